use bytes::Bytes;
use std::io::{self, Read};
use std::sync::mpsc::SyncSender;

/// Message handed from the producer to the reader.
/// An Err is always the final message before the channel closes.
pub type Chunk = io::Result<Bytes>;

/// Why the producer loop stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Exit {
    /// The source returned a zero-length read.
    Eof,
    /// The source returned an error, which was forwarded.
    Failed,
    /// The reader went away.
    Disconnected,
}

/// Read chunks of up to `block_size` from `source` and forward each one to `tx`,
/// until the source is exhausted or fails, or the receiver is dropped.
/// Dropping `tx` on return closes the channel.
pub fn produce<R: Read>(mut source: R, block_size: usize, tx: SyncSender<Chunk>) -> Exit {
    let (mut total, mut chunks) = (0usize, 0usize);
    tracing::debug!(block_size, "producer started");

    let exit = loop {
        let mut block = vec![0; block_size];

        let n = match source.read(&mut block) {
            Ok(0) => break Exit::Eof,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, total, "source read failed");
                _ = tx.send(Err(err));
                break Exit::Failed;
            }
        };
        block.truncate(n);

        tracing::trace!(n, "read chunk from source");

        if tx.send(Ok(Bytes::from(block))).is_err() {
            break Exit::Disconnected;
        }
        total += n;
        chunks += 1;
    };

    tracing::debug!(?exit, total, chunks, "producer exiting");
    exit
}

#[cfg(test)]
mod test {
    use super::{produce, Exit};
    use std::io::{self, Read};
    use std::sync::mpsc::sync_channel;

    // Returns canned results in order, then EOF.
    struct Canned(std::vec::IntoIter<io::Result<Vec<u8>>>);

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.next() {
                Some(Ok(data)) => {
                    assert!(data.len() <= buf.len());
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    fn canned(results: Vec<io::Result<&'static [u8]>>) -> Canned {
        Canned(
            results
                .into_iter()
                .map(|r| r.map(|b| b.to_vec()))
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    #[test]
    fn test_forwards_chunks_until_eof() {
        let (tx, rx) = sync_channel(0);
        let source = canned(vec![Ok(&b"ab"[..]), Ok(&b"cde"[..])]);
        let handle = std::thread::spawn(move || produce(source, 4, tx));

        let chunks: Vec<_> = rx.iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks, vec![&b"ab"[..], &b"cde"[..]]);
        assert_eq!(handle.join().unwrap(), Exit::Eof);
    }

    #[test]
    fn test_retries_interrupted_reads() {
        let (tx, rx) = sync_channel(0);
        let source = canned(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(&b"x"[..]),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(&b"y"[..]),
        ]);
        let handle = std::thread::spawn(move || produce(source, 1, tx));

        let chunks: Vec<_> = rx.iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks, vec![&b"x"[..], &b"y"[..]]);
        assert_eq!(handle.join().unwrap(), Exit::Eof);
    }

    #[test]
    fn test_forwards_failure_then_closes() {
        let (tx, rx) = sync_channel(0);
        let source = canned(vec![
            Ok(&b"ok"[..]),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(&b"never read"[..]),
        ]);
        let handle = std::thread::spawn(move || produce(source, 16, tx));

        assert_eq!(rx.recv().unwrap().unwrap(), &b"ok"[..]);
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(rx.recv().is_err());
        assert_eq!(handle.join().unwrap(), Exit::Failed);
    }

    #[test]
    fn test_stops_when_receiver_is_dropped() {
        let (tx, rx) = sync_channel(0);
        std::mem::drop(rx);

        let source = io::repeat(7);
        assert_eq!(produce(source, 8, tx), Exit::Disconnected);
    }
}
