//! nonblocking-reader adapts a blocking `std::io::Read` into a reader whose
//! reads return within a bounded time.
//!
//! A background thread reads greedily from the source in blocks of up to
//! `block_size` bytes, handing each block to the `Reader` over a rendezvous
//! channel. A call to `Reader::read` then returns as soon as one of:
//!
//! * the caller's buffer can be filled from data already read,
//! * no new data has arrived for `Config::chunk_timeout`,
//! * `Config::timeout` has elapsed since the call began, or
//! * the source has been exhausted.
//!
//! Short (and zero-length) reads are normal and are not errors. Exhaustion
//! of the source is reported as `Error::Eof` once all data has been read.
//!
//! ```no_run
//! use nonblocking_reader::{Config, Reader};
//! use std::time::Duration;
//!
//! // Return after no data has been read for 200ms,
//! // or once the maximum timeout of 2 seconds is hit.
//! let config = Config::default()
//!     .with_timeout(Duration::from_secs(2))
//!     .with_chunk_timeout(Duration::from_millis(200));
//!
//! let mut reader = Reader::new(std::io::stdin(), 1 << 16, config).unwrap();
//! let mut buf = vec![0; 1 << 16];
//!
//! loop {
//!     match reader.read(&mut buf) {
//!         Ok(n) => println!("read {n} bytes"),
//!         Err(err) if err.is_eof() => break,
//!         Err(err) => panic!("{err}"),
//!     }
//! }
//! ```
use bytes::{Buf, BytesMut};
use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

mod config;
mod error;
mod producer;

pub use config::Config;
pub use error::Error;

/// Reader is a non-blocking reader over a blocking source.
///
/// Reads are not synchronized: `read` takes `&mut self`, and a Reader
/// is used by a single caller at a time. Dropping the Reader disconnects
/// its producer thread, which exits the next time it has data to hand off.
/// A producer which is blocked within a read of its source cannot be
/// interrupted, and exits only after that read returns.
#[derive(Debug)]
pub struct Reader {
    rx: Receiver<producer::Chunk>,
    buffer: BytesMut,
    eof: bool,
    failure: Option<io::Error>,
    block_size: usize,
    config: Config,
}

/// Stop is the reason that a call to `Reader::read` returned.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Stop {
    // Enough data was already buffered. No waiting was done.
    Buffered,
    // The stream was already known to be exhausted. No waiting was done.
    Exhausted,
    // Enough data arrived while waiting.
    Satisfied,
    // No data arrived within the chunk timeout.
    ChunkIdle,
    // The overall timeout elapsed.
    Deadline,
    // The source was exhausted while waiting.
    EndOfStream,
}

impl Reader {
    /// Build a Reader which reads from `source` in blocks of up to `block_size`,
    /// using timeouts of the given Config.
    /// A thread is started which immediately begins reading the source.
    pub fn new<R>(source: R, block_size: usize, config: Config) -> Result<Self, Error>
    where
        R: io::Read + Send + 'static,
    {
        if block_size == 0 {
            return Err(Error::InvalidBlockSize);
        }
        config.validate()?;

        // A zero-capacity channel is a rendezvous: the producer blocks until
        // each chunk is taken, and never runs more than one chunk ahead.
        let (tx, rx) = std::sync::mpsc::sync_channel(0);

        std::thread::Builder::new()
            .name("nonblocking-reader".to_string())
            .spawn(move || producer::produce(source, block_size, tx))
            .map_err(Error::Spawn)?;

        Ok(Self {
            rx,
            buffer: BytesMut::with_capacity(block_size),
            eof: false,
            failure: None,
            block_size,
            config,
        })
    }

    /// Read into `buf`, returning the number of bytes read.
    ///
    /// Returns as soon as `buf` can be filled, or after no data has arrived
    /// for the chunk timeout, or once the overall timeout has elapsed.
    /// Fewer bytes than requested, including zero, may be returned.
    ///
    /// Error::Eof is returned when the source is exhausted and all of its
    /// data has been read. If `Config::surface_source_errors` is set and the
    /// source failed, Error::Source is returned once, by the first read which
    /// has no remaining data to return.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.read_inner(buf).0
    }

    /// Number of bytes which have been read from the source
    /// but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once the end of the source has been observed.
    /// Buffered data may remain to be read.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Maximum number of bytes read from the source at a time.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Config of this Reader's timeouts.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> (Result<usize, Error>, Stop) {
        let start = Instant::now();
        let stop = self.fill(buf.len(), start);

        let n = buf.len().min(self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);

        tracing::trace!(
            requested = buf.len(),
            n,
            elapsed = ?start.elapsed(),
            ?stop,
            "read"
        );

        if n == 0 && !buf.is_empty() && self.eof {
            // A failure is surfaced by the first read which has no data to return,
            // including the read which observed it.
            if self.config.surface_source_errors {
                if let Some(err) = self.failure.take() {
                    return (Err(Error::Source(err)), stop);
                }
            }
            if stop == Stop::Exhausted {
                return (Err(Error::Eof), stop);
            }
        }
        (Ok(n), stop)
    }

    // Pull chunks from the producer until `want` bytes are buffered,
    // or a timeout fires, or the source is exhausted.
    fn fill(&mut self, want: usize, start: Instant) -> Stop {
        if self.buffer.len() >= want {
            return Stop::Buffered;
        } else if self.eof {
            return Stop::Exhausted;
        }
        let (timeout, chunk_timeout) = (self.config.timeout, self.config.chunk_timeout);

        while self.buffer.len() < want {
            let iteration = Instant::now();

            match self
                .rx
                .recv_timeout(next_timeout(timeout, chunk_timeout, start.elapsed()))
            {
                Ok(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(Err(err)) => {
                    self.failure = Some(err);
                    self.set_eof();
                    return Stop::EndOfStream;
                }
                Err(RecvTimeoutError::Timeout) if iteration.elapsed() >= chunk_timeout => {
                    return Stop::ChunkIdle;
                }
                // We waited out the remainder of the overall timeout,
                // which is checked below.
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.set_eof();
                    return Stop::EndOfStream;
                }
            }

            if start.elapsed() >= timeout {
                return Stop::Deadline;
            }
        }
        Stop::Satisfied
    }

    fn set_eof(&mut self) {
        tracing::debug!(
            buffered = self.buffer.len(),
            failed = self.failure.is_some(),
            "observed end of source"
        );
        self.eof = true;
    }
}

/// Reader is also a `std::io::Read`. End-of-stream maps to `Ok(0)`,
/// and a read which timed out without data fails with `ErrorKind::WouldBlock`.
impl io::Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Reader::read(self, buf) {
            Ok(0) if !buf.is_empty() && !self.eof => Err(io::ErrorKind::WouldBlock.into()),
            Ok(n) => Ok(n),
            Err(Error::Eof) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

// Time to wait for the next chunk, given the time `elapsed` since the read began.
fn next_timeout(timeout: Duration, chunk_timeout: Duration, elapsed: Duration) -> Duration {
    let remaining = timeout.saturating_sub(elapsed);

    if chunk_timeout.is_zero() || chunk_timeout > remaining {
        remaining
    } else {
        chunk_timeout
    }
}
