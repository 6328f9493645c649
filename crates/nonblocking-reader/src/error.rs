use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("end of stream")]
    Eof,

    #[error("source read failed: {0}")]
    Source(#[source] std::io::Error),

    #[error("block size must be greater than zero")]
    InvalidBlockSize,

    #[error("chunk timeout ({chunk_timeout:?}) must not exceed the overall timeout ({timeout:?})")]
    ChunkTimeoutExceedsTimeout {
        chunk_timeout: Duration,
        timeout: Duration,
    },

    #[error("failed to spawn the producer thread")]
    Spawn(#[source] std::io::Error),
}

impl Error {
    /// Returns true if this is the end-of-stream condition,
    /// as opposed to a failure.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Eof => std::io::ErrorKind::UnexpectedEof.into(),
            Error::Source(err) | Error::Spawn(err) => err,
            err @ (Error::InvalidBlockSize | Error::ChunkTimeoutExceedsTimeout { .. }) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
            }
        }
    }
}
