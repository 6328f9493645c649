use crate::Error;
use std::time::Duration;

/// Config controls how long a call to `Reader::read` may wait for data.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// # Maximum time that a single read may wait, across all chunks.
    /// A read returns once this much time has elapsed, even if no data was read.
    /// Zero (the default) means a read returns only what is already available.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Duration,
    /// # Maximum time that a read waits for the next chunk.
    /// A read returns early once no data has arrived for this long, even if
    /// the overall timeout has not been reached. Zero (the default) disables
    /// the chunk-level limit. Must not exceed `timeout`.
    #[serde(default, with = "humantime_serde")]
    pub chunk_timeout: Duration,
    /// # Report source failures distinctly from end-of-stream.
    /// By default, any error of the underlying source is treated as a clean
    /// end of the stream. When set, the error is returned once after all
    /// preceding data has been read.
    #[serde(default)]
    pub surface_source_errors: bool,
}

impl Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunk_timeout(mut self, chunk_timeout: Duration) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    pub fn with_surface_source_errors(mut self, surface: bool) -> Self {
        self.surface_source_errors = surface;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.chunk_timeout.is_zero() && self.chunk_timeout > self.timeout {
            return Err(Error::ChunkTimeoutExceedsTimeout {
                chunk_timeout: self.chunk_timeout,
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}
