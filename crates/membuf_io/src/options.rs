// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Configures a transfer between a stream and a buffer.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use membuf_io::StreamOptions;
///
/// let options = StreamOptions::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_chunk_size(1024);
///
/// assert_eq!(options.timeout(), Duration::from_secs(5));
/// assert_eq!(options.chunk_size(), 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    timeout: Duration,
    chunk_size: usize,
}

impl StreamOptions {
    /// How long a transfer may go without progress when no timeout is configured.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Largest number of bytes moved per stream call when no chunk size is configured.
    pub const DEFAULT_CHUNK_SIZE: usize = 8192;

    /// Creates options with the default timeout and chunk size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets how long a transfer may go without moving a single byte before it fails.
    ///
    /// The timer restarts whenever at least one byte is moved, so a slow but steady stream
    /// never times out.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the largest number of bytes moved per stream call.
    ///
    /// A chunk size of zero is treated as one.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        self
    }

    /// How long a transfer may go without progress.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest number of bytes moved per stream call.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new()
    }
}
