// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::time::Duration;

use membuf::BufferError;
use thiserror::Error;

/// A `Result` that may contain a [`StreamError`].
pub type Result<T> = std::result::Result<T, StreamError>;

/// A failure to move bytes between a stream and a buffer.
///
/// Transfers are never retried after an error. Bytes moved before the failure stay where they
/// were written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// The stream made no progress for the configured timeout.
    #[error("no progress was made for {elapsed:?}")]
    Timeout {
        /// Time since the last successful transfer of at least one byte.
        elapsed: Duration,
    },

    /// The stream ended before the requested number of bytes was read.
    #[error("stream ended after {transferred} bytes")]
    Eof {
        /// Bytes read before the stream ended.
        transferred: usize,
    },

    /// The stream reported an error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The buffer rejected the transfer.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl From<StreamError> for io::Error {
    fn from(error: StreamError) -> Self {
        match error {
            StreamError::Io(inner) => inner,
            StreamError::Timeout { .. } => Self::new(io::ErrorKind::TimedOut, error),
            StreamError::Eof { .. } => Self::new(io::ErrorKind::UnexpectedEof, error),
            StreamError::Buffer(_) => Self::other(error),
        }
    }
}
