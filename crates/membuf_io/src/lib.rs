// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Moves bytes between [`membuf`] buffers and [`std::io`] streams.
//!
//! * [`read_exact_into()`] and [`read_available_into()`] fill a range of a buffer from a reader.
//! * [`write_all_from()`] drains a range of a buffer into a writer.
//! * [`BufferReader`] and [`BufferWriter`] expose a buffer as a [`std::io::Read`] or
//!   [`std::io::Write`] so that it can be handed to any code that expects a stream.
//!
//! Transfers tolerate streams that make no progress for a while, such as non-blocking sockets
//! returning [`std::io::ErrorKind::WouldBlock`]. They give up with [`StreamError::Timeout`]
//! once [`StreamOptions::timeout()`] passes without a single byte moving.
//!
//! ```
//! use membuf::HeapBuffer;
//! use membuf_io::{StreamOptions, read_exact_into, write_all_from};
//!
//! let options = StreamOptions::new().with_chunk_size(2);
//!
//! let mut source: &[u8] = b"payload";
//! let mut buffer = HeapBuffer::new(7);
//! read_exact_into(&mut source, &mut buffer, 0, 7, &options)?;
//!
//! let mut sink = Vec::new();
//! write_all_from(&mut sink, &buffer, 3, 4, &options)?;
//!
//! assert_eq!(sink, b"load");
//! # Ok::<(), membuf_io::StreamError>(())
//! ```

mod adapters;
mod deadline;
mod error;
mod options;
mod read;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
mod write;

pub use adapters::{BufferReader, BufferWriter};
pub use deadline::ProgressDeadline;
pub use error::{Result, StreamError};
pub use options::StreamOptions;
pub use read::{read_available_into, read_exact_into};
pub use write::write_all_from;
