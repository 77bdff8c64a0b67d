// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Endianness-aware, bounds-checked byte buffers over interchangeable storage.
//!
//! A buffer is a fixed-capacity range of bytes that can be read and written at arbitrary
//! indices, either as raw bytes or as typed values. Every buffer implements the [`Buffer`]
//! trait, so code that encodes or decodes data does not need to know where the bytes live:
//!
//! * [`HeapBuffer`] keeps its bytes in a heap allocation.
//! * [`NativeBuffer`] keeps its bytes in memory allocated outside any Rust collection, released
//!   deterministically through [`NativeBuffer::release()`] or when the owner is dropped.
//! * [`BytesMutBuffer`] adapts a [`bytes::BytesMut`].
//! * [`CompositeBuffer`] concatenates other buffers into one addressable range.
//!
//! Decorators change how an existing buffer behaves: [`SwappedBuffer`] reverses its byte
//! order, [`ReadOnlyBuffer`] rejects every mutation and [`LockedBuffer`] serializes access
//! from multiple threads.
//!
//! # Reading and writing values
//!
//! Each buffer has a [`ByteOrder`], native to the host CPU unless chosen otherwise. Typed
//! accessors come in families: the direct family (`get_i32()`, `put_f64()`, ...) uses the
//! order of the buffer, the foreign family (`get_i32_foreign()`, ...) uses the opposite
//! order, and the generic family (`get_num_le::<T>()`, `get_num_be::<T>()`, ...) uses an
//! explicit order. All of them are available on every buffer via [`BufferExt`].
//!
//! ```
//! use membuf::{Buffer, BufferExt, ByteOrder, HeapBuffer};
//!
//! let mut buffer = HeapBuffer::new(12).with_order(ByteOrder::BigEndian);
//!
//! buffer.put_u16(0, 0xCAFE)?;
//! buffer.put_f64(2, 0.25)?;
//! buffer.put_u16_foreign(10, 0xCAFE)?;
//!
//! assert_eq!(buffer.get_u8(0)?, 0xCA);
//! assert_eq!(buffer.get_num_le::<u16>(10)?, 0xCAFE);
//! assert!(buffer.get_u32(10).is_err());
//! # Ok::<(), membuf::BufferError>(())
//! ```
//!
//! Every access is bounds-checked before any byte is touched: an access that does not fit
//! fails with [`BufferError::OutOfBounds`] and leaves the buffer unchanged.
//!
//! # Views and clones
//!
//! [`slice()`][Buffer::slice] and [`new_slice()`][Buffer::new_slice] return views that share
//! storage with the buffer they came from; writes through either are visible through the
//! other. [`clone_range()`][Buffer::clone_range] copies bytes into independent storage.
//!
//! ```
//! use membuf::{Buffer, HeapBuffer};
//!
//! let mut buffer = HeapBuffer::new(8);
//! let mut view = buffer.new_slice(4, 4)?;
//! let clone = buffer.clone_range(4, 4)?;
//!
//! view.put_u8(0, 42)?;
//!
//! assert_eq!(buffer.get_u8(4)?, 42);
//! assert_eq!(clone.get_u8(0)?, 0);
//! # Ok::<(), membuf::BufferError>(())
//! ```
//!
//! # Growth
//!
//! Buffers created with a [`GrowthPolicy`] are expandable: writes past the end grow them
//! instead of failing. Views created before the growth no longer refer to the storage of
//! the buffer and report [`BufferError::Stale`] when used.
//!
//! # Threads
//!
//! [`HeapBuffer`], [`NativeBuffer`] and [`CompositeBuffer`] share storage between views
//! without synchronization, so they are neither `Send` nor `Sync`. [`BytesMutBuffer`] keeps
//! its [`bytes::BytesMut`] behind a mutex and can be used from any thread. Wrap it in a
//! [`LockedBuffer`] when a sequence of operations must not interleave with other threads.

mod buffer;
mod bytes_mut;
mod composite;
mod constants;
mod copy;
mod error;
mod ext;
mod growth;
mod heap;
mod locked;
mod native;
mod native_memory;
mod order;
mod raw;
mod read_only;
mod strings;
mod swapped;
#[cfg(any(test, feature = "test-util"))]
mod testing;

pub use buffer::{Backend, Buffer};
pub use bytes_mut::BytesMutBuffer;
pub use composite::CompositeBuffer;
pub use constants::DEFAULT_MAX_CAPACITY;
pub use error::{BufferError, Result};
pub use ext::BufferExt;
pub use growth::GrowthPolicy;
pub use heap::HeapBuffer;
pub use locked::LockedBuffer;
pub use native::NativeBuffer;
pub use native_memory::NativeMemory;
pub use order::ByteOrder;
pub use read_only::ReadOnlyBuffer;
pub use swapped::SwappedBuffer;
#[cfg(any(test, feature = "test-util"))]
pub use testing::PlainTestBuffer;
