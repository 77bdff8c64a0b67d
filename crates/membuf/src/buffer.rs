// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::cell::Cell;
use std::fmt::Debug;
use std::ptr::NonNull;

use bytes::Bytes;

use crate::constants::FILL_CHUNK_LEN;
use crate::raw::check_range;
use crate::{BufferError, ByteOrder, Result};

/// The storage technology behind a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Backend {
    /// A byte array on the Rust heap.
    Heap,

    /// A native memory region outside any Rust collection.
    Native,

    /// Storage owned by a third-party buffer type.
    ThirdParty,

    /// A concatenation of other buffers.
    Composite,
}

/// Uniform, bounds-checked access to a fixed-capacity range of bytes.
///
/// The trait is object-safe and every backend, view and decorator in this crate implements
/// it, so calling code can treat them interchangeably as `dyn Buffer`. The typed accessor
/// families, string helpers and bulk copies are provided by [`BufferExt`][crate::BufferExt].
///
/// # Direct accessors
///
/// The fixed-width accessors on this trait use the byte order reported by [`order()`][Self::order].
/// Backends only need to implement [`get_bytes()`][Self::get_bytes] and
/// [`put_bytes()`][Self::put_bytes]; the fixed-width accessors have default implementations
/// on top of them that backends override where they can do better.
///
/// # Capability probes
///
/// A buffer advertises how its bytes can be reached: as heap cells ([`array()`][Self::array]),
/// through a raw address ([`address()`][Self::address]) or as a contiguous chunk
/// ([`nio_bytes()`][Self::nio_bytes]). Bulk copies use these to pick the fastest path and
/// fall back to staging through a temporary when nothing else applies.
///
/// # Views
///
/// [`slice()`][Self::slice] returns a view that shares storage with its parent and is reused
/// across calls; [`new_slice()`][Self::new_slice] returns an independent handle to a fresh
/// view. Neither copies bytes. [`clone_range()`][Self::clone_range] copies bytes into new,
/// independently owned storage.
///
/// # Writes past the end
///
/// Writes that end past the capacity of an expandable buffer first grow the buffer; on
/// other buffers they fail with [`BufferError::OutOfBounds`] without touching any byte.
pub trait Buffer: Any + Debug {
    /// Number of addressable bytes.
    fn capacity(&self) -> usize;

    /// Byte order used by the direct accessor family.
    fn order(&self) -> ByteOrder;

    /// The storage technology behind the buffer.
    fn backend(&self) -> Backend;

    /// Whether every mutation is rejected with [`BufferError::ReadOnly`].
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether writes past the end and [`ensure_capacity()`][Self::ensure_capacity] grow the buffer.
    fn is_expandable(&self) -> bool {
        false
    }

    /// Offset of the first byte of this buffer from the start of the physical storage.
    fn wrap_adjustment(&self) -> usize {
        0
    }

    /// Whether the bytes are reachable as heap cells.
    fn has_array(&self) -> bool {
        false
    }

    /// The bytes of the buffer as heap cells, if the storage is still current.
    fn array(&self) -> Option<&[Cell<u8>]> {
        None
    }

    /// Whether the bytes are reachable through a raw address.
    fn has_address(&self) -> bool {
        false
    }

    /// Address of the first byte of the buffer, if the storage is still current.
    ///
    /// The address stays valid until the buffer grows or its storage is released. Any
    /// access through it is `unsafe` and must stay within [`capacity()`][Self::capacity] bytes.
    fn address(&self) -> Option<NonNull<u8>> {
        None
    }

    /// Whether [`nio_bytes()`][Self::nio_bytes] can produce a contiguous chunk.
    fn has_nio(&self) -> bool {
        false
    }

    /// Returns `[index, index + length)` as one contiguous chunk.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Unsupported`] unless [`has_nio()`][Self::has_nio] is `true`.
    fn nio_bytes(&self, index: usize, length: usize) -> Result<Bytes> {
        _ = (index, length);
        Err(BufferError::unsupported("nio_bytes"))
    }

    /// Copies `dst.len()` bytes starting at `index` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()>;

    /// Copies `src` into the buffer starting at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ReadOnly`] for read-only buffers and
    /// [`BufferError::OutOfBounds`] if the range does not fit in a non-expandable buffer.
    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()>;

    /// Sets `length` bytes starting at `index` to `value`.
    ///
    /// # Errors
    ///
    /// Same as [`put_bytes()`][Self::put_bytes].
    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        prepare_write(self, index, length)?;

        let end = index + length;
        let chunk = [value; FILL_CHUNK_LEN];
        let mut position = index;

        while position < end {
            let step = (end - position).min(FILL_CHUNK_LEN);
            self.put_bytes(position, &chunk[..step])?;
            position += step;
        }

        Ok(())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `index >= capacity()`.
    fn get_u8(&self, index: usize) -> Result<u8> {
        let mut bytes = [0; 1];
        self.get_bytes(index, &mut bytes)?;
        Ok(bytes[0])
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Same as [`put_bytes()`][Self::put_bytes].
    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.put_bytes(index, &[value])
    }

    /// Reads a `u16` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u16(&self, index: usize) -> Result<u16> {
        let mut bytes = [0; 2];
        self.get_bytes(index, &mut bytes)?;
        Ok(self.order().decode(&bytes))
    }

    /// Writes a `u16` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Same as [`put_bytes()`][Self::put_bytes].
    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        let bytes = self.order().encode(&value);
        self.put_bytes(index, &bytes)
    }

    /// Reads a `u32` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u32(&self, index: usize) -> Result<u32> {
        let mut bytes = [0; 4];
        self.get_bytes(index, &mut bytes)?;
        Ok(self.order().decode(&bytes))
    }

    /// Writes a `u32` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Same as [`put_bytes()`][Self::put_bytes].
    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        let bytes = self.order().encode(&value);
        self.put_bytes(index, &bytes)
    }

    /// Reads a `u64` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u64(&self, index: usize) -> Result<u64> {
        let mut bytes = [0; 8];
        self.get_bytes(index, &mut bytes)?;
        Ok(self.order().decode(&bytes))
    }

    /// Writes a `u64` in the buffer's byte order.
    ///
    /// # Errors
    ///
    /// Same as [`put_bytes()`][Self::put_bytes].
    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        let bytes = self.order().encode(&value);
        self.put_bytes(index, &bytes)
    }

    /// Ensures the buffer can hold at least `capacity` bytes, growing it if it is expandable.
    ///
    /// Capacity never decreases and existing bytes are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Unsupported`] if the buffer is too small and cannot grow, and
    /// [`BufferError::CapacityExceeded`] if growth would exceed the maximum capacity. In both
    /// cases the buffer is unchanged.
    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            Ok(())
        } else {
            Err(BufferError::unsupported("ensure_capacity"))
        }
    }

    /// Returns a view over `[index, index + length)` that shares storage with this buffer.
    ///
    /// The view object is owned by this buffer and reused by the next call. A view of the
    /// full range is this buffer itself.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer>;

    /// Returns a view over `[index, capacity())`, like [`slice()`][Self::slice].
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `index > capacity()`.
    fn slice_from(&mut self, index: usize) -> Result<&mut dyn Buffer> {
        let length = remaining_from(index, self.capacity())?;
        self.slice(index, length)
    }

    /// Returns a fresh, independently held view over `[index, index + length)`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>>;

    /// Returns a fresh view over `[index, capacity())`, like [`new_slice()`][Self::new_slice].
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `index > capacity()`.
    fn new_slice_from(&self, index: usize) -> Result<Box<dyn Buffer>> {
        let length = remaining_from(index, self.capacity())?;
        self.new_slice(index, length)
    }

    /// Copies `[index, index + length)` into new storage of the same kind.
    ///
    /// The copy is writable, not expandable, uses the same byte order and shares nothing
    /// with this buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>>;

    /// Copies the whole buffer into new storage, like [`clone_range()`][Self::clone_range].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage of the buffer is no longer accessible.
    fn clone_buffer(&self) -> Result<Box<dyn Buffer>> {
        self.clone_range(0, self.capacity())
    }

    /// The buffer wrapped by a decorator, if this is one.
    fn inner(&self) -> Option<&(dyn Buffer + 'static)> {
        None
    }

    /// The buffer wrapped by a decorator, if this is one.
    fn inner_mut(&mut self) -> Option<&mut (dyn Buffer + 'static)> {
        None
    }
}

impl dyn Buffer {
    /// Returns the concrete buffer type behind this trait object, looking through decorators.
    ///
    /// Returns `None` if neither this buffer nor anything it wraps is a `T`.
    ///
    /// # Example
    ///
    /// ```
    /// use membuf::{Buffer, HeapBuffer, ReadOnlyBuffer};
    ///
    /// let buffer: Box<dyn Buffer> = Box::new(ReadOnlyBuffer::new(HeapBuffer::new(4)));
    ///
    /// assert!(buffer.unwrap_as::<HeapBuffer>().is_some());
    /// assert!(buffer.unwrap_as::<membuf::NativeBuffer>().is_none());
    /// ```
    #[must_use]
    pub fn unwrap_as<T: Buffer>(&self) -> Option<&T> {
        let any: &dyn Any = self;

        match any.downcast_ref::<T>() {
            Some(found) => Some(found),
            None => self.inner()?.unwrap_as(),
        }
    }

    /// Mutable counterpart of [`unwrap_as()`][Self::unwrap_as].
    #[must_use]
    pub fn unwrap_as_mut<T: Buffer>(&mut self) -> Option<&mut T> {
        if (&*self as &dyn Any).is::<T>() {
            let any: &mut dyn Any = self;
            return any.downcast_mut::<T>();
        }

        self.inner_mut()?.unwrap_as_mut()
    }
}

impl Buffer for Box<dyn Buffer> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn order(&self) -> ByteOrder {
        (**self).order()
    }

    fn backend(&self) -> Backend {
        (**self).backend()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn is_expandable(&self) -> bool {
        (**self).is_expandable()
    }

    fn wrap_adjustment(&self) -> usize {
        (**self).wrap_adjustment()
    }

    fn has_array(&self) -> bool {
        (**self).has_array()
    }

    fn array(&self) -> Option<&[Cell<u8>]> {
        (**self).array()
    }

    fn has_address(&self) -> bool {
        (**self).has_address()
    }

    fn address(&self) -> Option<NonNull<u8>> {
        (**self).address()
    }

    fn has_nio(&self) -> bool {
        (**self).has_nio()
    }

    fn nio_bytes(&self, index: usize, length: usize) -> Result<Bytes> {
        (**self).nio_bytes(index, length)
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        (**self).get_bytes(index, dst)
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        (**self).put_bytes(index, src)
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        (**self).fill(index, length, value)
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        (**self).get_u8(index)
    }

    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        (**self).put_u8(index, value)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        (**self).get_u16(index)
    }

    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        (**self).put_u16(index, value)
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        (**self).get_u32(index)
    }

    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        (**self).put_u32(index, value)
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        (**self).get_u64(index)
    }

    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        (**self).put_u64(index, value)
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        (**self).ensure_capacity(capacity)
    }

    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer> {
        (**self).slice(index, length)
    }

    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        (**self).new_slice(index, length)
    }

    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        (**self).clone_range(index, length)
    }

    // A box is transparent to unwrapping.
    fn inner(&self) -> Option<&(dyn Buffer + 'static)> {
        Some(&**self)
    }

    fn inner_mut(&mut self) -> Option<&mut (dyn Buffer + 'static)> {
        Some(&mut **self)
    }
}

pub(crate) fn remaining_from(index: usize, capacity: usize) -> Result<usize> {
    capacity
        .checked_sub(index)
        .ok_or_else(|| BufferError::out_of_bounds(index, 0, capacity))
}

/// Stores `value` in the slot, reusing the allocation of whatever the slot held before.
pub(crate) fn reuse_slot<T>(slot: &mut Option<Box<T>>, value: T) -> &mut T {
    let boxed = match slot.take() {
        Some(mut boxed) => {
            *boxed = value;
            boxed
        }
        None => Box::new(value),
    };

    slot.insert(boxed)
}

/// Grows an expandable buffer so that `[index, index + length)` fits, then validates the range.
pub(crate) fn prepare_write<B: Buffer + ?Sized>(buffer: &mut B, index: usize, length: usize) -> Result<()> {
    if buffer.is_read_only() {
        return Err(BufferError::ReadOnly);
    }

    let end = index
        .checked_add(length)
        .ok_or_else(|| BufferError::out_of_bounds(index, length, buffer.capacity()))?;

    if end > buffer.capacity() && buffer.is_expandable() {
        buffer.ensure_capacity(end)?;
    }

    check_range(index, length, buffer.capacity()).map(|_| ())
}
