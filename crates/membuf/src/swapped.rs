// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;

use crate::buffer::reuse_slot;
use crate::{Backend, Buffer, ByteOrder, Result};

/// Presents a buffer in the opposite byte order.
///
/// The direct accessor family of the wrapper is the foreign family of the wrapped buffer
/// and vice versa. Bytes are not changed; only how multi-byte values are interpreted.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, ByteOrder, HeapBuffer, SwappedBuffer};
///
/// let mut buffer = SwappedBuffer::new(HeapBuffer::new(2).with_order(ByteOrder::LittleEndian));
/// assert_eq!(buffer.order(), ByteOrder::BigEndian);
///
/// buffer.put_u16(0, 0x0102)?;
/// assert_eq!(buffer.into_inner().get_u16(0)?, 0x0201);
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct SwappedBuffer<B> {
    inner: B,
    slice_cache: Option<Box<SwappedBuffer<Box<dyn Buffer>>>>,
}

impl<B: Buffer> SwappedBuffer<B> {
    /// Wraps `inner`, reversing the byte order it reports.
    #[must_use]
    pub const fn new(inner: B) -> Self {
        Self { inner, slice_cache: None }
    }

    /// Returns the wrapped buffer.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: Buffer> Buffer for SwappedBuffer<B> {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn order(&self) -> ByteOrder {
        self.inner.order().swapped()
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn is_expandable(&self) -> bool {
        self.inner.is_expandable()
    }

    fn wrap_adjustment(&self) -> usize {
        self.inner.wrap_adjustment()
    }

    fn has_array(&self) -> bool {
        self.inner.has_array()
    }

    fn array(&self) -> Option<&[std::cell::Cell<u8>]> {
        self.inner.array()
    }

    fn has_address(&self) -> bool {
        self.inner.has_address()
    }

    fn address(&self) -> Option<std::ptr::NonNull<u8>> {
        self.inner.address()
    }

    fn has_nio(&self) -> bool {
        self.inner.has_nio()
    }

    fn nio_bytes(&self, index: usize, length: usize) -> Result<Bytes> {
        self.inner.nio_bytes(index, length)
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.inner.get_bytes(index, dst)
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.inner.put_bytes(index, src)
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        self.inner.fill(index, length, value)
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        self.inner.get_u8(index)
    }

    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.inner.put_u8(index, value)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        self.inner.get_u16(index).map(u16::swap_bytes)
    }

    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        self.inner.put_u16(index, value.swap_bytes())
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        self.inner.get_u32(index).map(u32::swap_bytes)
    }

    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        self.inner.put_u32(index, value.swap_bytes())
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        self.inner.get_u64(index).map(u64::swap_bytes)
    }

    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        self.inner.put_u64(index, value.swap_bytes())
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        self.inner.ensure_capacity(capacity)
    }

    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer> {
        if index == 0 && length == self.capacity() {
            return Ok(self);
        }

        let view = SwappedBuffer::new(self.inner.new_slice(index, length)?);
        Ok(reuse_slot::<SwappedBuffer<Box<dyn Buffer>>>(&mut self.slice_cache, view))
    }

    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(SwappedBuffer::new(self.inner.new_slice(index, length)?)))
    }

    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(SwappedBuffer::new(self.inner.clone_range(index, length)?)))
    }

    fn inner(&self) -> Option<&(dyn Buffer + 'static)> {
        Some(&self.inner)
    }

    fn inner_mut(&mut self) -> Option<&mut (dyn Buffer + 'static)> {
        Some(&mut self.inner)
    }
}
