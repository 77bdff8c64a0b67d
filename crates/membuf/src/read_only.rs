// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;

use crate::buffer::reuse_slot;
use crate::{Backend, Buffer, BufferError, ByteOrder, Result};

/// Rejects every mutation of the wrapped buffer with [`BufferError::ReadOnly`].
///
/// The wrapper hides the array and address probes, so bulk copies can never write through
/// them either. Views of a read-only buffer are read-only; clones are independent copies
/// and therefore writable.
#[derive(Debug)]
pub struct ReadOnlyBuffer<B> {
    inner: B,
    slice_cache: Option<Box<ReadOnlyBuffer<Box<dyn Buffer>>>>,
}

impl<B: Buffer> ReadOnlyBuffer<B> {
    /// Wraps `inner`, making it read-only.
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

impl<B: Buffer> Buffer for ReadOnlyBuffer<B> {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn order(&self) -> ByteOrder {
        self.inner.order()
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn wrap_adjustment(&self) -> usize {
        self.inner.wrap_adjustment()
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

    fn put_bytes(&mut self, _index: usize, _src: &[u8]) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn fill(&mut self, _index: usize, _length: usize, _value: u8) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        self.inner.get_u8(index)
    }

    fn put_u8(&mut self, _index: usize, _value: u8) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        self.inner.get_u16(index)
    }

    fn put_u16(&mut self, _index: usize, _value: u16) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        self.inner.get_u32(index)
    }

    fn put_u32(&mut self, _index: usize, _value: u32) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        self.inner.get_u64(index)
    }

    fn put_u64(&mut self, _index: usize, _value: u64) -> Result<()> {
        Err(BufferError::ReadOnly)
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            Ok(())
        } else {
            Err(BufferError::ReadOnly)
        }
    }

    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer> {
        if index == 0 && length == self.capacity() {
            return Ok(self);
        }

        let view = ReadOnlyBuffer::new(self.inner.new_slice(index, length)?);
        Ok(reuse_slot::<ReadOnlyBuffer<Box<dyn Buffer>>>(&mut self.slice_cache, view))
    }

    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(ReadOnlyBuffer::new(self.inner.new_slice(index, length)?)))
    }

    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        self.inner.clone_range(index, length)
    }

    fn inner(&self) -> Option<&(dyn Buffer + 'static)> {
        Some(&self.inner)
    }

    fn inner_mut(&mut self) -> Option<&mut (dyn Buffer + 'static)> {
        Some(&mut self.inner)
    }
}
