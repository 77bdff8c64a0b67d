// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::buffer::reuse_slot;
use crate::constants::ERR_POISONED_LOCK;
use crate::raw::check_range;
use crate::{Backend, Buffer, ByteOrder, Result};

/// Serializes every operation on a buffer behind one lock.
///
/// Slices of a locked buffer are windows onto the same wrapped buffer that take the same
/// lock, so every operation on the buffer or any of its slices is serialized. The lock is
/// held for the duration of a single operation.
///
/// The wrapper is `Send` and `Sync` when the wrapped buffer is `Send`, which holds for
/// [`BytesMutBuffer`][crate::BytesMutBuffer]. [`HeapBuffer`][crate::HeapBuffer],
/// [`NativeBuffer`][crate::NativeBuffer] and [`CompositeBuffer`][crate::CompositeBuffer] share
/// storage with their views without synchronization; they are not `Send` and stay confined to
/// one thread even when locked.
///
/// Cell and address probes are hidden because the bytes may only be touched under the lock.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, HeapBuffer, LockedBuffer};
///
/// let mut buffer = LockedBuffer::new(HeapBuffer::new(8));
/// buffer.put_u32(4, 7)?;
///
/// let window = buffer.new_slice(4, 4)?;
/// assert_eq!(window.get_u32(0)?, 7);
///
/// let capacity = buffer.with_inner(|inner| inner.capacity());
/// assert_eq!(capacity, 8);
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct LockedBuffer<B> {
    shared: Arc<Mutex<B>>,

    // Offset and length of a slice; `None` addresses the whole wrapped buffer.
    window: Option<(usize, usize)>,
    slice_cache: Option<Box<Self>>,
}

impl<B: Buffer> LockedBuffer<B> {
    /// Wraps `inner` behind a new lock.
    #[must_use]
    pub fn new(inner: B) -> Self {
        Self {
            shared: Arc::new(Mutex::new(inner)),
            window: None,
            slice_cache: None,
        }
    }

    /// Runs `f` against the wrapped buffer while holding the lock.
    ///
    /// For slices, `f` still receives the whole wrapped buffer. Several operations made by `f`
    /// are atomic with respect to every other handle of the wrapped buffer.
    ///
    /// # Panics
    ///
    /// The lock is held while `f` runs. Using this buffer or any of its slices from within `f`
    /// deadlocks or panics.
    pub fn with_inner<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, B> {
        self.shared.lock().expect(ERR_POISONED_LOCK)
    }

    /// Translates an index of this buffer to an index of the wrapped buffer.
    fn translate(&self, index: usize, length: usize) -> Result<usize> {
        match self.window {
            Some((offset, len)) => {
                check_range(index, length, len)?;
                Ok(offset + index)
            }
            None => Ok(index),
        }
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.capacity())?;

        let offset = self.window.map_or(0, |(offset, _)| offset);

        Ok(Self {
            shared: Arc::clone(&self.shared),
            window: Some((offset + index, length)),
            slice_cache: None,
        })
    }
}

impl<B: Buffer> Buffer for LockedBuffer<B> {
    fn capacity(&self) -> usize {
        match self.window {
            Some((_, len)) => len,
            None => self.lock().capacity(),
        }
    }

    fn order(&self) -> ByteOrder {
        self.lock().order()
    }

    fn backend(&self) -> Backend {
        self.lock().backend()
    }

    fn is_read_only(&self) -> bool {
        self.lock().is_read_only()
    }

    fn is_expandable(&self) -> bool {
        self.window.is_none() && self.lock().is_expandable()
    }

    fn wrap_adjustment(&self) -> usize {
        let offset = self.window.map_or(0, |(offset, _)| offset);
        self.lock().wrap_adjustment() + offset
    }

    fn has_nio(&self) -> bool {
        self.lock().has_nio()
    }

    fn nio_bytes(&self, index: usize, length: usize) -> Result<Bytes> {
        let at = self.translate(index, length)?;
        self.lock().nio_bytes(at, length)
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        let at = self.translate(index, dst.len())?;
        self.lock().get_bytes(at, dst)
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        let at = self.translate(index, src.len())?;
        self.lock().put_bytes(at, src)
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        let at = self.translate(index, length)?;
        self.lock().fill(at, length, value)
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        let at = self.translate(index, 1)?;
        self.lock().get_u8(at)
    }

    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        let at = self.translate(index, 1)?;
        self.lock().put_u8(at, value)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        let at = self.translate(index, size_of::<u16>())?;
        self.lock().get_u16(at)
    }

    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        let at = self.translate(index, size_of::<u16>())?;
        self.lock().put_u16(at, value)
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        let at = self.translate(index, size_of::<u32>())?;
        self.lock().get_u32(at)
    }

    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        let at = self.translate(index, size_of::<u32>())?;
        self.lock().put_u32(at, value)
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        let at = self.translate(index, size_of::<u64>())?;
        self.lock().get_u64(at)
    }

    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        let at = self.translate(index, size_of::<u64>())?;
        self.lock().put_u64(at, value)
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        match self.window {
            Some((_, len)) => check_range(0, capacity, len)
                .map(|_| ())
                .map_err(|_out_of_bounds| crate::BufferError::unsupported("ensure_capacity")),
            None => self.lock().ensure_capacity(capacity),
        }
    }

    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer> {
        if index == 0 && length == self.capacity() {
            return Ok(self);
        }

        let view = self.view(index, length)?;
        Ok(reuse_slot::<Self>(&mut self.slice_cache, view))
    }

    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(self.view(index, length)?))
    }

    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        let at = self.translate(index, length)?;
        self.lock().clone_range(at, length)
    }
}
