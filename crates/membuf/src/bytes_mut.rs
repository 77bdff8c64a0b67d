// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tracing::{Level, event};

use crate::buffer::{prepare_write, reuse_slot};
use crate::constants::ERR_POISONED_LOCK;
use crate::raw::check_range;
use crate::{Backend, Buffer, BufferError, ByteOrder, GrowthPolicy, Result};

/// A buffer over a [`BytesMut`] from the `bytes` crate.
///
/// The initialized bytes of the [`BytesMut`] (its `len()`) are the contents of the buffer.
/// Views share the same [`BytesMut`] and, unlike views of other backends, stay valid when
/// the owner grows, because they address the storage by offset rather than by address.
///
/// The [`BytesMut`] is shared behind a mutex, so this buffer and its views are `Send` and
/// `Sync`. Each operation takes the mutex once; a sequence of operations is not atomic unless
/// the buffer is wrapped in a [`LockedBuffer`][crate::LockedBuffer].
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use membuf::{Buffer, BufferExt, BytesMutBuffer};
///
/// let mut buffer = BytesMutBuffer::new(BytesMut::from(&b"\x00\x2A"[..]));
/// assert_eq!(buffer.get_num_be::<u16>(0)?, 42);
///
/// let bytes = buffer.with_bytes_mut(|bytes| bytes.split().freeze());
/// assert_eq!(&bytes[..], b"\x00\x2A");
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct BytesMutBuffer {
    inner: Arc<Mutex<BytesMut>>,
    offset: usize,

    // The owner tracks the length of the `BytesMut` itself.
    len: Option<usize>,
    order: ByteOrder,
    growth: Option<GrowthPolicy>,
    slice_cache: Option<Box<Self>>,
}

impl BytesMutBuffer {
    /// Adapts an existing [`BytesMut`], using its initialized bytes as the contents.
    #[must_use]
    pub fn new(bytes: BytesMut) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bytes)),
            offset: 0,
            len: None,
            order: ByteOrder::NATIVE,
            growth: None,
            slice_cache: None,
        }
    }

    /// Creates a buffer over a zero-filled [`BytesMut`] of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(BytesMut::zeroed(capacity))
    }

    /// Makes the buffer grow on demand under `policy`.
    ///
    /// Only the buffer created from the [`BytesMut`] can grow; views never do.
    #[must_use]
    pub fn with_growth(mut self, policy: GrowthPolicy) -> Self {
        if self.len.is_none() {
            self.growth = Some(policy);
        }

        self
    }

    /// Sets the byte order used by the direct accessor family.
    #[must_use]
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Gives the closure direct access to the shared [`BytesMut`].
    ///
    /// Changing the length of the [`BytesMut`] changes the capacity of the owning buffer;
    /// views whose range no longer fits report [`BufferError::OutOfBounds`].
    ///
    /// The [`BytesMut`] stays locked while `f` runs. Using this buffer, or any buffer that
    /// shares the same [`BytesMut`], from within `f` deadlocks or panics.
    pub fn with_bytes_mut<R>(&mut self, f: impl FnOnce(&mut BytesMut) -> R) -> R {
        f(&mut self.shared())
    }

    fn shared(&self) -> MutexGuard<'_, BytesMut> {
        self.inner.lock().expect(ERR_POISONED_LOCK)
    }

    /// Range of `bytes` covered by `[index, index + length)` of this buffer, if it still exists.
    fn range(&self, bytes: &BytesMut, index: usize, length: usize) -> Result<Range<usize>> {
        check_range(index, length, self.len.unwrap_or(bytes.len()))?;

        let start = self.offset + index;
        let end = start + length;

        if end > bytes.len() {
            return Err(BufferError::out_of_bounds(start, length, bytes.len()));
        }

        Ok(start..end)
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.capacity())?;

        Ok(Self {
            inner: Arc::clone(&self.inner),
            offset: self.offset + index,
            len: Some(length),
            order: self.order,
            growth: None,
            slice_cache: None,
        })
    }
}

impl Buffer for BytesMutBuffer {
    fn capacity(&self) -> usize {
        self.len.unwrap_or_else(|| self.shared().len())
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    fn backend(&self) -> Backend {
        Backend::ThirdParty
    }

    fn is_expandable(&self) -> bool {
        self.growth.is_some()
    }

    fn wrap_adjustment(&self) -> usize {
        self.offset
    }

    fn has_nio(&self) -> bool {
        true
    }

    fn nio_bytes(&self, index: usize, length: usize) -> Result<Bytes> {
        let bytes = self.shared();
        let range = self.range(&bytes, index, length)?;
        Ok(Bytes::copy_from_slice(&bytes[range]))
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        let bytes = self.shared();
        let range = self.range(&bytes, index, dst.len())?;
        dst.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        prepare_write(self, index, src.len())?;
        let mut bytes = self.shared();
        let range = self.range(&bytes, index, src.len())?;
        bytes[range].copy_from_slice(src);
        Ok(())
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        prepare_write(self, index, length)?;
        let mut bytes = self.shared();
        let range = self.range(&bytes, index, length)?;
        bytes[range].fill(value);
        Ok(())
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        let current = self.capacity();

        if capacity <= current {
            return Ok(());
        }

        let Some(policy) = self.growth else {
            return Err(BufferError::unsupported("ensure_capacity"));
        };

        let new_len = policy.next_capacity(current, capacity)?;
        self.shared().resize(new_len, 0);

        event!(
            Level::DEBUG,
            message = "bytes buffer grew",
            old_capacity = current,
            new_capacity = new_len
        );

        Ok(())
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
        let copy = {
            let bytes = self.shared();
            let range = self.range(&bytes, index, length)?;
            BytesMut::from(&bytes[range])
        };

        Ok(Box::new(Self::new(copy).with_order(self.order)))
    }
}

impl From<BytesMut> for BytesMutBuffer {
    fn from(bytes: BytesMut) -> Self {
        Self::new(bytes)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::BufferExt;
    use crate::testing::contract;

    assert_impl_all!(BytesMutBuffer: Send, Sync);

    #[test]
    fn satisfies_contract() {
        contract::check_all(|capacity| Box::new(BytesMutBuffer::with_capacity(capacity)));
    }

    #[test]
    fn views_satisfy_contract() {
        contract::check_all(|capacity| {
            let parent = BytesMutBuffer::with_capacity(capacity + 1);
            parent.new_slice(1, capacity).unwrap()
        });
    }

    #[test]
    fn contents_are_initialized_bytes() {
        let mut bytes = BytesMut::with_capacity(64);
        bytes.extend_from_slice(b"abc");

        let buffer = BytesMutBuffer::from(bytes);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.to_vec().unwrap(), b"abc");
    }

    #[test]
    fn growth_keeps_views_valid() {
        let mut buffer = BytesMutBuffer::with_capacity(4).with_growth(GrowthPolicy::new().with_initial_capacity(4));
        let mut view = buffer.new_slice(2, 2).unwrap();
        view.put_u8(0, 3).unwrap();

        buffer.put_u16(4, 0xFFFF).unwrap();

        assert_eq!(buffer.capacity(), 6);
        assert_eq!(view.get_u8(0).unwrap(), 3);
        view.put_u8(1, 4).unwrap();
        assert_eq!(buffer.get_u8(3).unwrap(), 4);
    }

    #[test]
    fn shrinking_the_bytes_is_observed() {
        let mut buffer = BytesMutBuffer::with_capacity(8);
        let view = buffer.new_slice(4, 4).unwrap();

        buffer.with_bytes_mut(|bytes| bytes.truncate(6));

        assert_eq!(buffer.capacity(), 6);
        assert!(matches!(view.get_u32(0), Err(BufferError::OutOfBounds { .. })));
        assert!(view.get_u16(0).is_ok());
    }

    #[test]
    fn views_ignore_growth_policy() {
        let buffer = BytesMutBuffer::with_capacity(4);
        let view = buffer.view(0, 2).unwrap().with_growth(GrowthPolicy::new());
        assert!(!view.is_expandable());
    }

    #[test]
    fn nio_bytes_is_a_snapshot() {
        let mut buffer = BytesMutBuffer::with_capacity(4);
        buffer.put_bytes(0, b"wxyz").unwrap();

        let chunk = buffer.nio_bytes(1, 2).unwrap();
        buffer.put_u8(1, b'!').unwrap();

        assert_eq!(&chunk[..], b"xy");
        assert!(buffer.nio_bytes(3, 2).is_err());
    }

    #[test]
    fn clone_is_isolated() {
        let mut buffer = BytesMutBuffer::with_capacity(4);
        let clone = buffer.clone_buffer().unwrap();

        buffer.put_u32(0, u32::MAX).unwrap();

        assert_eq!(clone.to_vec().unwrap(), [0; 4]);
        assert_eq!(clone.backend(), Backend::ThirdParty);
    }

    #[test]
    fn views_write_from_other_threads() {
        let buffer = BytesMutBuffer::with_capacity(8);
        let mut left = buffer.view(0, 4).unwrap();
        let mut right = buffer.view(4, 4).unwrap();

        thread::scope(|scope| {
            scope.spawn(move || left.put_u32(0, 1).unwrap());
            scope.spawn(move || right.put_u32(0, 2).unwrap());
        });

        assert_eq!(buffer.get_u32(0).unwrap(), 1);
        assert_eq!(buffer.get_u32(4).unwrap(), 2);
    }
}
