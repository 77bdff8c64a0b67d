// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{Level, event};

use crate::buffer::{prepare_write, reuse_slot};
use crate::raw::{RawMemory, check_range};
use crate::{Backend, Buffer, BufferError, ByteOrder, GrowthPolicy, Result};

/// Bytes on the Rust heap, shared between a buffer and its views.
#[derive(Debug)]
struct HeapRegion {
    cells: Box<[Cell<u8>]>,

    // Set when the owner has moved its bytes into a larger region.
    retired: Cell<bool>,
}

impl HeapRegion {
    fn zeroed(len: usize) -> Rc<Self> {
        Rc::new(Self {
            cells: vec![Cell::new(0); len].into_boxed_slice(),
            retired: Cell::new(false),
        })
    }

    fn from_vec(bytes: Vec<u8>) -> Rc<Self> {
        Rc::new(Self {
            cells: bytes.into_iter().map(Cell::new).collect(),
            retired: Cell::new(false),
        })
    }
}

/// A buffer over a byte array on the Rust heap.
///
/// The bytes are reachable as cells through [`Buffer::array()`], which lets bulk copies
/// between heap buffers run as a single `memmove`.
///
/// A buffer created with [`HeapBuffer::expandable()`] grows when written past its end.
/// Growth moves the bytes into a new array; views taken before that keep the old array
/// alive but report [`BufferError::Stale`] on every access.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, BufferExt, HeapBuffer};
///
/// let mut buffer = HeapBuffer::copied_from_slice(b"abcdef");
///
/// let mut view = buffer.new_slice(2, 3)?;
/// view.put_u8(0, b'C')?;
///
/// assert_eq!(buffer.to_vec()?, b"abCdef");
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct HeapBuffer {
    region: Rc<HeapRegion>,
    offset: usize,
    len: usize,
    order: ByteOrder,

    // Only the owner of a region can grow it.
    growth: Option<GrowthPolicy>,

    slice_cache: Option<Box<Self>>,
}

impl HeapBuffer {
    /// Creates a zero-filled buffer of fixed capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::over(HeapRegion::zeroed(capacity), capacity, None)
    }

    /// Creates a zero-filled buffer that grows on demand under `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if `capacity` is above the policy's maximum.
    pub fn expandable(capacity: usize, policy: GrowthPolicy) -> Result<Self> {
        if capacity > policy.max_capacity() {
            return Err(BufferError::CapacityExceeded {
                requested: capacity,
                max: policy.max_capacity(),
            });
        }

        Ok(Self::over(HeapRegion::zeroed(capacity), capacity, Some(policy)))
    }

    /// Takes ownership of `bytes` as the contents of a fixed-capacity buffer.
    #[must_use]
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self::over(HeapRegion::from_vec(bytes), len, None)
    }

    /// Creates a fixed-capacity buffer holding a copy of `bytes`.
    #[must_use]
    pub fn copied_from_slice(bytes: &[u8]) -> Self {
        Self::wrap(bytes.to_vec())
    }

    /// Sets the byte order used by the direct accessor family.
    #[must_use]
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    fn over(region: Rc<HeapRegion>, len: usize, growth: Option<GrowthPolicy>) -> Self {
        Self {
            region,
            offset: 0,
            len,
            order: ByteOrder::NATIVE,
            growth,
            slice_cache: None,
        }
    }

    fn cells(&self) -> Result<&[Cell<u8>]> {
        if self.region.retired.get() {
            return Err(BufferError::Stale);
        }

        Ok(&self.region.cells[self.offset..self.offset + self.len])
    }

    fn raw(&self) -> Result<RawMemory<'_>> {
        self.cells().map(RawMemory::from_cells)
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.len)?;
        self.cells()?;

        Ok(Self {
            region: Rc::clone(&self.region),
            offset: self.offset + index,
            len: length,
            order: self.order,
            growth: None,
            slice_cache: None,
        })
    }

    fn grow(&mut self, policy: GrowthPolicy, required: usize) -> Result<()> {
        let new_len = policy.next_capacity(self.len, required)?;
        let old = self.raw()?;

        let region = HeapRegion::zeroed(new_len);
        old.copy_to(0, &RawMemory::from_cells(&region.cells), 0, self.len)?;

        event!(
            Level::DEBUG,
            message = "heap buffer grew",
            old_capacity = self.len,
            new_capacity = new_len
        );

        // Views still holding the old region keep it alive until they are dropped.
        self.region.retired.set(true);
        self.region = region;
        self.len = new_len;

        Ok(())
    }
}

impl Buffer for HeapBuffer {
    fn capacity(&self) -> usize {
        self.len
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    fn backend(&self) -> Backend {
        Backend::Heap
    }

    fn is_expandable(&self) -> bool {
        self.growth.is_some()
    }

    fn wrap_adjustment(&self) -> usize {
        self.offset
    }

    fn has_array(&self) -> bool {
        true
    }

    fn array(&self) -> Option<&[Cell<u8>]> {
        self.cells().ok()
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.raw()?.read_into(index, dst)
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        prepare_write(self, index, src.len())?;
        self.raw()?.write_from(index, src)
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        prepare_write(self, index, length)?;
        self.raw()?.fill(index, length, value)
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        self.cells()?
            .get(index)
            .map(Cell::get)
            .ok_or_else(|| BufferError::out_of_bounds(index, 1, self.len))
    }

    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        prepare_write(self, index, 1)?;
        self.cells()?[index].set(value);
        Ok(())
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.len {
            return Ok(());
        }

        match self.growth {
            Some(policy) => self.grow(policy, capacity),
            None => Err(BufferError::unsupported("ensure_capacity")),
        }
    }

    fn slice(&mut self, index: usize, length: usize) -> Result<&mut dyn Buffer> {
        if index == 0 && length == self.len {
            return Ok(self);
        }

        let view = self.view(index, length)?;
        Ok(reuse_slot::<Self>(&mut self.slice_cache, view))
    }

    fn new_slice(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        Ok(Box::new(self.view(index, length)?))
    }

    fn clone_range(&self, index: usize, length: usize) -> Result<Box<dyn Buffer>> {
        let mut bytes = vec![0; length];
        self.get_bytes(index, &mut bytes)?;

        Ok(Box::new(Self::wrap(bytes).with_order(self.order)))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::BufferExt;
    use crate::testing::contract;

    assert_not_impl_any!(HeapBuffer: Send, Sync);

    #[test]
    fn satisfies_contract() {
        contract::check_all(|capacity| Box::new(HeapBuffer::new(capacity)));
    }

    #[test]
    fn views_satisfy_contract() {
        contract::check_all(|capacity| {
            let parent = HeapBuffer::new(capacity + 6);
            parent.new_slice(3, capacity).unwrap()
        });
    }

    #[test]
    fn native_order_is_host_dependent() {
        let mut buffer = HeapBuffer::new(8);
        buffer.put_u64(0, 0x0102_0304_0506_0708).unwrap();

        let expected: [u8; 8] = if cfg!(target_endian = "little") {
            [8, 7, 6, 5, 4, 3, 2, 1]
        } else {
            [1, 2, 3, 4, 5, 6, 7, 8]
        };
        assert_eq!(buffer.to_vec().unwrap(), expected);

        buffer.put_u64_foreign(0, 0x0102_0304_0506_0708).unwrap();
        let mut swapped = expected;
        swapped.reverse();
        assert_eq!(buffer.to_vec().unwrap(), swapped);
    }

    #[test]
    fn full_range_slice_is_self() {
        let mut buffer = HeapBuffer::new(8);
        let expected: *const HeapBuffer = &raw const buffer;

        let slice = std::ptr::from_mut(buffer.slice(0, 8).unwrap()).cast::<()>();
        assert!(std::ptr::addr_eq(slice, expected));
    }

    #[test]
    fn cached_slice_is_reused() {
        let mut buffer = HeapBuffer::copied_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);

        let first = std::ptr::from_mut(buffer.slice(1, 2).unwrap()).cast::<()>();
        let second = buffer.slice(4, 3).unwrap();
        assert!(std::ptr::addr_eq(first, std::ptr::from_mut(&mut *second)));
        assert_eq!(second.get_u8(0).unwrap(), 4);
        assert_eq!(second.capacity(), 3);
    }

    #[test]
    fn slices_alias_parent() {
        let mut parent = HeapBuffer::new(8);
        let mut view = parent.new_slice(2, 4).unwrap();

        view.put_u8(1, 0xAB).unwrap();
        assert_eq!(parent.get_u8(3).unwrap(), 0xAB);

        parent.put_u8(5, 0xCD).unwrap();
        assert_eq!(view.get_u8(3).unwrap(), 0xCD);

        let cached = parent.slice(2, 4).unwrap();
        assert_eq!(cached.get_u8(1).unwrap(), 0xAB);
    }

    #[test]
    fn wrap_adjustment_accumulates() {
        let parent = HeapBuffer::new(16);
        let child = parent.new_slice(3, 10).unwrap();
        let grandchild = child.new_slice(4, 2).unwrap();

        assert_eq!(parent.wrap_adjustment(), 0);
        assert_eq!(child.wrap_adjustment(), 3);
        assert_eq!(grandchild.wrap_adjustment(), 7);
    }

    #[test]
    fn clone_is_isolated() {
        let mut source = HeapBuffer::copied_from_slice(b"hello");
        let clone = source.clone_buffer().unwrap();

        source.put_u8(0, b'j').unwrap();

        assert_eq!(clone.to_vec().unwrap(), b"hello");
        assert_eq!(source.to_vec().unwrap(), b"jello");
        assert_eq!(clone.backend(), Backend::Heap);
        assert!(!clone.is_expandable());
    }

    #[test]
    fn clone_keeps_order() {
        let source = HeapBuffer::new(4).with_order(ByteOrder::FOREIGN);
        let clone = source.clone_range(0, 2).unwrap();
        assert_eq!(clone.order(), ByteOrder::FOREIGN);
        assert_eq!(clone.capacity(), 2);
    }

    #[test]
    fn fixed_buffer_does_not_grow() {
        let mut buffer = HeapBuffer::new(4);

        assert!(matches!(
            buffer.put_u32(2, 1),
            Err(BufferError::OutOfBounds { index: 2, length: 4, capacity: 4 })
        ));
        assert!(matches!(buffer.ensure_capacity(5), Err(BufferError::Unsupported { .. })));
        assert_eq!(buffer.to_vec().unwrap(), [0; 4]);
    }

    #[test]
    fn growth_preserves_bytes() {
        let policy = GrowthPolicy::new().with_initial_capacity(4);
        let mut buffer = HeapBuffer::expandable(4, policy).unwrap();
        buffer.put_bytes(0, &[1, 2, 3, 4]).unwrap();

        buffer.ensure_capacity(5).unwrap();
        assert_eq!(buffer.capacity(), 6);
        assert_eq!(buffer.to_vec().unwrap(), [1, 2, 3, 4, 0, 0]);

        buffer.ensure_capacity(2).unwrap();
        assert_eq!(buffer.capacity(), 6);
    }

    #[test]
    fn write_past_end_grows() {
        let mut buffer = HeapBuffer::expandable(0, GrowthPolicy::new()).unwrap();

        buffer.put_u64(100, 42).unwrap();

        assert!(buffer.capacity() >= 108);
        assert_eq!(buffer.get_u64(100).unwrap(), 42);
    }

    #[test]
    fn growth_over_max_leaves_buffer_intact() {
        let policy = GrowthPolicy::new().with_max_capacity(8);
        let mut buffer = HeapBuffer::expandable(8, policy).unwrap();
        buffer.put_u8(7, 9).unwrap();
        let view = buffer.new_slice(4, 4).unwrap();

        assert_eq!(
            buffer.put_u8(8, 1),
            Err(BufferError::CapacityExceeded { requested: 9, max: 8 })
        );
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(view.get_u8(3).unwrap(), 9);
    }

    #[test]
    fn growth_makes_views_stale() {
        let mut buffer = HeapBuffer::expandable(4, GrowthPolicy::new()).unwrap();
        let view = buffer.new_slice(0, 2).unwrap();

        buffer.ensure_capacity(100).unwrap();

        assert_eq!(view.get_u8(0), Err(BufferError::Stale));
        assert!(view.array().is_none());
        assert_eq!(view.new_slice(0, 1).err(), Some(BufferError::Stale));

        // The owner keeps working, and new views see the new storage.
        let fresh = buffer.new_slice(0, 2).unwrap();
        buffer.put_u8(1, 5).unwrap();
        assert_eq!(fresh.get_u8(1).unwrap(), 5);
    }

    #[test]
    fn views_are_not_expandable() {
        let buffer = HeapBuffer::expandable(4, GrowthPolicy::new()).unwrap();
        let mut view = buffer.new_slice(0, 4).unwrap();

        assert!(!view.is_expandable());
        assert!(view.put_u8(4, 0).is_err());
    }

    #[test]
    fn expandable_rejects_initial_capacity_over_max() {
        let policy = GrowthPolicy::new().with_max_capacity(2);
        assert!(HeapBuffer::expandable(3, policy).is_err());
    }
}
