// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use nm::{Event, Magnitude};
use smallvec::SmallVec;
use tracing::{Level, event};

use crate::buffer::{prepare_write, reuse_slot};
use crate::constants::MAX_INLINE_CHILDREN;
use crate::raw::check_range;
use crate::{Backend, Buffer, BufferError, ByteOrder, Result};

/// The part of an access that falls within one child.
#[derive(Clone, Copy, Debug)]
struct Piece {
    child: usize,
    local: usize,

    // Position of the piece within the accessed range.
    offset: usize,
    len: usize,
}

type Pieces = SmallVec<[Piece; MAX_INLINE_CHILDREN]>;

/// A buffer that concatenates other buffers into one addressable range.
///
/// Children are addressed in the order they were appended. The capacity is the sum of the
/// capacities of the children, recalculated on every call because children may grow.
///
/// Every child must use the byte order of the composite; this is checked when a child is
/// appended and never again. Reaching into a child afterwards to change its order is not
/// detected and yields garbled values.
///
/// Fixed-width accesses that fall within one child are delegated to that child. Accesses
/// that straddle a boundary are assembled piece by piece in a small scratch array on the
/// stack.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, BufferExt, ByteOrder, CompositeBuffer, HeapBuffer};
///
/// let mut composite = CompositeBuffer::new(ByteOrder::BigEndian);
/// composite.append(Box::new(HeapBuffer::new(4).with_order(ByteOrder::BigEndian)))?;
/// composite.append(Box::new(HeapBuffer::new(4).with_order(ByteOrder::BigEndian)))?;
///
/// // Bytes 2..6 span both children.
/// composite.put_u32(2, 0x0102_0304)?;
///
/// assert_eq!(composite.to_vec()?, [0, 0, 1, 2, 3, 4, 0, 0]);
/// assert_eq!(composite.get_u32(2)?, 0x0102_0304);
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct CompositeBuffer {
    children: SmallVec<[Box<dyn Buffer>; MAX_INLINE_CHILDREN]>,
    order: ByteOrder,
    wrap_adjustment: usize,
    slice_cache: Option<Box<Self>>,
}

impl CompositeBuffer {
    /// Creates a composite with no children and therefore no capacity.
    #[must_use]
    pub fn new(order: ByteOrder) -> Self {
        Self {
            children: SmallVec::new(),
            order,
            wrap_adjustment: 0,
            slice_cache: None,
        }
    }

    /// Creates a composite over `children`, in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OrderMismatch`] if any child does not use `order`.
    pub fn from_children(order: ByteOrder, children: impl IntoIterator<Item = Box<dyn Buffer>>) -> Result<Self> {
        let mut composite = Self::new(order);

        for child in children {
            composite.append(child)?;
        }

        Ok(composite)
    }

    /// Appends a child at the end of the addressable range.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OrderMismatch`] if the child does not use the composite's order.
    pub fn append(&mut self, child: Box<dyn Buffer>) -> Result<()> {
        if child.order() != self.order {
            event!(
                Level::DEBUG,
                message = "child rejected by composite",
                expected = ?self.order,
                actual = ?child.order()
            );

            return Err(BufferError::OrderMismatch {
                expected: self.order,
                actual: child.order(),
            });
        }

        self.children.push(child);
        Ok(())
    }

    /// The children, in addressing order.
    #[must_use]
    pub fn children(&self) -> &[Box<dyn Buffer>] {
        &self.children
    }

    /// Finds the child holding `index` and the index within that child.
    ///
    /// Returns `None` if `index` is not below the capacity.
    #[must_use]
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut running = 0;

        for (child_index, child) in self.children.iter().enumerate() {
            let end = running + child.capacity();

            if index < end {
                return Some((child_index, index - running));
            }

            running = end;
        }

        None
    }

    fn pieces(&self, index: usize, length: usize) -> Result<Pieces> {
        let end = check_range(index, length, self.capacity())?;

        let mut pieces = Pieces::new();
        let mut running = 0;
        let mut position = index;

        for (child_index, child) in self.children.iter().enumerate() {
            if position >= end {
                break;
            }

            let child_end = running + child.capacity();

            if position < child_end {
                let len = child_end.min(end) - position;

                pieces.push(Piece {
                    child: child_index,
                    local: position - running,
                    offset: position - index,
                    len,
                });

                position += len;
            }

            running = child_end;
        }

        Ok(pieces)
    }

    /// The child that holds all of `[index, index + size)`, if a single one does.
    fn owning_child(&self, index: usize, size: usize) -> Result<Option<(usize, usize)>> {
        check_range(index, size, self.capacity())?;

        Ok(self
            .locate(index)
            .filter(|&(child, local)| local + size <= self.children[child].capacity()))
    }

    fn read_straddling<const N: usize>(&self, index: usize) -> Result<[u8; N]> {
        STRADDLING_ACCESS_SIZE.with(|e| e.observe(N));

        let mut scratch = [0; N];
        self.get_bytes(index, &mut scratch)?;
        Ok(scratch)
    }

    /// Fails if any child touched by `pieces` would reject a write.
    ///
    /// Released and stale children are caught by an empty read, which checks the state of the
    /// storage without moving any bytes.
    fn check_writable(&self, pieces: &Pieces) -> Result<()> {
        for piece in pieces {
            let child = &self.children[piece.child];

            if child.is_read_only() {
                return Err(BufferError::ReadOnly);
            }

            child.get_bytes(piece.local, &mut [])?;
        }

        Ok(())
    }

    fn write_pieces(&mut self, index: usize, src: &[u8]) -> Result<()> {
        let pieces = self.pieces(index, src.len())?;
        self.check_writable(&pieces)?;

        for piece in pieces {
            self.children[piece.child].put_bytes(piece.local, &src[piece.offset..piece.offset + piece.len])?;
        }

        Ok(())
    }

    fn write_straddling(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        STRADDLING_ACCESS_SIZE.with(|e| e.observe(bytes.len()));
        self.write_pieces(index, bytes)
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        let mut view = Self::new(self.order);
        view.wrap_adjustment = self.wrap_adjustment + index;

        for piece in self.pieces(index, length)? {
            view.children.push(self.children[piece.child].new_slice(piece.local, piece.len)?);
        }

        Ok(view)
    }
}

impl Buffer for CompositeBuffer {
    fn capacity(&self) -> usize {
        self.children.iter().map(|child| child.capacity()).sum()
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    fn backend(&self) -> Backend {
        Backend::Composite
    }

    fn is_read_only(&self) -> bool {
        !self.children.is_empty() && self.children.iter().all(|child| child.is_read_only())
    }

    fn is_expandable(&self) -> bool {
        self.children.last().is_some_and(|child| child.is_expandable())
    }

    fn wrap_adjustment(&self) -> usize {
        self.wrap_adjustment
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        for piece in self.pieces(index, dst.len())? {
            self.children[piece.child].get_bytes(piece.local, &mut dst[piece.offset..piece.offset + piece.len])?;
        }

        Ok(())
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        prepare_write(self, index, src.len())?;
        self.write_pieces(index, src)
    }

    fn fill(&mut self, index: usize, length: usize, value: u8) -> Result<()> {
        prepare_write(self, index, length)?;
        let pieces = self.pieces(index, length)?;
        self.check_writable(&pieces)?;

        for piece in pieces {
            self.children[piece.child].fill(piece.local, piece.len, value)?;
        }

        Ok(())
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        match self.locate(index) {
            Some((child, local)) => self.children[child].get_u8(local),
            None => Err(BufferError::out_of_bounds(index, 1, self.capacity())),
        }
    }

    fn put_u8(&mut self, index: usize, value: u8) -> Result<()> {
        prepare_write(self, index, 1)?;

        match self.locate(index) {
            Some((child, local)) => self.children[child].put_u8(local, value),
            None => Err(BufferError::out_of_bounds(index, 1, self.capacity())),
        }
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        match self.owning_child(index, size_of::<u16>())? {
            Some((child, local)) => self.children[child].get_u16(local),
            None => Ok(self.order.decode(&self.read_straddling(index)?)),
        }
    }

    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        prepare_write(self, index, size_of::<u16>())?;

        match self.owning_child(index, size_of::<u16>())? {
            Some((child, local)) => self.children[child].put_u16(local, value),
            None => self.write_straddling(index, &self.order.encode(&value)),
        }
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        match self.owning_child(index, size_of::<u32>())? {
            Some((child, local)) => self.children[child].get_u32(local),
            None => Ok(self.order.decode(&self.read_straddling(index)?)),
        }
    }

    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        prepare_write(self, index, size_of::<u32>())?;

        match self.owning_child(index, size_of::<u32>())? {
            Some((child, local)) => self.children[child].put_u32(local, value),
            None => self.write_straddling(index, &self.order.encode(&value)),
        }
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        match self.owning_child(index, size_of::<u64>())? {
            Some((child, local)) => self.children[child].get_u64(local),
            None => Ok(self.order.decode(&self.read_straddling(index)?)),
        }
    }

    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        prepare_write(self, index, size_of::<u64>())?;

        match self.owning_child(index, size_of::<u64>())? {
            Some((child, local)) => self.children[child].put_u64(local, value),
            None => self.write_straddling(index, &self.order.encode(&value)),
        }
    }

    fn ensure_capacity(&mut self, capacity: usize) -> Result<()> {
        let current = self.capacity();

        if capacity <= current {
            return Ok(());
        }

        match self.children.last_mut() {
            Some(last) if last.is_expandable() => {
                let target = last.capacity() + (capacity - current);
                last.ensure_capacity(target)
            }
            _ => Err(BufferError::unsupported("ensure_capacity")),
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
        let mut clone = Self::new(self.order);

        for piece in self.pieces(index, length)? {
            clone.children.push(self.children[piece.child].clone_range(piece.local, piece.len)?);
        }

        Ok(Box::new(clone))
    }
}

const ACCESS_SIZE_BUCKETS: &[Magnitude] = &[2, 4, 8];

thread_local! {
    static STRADDLING_ACCESS_SIZE: Event = Event::builder()
        .name("membuf_composite_straddling_access_size")
        .histogram(ACCESS_SIZE_BUCKETS)
        .build();
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::ptr;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::testing::{PlainTestBuffer, contract};
    use crate::{BufferExt, BytesMutBuffer, GrowthPolicy, HeapBuffer, NativeBuffer, ReadOnlyBuffer};

    assert_not_impl_any!(CompositeBuffer: Send, Sync);

    fn heap_children(order: ByteOrder, sizes: &[usize]) -> CompositeBuffer {
        CompositeBuffer::from_children(
            order,
            sizes
                .iter()
                .map(|&size| Box::new(HeapBuffer::new(size).with_order(order)) as Box<dyn Buffer>),
        )
        .unwrap()
    }

    #[test]
    fn satisfies_contract() {
        contract::check_all(|capacity| {
            let first = capacity / 2;
            Box::new(heap_children(ByteOrder::NATIVE, &[first, 1, capacity.saturating_sub(first + 1)]))
        });
    }

    #[test]
    fn mixed_backends_satisfy_contract() {
        contract::check_all(|capacity| {
            let third = capacity / 3;
            let children: Vec<Box<dyn Buffer>> = vec![
                Box::new(NativeBuffer::allocate(third).unwrap()),
                Box::new(BytesMutBuffer::with_capacity(third)),
                Box::new(PlainTestBuffer::new(capacity - 2 * third)),
            ];
            Box::new(CompositeBuffer::from_children(ByteOrder::NATIVE, children).unwrap())
        });
    }

    #[test]
    fn long_straddling_boundary_round_trips() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[4, 4, 4]);
        composite.put_i64(2, -0x0102_0304_0506_0708).unwrap();
        assert_eq!(composite.get_i64(2).unwrap(), -0x0102_0304_0506_0708);
        assert_eq!(composite.get_i64_foreign(2).unwrap(), (-0x0102_0304_0506_0708_i64).swap_bytes());
    }

    #[test]
    fn int_straddling_boundary_round_trips() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[4, 4]);

        composite.put_i32(2, -0x0102_0304).unwrap();

        assert_eq!(composite.get_i32(2).unwrap(), -0x0102_0304);
        assert!(matches!(
            composite.put_i64(2, 1),
            Err(BufferError::OutOfBounds { index: 2, length: 8, capacity: 8 })
        ));
    }

    #[test]
    fn value_spanning_many_children() {
        let mut composite = heap_children(ByteOrder::BigEndian, &[1; 8]);

        composite.put_u64(0, 0x0102_0304_0506_0708).unwrap();

        for (index, child) in composite.children().iter().enumerate() {
            assert_eq!(child.get_u8(0).unwrap(), u8::try_from(index + 1).unwrap());
        }
        assert_eq!(composite.get_u64(0).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn straddling_read_matches_flat_buffer() {
        let bytes = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];

        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let flat = HeapBuffer::copied_from_slice(&bytes).with_order(order);

            let mut composite = heap_children(order, &[4, 4]);
            composite.put_bytes(0, &bytes).unwrap();

            assert_eq!(composite.get_i32(2).unwrap(), flat.get_i32(2).unwrap());
            assert_eq!(composite.get_u16(3).unwrap(), flat.get_u16(3).unwrap());
            assert_eq!(composite.get_u64(0).unwrap(), flat.get_u64(0).unwrap());
        }
    }

    #[test]
    fn non_straddling_access_is_delegated() {
        let mut composite = heap_children(ByteOrder::LittleEndian, &[4, 4]);

        composite.put_u32(4, 0xAABB_CCDD).unwrap();

        assert_eq!(composite.children()[1].get_u32(0).unwrap(), 0xAABB_CCDD);
        assert_eq!(composite.children()[0].to_vec().unwrap(), [0; 4]);
    }

    #[test]
    fn append_rejects_foreign_order_child() {
        let mut composite = CompositeBuffer::new(ByteOrder::BigEndian);

        let result = composite.append(Box::new(HeapBuffer::new(4).with_order(ByteOrder::LittleEndian)));

        assert_eq!(
            result,
            Err(BufferError::OrderMismatch {
                expected: ByteOrder::BigEndian,
                actual: ByteOrder::LittleEndian,
            })
        );
        assert_eq!(composite.capacity(), 0);
    }

    #[test]
    fn locate_walks_cumulative_capacity() {
        let composite = heap_children(ByteOrder::NATIVE, &[3, 0, 2, 5]);

        assert_eq!(composite.locate(0), Some((0, 0)));
        assert_eq!(composite.locate(2), Some((0, 2)));
        assert_eq!(composite.locate(3), Some((2, 0)));
        assert_eq!(composite.locate(5), Some((3, 0)));
        assert_eq!(composite.locate(9), Some((3, 4)));
        assert_eq!(composite.locate(10), None);
    }

    #[test]
    fn empty_composite_rejects_access() {
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);

        assert_eq!(composite.capacity(), 0);
        assert!(composite.get_u8(0).is_err());
        assert!(composite.put_u8(0, 1).is_err());
        assert!(!composite.is_read_only());
        assert!(!composite.is_expandable());
    }

    #[test]
    fn slices_span_children_and_alias_them() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[4, 4]);

        let mut view = composite.new_slice(3, 3).unwrap();
        assert_eq!(view.wrap_adjustment(), 3);
        assert_eq!(view.backend(), Backend::Composite);

        view.put_bytes(0, &[7, 8, 9]).unwrap();
        assert_eq!(composite.to_vec().unwrap(), [0, 0, 0, 7, 8, 9, 0, 0]);

        composite.put_u8(4, 1).unwrap();
        let cached = composite.slice(3, 3).unwrap();
        assert_eq!(cached.to_vec().unwrap(), [7, 1, 9]);
    }

    #[test]
    fn clone_is_isolated() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[2, 2]);
        composite.put_bytes(0, &[1, 2, 3, 4]).unwrap();

        let clone = composite.clone_range(1, 2).unwrap();
        composite.fill(0, 4, 0).unwrap();

        assert_eq!(clone.to_vec().unwrap(), [2, 3]);
        assert_eq!(clone.backend(), Backend::Composite);
    }

    #[test]
    fn grows_through_last_child() {
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);
        composite.append(Box::new(HeapBuffer::new(4))).unwrap();
        composite
            .append(Box::new(
                HeapBuffer::expandable(2, GrowthPolicy::new().with_initial_capacity(2)).unwrap(),
            ))
            .unwrap();
        assert!(composite.is_expandable());

        composite.put_u32(5, u32::MAX).unwrap();

        assert!(composite.capacity() >= 9);
        assert_eq!(composite.get_u32(5).unwrap(), u32::MAX);
        assert_eq!(composite.children()[0].capacity(), 4);
    }

    #[test]
    fn fixed_composite_cannot_grow() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[2, 2]);

        assert!(matches!(composite.ensure_capacity(5), Err(BufferError::Unsupported { .. })));
        assert!(matches!(composite.put_u16(3, 1), Err(BufferError::OutOfBounds { .. })));
    }

    #[test]
    fn read_only_child_rejects_whole_write() {
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);
        composite.append(Box::new(HeapBuffer::new(2))).unwrap();
        composite
            .append(Box::new(ReadOnlyBuffer::new(HeapBuffer::new(2))))
            .unwrap();

        assert!(!composite.is_read_only());
        assert_eq!(composite.put_u32(0, u32::MAX), Err(BufferError::ReadOnly));
        assert_eq!(composite.fill(1, 2, 1), Err(BufferError::ReadOnly));
        assert_eq!(composite.to_vec().unwrap(), [0; 4]);

        composite.put_u16(0, u16::MAX).unwrap();
    }

    #[test]
    fn released_child_rejects_whole_write() {
        let mut owner = NativeBuffer::allocate(4).unwrap();
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);
        composite.append(Box::new(HeapBuffer::new(4))).unwrap();
        composite.append(owner.new_slice(0, 4).unwrap()).unwrap();

        owner.release().unwrap();

        assert_eq!(composite.put_u32(2, u32::MAX), Err(BufferError::Released));
        assert_eq!(composite.put_bytes(3, &[1, 2]), Err(BufferError::Released));
        assert_eq!(composite.fill(0, 8, 1), Err(BufferError::Released));
        assert_eq!(composite.children()[0].to_vec().unwrap(), [0; 4]);

        composite.put_u32(0, u32::MAX).unwrap();
    }

    #[test]
    fn stale_child_rejects_whole_write() {
        let mut parent = HeapBuffer::expandable(4, GrowthPolicy::new().with_initial_capacity(4)).unwrap();
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);
        composite.append(Box::new(HeapBuffer::new(4))).unwrap();
        composite.append(parent.new_slice(0, 4).unwrap()).unwrap();

        parent.ensure_capacity(16).unwrap();

        assert_eq!(composite.put_u64(0, u64::MAX), Err(BufferError::Stale));
        assert_eq!(composite.children()[0].to_vec().unwrap(), [0; 4]);
    }

    #[test]
    fn cached_slice_reuses_its_allocation() {
        let mut composite = heap_children(ByteOrder::NATIVE, &[4, 4]);

        let first = ptr::from_mut(composite.slice(1, 4).unwrap()).cast::<()>();
        let second = composite.slice(3, 2).unwrap();
        assert_eq!(second.capacity(), 2);

        assert!(ptr::addr_eq(first, ptr::from_mut(second).cast::<()>()));
    }
}
