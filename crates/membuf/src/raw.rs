// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! All pointer arithmetic of the crate lives here.
//!
//! Every other module reaches memory only through [`RawMemory`], whose methods validate
//! the accessed range before dereferencing anything, and through the allocation helpers
//! used by the off-heap lifecycle manager.

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use num_traits::{FromBytes, ToBytes};

use crate::{BufferError, ByteOrder, Result};

/// Validates that `[index, index + length)` fits in `capacity` and returns the end of the range.
pub(crate) fn check_range(index: usize, length: usize, capacity: usize) -> Result<usize> {
    match index.checked_add(length) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(BufferError::out_of_bounds(index, length, capacity)),
    }
}

/// A `(pointer, length)` pair describing bytes that may be shared with other views.
///
/// The lifetime ties the memory to whatever keeps it alive: a borrowed cell slice for heap
/// storage, or a borrow of the owning handle for native storage. The type is `!Send` and
/// `!Sync` because the bytes may be aliased by other single-threaded views.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawMemory<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _storage: PhantomData<&'a [Cell<u8>]>,
}

impl<'a> RawMemory<'a> {
    /// # Safety
    ///
    /// The caller guarantees that `len` bytes starting at `ptr` are allocated, initialized
    /// and writable for the lifetime `'a`, and that nothing creates a Rust reference to them
    /// other than through `Cell`-based views during that time.
    pub(crate) const unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            _storage: PhantomData,
        }
    }

    /// Views heap cells as raw memory.
    pub(crate) fn from_cells(cells: &'a [Cell<u8>]) -> Self {
        Self {
            // Cell<u8> has the same layout as u8 and permits writes through shared references.
            ptr: NonNull::from(cells).cast::<u8>(),
            len: cells.len(),
            _storage: PhantomData,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Narrows the memory to `[index, index + length)`.
    pub(crate) fn window(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.len)?;

        Ok(Self {
            // SAFETY: check_range guarantees index <= len, so the result stays within
            // (or one past the end of) the same allocation.
            ptr: unsafe { self.ptr.add(index) },
            len: length,
            _storage: PhantomData,
        })
    }

    pub(crate) fn read_into(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        check_range(index, dst.len(), self.len)?;

        // SAFETY: The range was validated above. The destination is a distinct exclusive
        // borrow, so it cannot overlap memory reachable only through cells.
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(index), dst.as_mut_ptr(), dst.len());
        }

        Ok(())
    }

    pub(crate) fn write_from(&self, index: usize, src: &[u8]) -> Result<()> {
        check_range(index, src.len(), self.len)?;

        // SAFETY: The range was validated above. `copy` tolerates a source that happens to
        // point into the same storage.
        unsafe {
            ptr::copy(src.as_ptr(), self.ptr.as_ptr().add(index), src.len());
        }

        Ok(())
    }

    pub(crate) fn fill(&self, index: usize, length: usize, value: u8) -> Result<()> {
        check_range(index, length, self.len)?;

        // SAFETY: The range was validated above and any byte value is a valid u8.
        unsafe {
            self.ptr.as_ptr().add(index).write_bytes(value, length);
        }

        Ok(())
    }

    /// Copies `length` bytes to `dst`, correctly handling overlap when both refer to the same storage.
    pub(crate) fn copy_to(&self, index: usize, dst: &RawMemory<'_>, dst_index: usize, length: usize) -> Result<()> {
        check_range(index, length, self.len)?;
        check_range(dst_index, length, dst.len)?;

        // SAFETY: Both ranges were validated against their memory above.
        unsafe {
            ptr::copy(self.ptr.as_ptr().add(index), dst.ptr.as_ptr().add(dst_index), length);
        }

        Ok(())
    }

    pub(crate) fn get_num<T>(&self, index: usize, order: ByteOrder) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        let mut bytes = T::Bytes::default();
        self.read_into(index, bytes.as_mut())?;
        Ok(order.decode(&bytes))
    }

    pub(crate) fn put_num<T: ToBytes>(&self, index: usize, value: &T, order: ByteOrder) -> Result<()> {
        self.write_from(index, order.encode(value).as_ref())
    }
}

/// Allocates `len` zeroed bytes outside of any Rust collection.
///
/// Zero-length requests return a dangling pointer without allocating.
pub(crate) fn allocate_zeroed(len: usize) -> Result<NonNull<u8>> {
    if len == 0 {
        return Ok(NonNull::dangling());
    }

    let layout = Layout::array::<u8>(len).map_err(|_layout_error| BufferError::CapacityExceeded {
        requested: len,
        max: isize::MAX.unsigned_abs(),
    })?;

    // SAFETY: The layout has a non-zero size, checked above.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };

    match NonNull::new(ptr) {
        Some(ptr) => Ok(ptr),
        None => alloc::handle_alloc_error(layout),
    }
}

/// # Safety
///
/// `ptr` must have been returned by [`allocate_zeroed`] with the same `len` and must not have
/// been deallocated already.
pub(crate) unsafe fn deallocate(ptr: NonNull<u8>, len: usize) {
    if len == 0 {
        return;
    }

    // SAFETY: The same layout was successfully created when the memory was allocated.
    let layout = unsafe { Layout::array::<u8>(len).unwrap_unchecked() };

    // SAFETY: The caller guarantees the pointer came from allocate_zeroed with this length.
    unsafe {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}
