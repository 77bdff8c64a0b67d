// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use nm::{Event, Magnitude};
use tracing::{Level, event};

use crate::raw::{self, RawMemory};
use crate::{BufferError, Result};

#[derive(Debug)]
struct RegionState {
    ptr: Cell<NonNull<u8>>,
    len: Cell<usize>,

    // Bumped whenever the bytes move to a new allocation.
    generation: Cell<u64>,
    released: Cell<bool>,

    // Caller-provided ranges are never freed by us.
    owned: bool,
}

/// The owning handle of a native memory region.
///
/// There is exactly one owning handle per region. The region is freed exactly once: by
/// [`release()`][Self::release] or, if that is never called, when the handle is dropped.
/// Views of the region hold non-owning handles that observe the release and report
/// [`BufferError::Released`] from then on, so a freed region is never touched.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, BufferError, NativeBuffer};
///
/// let mut buffer = NativeBuffer::allocate(16)?;
/// let view = buffer.new_slice(0, 8)?;
///
/// buffer.release()?;
///
/// assert_eq!(view.get_u8(0), Err(BufferError::Released));
/// assert_eq!(buffer.release(), Err(BufferError::Released));
/// # Ok::<(), BufferError>(())
/// ```
#[derive(Debug)]
pub struct NativeMemory {
    state: Rc<RegionState>,
}

impl NativeMemory {
    /// Allocates `len` zero-filled bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if `len` cannot be described by an allocation layout.
    pub fn allocate(len: usize) -> Result<Self> {
        let ptr = raw::allocate_zeroed(len)?;

        NATIVE_ALLOCATED_BYTES.with(|e| e.observe(len));
        event!(Level::TRACE, message = "native memory allocated", len);

        Ok(Self::over(ptr, len, true))
    }

    /// Manages a memory range owned by someone else.
    ///
    /// The range is never freed by this handle; releasing it only stops further access.
    ///
    /// # Safety
    ///
    /// The caller guarantees that `len` bytes starting at `ptr` are initialized, writable and
    /// not accessed through any other path for as long as this handle or any buffer created
    /// over it exists.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self::over(ptr, len, false)
    }

    fn over(ptr: NonNull<u8>, len: usize, owned: bool) -> Self {
        Self {
            state: Rc::new(RegionState {
                ptr: Cell::new(ptr),
                len: Cell::new(len),
                generation: Cell::new(0),
                released: Cell::new(false),
                owned,
            }),
        }
    }

    /// Length of the region in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len.get()
    }

    /// Whether the region has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the region has already been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state.released.get()
    }

    /// Frees the region now instead of when the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Released`] if the region was already released.
    pub fn release(&mut self) -> Result<()> {
        if self.is_released() {
            return Err(BufferError::Released);
        }

        event!(Level::TRACE, message = "native memory released", len = self.len());
        self.free();

        Ok(())
    }

    fn free(&self) {
        self.state.released.set(true);

        if self.state.owned {
            // SAFETY: The pointer and length describe our own allocation, and the released
            // flag set above guarantees this is the only time it is freed.
            unsafe {
                raw::deallocate(self.state.ptr.get(), self.state.len.get());
            }
        }
    }

    /// Moves the bytes into a new allocation of `new_len` bytes and frees the old one.
    ///
    /// Bytes beyond the old length are zero. Handles created before the move report
    /// [`BufferError::Stale`] afterwards.
    pub(crate) fn reallocate(&mut self, new_len: usize) -> Result<()> {
        if !self.state.owned {
            return Err(BufferError::unsupported("reallocate"));
        }

        let old = self.raw()?;
        let new_ptr = raw::allocate_zeroed(new_len)?;

        // SAFETY: Freshly allocated with this length and not yet shared with anyone.
        let new = unsafe { RawMemory::new(new_ptr, new_len) };

        if let Err(error) = old.copy_to(0, &new, 0, old.len().min(new_len)) {
            // SAFETY: Allocated above with the same length and never exposed.
            unsafe {
                raw::deallocate(new_ptr, new_len);
            }

            return Err(error);
        }

        let old_ptr = self.state.ptr.replace(new_ptr);
        let old_len = self.state.len.replace(new_len);
        self.state.generation.set(self.state.generation.get().wrapping_add(1));

        // SAFETY: The old allocation belongs to us and is no longer reachable: the state now
        // points at the new allocation and older handles fail the generation check.
        unsafe {
            raw::deallocate(old_ptr, old_len);
        }

        NATIVE_ALLOCATED_BYTES.with(|e| e.observe(new_len));
        event!(Level::TRACE, message = "native memory reallocated", old_len, new_len);

        Ok(())
    }

    pub(crate) fn raw(&self) -> Result<RawMemory<'_>> {
        if self.is_released() {
            return Err(BufferError::Released);
        }

        // SAFETY: The region is live (not released) and the owning handle is borrowed for the
        // lifetime of the result, so it can neither be released nor reallocated meanwhile.
        Ok(unsafe { RawMemory::new(self.state.ptr.get(), self.state.len.get()) })
    }

    pub(crate) fn handle(&self) -> NativeMemoryRef {
        NativeMemoryRef {
            state: Rc::clone(&self.state),
            generation: self.state.generation.get(),
        }
    }
}

impl Drop for NativeMemory {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }

        NATIVE_RELEASED_ON_DROP.with(|e| e.observe(self.len()));
        event!(Level::TRACE, message = "native memory released on drop", len = self.len());

        self.free();
    }
}

/// A non-owning handle to a native memory region, as held by views.
#[derive(Clone, Debug)]
pub(crate) struct NativeMemoryRef {
    state: Rc<RegionState>,
    generation: u64,
}

impl NativeMemoryRef {
    pub(crate) fn raw(&self) -> Result<RawMemory<'_>> {
        if self.state.released.get() {
            return Err(BufferError::Released);
        }

        if self.state.generation.get() != self.generation {
            return Err(BufferError::Stale);
        }

        // SAFETY: The region is live and has not moved since this handle was created. Buffers
        // are single-threaded and every use of the result ends within the buffer operation
        // that requested it, during which the owner cannot release or reallocate the region.
        Ok(unsafe { RawMemory::new(self.state.ptr.get(), self.state.len.get()) })
    }
}

const ALLOCATION_BUCKETS: &[Magnitude] = &[64, 1024, 16_384, 262_144, 4_194_304, 67_108_864];

thread_local! {
    static NATIVE_ALLOCATED_BYTES: Event = Event::builder()
        .name("membuf_native_allocated_bytes")
        .histogram(ALLOCATION_BUCKETS)
        .build();

    static NATIVE_RELEASED_ON_DROP: Event = Event::builder()
        .name("membuf_native_released_on_drop")
        .build();
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use static_assertions::assert_not_impl_any;
    use tracing_test::traced_test;

    use super::*;
    use crate::ByteOrder;

    assert_not_impl_any!(NativeMemory: Send, Sync, Clone);
    assert_not_impl_any!(NativeMemoryRef: Send, Sync);

    #[test]
    fn allocation_is_zeroed() {
        let memory = NativeMemory::allocate(32).unwrap();
        let raw = memory.raw().unwrap();

        let mut bytes = [0xFF; 32];
        raw.read_into(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0; 32]);
        assert_eq!(memory.len(), 32);
        assert!(!memory.is_empty());
    }

    #[test]
    fn release_happens_once() {
        let mut memory = NativeMemory::allocate(8).unwrap();
        let handle = memory.handle();

        memory.release().unwrap();

        assert!(memory.is_released());
        assert_eq!(memory.release(), Err(BufferError::Released));
        assert_eq!(memory.raw().err(), Some(BufferError::Released));
        assert_eq!(handle.raw().err(), Some(BufferError::Released));
    }

    #[test]
    #[traced_test]
    fn drop_releases_unreleased_memory() {
        let memory = NativeMemory::allocate(8).unwrap();
        let handle = memory.handle();

        drop(memory);

        assert_eq!(handle.raw().err(), Some(BufferError::Released));
        assert!(logs_contain("native memory released on drop"));
    }

    #[test]
    #[traced_test]
    fn drop_after_release_does_nothing() {
        let mut memory = NativeMemory::allocate(8).unwrap();
        memory.release().unwrap();

        drop(memory);

        assert!(!logs_contain("released on drop"));
    }

    #[test]
    fn reallocation_preserves_bytes_and_invalidates_handles() {
        let mut memory = NativeMemory::allocate(4).unwrap();
        memory.raw().unwrap().write_from(0, &[1, 2, 3, 4]).unwrap();
        let handle = memory.handle();

        memory.reallocate(6).unwrap();

        let mut bytes = [0xFF; 6];
        memory.raw().unwrap().read_into(0, &mut bytes).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 0, 0]);
        assert_eq!(handle.raw().err(), Some(BufferError::Stale));
        assert!(memory.handle().raw().is_ok());
    }

    #[test]
    fn borrowed_range_is_not_freed() {
        let mut backing = vec![0_u8; 8];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();

        {
            // SAFETY: The vector outlives the handle and is not touched while it exists.
            let mut memory = unsafe { NativeMemory::from_raw_parts(ptr, backing.len()) };
            memory.raw().unwrap().put_num(0, &0x0102_u16, ByteOrder::BigEndian).unwrap();

            assert!(matches!(memory.reallocate(16), Err(BufferError::Unsupported { .. })));
            memory.release().unwrap();
        }

        assert_eq!(backing[..2], [1, 2]);
    }
}
