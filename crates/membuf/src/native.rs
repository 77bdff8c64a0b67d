// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ptr::NonNull;

use tracing::{Level, event};

use crate::buffer::{prepare_write, reuse_slot};
use crate::native_memory::NativeMemoryRef;
use crate::raw::{RawMemory, check_range};
use crate::{Backend, Buffer, BufferError, ByteOrder, GrowthPolicy, NativeMemory, Result};

#[derive(Debug)]
enum Storage {
    Owner(NativeMemory),
    View(NativeMemoryRef),
}

/// A buffer over native memory outside any Rust collection.
///
/// The buffer that allocated the region owns it through a [`NativeMemory`] handle and frees
/// it on [`release()`][Self::release] or drop. Views hold non-owning handles: after the
/// owner releases the region they report [`BufferError::Released`], and after the owner
/// grows they report [`BufferError::Stale`].
///
/// The bytes are reachable through [`Buffer::address()`], which lets bulk copies between
/// native buffers run as a single `memmove`.
#[derive(Debug)]
pub struct NativeBuffer {
    storage: Storage,
    offset: usize,
    len: usize,
    order: ByteOrder,
    growth: Option<GrowthPolicy>,
    slice_cache: Option<Box<Self>>,
}

impl NativeBuffer {
    /// Allocates a zero-filled buffer of fixed capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::CapacityExceeded`] if the capacity cannot be allocated.
    pub fn allocate(capacity: usize) -> Result<Self> {
        NativeMemory::allocate(capacity).map(Self::from_memory)
    }

    /// Allocates a zero-filled buffer that grows on demand under `policy`.
    ///
    /// Growth allocates a new region, copies the bytes and frees the old region immediately.
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

        let mut buffer = Self::allocate(capacity)?;
        buffer.growth = Some(policy);
        Ok(buffer)
    }

    /// Creates a fixed-capacity buffer over memory owned by someone else.
    ///
    /// The memory is never freed by the buffer.
    ///
    /// # Safety
    ///
    /// Same as [`NativeMemory::from_raw_parts()`].
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        // SAFETY: Forwarding the caller's guarantees.
        Self::from_memory(unsafe { NativeMemory::from_raw_parts(ptr, len) })
    }

    /// Creates a fixed-capacity buffer that takes ownership of a native memory region.
    #[must_use]
    pub fn from_memory(memory: NativeMemory) -> Self {
        Self {
            len: memory.len(),
            storage: Storage::Owner(memory),
            offset: 0,
            order: ByteOrder::NATIVE,
            growth: None,
            slice_cache: None,
        }
    }

    /// Sets the byte order used by the direct accessor family.
    #[must_use]
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Frees the native memory now.
    ///
    /// Every later access through this buffer or any view of it fails with
    /// [`BufferError::Released`].
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Released`] if the memory was already released and
    /// [`BufferError::Unsupported`] if this buffer is a view, which does not own the memory.
    pub fn release(&mut self) -> Result<()> {
        self.slice_cache = None;

        match &mut self.storage {
            Storage::Owner(memory) => memory.release(),
            Storage::View(_) => Err(BufferError::unsupported("release")),
        }
    }

    /// Whether the memory behind the buffer has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        matches!(self.memory(), Err(BufferError::Released))
    }

    fn memory(&self) -> Result<RawMemory<'_>> {
        match &self.storage {
            Storage::Owner(memory) => memory.raw(),
            Storage::View(handle) => handle.raw(),
        }
    }

    fn raw(&self) -> Result<RawMemory<'_>> {
        self.memory()?.window(self.offset, self.len)
    }

    fn handle(&self) -> NativeMemoryRef {
        match &self.storage {
            Storage::Owner(memory) => memory.handle(),
            Storage::View(handle) => handle.clone(),
        }
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.len)?;
        self.memory()?;

        Ok(Self {
            storage: Storage::View(self.handle()),
            offset: self.offset + index,
            len: length,
            order: self.order,
            growth: None,
            slice_cache: None,
        })
    }

    fn grow(&mut self, policy: GrowthPolicy, required: usize) -> Result<()> {
        let new_len = policy.next_capacity(self.len, required)?;

        let Storage::Owner(memory) = &mut self.storage else {
            return Err(BufferError::unsupported("ensure_capacity"));
        };

        memory.reallocate(new_len)?;

        event!(
            Level::DEBUG,
            message = "native buffer grew",
            old_capacity = self.len,
            new_capacity = new_len
        );

        self.len = new_len;
        Ok(())
    }
}

impl Buffer for NativeBuffer {
    fn capacity(&self) -> usize {
        self.len
    }

    fn order(&self) -> ByteOrder {
        self.order
    }

    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn is_expandable(&self) -> bool {
        self.growth.is_some()
    }

    fn wrap_adjustment(&self) -> usize {
        self.offset
    }

    fn has_address(&self) -> bool {
        true
    }

    fn address(&self) -> Option<NonNull<u8>> {
        self.raw().ok().map(|raw| raw.as_ptr())
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

    fn get_u16(&self, index: usize) -> Result<u16> {
        self.raw()?.get_num(index, self.order)
    }

    fn put_u16(&mut self, index: usize, value: u16) -> Result<()> {
        prepare_write(self, index, size_of::<u16>())?;
        self.raw()?.put_num(index, &value, self.order)
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        self.raw()?.get_num(index, self.order)
    }

    fn put_u32(&mut self, index: usize, value: u32) -> Result<()> {
        prepare_write(self, index, size_of::<u32>())?;
        self.raw()?.put_num(index, &value, self.order)
    }

    fn get_u64(&self, index: usize) -> Result<u64> {
        self.raw()?.get_num(index, self.order)
    }

    fn put_u64(&mut self, index: usize, value: u64) -> Result<()> {
        prepare_write(self, index, size_of::<u64>())?;
        self.raw()?.put_num(index, &value, self.order)
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
        let source = self.raw()?;
        check_range(index, length, self.len)?;

        let clone = Self::allocate(length)?.with_order(self.order);
        source.copy_to(index, &clone.raw()?, 0, length)?;

        Ok(Box::new(clone))
    }
}
