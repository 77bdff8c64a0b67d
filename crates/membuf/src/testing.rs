// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Buffers for testing code that is generic over [`Buffer`].

use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::{prepare_write, reuse_slot};
use crate::constants::ERR_POISONED_LOCK;
use crate::raw::check_range;
use crate::{Backend, Buffer, ByteOrder, Result};

/// A heap-backed buffer that reports no capabilities.
///
/// Every capability probe answers `false`, so bulk copies, fills and composite accesses
/// involving this buffer take their most general path. Only `get_bytes()` and
/// `put_bytes()` are implemented; every other operation uses the default implementation
/// of [`Buffer`].
///
/// The buffer is `Send` and `Sync`, so it can also be wrapped in a
/// [`LockedBuffer`][crate::LockedBuffer] and moved across threads.
///
/// # Example
///
/// ```
/// use membuf::{Buffer, BufferExt, HeapBuffer, PlainTestBuffer};
///
/// let mut plain = PlainTestBuffer::new(4);
/// assert!(!plain.has_array());
///
/// HeapBuffer::copied_from_slice(b"abcd").copy_to(0, &mut plain, 0, 4)?;
/// assert_eq!(plain.to_vec()?, b"abcd");
/// # Ok::<(), membuf::BufferError>(())
/// ```
#[derive(Debug)]
pub struct PlainTestBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
    offset: usize,
    len: usize,
    slice_cache: Option<Box<Self>>,
}

impl PlainTestBuffer {
    /// Creates a zero-filled buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::from_vec(vec![0; capacity])
    }

    /// Creates a buffer over `bytes`.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();

        Self {
            bytes: Arc::new(Mutex::new(bytes)),
            offset: 0,
            len,
            slice_cache: None,
        }
    }

    fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().expect(ERR_POISONED_LOCK)
    }

    fn view(&self, index: usize, length: usize) -> Result<Self> {
        check_range(index, length, self.len)?;

        Ok(Self {
            bytes: Arc::clone(&self.bytes),
            offset: self.offset + index,
            len: length,
            slice_cache: None,
        })
    }
}

impl Buffer for PlainTestBuffer {
    fn capacity(&self) -> usize {
        self.len
    }

    fn order(&self) -> ByteOrder {
        ByteOrder::NATIVE
    }

    fn backend(&self) -> Backend {
        Backend::Heap
    }

    fn wrap_adjustment(&self) -> usize {
        self.offset
    }

    fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        let end = check_range(index, dst.len(), self.len)?;
        dst.copy_from_slice(&self.bytes()[self.offset + index..self.offset + end]);
        Ok(())
    }

    fn put_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        prepare_write(self, index, src.len())?;

        let start = self.offset + index;
        self.bytes()[start..start + src.len()].copy_from_slice(src);
        Ok(())
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
        Ok(Box::new(Self::from_vec(bytes)))
    }
}
