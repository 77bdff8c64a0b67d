// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bulk copies between two buffers of any kind.
//!
//! The copy picks the fastest path both sides support: a memmove when both expose their
//! bytes directly (heap cells or a native address), a contiguous chunk when the source
//! offers one, and otherwise staging the whole range through a temporary. Each path is
//! correct when the two buffers share storage.

use nm::{Event, Magnitude};
use smallvec::SmallVec;

use crate::buffer::prepare_write;
use crate::raw::{RawMemory, check_range};
use crate::{Buffer, Result};

// Staging below this size stays on the stack.
const INLINE_STAGING_LEN: usize = 64;

const STAGED_BYTES_BUCKETS: &[Magnitude] = &[0, 64, 256, 1024, 4096, 16384, 65536];

thread_local! {
    static STAGED_COPY_BYTES: Event = Event::builder()
        .name("membuf_copy_staged_bytes")
        .histogram(STAGED_BYTES_BUCKETS)
        .build();
}

/// Returns the bytes of `buffer` as raw memory, if the buffer exposes them.
fn raw_memory<B: Buffer + ?Sized>(buffer: &B) -> Option<RawMemory<'_>> {
    if let Some(cells) = buffer.array() {
        return Some(RawMemory::from_cells(cells));
    }

    let address = buffer.address()?;

    // SAFETY: A buffer that reports an address guarantees that capacity() bytes starting
    // there are allocated and writable until it grows or is released, neither of which can
    // happen while `buffer` is borrowed.
    Some(unsafe { RawMemory::new(address, buffer.capacity()) })
}

/// Copies `[index, index + length)` of `src` to `dst` starting at `dst_index`.
///
/// Grows an expandable destination if needed. Nothing is written unless both ranges are valid.
pub(crate) fn copy_between<S, D>(src: &S, index: usize, dst: &mut D, dst_index: usize, length: usize) -> Result<()>
where
    S: Buffer + ?Sized,
    D: Buffer + ?Sized,
{
    check_range(index, length, src.capacity())?;
    prepare_write(dst, dst_index, length)?;

    if length == 0 {
        return Ok(());
    }

    if let (Some(from), Some(to)) = (raw_memory(src), raw_memory(&*dst)) {
        return from.copy_to(index, &to, dst_index, length);
    }

    if src.has_nio() {
        let chunk = src.nio_bytes(index, length)?;
        return dst.put_bytes(dst_index, &chunk);
    }

    copy_staged(src, index, dst, dst_index, length)
}

/// Copies through a temporary holding the whole range.
///
/// Works for every pair of buffers. Reading everything before writing anything keeps the
/// result correct when source and destination overlap in shared storage.
pub(crate) fn copy_staged<S, D>(src: &S, index: usize, dst: &mut D, dst_index: usize, length: usize) -> Result<()>
where
    S: Buffer + ?Sized,
    D: Buffer + ?Sized,
{
    let mut staging: SmallVec<[u8; INLINE_STAGING_LEN]> = SmallVec::from_elem(0, length);
    src.get_bytes(index, &mut staging)?;

    STAGED_COPY_BYTES.with(|event| event.observe(length));

    dst.put_bytes(dst_index, &staging)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PlainTestBuffer;
    use crate::{BufferError, BufferExt, BytesMutBuffer, GrowthPolicy, HeapBuffer, NativeBuffer, ReadOnlyBuffer};

    fn numbered(len: usize) -> HeapBuffer {
        let bytes: Vec<u8> = (1..=len).map(|b| u8::try_from(b).unwrap()).collect();
        HeapBuffer::wrap(bytes)
    }

    #[test]
    fn heap_to_native_uses_raw_path() {
        let src = numbered(8);
        let mut dst = NativeBuffer::allocate(8).unwrap();

        copy_between(&src, 2, &mut dst, 0, 4).unwrap();

        assert_eq!(dst.to_vec().unwrap(), [3, 4, 5, 6, 0, 0, 0, 0]);
    }

    #[test]
    fn nio_source_is_copied_as_chunk() {
        let mut src = BytesMutBuffer::with_capacity(4);
        src.put_bytes(0, b"wxyz").unwrap();
        let mut dst = PlainTestBuffer::new(6);

        copy_between(&src, 0, &mut dst, 1, 4).unwrap();

        assert_eq!(dst.to_vec().unwrap(), b"\0wxyz\0");
    }

    #[test]
    fn probe_free_buffers_are_staged() {
        let mut src = PlainTestBuffer::new(4);
        src.put_bytes(0, b"abcd").unwrap();
        let mut dst = PlainTestBuffer::new(4);

        copy_between(&src, 1, &mut dst, 0, 3).unwrap();

        assert_eq!(dst.to_vec().unwrap(), b"bcd\0");
    }

    #[test]
    fn overlapping_views_copy_like_memmove() {
        let parent = numbered(6);
        let src = parent.new_slice(0, 4).unwrap();
        let mut dst = parent.new_slice(2, 4).unwrap();

        copy_between(&*src, 0, &mut *dst, 0, 4).unwrap();

        assert_eq!(parent.to_vec().unwrap(), [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn overlapping_staged_copy_reads_before_writing() {
        let parent = numbered(6);
        let src = ReadOnlyBuffer::new(parent.new_slice(0, 4).unwrap());
        let mut dst = parent.new_slice(2, 4).unwrap();

        copy_staged(&src, 0, &mut *dst, 0, 4).unwrap();

        assert_eq!(parent.to_vec().unwrap(), [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn invalid_ranges_write_nothing() {
        let src = numbered(4);
        let mut dst = HeapBuffer::new(4);

        assert!(matches!(
            copy_between(&src, 2, &mut dst, 0, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert!(matches!(
            copy_between(&src, 0, &mut dst, 2, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert_eq!(dst.to_vec().unwrap(), [0; 4]);
    }

    #[test]
    fn expandable_destination_grows() {
        let src = numbered(8);
        let mut dst = HeapBuffer::expandable(2, GrowthPolicy::new().with_initial_capacity(2)).unwrap();

        copy_between(&src, 0, &mut dst, 0, 8).unwrap();

        assert!(dst.capacity() >= 8);
        assert_eq!(dst.get_u8(7).unwrap(), 8);
    }

    #[test]
    fn empty_copy_touches_nothing() {
        let src = PlainTestBuffer::new(0);
        let mut dst = PlainTestBuffer::new(2);

        copy_between(&src, 0, &mut dst, 2, 0).unwrap();

        assert_eq!(dst.to_vec().unwrap(), [0, 0]);
    }
}
