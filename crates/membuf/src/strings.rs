// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::buffer::prepare_write;
use crate::{Buffer, BufferError, Result};

const PREFIX_LEN: usize = size_of::<u32>();

const INVALID_UTF8: BufferError = BufferError::InvalidString { reason: "bytes are not valid UTF-8" };
const NOT_ASCII: BufferError = BufferError::InvalidString {
    reason: "data contains a non-ASCII character",
};
const TOO_LONG: BufferError = BufferError::InvalidString {
    reason: "string is longer than a u32 length prefix can describe",
};

pub(crate) fn put_utf8<B: Buffer + ?Sized>(buffer: &mut B, index: usize, value: &str) -> Result<usize> {
    buffer.put_bytes(index, value.as_bytes())?;
    Ok(value.len())
}

pub(crate) fn get_utf8<B: Buffer + ?Sized>(buffer: &B, index: usize, length: usize) -> Result<String> {
    decode_utf8(read_vec(buffer, index, length)?)
}

pub(crate) fn put_ascii<B: Buffer + ?Sized>(buffer: &mut B, index: usize, value: &str) -> Result<usize> {
    if !value.is_ascii() {
        return Err(NOT_ASCII);
    }

    put_utf8(buffer, index, value)
}

pub(crate) fn get_ascii<B: Buffer + ?Sized>(buffer: &B, index: usize, length: usize) -> Result<String> {
    decode_ascii(read_vec(buffer, index, length)?)
}

/// Writes a `u32` byte count in the buffer's order, followed by the bytes of `value`.
///
/// Returns the number of bytes written, prefix included.
pub(crate) fn put_prefixed<B: Buffer + ?Sized>(buffer: &mut B, index: usize, value: &str) -> Result<usize> {
    let prefix = u32::try_from(value.len()).map_err(|_too_long| TOO_LONG)?;
    let total = PREFIX_LEN + value.len();

    // Validate (and grow for) the whole record so that a failure leaves no partial prefix.
    prepare_write(buffer, index, total)?;

    buffer.put_u32(index, prefix)?;
    buffer.put_bytes(index + PREFIX_LEN, value.as_bytes())?;

    Ok(total)
}

/// Reads the byte count written by [`put_prefixed`] and returns the bytes that follow it.
pub(crate) fn get_prefixed<B: Buffer + ?Sized>(buffer: &B, index: usize) -> Result<Vec<u8>> {
    let length = buffer.get_u32(index)? as usize;
    read_vec(buffer, index + PREFIX_LEN, length)
}

pub(crate) fn decode_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_utf8_error| INVALID_UTF8)
}

pub(crate) fn decode_ascii(bytes: Vec<u8>) -> Result<String> {
    if bytes.is_ascii() {
        decode_utf8(bytes)
    } else {
        Err(NOT_ASCII)
    }
}

fn read_vec<B: Buffer + ?Sized>(buffer: &B, index: usize, length: usize) -> Result<Vec<u8>> {
    // Checked before allocating so that a corrupt length cannot request a huge vector.
    crate::raw::check_range(index, length, buffer.capacity())?;

    let mut bytes = vec![0; length];
    buffer.get_bytes(index, &mut bytes)?;
    Ok(bytes)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteOrder, GrowthPolicy, HeapBuffer};

    #[test]
    fn utf8_round_trip() {
        let mut buffer = HeapBuffer::new(16);

        let written = put_utf8(&mut buffer, 2, "héllo").unwrap();

        assert_eq!(written, 6);
        assert_eq!(get_utf8(&buffer, 2, written).unwrap(), "héllo");
    }

    #[test]
    fn truncated_utf8_is_rejected() {
        let mut buffer = HeapBuffer::new(8);
        put_utf8(&mut buffer, 0, "é").unwrap();

        assert_eq!(get_utf8(&buffer, 0, 1), Err(INVALID_UTF8));
    }

    #[test]
    fn ascii_rejects_wide_characters_both_ways() {
        let mut buffer = HeapBuffer::new(8);

        assert_eq!(put_ascii(&mut buffer, 0, "naïve"), Err(NOT_ASCII));
        assert_eq!(buffer.get_u8(0).unwrap(), 0);

        put_utf8(&mut buffer, 0, "ï").unwrap();
        assert_eq!(get_ascii(&buffer, 0, 2), Err(NOT_ASCII));

        put_ascii(&mut buffer, 0, "plain").unwrap();
        assert_eq!(get_ascii(&buffer, 0, 5).unwrap(), "plain");
    }

    #[test]
    fn prefix_uses_buffer_order() {
        let mut buffer = HeapBuffer::new(8).with_order(ByteOrder::BigEndian);

        assert_eq!(put_prefixed(&mut buffer, 0, "abc").unwrap(), 7);

        assert_eq!(buffer.get_u32(0).unwrap(), 3);
        assert_eq!(buffer.get_u8(3).unwrap(), 3);
        assert_eq!(decode_utf8(get_prefixed(&buffer, 0).unwrap()).unwrap(), "abc");
    }

    #[test]
    fn prefixed_record_that_does_not_fit_writes_nothing() {
        let mut buffer = HeapBuffer::new(6);

        assert!(matches!(
            put_prefixed(&mut buffer, 0, "abc"),
            Err(BufferError::OutOfBounds { .. })
        ));
        assert_eq!(buffer.get_u32(0).unwrap(), 0);
    }

    #[test]
    fn prefixed_record_grows_expandable_buffer() {
        let mut buffer = HeapBuffer::expandable(2, GrowthPolicy::new().with_initial_capacity(2)).unwrap();

        put_prefixed(&mut buffer, 0, "grow").unwrap();

        assert!(buffer.capacity() >= 8);
        assert_eq!(decode_ascii(get_prefixed(&buffer, 0).unwrap()).unwrap(), "grow");
    }

    #[test]
    fn corrupt_prefix_is_out_of_bounds() {
        let mut buffer = HeapBuffer::new(8);
        buffer.put_u32(0, u32::MAX).unwrap();

        assert!(matches!(get_prefixed(&buffer, 0), Err(BufferError::OutOfBounds { .. })));
    }
}
