// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::{Buf, BufMut, BytesMut};
use num_traits::{FromBytes, ToBytes};

use crate::buffer::prepare_write;
use crate::constants::STAGING_CHUNK_LEN;
use crate::raw::check_range;
use crate::{Buffer, BufferError, ByteOrder, Result, copy, strings};

/// Typed accessors, bulk copies and string helpers derived from the [`Buffer`] primitives.
///
/// Implemented for every [`Buffer`], including `dyn Buffer`.
///
/// # Accessor families
///
/// * The direct family (`get_i32()`, `put_f64()`, ...) uses the byte order of the buffer.
/// * The foreign family (`get_i32_foreign()`, ...) uses the opposite order. Reading a value
///   through one family returns the byte-swapped value of the other.
/// * The generic family (`get_num_le::<T>()`, `put_num_be::<T>()`, ...) works for any
///   primitive number and an explicit, host-independent order.
///
/// Every accessor validates the full range before touching memory and fails with
/// [`BufferError::OutOfBounds`] if it does not fit. Writes fail with
/// [`BufferError::ReadOnly`] on read-only buffers and grow expandable buffers when they
/// end past the capacity.
///
/// # Example
///
/// ```
/// use membuf::{BufferExt, ByteOrder, HeapBuffer};
///
/// let mut buffer = HeapBuffer::new(16).with_order(ByteOrder::BigEndian);
///
/// buffer.put_i32(0, -2)?;
/// buffer.put_f64_foreign(4, 1.5)?;
/// buffer.put_utf8_prefixed(12, "")?;
///
/// assert_eq!(buffer.get_num_be::<i32>(0)?, -2);
/// assert_eq!(buffer.get_num_le::<f64>(4)?, 1.5);
/// assert_eq!(buffer.get_i32_foreign(0)?, (-2_i32).swap_bytes());
/// # Ok::<(), membuf::BufferError>(())
/// ```
pub trait BufferExt: Buffer {
    /// Reads an `i8`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i8(&self, index: usize) -> Result<i8> {
        self.get_u8(index).map(u8::cast_signed)
    }

    /// Writes an `i8`.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i8(&mut self, index: usize, value: i8) -> Result<()> {
        self.put_u8(index, value.cast_unsigned())
    }

    /// Reads an `i16` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i16(&self, index: usize) -> Result<i16> {
        self.get_u16(index).map(u16::cast_signed)
    }

    /// Writes an `i16` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i16(&mut self, index: usize, value: i16) -> Result<()> {
        self.put_u16(index, value.cast_unsigned())
    }

    /// Reads an `i32` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i32(&self, index: usize) -> Result<i32> {
        self.get_u32(index).map(u32::cast_signed)
    }

    /// Writes an `i32` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i32(&mut self, index: usize, value: i32) -> Result<()> {
        self.put_u32(index, value.cast_unsigned())
    }

    /// Reads an `i64` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i64(&self, index: usize) -> Result<i64> {
        self.get_u64(index).map(u64::cast_signed)
    }

    /// Writes an `i64` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i64(&mut self, index: usize, value: i64) -> Result<()> {
        self.put_u64(index, value.cast_unsigned())
    }

    /// Reads an `f32` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_f32(&self, index: usize) -> Result<f32> {
        self.get_u32(index).map(f32::from_bits)
    }

    /// Writes an `f32` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_f32(&mut self, index: usize, value: f32) -> Result<()> {
        self.put_u32(index, value.to_bits())
    }

    /// Reads an `f64` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_f64(&self, index: usize) -> Result<f64> {
        self.get_u64(index).map(f64::from_bits)
    }

    /// Writes an `f64` in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_f64(&mut self, index: usize, value: f64) -> Result<()> {
        self.put_u64(index, value.to_bits())
    }

    /// Reads a UTF-16 code unit in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_char(&self, index: usize) -> Result<u16> {
        self.get_u16(index)
    }

    /// Writes a UTF-16 code unit in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_char(&mut self, index: usize, value: u16) -> Result<()> {
        self.put_u16(index, value)
    }

    /// Reads a `u16` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u16_foreign(&self, index: usize) -> Result<u16> {
        self.get_u16(index).map(u16::swap_bytes)
    }

    /// Writes a `u16` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_u16_foreign(&mut self, index: usize, value: u16) -> Result<()> {
        self.put_u16(index, value.swap_bytes())
    }

    /// Reads a `u32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u32_foreign(&self, index: usize) -> Result<u32> {
        self.get_u32(index).map(u32::swap_bytes)
    }

    /// Writes a `u32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_u32_foreign(&mut self, index: usize, value: u32) -> Result<()> {
        self.put_u32(index, value.swap_bytes())
    }

    /// Reads a `u64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_u64_foreign(&self, index: usize) -> Result<u64> {
        self.get_u64(index).map(u64::swap_bytes)
    }

    /// Writes a `u64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_u64_foreign(&mut self, index: usize, value: u64) -> Result<()> {
        self.put_u64(index, value.swap_bytes())
    }

    /// Reads an `i16` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i16_foreign(&self, index: usize) -> Result<i16> {
        self.get_u16_foreign(index).map(u16::cast_signed)
    }

    /// Writes an `i16` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i16_foreign(&mut self, index: usize, value: i16) -> Result<()> {
        self.put_u16_foreign(index, value.cast_unsigned())
    }

    /// Reads an `i32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i32_foreign(&self, index: usize) -> Result<i32> {
        self.get_u32_foreign(index).map(u32::cast_signed)
    }

    /// Writes an `i32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i32_foreign(&mut self, index: usize, value: i32) -> Result<()> {
        self.put_u32_foreign(index, value.cast_unsigned())
    }

    /// Reads an `i64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_i64_foreign(&self, index: usize) -> Result<i64> {
        self.get_u64_foreign(index).map(u64::cast_signed)
    }

    /// Writes an `i64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_i64_foreign(&mut self, index: usize, value: i64) -> Result<()> {
        self.put_u64_foreign(index, value.cast_unsigned())
    }

    /// Reads an `f32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_f32_foreign(&self, index: usize) -> Result<f32> {
        self.get_u32_foreign(index).map(f32::from_bits)
    }

    /// Writes an `f32` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_f32_foreign(&mut self, index: usize, value: f32) -> Result<()> {
        self.put_u32_foreign(index, value.to_bits())
    }

    /// Reads an `f64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_f64_foreign(&self, index: usize) -> Result<f64> {
        self.get_u64_foreign(index).map(f64::from_bits)
    }

    /// Writes an `f64` in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_f64_foreign(&mut self, index: usize, value: f64) -> Result<()> {
        self.put_u64_foreign(index, value.to_bits())
    }

    /// Reads a UTF-16 code unit in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_char_foreign(&self, index: usize) -> Result<u16> {
        self.get_u16_foreign(index)
    }

    /// Writes a UTF-16 code unit in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_char_foreign(&mut self, index: usize, value: u16) -> Result<()> {
        self.put_u16_foreign(index, value)
    }

    /// Reads any primitive number in the given byte order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_num_in<T>(&self, index: usize, order: ByteOrder) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        let mut bytes = T::Bytes::default();
        self.get_bytes(index, bytes.as_mut())?;
        Ok(order.decode(&bytes))
    }

    /// Writes any primitive number in the given byte order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_num_in<T: ToBytes>(&mut self, index: usize, value: T, order: ByteOrder) -> Result<()> {
        self.put_bytes(index, order.encode(&value).as_ref())
    }

    /// Reads any primitive number in the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_num<T>(&self, index: usize) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        self.get_num_in(index, self.order())
    }

    /// Writes any primitive number in the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_num<T: ToBytes>(&mut self, index: usize, value: T) -> Result<()> {
        let order = self.order();
        self.put_num_in(index, value, order)
    }

    /// Reads any primitive number in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_num_foreign<T>(&self, index: usize) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        self.get_num_in(index, self.order().swapped())
    }

    /// Writes any primitive number in the opposite of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_num_foreign<T: ToBytes>(&mut self, index: usize, value: T) -> Result<()> {
        let order = self.order().swapped();
        self.put_num_in(index, value, order)
    }

    /// Reads any primitive number stored little-endian, regardless of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_num_le<T>(&self, index: usize) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        self.get_num_in(index, ByteOrder::LittleEndian)
    }

    /// Writes any primitive number little-endian, regardless of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_num_le<T: ToBytes>(&mut self, index: usize, value: T) -> Result<()> {
        self.put_num_in(index, value, ByteOrder::LittleEndian)
    }

    /// Reads any primitive number stored big-endian, regardless of the buffer's order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the value does not fit in the buffer.
    fn get_num_be<T>(&self, index: usize) -> Result<T>
    where
        T: FromBytes,
        T::Bytes: Default,
    {
        self.get_num_in(index, ByteOrder::BigEndian)
    }

    /// Writes any primitive number big-endian, regardless of the buffer's order.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_num_be<T: ToBytes>(&mut self, index: usize, value: T) -> Result<()> {
        self.put_num_in(index, value, ByteOrder::BigEndian)
    }

    /// Makes sure `[index, index + length)` can be written, growing an expandable buffer if needed.
    ///
    /// Useful before a multi-step write that must not stop halfway because the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ReadOnly`] for read-only buffers, [`BufferError::OutOfBounds`] if
    /// the range does not fit in a non-expandable buffer and [`BufferError::CapacityExceeded`]
    /// if growth would exceed the maximum capacity.
    fn reserve(&mut self, index: usize, length: usize) -> Result<()> {
        prepare_write(self, index, length)
    }

    /// Copies `[index, index + length)` of this buffer into `dst` starting at `dst_index`.
    ///
    /// The copy behaves as if the source range were first copied to a temporary, so it is
    /// correct even when `dst` shares storage with this buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if either range does not fit and
    /// [`BufferError::ReadOnly`] if `dst` is read-only. Nothing is written on failure.
    fn copy_to<D: Buffer + ?Sized>(&self, index: usize, dst: &mut D, dst_index: usize, length: usize) -> Result<()> {
        copy::copy_between(self, index, dst, dst_index, length)
    }

    /// Copies `[src_index, src_index + length)` of `src` into this buffer starting at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`copy_to()`][Self::copy_to].
    fn copy_from<S: Buffer + ?Sized>(&mut self, index: usize, src: &S, src_index: usize, length: usize) -> Result<()> {
        copy::copy_between(src, src_index, self, index, length)
    }

    /// Copies `[index, index + length)` into a new [`BytesMut`].
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn get_bytes_mut(&self, index: usize, length: usize) -> Result<BytesMut> {
        check_range(index, length, self.capacity())?;

        let mut bytes = BytesMut::zeroed(length);
        self.get_bytes(index, &mut bytes)?;
        Ok(bytes)
    }

    /// Consumes `length` bytes from `src` and writes them starting at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if `src` has fewer than `length` bytes remaining
    /// or the range does not fit in the buffer, and [`BufferError::ReadOnly`] for read-only
    /// buffers. `src` is not advanced on failure.
    fn put_buf(&mut self, index: usize, src: &mut dyn Buf, length: usize) -> Result<()> {
        if src.remaining() < length {
            return Err(BufferError::out_of_bounds(0, length, src.remaining()));
        }

        prepare_write(self, index, length)?;

        let mut position = index;
        let end = index + length;

        while position < end {
            let chunk = src.chunk();
            let step = chunk.len().min(end - position);

            self.put_bytes(position, &chunk[..step])?;
            src.advance(step);
            position += step;
        }

        Ok(())
    }

    /// Appends `[index, index + length)` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfBounds`] if the range does not fit in the buffer or `dst`
    /// has room for fewer than `length` bytes. Nothing is appended on failure.
    fn get_into_buf_mut(&self, index: usize, length: usize, dst: &mut dyn BufMut) -> Result<()> {
        let end = check_range(index, length, self.capacity())?;

        if dst.remaining_mut() < length {
            return Err(BufferError::out_of_bounds(0, length, dst.remaining_mut()));
        }

        let mut staging = [0; STAGING_CHUNK_LEN];
        let mut position = index;

        while position < end {
            let step = (end - position).min(STAGING_CHUNK_LEN);

            self.get_bytes(position, &mut staging[..step])?;
            dst.put_slice(&staging[..step]);
            position += step;
        }

        Ok(())
    }

    /// Writes the UTF-8 bytes of `value` starting at `index` and returns how many were written.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::put_bytes`].
    fn put_utf8(&mut self, index: usize, value: &str) -> Result<usize> {
        strings::put_utf8(self, index, value)
    }

    /// Reads `length` bytes starting at `index` as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if the bytes are not valid UTF-8 and
    /// [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn get_utf8(&self, index: usize, length: usize) -> Result<String> {
        strings::get_utf8(self, index, length)
    }

    /// Writes `value` as ASCII starting at `index` and returns how many bytes were written.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] without writing anything if `value` contains a
    /// non-ASCII character, otherwise the same as [`Buffer::put_bytes`].
    fn put_ascii(&mut self, index: usize, value: &str) -> Result<usize> {
        strings::put_ascii(self, index, value)
    }

    /// Reads `length` bytes starting at `index` as ASCII.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if any byte is not ASCII and
    /// [`BufferError::OutOfBounds`] if the range does not fit in the buffer.
    fn get_ascii(&self, index: usize, length: usize) -> Result<String> {
        strings::get_ascii(self, index, length)
    }

    /// Writes a `u32` byte count in the buffer's order followed by the UTF-8 bytes of `value`.
    ///
    /// Returns the number of bytes written, prefix included.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if `value` is longer than `u32::MAX` bytes,
    /// otherwise the same as [`Buffer::put_bytes`]. Nothing is written on failure.
    fn put_utf8_prefixed(&mut self, index: usize, value: &str) -> Result<usize> {
        strings::put_prefixed(self, index, value)
    }

    /// Reads a string written by [`put_utf8_prefixed()`][Self::put_utf8_prefixed].
    ///
    /// The record occupies four bytes more than the length of the returned string.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if the bytes are not valid UTF-8 and
    /// [`BufferError::OutOfBounds`] if the record does not fit in the buffer.
    fn get_utf8_prefixed(&self, index: usize) -> Result<String> {
        strings::decode_utf8(strings::get_prefixed(self, index)?)
    }

    /// Writes a `u32` byte count in the buffer's order followed by `value` as ASCII.
    ///
    /// Returns the number of bytes written, prefix included.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if `value` contains a non-ASCII character,
    /// otherwise the same as [`Buffer::put_bytes`]. Nothing is written on failure.
    fn put_ascii_prefixed(&mut self, index: usize, value: &str) -> Result<usize> {
        if !value.is_ascii() {
            return Err(BufferError::InvalidString {
                reason: "data contains a non-ASCII character",
            });
        }

        strings::put_prefixed(self, index, value)
    }

    /// Reads a string written by [`put_ascii_prefixed()`][Self::put_ascii_prefixed].
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidString`] if any byte is not ASCII and
    /// [`BufferError::OutOfBounds`] if the record does not fit in the buffer.
    fn get_ascii_prefixed(&self, index: usize) -> Result<String> {
        strings::decode_ascii(strings::get_prefixed(self, index)?)
    }

    /// Copies the whole buffer into a new vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage of the buffer is no longer accessible.
    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.capacity()];
        self.get_bytes(0, &mut bytes)?;
        Ok(bytes)
    }
}

impl<B: Buffer + ?Sized> BufferExt for B {}
