// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, Read, Write};

use membuf::{Buffer, BufferExt};

/// Reads the bytes of a buffer through [`std::io::Read`], starting at a position.
///
/// Reading stops at the capacity of the buffer, where [`Read::read()`] returns `Ok(0)`.
///
/// # Example
///
/// ```
/// use std::io::Read;
///
/// use membuf::HeapBuffer;
/// use membuf_io::BufferReader;
///
/// let mut reader = BufferReader::new(HeapBuffer::copied_from_slice(b"hello"), 1);
/// let mut text = String::new();
/// reader.read_to_string(&mut text)?;
///
/// assert_eq!(text, "ello");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct BufferReader<B> {
    buffer: B,
    position: usize,
}

impl<B: Buffer> BufferReader<B> {
    /// Creates a reader over `buffer` whose next read starts at `position`.
    #[must_use]
    pub const fn new(buffer: B, position: usize) -> Self {
        Self { buffer, position }
    }

    /// Index of the next byte to be read.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes left before the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.capacity().saturating_sub(self.position)
    }

    /// Returns the wrapped buffer.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl<B: Buffer> Read for BufferReader<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.remaining());

        if len == 0 {
            return Ok(0);
        }

        self.buffer.get_bytes(self.position, &mut buf[..len]).map_err(io::Error::other)?;
        self.position += len;

        Ok(len)
    }
}

/// Writes into a buffer through [`std::io::Write`], starting at a position.
///
/// A fixed-capacity buffer accepts bytes until it is full, after which [`Write::write()`]
/// returns `Ok(0)`. An expandable buffer grows to accept every write.
///
/// # Example
///
/// ```
/// use std::io::Write;
///
/// use membuf::{BufferExt, HeapBuffer};
/// use membuf_io::BufferWriter;
///
/// let mut writer = BufferWriter::new(HeapBuffer::new(4), 0);
///
/// assert_eq!(writer.write(b"abcdef")?, 4);
/// assert!(writer.write_all(b"g").is_err());
///
/// assert_eq!(writer.into_inner().get_ascii(0, 4).unwrap(), "abcd");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct BufferWriter<B> {
    buffer: B,
    position: usize,
}

impl<B: Buffer> BufferWriter<B> {
    /// Creates a writer into `buffer` whose next write starts at `position`.
    #[must_use]
    pub const fn new(buffer: B, position: usize) -> Self {
        Self { buffer, position }
    }

    /// Index at which the next write starts.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the wrapped buffer.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl<B: Buffer> Write for BufferWriter<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = if self.buffer.is_expandable() {
            buf.len()
        } else {
            buf.len().min(self.buffer.capacity().saturating_sub(self.position))
        };

        self.buffer.reserve(self.position, len).map_err(io::Error::other)?;
        self.buffer.put_bytes(self.position, &buf[..len]).map_err(io::Error::other)?;
        self.position += len;

        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
