// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;

use membuf::{Buffer, BufferError};

use crate::read::is_zero_progress;
use crate::{ProgressDeadline, Result, StreamOptions};

/// Writes `[index, index + length)` of `buffer` to `writer`, then flushes it.
///
/// Writes that return `Ok(0)`, [`std::io::ErrorKind::WouldBlock`] or
/// [`std::io::ErrorKind::Interrupted`] count as zero progress and are retried until the timeout
/// of `options` elapses without any byte being accepted.
///
/// # Errors
///
/// * [`StreamError::Timeout`][crate::StreamError::Timeout] if the writer accepts nothing within the timeout.
/// * [`StreamError::Io`][crate::StreamError::Io] for any other error reported by the writer.
/// * [`StreamError::Buffer`][crate::StreamError::Buffer] if the range does not fit in the buffer.
///   Nothing is written in that case.
///
/// # Example
///
/// ```
/// use membuf::{BufferExt, HeapBuffer};
/// use membuf_io::{StreamOptions, write_all_from};
///
/// let mut buffer = HeapBuffer::new(8);
/// buffer.put_ascii(0, "ping")?;
///
/// let mut sink = Vec::new();
/// write_all_from(&mut sink, &buffer, 0, 4, &StreamOptions::new())?;
///
/// assert_eq!(sink, b"ping");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn write_all_from<W, B>(writer: &mut W, buffer: &B, index: usize, length: usize, options: &StreamOptions) -> Result<()>
where
    W: Write + ?Sized,
    B: Buffer + ?Sized,
{
    let capacity = buffer.capacity();

    if index.checked_add(length).is_none_or(|end| end > capacity) {
        return Err(BufferError::OutOfBounds { index, length, capacity }.into());
    }

    let mut staging = vec![0; length.min(options.chunk_size())];
    let mut deadline = ProgressDeadline::new(options.timeout());
    let mut transferred = 0;

    while transferred < length {
        let step = (length - transferred).min(staging.len());
        buffer.get_bytes(index + transferred, &mut staging[..step])?;

        let mut written = 0;

        while written < step {
            match writer.write(&staging[written..step]) {
                Ok(0) => deadline.stalled()?,
                Ok(accepted) => {
                    written += accepted;
                    deadline.progress(accepted);
                }
                Err(error) if is_zero_progress(&error) => deadline.stalled()?,
                Err(error) => return Err(error.into()),
            }
        }

        transferred += step;
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(error) if is_zero_progress(&error) => deadline.stalled()?,
            Err(error) => return Err(error.into()),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use membuf::{BufferExt, ByteOrder, CompositeBuffer, HeapBuffer};

    use super::*;
    use crate::StreamError;
    use crate::testing::{FakeWriter, WriteStep};

    fn quick() -> StreamOptions {
        StreamOptions::new().with_timeout(Duration::from_millis(50))
    }

    fn abcdef() -> HeapBuffer {
        HeapBuffer::copied_from_slice(b"abcdef")
    }

    #[test]
    fn partial_and_zero_writes_are_continued() {
        let mut writer = FakeWriter::new([
            WriteStep::Accept(1),
            WriteStep::Zero,
            WriteStep::WouldBlock,
            WriteStep::Interrupted,
            WriteStep::Accept(2),
        ]);

        write_all_from(&mut writer, &abcdef(), 1, 5, &quick().with_chunk_size(2)).unwrap();

        assert_eq!(writer.written(), b"bcdef");
        assert_eq!(writer.flushes(), 1);
    }

    #[test]
    fn stalled_writer_times_out() {
        let mut writer = FakeWriter::stalled();

        let error = write_all_from(&mut writer, &abcdef(), 0, 6, &quick()).unwrap_err();

        assert!(matches!(error, StreamError::Timeout { .. }));
        assert!(writer.written().is_empty());
    }

    #[test]
    fn io_errors_are_surfaced() {
        let mut writer = FakeWriter::new([WriteStep::Accept(2), WriteStep::Fail(io::ErrorKind::BrokenPipe)]);

        let error = write_all_from(&mut writer, &abcdef(), 0, 6, &quick()).unwrap_err();

        assert!(matches!(error, StreamError::Io(inner) if inner.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(writer.written(), b"ab");
    }

    #[test]
    fn range_past_end_writes_nothing() {
        let mut writer = FakeWriter::new([]);

        let error = write_all_from(&mut writer, &abcdef(), 4, 4, &quick()).unwrap_err();

        assert!(matches!(error, StreamError::Buffer(BufferError::OutOfBounds { .. })));
        assert!(writer.written().is_empty());
    }

    #[test]
    fn writes_from_composite_across_children() {
        let mut composite = CompositeBuffer::new(ByteOrder::NATIVE);
        composite.append(Box::new(HeapBuffer::copied_from_slice(b"he"))).unwrap();
        composite.append(Box::new(HeapBuffer::copied_from_slice(b"llo"))).unwrap();
        assert_eq!(composite.get_ascii(0, 5).unwrap(), "hello");

        let mut sink = Vec::new();
        write_all_from(&mut sink, &composite, 1, 3, &quick()).unwrap();

        assert_eq!(sink, b"ell");
    }
}
