// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, Read};

use membuf::{Buffer, BufferExt};
use tracing::{Level, event};

use crate::{ProgressDeadline, Result, StreamError, StreamOptions};

/// Reads exactly `length` bytes from `reader` into `buffer` starting at `index`.
///
/// Reads of [`io::ErrorKind::WouldBlock`] and [`io::ErrorKind::Interrupted`] count as zero
/// progress and are retried until the timeout of `options` elapses without any byte arriving.
///
/// The target range is validated (and an expandable buffer grown) before anything is read.
///
/// # Errors
///
/// * [`StreamError::Eof`] if the stream ends early. The bytes read so far are in the buffer.
/// * [`StreamError::Timeout`] if no byte arrives within the timeout.
/// * [`StreamError::Io`] for any other error reported by the reader.
/// * [`StreamError::Buffer`] if the range cannot be written.
///
/// # Example
///
/// ```
/// use membuf::{BufferExt, HeapBuffer};
/// use membuf_io::{StreamError, StreamOptions, read_exact_into};
///
/// let mut source: &[u8] = b"\x00\x00\x00\x2A";
/// let mut buffer = HeapBuffer::new(8);
///
/// read_exact_into(&mut source, &mut buffer, 0, 4, &StreamOptions::new())?;
/// assert_eq!(buffer.get_num_be::<u32>(0)?, 42);
///
/// let error = read_exact_into(&mut source, &mut buffer, 4, 4, &StreamOptions::new()).unwrap_err();
/// assert!(matches!(error, StreamError::Eof { transferred: 0 }));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn read_exact_into<R, B>(reader: &mut R, buffer: &mut B, index: usize, length: usize, options: &StreamOptions) -> Result<()>
where
    R: Read + ?Sized,
    B: Buffer + ?Sized,
{
    let transferred = read_into(reader, buffer, index, length, options)?;

    if transferred < length {
        event!(
            Level::DEBUG,
            message = "stream ended before the requested bytes were read",
            transferred,
            requested = length
        );

        return Err(StreamError::Eof { transferred });
    }

    Ok(())
}

/// Reads up to `length` bytes from `reader` into `buffer` starting at `index`, stopping early
/// if the stream ends.
///
/// Returns the number of bytes read, which is less than `length` only if the stream ended.
///
/// # Errors
///
/// Same as [`read_exact_into()`], except that the end of the stream is not an error.
pub fn read_available_into<R, B>(reader: &mut R, buffer: &mut B, index: usize, length: usize, options: &StreamOptions) -> Result<usize>
where
    R: Read + ?Sized,
    B: Buffer + ?Sized,
{
    read_into(reader, buffer, index, length, options)
}

fn read_into<R, B>(reader: &mut R, buffer: &mut B, index: usize, length: usize, options: &StreamOptions) -> Result<usize>
where
    R: Read + ?Sized,
    B: Buffer + ?Sized,
{
    buffer.reserve(index, length)?;

    let mut staging = vec![0; length.min(options.chunk_size())];
    let mut deadline = ProgressDeadline::new(options.timeout());
    let mut transferred = 0;

    while transferred < length {
        let step = (length - transferred).min(staging.len());

        match reader.read(&mut staging[..step]) {
            Ok(0) => break,
            Ok(read) => {
                buffer.put_bytes(index + transferred, &staging[..read])?;
                transferred += read;
                deadline.progress(read);
            }
            Err(error) if is_zero_progress(&error) => deadline.stalled()?,
            Err(error) => return Err(error.into()),
        }
    }

    Ok(transferred)
}

pub(crate) fn is_zero_progress(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}
