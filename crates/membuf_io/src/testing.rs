// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Scripted streams for testing code that moves bytes through `std::io`.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// One response of a [`FakeReader`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadStep {
    /// Returns these bytes, over as many reads as the caller's buffers require.
    ///
    /// An empty vector signals the end of the stream once.
    Data(Vec<u8>),

    /// Fails with [`io::ErrorKind::WouldBlock`].
    WouldBlock,

    /// Fails with [`io::ErrorKind::Interrupted`].
    Interrupted,

    /// Fails with an error of the given kind.
    Fail(io::ErrorKind),
}

/// A [`Read`] that plays back a script of responses.
///
/// Once the script is exhausted the reader reports the end of the stream, or, if created
/// with [`stalled()`][Self::stalled], keeps failing with [`io::ErrorKind::WouldBlock`].
///
/// This is for test and example purposes only and is not optimized for performance.
#[derive(Debug, Default)]
pub struct FakeReader {
    steps: VecDeque<ReadStep>,
    stall_when_done: bool,
    reads: usize,
}

impl FakeReader {
    /// Creates a reader that plays back `steps` and then reports the end of the stream.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = ReadStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            stall_when_done: false,
            reads: 0,
        }
    }

    /// Creates a reader that returns `data` and then reports the end of the stream.
    #[must_use]
    pub fn with_data(data: &[u8]) -> Self {
        Self::new([ReadStep::Data(data.to_vec())])
    }

    /// Creates a reader that never produces data and never ends.
    #[must_use]
    pub fn stalled() -> Self {
        Self::new([]).stall_when_done()
    }

    /// Keeps failing with [`io::ErrorKind::WouldBlock`] once the script is exhausted.
    #[must_use]
    pub fn stall_when_done(mut self) -> Self {
        self.stall_when_done = true;
        self
    }

    /// Number of calls to [`Read::read()`] so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl Read for FakeReader {
    #[cfg_attr(test, mutants::skip)] // Mutations easily lead to infinite loops, not worth the effort.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;

        match self.steps.pop_front() {
            Some(ReadStep::Data(mut data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);

                if len < data.len() {
                    self.steps.push_front(ReadStep::Data(data.split_off(len)));
                }

                Ok(len)
            }
            Some(ReadStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
            Some(ReadStep::Fail(kind)) => Err(kind.into()),
            None if self.stall_when_done => Err(io::ErrorKind::WouldBlock.into()),
            None => Ok(0),
        }
    }
}

/// One response of a [`FakeWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStep {
    /// Accepts at most this many bytes.
    Accept(usize),

    /// Accepts nothing and returns `Ok(0)`.
    Zero,

    /// Fails with [`io::ErrorKind::WouldBlock`].
    WouldBlock,

    /// Fails with [`io::ErrorKind::Interrupted`].
    Interrupted,

    /// Fails with an error of the given kind.
    Fail(io::ErrorKind),
}

/// A [`Write`] that plays back a script of responses and collects what it accepts.
///
/// Once the script is exhausted the writer accepts everything, or, if created with
/// [`stalled()`][Self::stalled], keeps failing with [`io::ErrorKind::WouldBlock`].
///
/// This is for test and example purposes only and is not optimized for performance.
#[derive(Debug, Default)]
pub struct FakeWriter {
    steps: VecDeque<WriteStep>,
    stall_when_done: bool,
    written: Vec<u8>,
    flushes: usize,
}

impl FakeWriter {
    /// Creates a writer that plays back `steps` and then accepts everything.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = WriteStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Creates a writer that never accepts anything.
    #[must_use]
    pub fn stalled() -> Self {
        Self {
            stall_when_done: true,
            ..Self::default()
        }
    }

    /// The bytes accepted so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of calls to [`Write::flush()`] so far.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Write for FakeWriter {
    #[cfg_attr(test, mutants::skip)] // Mutations easily lead to infinite loops, not worth the effort.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = match self.steps.pop_front() {
            Some(WriteStep::Accept(limit)) => limit.min(buf.len()),
            Some(WriteStep::Zero) => 0,
            Some(WriteStep::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(WriteStep::Interrupted) => return Err(io::ErrorKind::Interrupted.into()),
            Some(WriteStep::Fail(kind)) => return Err(kind.into()),
            None if self.stall_when_done => return Err(io::ErrorKind::WouldBlock.into()),
            None => buf.len(),
        };

        self.written.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_splits_data_across_reads() {
        let mut reader = FakeReader::new([ReadStep::Data(b"abcde".to_vec()), ReadStep::WouldBlock]);
        let mut buf = [0; 3];

        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");
        assert_eq!(reader.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.reads(), 4);
    }

    #[test]
    fn stalled_reader_never_ends() {
        let mut reader = FakeReader::stalled();

        for _ in 0..3 {
            assert_eq!(reader.read(&mut [0; 1]).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        }
    }

    #[test]
    fn writer_follows_script_then_accepts_all() {
        let mut writer = FakeWriter::new([WriteStep::Accept(2), WriteStep::Zero, WriteStep::Interrupted]);

        assert_eq!(writer.write(b"abcd").unwrap(), 2);
        assert_eq!(writer.write(b"cd").unwrap(), 0);
        assert_eq!(writer.write(b"cd").unwrap_err().kind(), io::ErrorKind::Interrupted);
        assert_eq!(writer.write(b"cd").unwrap(), 2);
        writer.flush().unwrap();

        assert_eq!(writer.written(), b"abcd");
        assert_eq!(writer.flushes(), 1);
    }
}
