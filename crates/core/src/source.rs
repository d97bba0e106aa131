//! Byte sources feeding the pipeline.

use std::io::Read;

use crate::error::{LiveRtpError, Result};

/// Outcome of a successful source read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were written to the front of the buffer (possibly zero).
    Data(usize),
    /// The source is exhausted; the pipeline stops.
    EndOfStream,
}

/// A blocking producer of raw bytes with no framing guarantees.
///
/// An `Err` is a transient failure: the caller may read again.
pub trait ByteSource: Send {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadStatus>;
}

/// Adapts any [`Read`] (device node, FIFO, file, stdin) into a [`ByteSource`].
///
/// `Ok(0)` from the reader is end-of-stream; every error is reported as
/// [`LiveRtpError::Source`].
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        match self.inner.read(buf) {
            Ok(0) => Ok(ReadStatus::EndOfStream),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(e) => Err(LiveRtpError::Source(e)),
        }
    }
}
