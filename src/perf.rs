//! Write-buffer batching for the archive writer.
//!
//! [`WriteBuffer`] accumulates small writes into a fixed-capacity buffer and
//! flushes to the underlying writer in large aligned chunks, reducing the
//! number of `write` syscalls for archives built from many small blocks.

use std::io::{self, Write};

/// Buffered writer with configurable flush threshold.
///
/// Accumulates writes up to `capacity` bytes and flushes to the underlying
/// writer when the buffer is full or when `flush()` is called explicitly.
///
/// Unlike `std::io::BufWriter`, this implementation exposes `bytes_written`
/// and [`WriteBuffer::get_mut`], letting [`crate::writer::Writer`] seek past
/// the buffered region to patch a fixed-offset header field after more bytes
/// have already been queued.
pub struct WriteBuffer<W: Write> {
    inner: W,
    buf: Vec<u8>,
    capacity: usize,
    pub bytes_written: u64,
}

impl<W: Write> WriteBuffer<W> {
    /// Create a new `WriteBuffer` with the given capacity in bytes.
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity,
            bytes_written: 0,
        }
    }

    /// Direct access to the inner writer, for callers that need to seek past
    /// the buffered region.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Flush if buffer exceeds capacity.
    fn flush_if_full(&mut self) -> io::Result<()> {
        if self.buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // For large writes that exceed remaining capacity, bypass the buffer.
        if buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
            self.inner.write_all(buf)?;
        } else {
            self.buf.extend_from_slice(buf);
            self.flush_if_full()?;
        }
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_buffer_flushes() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut wb = WriteBuffer::new(&mut buf, 8);
            wb.write_all(b"hello").unwrap();
            wb.write_all(b" world!").unwrap();
            wb.flush().unwrap();
        }
        assert_eq!(&buf, b"hello world!");
    }

    #[test]
    fn get_mut_exposes_the_inner_writer() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut wb = WriteBuffer::new(&mut buf, 64);
            wb.write_all(&[0u8; 16]).unwrap();
            wb.flush().unwrap();
            let inner: &mut &mut Vec<u8> = wb.get_mut();
            (*inner)[0] = 0xAB;
        }
        assert_eq!(buf[0], 0xAB);
    }
}
