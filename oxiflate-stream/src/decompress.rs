//! Decompressing reader.

use crate::input_buffer::DecodeInputBuffer;
use crate::{DEFAULT_INPUT_BUFFER_SIZE, SKIP_CHUNK_SIZE, unsupported};
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{CryptoTransform, InflateEngine};
use oxiflate_deflate::Inflater;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use tracing::debug;

/// A [`Read`] adapter that inflates a compressed source.
///
/// # Example
///
/// ```rust
/// use oxiflate_stream::DecompressionStream;
/// use std::io::Read;
///
/// let compressed = oxiflate_deflate::deflate(b"inflate me", 6).unwrap();
/// let mut reader = DecompressionStream::new(compressed.as_slice());
///
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).unwrap();
/// assert_eq!(out, b"inflate me");
/// ```
#[derive(Debug)]
pub struct DecompressionStream<R, E = Inflater> {
    engine: E,
    input: DecodeInputBuffer<R>,
    is_stream_owner: bool,
    closed: bool,
}

impl<R: Read> DecompressionStream<R> {
    /// Read a raw DEFLATE stream from `source`.
    pub fn new(source: R) -> Self {
        Self::with_engine(source, Inflater::new())
    }

    /// Read a zlib-framed stream from `source`.
    pub fn zlib(source: R) -> Self {
        Self::with_engine(source, Inflater::zlib())
    }
}

impl<R: Read, E: InflateEngine> DecompressionStream<R, E> {
    /// Read through `engine` with the default input buffer size.
    pub fn with_engine(source: R, engine: E) -> Self {
        Self::with_buffer_size(source, engine, DEFAULT_INPUT_BUFFER_SIZE)
    }

    /// Read through `engine`, buffering `buffer_size` raw bytes at a time.
    pub fn with_buffer_size(source: R, engine: E, buffer_size: usize) -> Self {
        Self {
            engine,
            input: DecodeInputBuffer::with_buffer_size(source, buffer_size),
            is_stream_owner: true,
            closed: false,
        }
    }

    /// Inflate into `buf`, returning the bytes produced.
    ///
    /// Returns as soon as some output exists; 0 means the compressed stream
    /// has ended (or `buf` is empty).
    pub fn read_inflated(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(OxiflateError::StreamClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.engine.is_needing_dictionary() {
                return Err(OxiflateError::NeedsDictionary {
                    dict_id: self.engine.adler(),
                });
            }

            let produced = self.engine.inflate(buf)?;
            if produced > 0 || self.engine.is_finished() {
                return Ok(produced);
            }

            if self.engine.is_needing_dictionary() {
                continue;
            }
            if self.engine.is_needing_input() {
                self.fill()?;
            } else {
                return Err(OxiflateError::InvalidInputData);
            }
        }
    }

    /// Move the next chunk of input into the engine.
    fn fill(&mut self) -> Result<()> {
        if self.input.available() == 0 {
            self.input.fill()?;
            if self.input.available() == 0 {
                return Err(OxiflateError::unexpected_eof(
                    "compressed stream ended before its end marker",
                ));
            }
        }
        self.input.set_inflater_input(&mut self.engine)
    }

    /// Skip `count` bytes of the underlying (compressed) source by reading
    /// and discarding them. Returns the bytes actually skipped, which is less
    /// than `count` only at the end of the source.
    ///
    /// This never seeks, even when `R` implements [`Seek`]; call
    /// [`skip_seekable`](Self::skip_seekable) for a relative seek instead.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        if count == 0 {
            return Err(OxiflateError::invalid_argument("skip count must be positive"));
        }
        let source = self.input.get_mut().ok_or(OxiflateError::StreamClosed)?;

        let chunk =
            |left: u64| usize::try_from(left).map_or(SKIP_CHUNK_SIZE, |n| n.min(SKIP_CHUNK_SIZE));
        let mut scratch = vec![0u8; chunk(count)];
        let mut remaining = count;
        while remaining > 0 {
            let want = chunk(remaining);
            match source.read(&mut scratch[..want]) {
                Ok(0) => break,
                Ok(n) => remaining -= n as u64,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(count - remaining)
    }

    /// 0 once the engine has finished, 1 while more output may follow.
    pub fn available(&self) -> u32 {
        u32::from(!self.closed && !self.engine.is_finished())
    }

    /// Close the stream, dropping the source if this stream owns it.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.is_stream_owner {
            drop(self.input.take_source());
        }
        debug!(owner = self.is_stream_owner, "decompression stream closed");
    }

    /// Decrypt compressed bytes with `transform` from the next undelivered
    /// byte on.
    pub fn set_decryption(&mut self, transform: Box<dyn CryptoTransform>) -> Result<()> {
        self.input.set_transform(Some(transform))
    }

    /// Stop decrypting; remaining input is passed through unchanged.
    pub fn stop_decrypting(&mut self) -> Result<()> {
        self.input.set_transform(None)
    }

    /// The input buffer, for container readers that parse headers inline.
    pub fn input_buffer_mut(&mut self) -> &mut DecodeInputBuffer<R> {
        &mut self.input
    }

    /// The decode engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the decode engine, e.g. to install a dictionary.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Whether closing this stream drops the source.
    pub fn is_stream_owner(&self) -> bool {
        self.is_stream_owner
    }

    /// Choose whether closing this stream drops the source.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.is_stream_owner = owner;
    }

    /// The source, unless a close has dropped it.
    pub fn get_ref(&self) -> Option<&R> {
        self.input.get_ref()
    }

    /// Recover the source, unless a close has dropped it.
    pub fn into_inner(mut self) -> Option<R> {
        self.input.take_source()
    }
}

impl<R: Read + Seek, E: InflateEngine> DecompressionStream<R, E> {
    /// Skip `count` bytes of the underlying source with a relative seek.
    ///
    /// Unlike [`skip`](Self::skip) this does not check the source length, so
    /// it always reports `count`.
    pub fn skip_seekable(&mut self, count: u64) -> Result<u64> {
        if count == 0 {
            return Err(OxiflateError::invalid_argument("skip count must be positive"));
        }
        let offset = i64::try_from(count)
            .map_err(|_| OxiflateError::invalid_argument("skip count exceeds i64::MAX"))?;
        let source = self.input.get_mut().ok_or(OxiflateError::StreamClosed)?;
        source.seek(SeekFrom::Current(offset))?;
        Ok(count)
    }
}

impl<R: Read, E: InflateEngine> Read for DecompressionStream<R, E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_inflated(buf)?)
    }
}

impl<R, E> Write for DecompressionStream<R, E> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("write on a decompression stream"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(unsupported("flush on a decompression stream"))
    }
}

impl<R, E> Seek for DecompressionStream<R, E> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("seek on a decompression stream"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_whole_stream() {
        let input = b"stream me through a reader ".repeat(300);
        let compressed = oxiflate_deflate::deflate(&input, 6).unwrap();

        let mut reader = DecompressionStream::new(compressed.as_slice());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, input);
        assert_eq!(reader.available(), 0);
        assert_eq!(reader.read_inflated(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_available_before_end() {
        let compressed = oxiflate_deflate::deflate(&[7u8; 10_000], 6).unwrap();
        let mut reader = DecompressionStream::new(compressed.as_slice());
        let mut first = [0u8; 10];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(reader.available(), 1);
    }

    #[test]
    fn test_truncated_source_is_unexpected_eof() {
        let compressed = oxiflate_deflate::deflate(&b"abcdefgh".repeat(100), 6).unwrap();
        let mut reader = DecompressionStream::new(&compressed[..compressed.len() / 2]);
        let mut out = vec![0u8; 2000];
        let mut result = Ok(1);
        while matches!(result, Ok(n) if n > 0) {
            result = reader.read_inflated(&mut out);
        }
        assert!(matches!(result, Err(OxiflateError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_skip_reads_raw_source() {
        let data: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let mut reader = DecompressionStream::new(data.as_slice());
        assert_eq!(reader.skip(4500).unwrap(), 4500);
        assert_eq!(reader.skip(4500).unwrap(), 500);
        assert!(reader.skip(0).is_err());
    }

    #[test]
    fn test_skip_seekable() {
        let mut reader = DecompressionStream::new(Cursor::new(vec![0u8; 100]));
        assert_eq!(reader.skip_seekable(40).unwrap(), 40);
        assert_eq!(reader.get_ref().unwrap().position(), 40);
    }

    #[test]
    fn test_skip_reads_even_when_seekable() {
        let mut reader = DecompressionStream::new(Cursor::new(vec![0u8; 100]));
        assert_eq!(reader.skip(150).unwrap(), 100);
        assert_eq!(reader.get_ref().unwrap().position(), 100);
    }

    #[test]
    fn test_close_is_idempotent() {
        let compressed = oxiflate_deflate::deflate(b"x", 6).unwrap();
        let mut reader = DecompressionStream::new(compressed.as_slice());
        reader.close();
        reader.close();
        assert!(reader.get_ref().is_none());
        assert_eq!(reader.available(), 0);
        assert!(matches!(
            reader.read_inflated(&mut [0u8; 4]),
            Err(OxiflateError::StreamClosed)
        ));
    }

    #[test]
    fn test_close_keeps_unowned_source() {
        let compressed = oxiflate_deflate::deflate(b"x", 6).unwrap();
        let mut reader = DecompressionStream::new(Cursor::new(compressed));
        reader.set_stream_owner(false);
        assert!(!reader.is_stream_owner());
        reader.close();
        assert!(reader.into_inner().is_some());
    }

    #[test]
    fn test_write_and_seek_unsupported() {
        let mut reader = DecompressionStream::new(&b""[..]);
        assert_eq!(
            reader.write(b"x").unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(reader.flush().unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(
            reader.seek(SeekFrom::Start(0)).unwrap_err().kind(),
            ErrorKind::Unsupported
        );
    }
}
