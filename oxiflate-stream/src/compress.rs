//! Compressing writer and the drain loop it shares with the async variant.

use crate::{DEFAULT_OUTPUT_BUFFER_SIZE, MIN_OUTPUT_BUFFER_SIZE, unsupported};
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{CompressionLevel, CryptoTransform, DeflateEngine};
use oxiflate_deflate::Deflater;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use tracing::debug;

/// Engine, scratch buffer and optional encryption behind a compression stream.
///
/// The drain hands out one encrypted chunk at a time; the caller writes it to
/// its sink and reports progress with [`consume`](Self::consume). A chunk
/// stays pending until fully consumed, so a write abandoned halfway resumes
/// from the first unwritten byte on the next drain.
pub(crate) struct DeflateDrain<E> {
    engine: E,
    scratch: Vec<u8>,
    /// Produced but unwritten part of `scratch`.
    pending: Range<usize>,
    transform: Option<Box<dyn CryptoTransform>>,
    auth_code: Option<Vec<u8>>,
}

impl<E: DeflateEngine> DeflateDrain<E> {
    pub(crate) fn new(engine: E, buffer_size: usize) -> Result<Self> {
        if buffer_size < MIN_OUTPUT_BUFFER_SIZE {
            return Err(OxiflateError::invalid_argument(format!(
                "output buffer of {} bytes is below the {} byte minimum",
                buffer_size, MIN_OUTPUT_BUFFER_SIZE
            )));
        }
        Ok(Self {
            engine,
            scratch: vec![0u8; buffer_size],
            pending: 0..0,
            transform: None,
            auth_code: None,
        })
    }

    pub(crate) fn with_default_buffer(engine: E) -> Self {
        Self {
            engine,
            scratch: vec![0u8; DEFAULT_OUTPUT_BUFFER_SIZE],
            pending: 0..0,
            transform: None,
            auth_code: None,
        }
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub(crate) fn set_input(&mut self, input: &[u8]) -> Result<()> {
        self.engine.set_input(input)
    }

    pub(crate) fn request_flush(&mut self) {
        self.engine.flush();
    }

    pub(crate) fn request_finish(&mut self) {
        self.engine.finish();
    }

    /// The unwritten rest of the pending chunk, or a freshly deflated and
    /// encrypted one.
    fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.pending.is_empty() {
            let len = self.engine.deflate(&mut self.scratch)?;
            if len == 0 {
                return Ok(None);
            }
            if let Some(transform) = self.transform.as_mut() {
                transform.transform_in_place(&mut self.scratch[..len])?;
            }
            self.pending = 0..len;
        }
        Ok(Some(&self.scratch[self.pending.clone()]))
    }

    /// Mark `written` bytes of the pending chunk as delivered to the sink.
    pub(crate) fn consume(&mut self, written: usize) {
        self.pending.start = (self.pending.start + written).min(self.pending.end);
    }

    /// Whether part of a chunk is still waiting to be written.
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Next chunk while input remains, or while a flush is being drained.
    pub(crate) fn next_input_chunk(&mut self, flushing: bool) -> Result<Option<&[u8]>> {
        if !flushing && !self.has_pending() && self.engine.is_needing_input() {
            return Ok(None);
        }
        self.next_chunk()
    }

    /// Fails if the engine stopped producing output with input left over.
    pub(crate) fn check_input_consumed(&self) -> Result<()> {
        if self.engine.is_needing_input() {
            Ok(())
        } else {
            Err(OxiflateError::CantDeflateAllInput)
        }
    }

    /// Next chunk of the final drain, `None` once the engine has finished
    /// and nothing is pending.
    ///
    /// An engine that yields nothing before finishing is a fatal error.
    pub(crate) fn next_final_chunk(&mut self) -> Result<Option<&[u8]>> {
        if !self.has_pending() && self.engine.is_finished() {
            return Ok(None);
        }
        match self.next_chunk()? {
            Some(chunk) => Ok(Some(chunk)),
            None => Err(OxiflateError::CantDeflateAllInput),
        }
    }

    /// Take the transform's authentication code and release the transform.
    pub(crate) fn complete_transform(&mut self) {
        if let Some(mut transform) = self.transform.take() {
            self.auth_code = transform.authentication_code();
            debug!(
                auth_code = self.auth_code.is_some(),
                "encryption transform released"
            );
        }
    }

    pub(crate) fn set_transform(&mut self, transform: Option<Box<dyn CryptoTransform>>) {
        debug!(enabled = transform.is_some(), "encryption transform set");
        self.transform = transform;
    }

    pub(crate) fn authentication_code(&self) -> Option<&[u8]> {
        self.auth_code.as_deref()
    }
}

/// A [`Write`] adapter that deflates everything written into a sink.
///
/// Call [`finish`](Self::finish) or [`close`](Self::close) to write the end of
/// the compressed stream. Dropping an unclosed stream closes it, ignoring
/// errors.
///
/// # Example
///
/// ```rust
/// use oxiflate_stream::CompressionStream;
/// use std::io::Write;
///
/// let mut writer = CompressionStream::with_level(Vec::new(), 9);
/// writer.write_all(b"compress me, compress me").unwrap();
/// let compressed = writer.into_inner().unwrap();
///
/// let output = oxiflate_deflate::inflate(&compressed).unwrap();
/// assert_eq!(output, b"compress me, compress me");
/// ```
pub struct CompressionStream<W: Write, E: DeflateEngine = Deflater> {
    drain: DeflateDrain<E>,
    sink: Option<W>,
    is_stream_owner: bool,
    closed: bool,
}

impl<W: Write> CompressionStream<W> {
    /// Write a raw DEFLATE stream at the default level.
    pub fn new(sink: W) -> Self {
        Self::with_level(sink, CompressionLevel::DEFAULT)
    }

    /// Write a raw DEFLATE stream at `level`.
    pub fn with_level(sink: W, level: impl Into<CompressionLevel>) -> Self {
        Self::from_parts(sink, Deflater::new(level))
    }

    /// Write a zlib-framed stream at `level`.
    pub fn zlib(sink: W, level: impl Into<CompressionLevel>) -> Self {
        Self::from_parts(sink, Deflater::zlib(level))
    }

    fn from_parts(sink: W, engine: Deflater) -> Self {
        Self {
            drain: DeflateDrain::with_default_buffer(engine),
            sink: Some(sink),
            is_stream_owner: true,
            closed: false,
        }
    }
}

impl<W: Write, E: DeflateEngine> CompressionStream<W, E> {
    /// Compress through `engine` with the default output buffer.
    pub fn with_engine(sink: W, engine: E) -> Result<Self> {
        Self::with_buffer_size(sink, engine, DEFAULT_OUTPUT_BUFFER_SIZE)
    }

    /// Compress through `engine`, draining `buffer_size` bytes at a time.
    ///
    /// Sizes below [`MIN_OUTPUT_BUFFER_SIZE`] are rejected.
    pub fn with_buffer_size(sink: W, engine: E, buffer_size: usize) -> Result<Self> {
        Ok(Self {
            drain: DeflateDrain::new(engine, buffer_size)?,
            sink: Some(sink),
            is_stream_owner: true,
            closed: false,
        })
    }

    fn sink_mut(&mut self) -> Result<&mut W> {
        self.sink.as_mut().ok_or(OxiflateError::StreamClosed)
    }

    /// Compress `buf` and write what the engine produces.
    pub fn write_input(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(OxiflateError::StreamClosed);
        }
        self.drain.set_input(buf)?;
        self.drain_input(false)
    }

    /// Compress a single byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_input(&[value])
    }

    fn drain_input(&mut self, flushing: bool) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(OxiflateError::StreamClosed)?;
        while let Some(chunk) = self.drain.next_input_chunk(flushing)? {
            let len = chunk.len();
            sink.write_all(chunk)?;
            self.drain.consume(len);
        }
        self.drain.check_input_consumed()
    }

    /// Sync-flush the engine so everything written so far can be decoded,
    /// then flush the sink.
    pub fn flush_output(&mut self) -> Result<()> {
        if self.closed {
            return Err(OxiflateError::StreamClosed);
        }
        self.drain.request_flush();
        self.drain_input(true)?;
        self.sink_mut()?.flush()?;
        Ok(())
    }

    /// Write the end of the compressed stream and flush the sink.
    ///
    /// The transform's authentication code is captured and the transform
    /// released. The stream accepts no further input afterwards.
    pub fn finish(&mut self) -> Result<()> {
        self.drain.request_finish();
        let sink = self.sink.as_mut().ok_or(OxiflateError::StreamClosed)?;
        while let Some(chunk) = self.drain.next_final_chunk()? {
            let len = chunk.len();
            sink.write_all(chunk)?;
            self.drain.consume(len);
        }
        sink.flush()?;
        self.drain.complete_transform();
        Ok(())
    }

    /// Finish the stream and release the sink if this stream owns it.
    ///
    /// Closing twice is a no-op. The sink is released even when finishing
    /// fails; the finishing error is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.finish();
        self.drain.complete_transform();
        if self.is_stream_owner {
            drop(self.sink.take());
        }
        debug!(
            owner = self.is_stream_owner,
            ok = result.is_ok(),
            "compression stream closed"
        );
        result
    }

    /// Finish the stream and return the sink.
    pub fn into_inner(mut self) -> Result<W> {
        if !self.closed {
            self.closed = true;
            self.finish()?;
        }
        self.sink.take().ok_or(OxiflateError::StreamClosed)
    }

    /// Authentication code captured from the transform when the stream
    /// finished, for transforms that produce one.
    pub fn authentication_code(&self) -> Option<&[u8]> {
        self.drain.authentication_code()
    }

    /// Encrypt compressed bytes with `transform` from now on.
    pub fn set_encryption(&mut self, transform: Option<Box<dyn CryptoTransform>>) {
        self.drain.set_transform(transform);
    }

    /// The encode engine.
    pub fn engine(&self) -> &E {
        self.drain.engine()
    }

    /// Mutable access to the encode engine.
    pub fn engine_mut(&mut self) -> &mut E {
        self.drain.engine_mut()
    }

    /// Whether closing this stream drops the sink.
    pub fn is_stream_owner(&self) -> bool {
        self.is_stream_owner
    }

    /// Choose whether closing this stream drops the sink.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.is_stream_owner = owner;
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The sink, unless a close has dropped it.
    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// Mutable access to the sink, unless a close has dropped it.
    pub fn get_mut(&mut self) -> Option<&mut W> {
        self.sink.as_mut()
    }
}

impl<W: Write, E: DeflateEngine> Write for CompressionStream<W, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_input(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_output()?)
    }
}

impl<W: Write, E: DeflateEngine> Read for CompressionStream<W, E> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("read on a compression stream"))
    }
}

impl<W: Write, E: DeflateEngine> Seek for CompressionStream<W, E> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("seek on a compression stream"))
    }
}

impl<W: Write, E: DeflateEngine> Drop for CompressionStream<W, E> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "close on drop failed");
        }
    }
}
