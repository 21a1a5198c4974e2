//! Compressing writer over a tokio [`AsyncWrite`].
//!
//! The encoder work is synchronous; only the writes, flushes and the final
//! shutdown of the sink suspend. Each suspension is a single `poll_write` of
//! the pending chunk, and bytes count as delivered only once the sink
//! reports them. Dropping any of the returned futures cancels at that point
//! with the rest of the chunk kept, so a later
//! [`close`](AsyncCompressionStream::close) resumes the drain from the first
//! unwritten byte.
//!
//! # Example
//!
//! ```rust
//! use oxiflate_stream::AsyncCompressionStream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> oxiflate_core::Result<()> {
//! let mut writer = AsyncCompressionStream::new(Vec::new());
//! writer.write(b"written without blocking").await?;
//! let compressed = writer.into_inner().await?;
//!
//! let output = oxiflate_deflate::inflate(&compressed)?;
//! assert_eq!(output, b"written without blocking");
//! # Ok(())
//! # }
//! ```

use crate::DEFAULT_OUTPUT_BUFFER_SIZE;
use crate::compress::DeflateDrain;
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{CompressionLevel, CryptoTransform, DeflateEngine};
use oxiflate_deflate::Deflater;
use std::future::Future;
use std::io::{self, ErrorKind};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Async counterpart of [`CompressionStream`](crate::CompressionStream).
///
/// There is no asynchronous drop: a stream dropped without
/// [`close`](Self::close) or [`finish`](Self::finish) leaves the sink without
/// the end of the compressed stream.
pub struct AsyncCompressionStream<W, E = Deflater> {
    drain: DeflateDrain<E>,
    sink: Option<W>,
    is_stream_owner: bool,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> AsyncCompressionStream<W> {
    /// Write a raw DEFLATE stream at the default level.
    pub fn new(sink: W) -> Self {
        Self::with_level(sink, CompressionLevel::DEFAULT)
    }

    /// Write a raw DEFLATE stream at `level`.
    pub fn with_level(sink: W, level: impl Into<CompressionLevel>) -> Self {
        Self::from_drain(sink, DeflateDrain::with_default_buffer(Deflater::new(level)))
    }

    /// Write a zlib-framed stream at `level`.
    pub fn zlib(sink: W, level: impl Into<CompressionLevel>) -> Self {
        Self::from_drain(sink, DeflateDrain::with_default_buffer(Deflater::zlib(level)))
    }
}

impl<W: AsyncWrite + Unpin, E: DeflateEngine> AsyncCompressionStream<W, E> {
    /// Compress through `engine` with the default output buffer.
    pub fn with_engine(sink: W, engine: E) -> Result<Self> {
        Self::with_buffer_size(sink, engine, DEFAULT_OUTPUT_BUFFER_SIZE)
    }

    /// Compress through `engine`, draining `buffer_size` bytes at a time.
    pub fn with_buffer_size(sink: W, engine: E, buffer_size: usize) -> Result<Self> {
        Ok(Self::from_drain(sink, DeflateDrain::new(engine, buffer_size)?))
    }

    fn from_drain(sink: W, drain: DeflateDrain<E>) -> Self {
        Self {
            drain,
            sink: Some(sink),
            is_stream_owner: true,
            closed: false,
        }
    }

    /// Compress `buf` and write what the engine produces.
    pub async fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(OxiflateError::StreamClosed);
        }
        self.drain.set_input(buf)?;
        self.drain_input(false).await
    }

    /// Compress a single byte.
    pub async fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write(&[value]).await
    }

    async fn drain_input(&mut self, flushing: bool) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(OxiflateError::StreamClosed)?;
        while let Some(chunk) = self.drain.next_input_chunk(flushing)? {
            let written = sink.write(chunk).await?;
            if written == 0 {
                return Err(write_zero());
            }
            self.drain.consume(written);
        }
        self.drain.check_input_consumed()
    }

    /// Sync-flush the engine, then flush the sink.
    pub async fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(OxiflateError::StreamClosed);
        }
        self.drain.request_flush();
        self.drain_input(true).await?;
        let sink = self.sink.as_mut().ok_or(OxiflateError::StreamClosed)?;
        sink.flush().await?;
        Ok(())
    }

    /// Write the end of the compressed stream and flush the sink.
    pub async fn finish(&mut self) -> Result<()> {
        self.drain.request_finish();
        let sink = self.sink.as_mut().ok_or(OxiflateError::StreamClosed)?;
        while let Some(chunk) = self.drain.next_final_chunk()? {
            let written = sink.write(chunk).await?;
            if written == 0 {
                return Err(write_zero());
            }
            self.drain.consume(written);
        }
        sink.flush().await?;
        self.drain.complete_transform();
        Ok(())
    }

    /// [`finish`](Self::finish), abandoned with [`OxiflateError::Cancelled`]
    /// as soon as `signal` completes.
    ///
    /// `signal` is polled first, so an already completed signal cancels
    /// before anything is written. A cancelled finish can be resumed by
    /// calling [`finish`](Self::finish) or [`close`](Self::close) again.
    pub async fn finish_cancellable<F>(&mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = signal => {
                debug!("finish cancelled");
                Err(OxiflateError::Cancelled)
            }
            result = self.finish() => result,
        }
    }

    /// Finish the stream, then shut down and release the sink if this
    /// stream owns it.
    ///
    /// Closing twice is a no-op. The sink is shut down and released even when
    /// finishing fails; the first error is returned.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = self.finish().await;
        self.drain.complete_transform();
        if self.is_stream_owner {
            if let Some(mut sink) = self.sink.take() {
                let shutdown = sink.shutdown().await;
                if result.is_ok() {
                    result = shutdown.map_err(OxiflateError::from);
                }
            }
        }
        debug!(
            owner = self.is_stream_owner,
            ok = result.is_ok(),
            "async compression stream closed"
        );
        result
    }

    /// Finish the stream and return the sink without shutting it down.
    pub async fn into_inner(mut self) -> Result<W> {
        if !self.closed {
            self.closed = true;
            self.finish().await?;
        }
        self.sink.take().ok_or(OxiflateError::StreamClosed)
    }

    /// Authentication code captured when the stream finished.
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

    /// Whether closing this stream shuts down and drops the sink.
    pub fn is_stream_owner(&self) -> bool {
        self.is_stream_owner
    }

    /// Choose whether closing this stream shuts down and drops the sink.
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

fn write_zero() -> OxiflateError {
    io::Error::new(ErrorKind::WriteZero, "sink accepted no compressed bytes").into()
}
