//! Buffered, optionally decrypted, view of a compressed source.
//!
//! [`DecodeInputBuffer`] reads the source in large chunks and keeps two views
//! of the most recent chunk: the raw bytes, and the clear text the decoder
//! consumes. Without a transform both views are the same buffer; installing a
//! transform gives the clear text its own storage.
//!
//! `available` counts the bytes of the current chunk not yet delivered. It
//! always indexes from the end of a view: the next undelivered byte of a view
//! of length `n` sits at `n - available`.

use crate::{DEFAULT_INPUT_BUFFER_SIZE, MIN_INPUT_BUFFER_SIZE};
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{CryptoTransform, InflateEngine};
use std::fmt;
use std::io::{ErrorKind, Read};
use tracing::{debug, trace};

/// Where the clear text of the current chunk lives.
enum ClearText {
    /// The raw bytes are already clear text.
    Raw,
    /// Decrypted copy of the raw bytes.
    Decrypted(Vec<u8>),
}

/// Chunked reader over a compressed source.
pub struct DecodeInputBuffer<R> {
    source: Option<R>,
    raw: Vec<u8>,
    raw_length: usize,
    clear: ClearText,
    clear_length: usize,
    available: usize,
    transform: Option<Box<dyn CryptoTransform>>,
}

impl<R> fmt::Debug for DecodeInputBuffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeInputBuffer")
            .field("capacity", &self.raw.len())
            .field("raw_length", &self.raw_length)
            .field("clear_text_length", &self.clear_length)
            .field("available", &self.available)
            .field("decrypting", &self.transform.is_some())
            .finish()
    }
}

impl<R: Read> DecodeInputBuffer<R> {
    /// Create a buffer of [`DEFAULT_INPUT_BUFFER_SIZE`] bytes.
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, DEFAULT_INPUT_BUFFER_SIZE)
    }

    /// Create a buffer of `buffer_size` bytes, raised to at least
    /// [`MIN_INPUT_BUFFER_SIZE`].
    pub fn with_buffer_size(source: R, buffer_size: usize) -> Self {
        Self {
            source: Some(source),
            raw: vec![0u8; buffer_size.max(MIN_INPUT_BUFFER_SIZE)],
            raw_length: 0,
            clear: ClearText::Raw,
            clear_length: 0,
            available: 0,
            transform: None,
        }
    }

    /// Replace the buffered chunk with the next one from the source.
    ///
    /// Reads until the buffer is full or the source reports end of stream.
    /// Afterwards `available` equals the clear text length, which is 0 once
    /// the source is exhausted.
    pub fn fill(&mut self) -> Result<()> {
        let source = self.source.as_mut().ok_or(OxiflateError::StreamClosed)?;

        self.raw_length = 0;
        while self.raw_length < self.raw.len() {
            match source.read(&mut self.raw[self.raw_length..]) {
                Ok(0) => break,
                Ok(n) => self.raw_length += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        self.clear_length = match (&mut self.clear, self.transform.as_mut()) {
            (ClearText::Decrypted(clear), Some(transform)) => {
                transform.transform_block(&self.raw[..self.raw_length], clear)?
            }
            _ => self.raw_length,
        };
        self.available = self.clear_length;
        trace!(raw = self.raw_length, clear = self.clear_length, "input buffer filled");
        Ok(())
    }

    /// Copy undelivered raw bytes into `out`, refilling as needed.
    ///
    /// Returns the number of bytes delivered; fewer than `out.len()` only
    /// when the source ran dry.
    pub fn read_raw_buffer(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut delivered = 0;
        while delivered < out.len() {
            if self.available == 0 {
                self.fill()?;
                if self.available == 0 {
                    break;
                }
            }
            let count = (out.len() - delivered).min(self.available);
            let start = self.raw_length - self.available;
            out[delivered..delivered + count].copy_from_slice(&self.raw[start..start + count]);
            delivered += count;
            self.available -= count;
        }
        Ok(delivered)
    }

    /// Copy undelivered clear text into `out`, refilling as needed.
    pub fn read_clear_text_buffer(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut delivered = 0;
        while delivered < out.len() {
            if self.available == 0 {
                self.fill()?;
                if self.available == 0 {
                    break;
                }
            }
            let count = (out.len() - delivered).min(self.available);
            let start = self.clear_length - self.available;
            out[delivered..delivered + count]
                .copy_from_slice(&self.clear_text_storage()[start..start + count]);
            delivered += count;
            self.available -= count;
        }
        Ok(delivered)
    }

    /// Read one raw byte.
    pub fn read_le_byte(&mut self) -> Result<u8> {
        if self.available == 0 {
            self.fill()?;
            if self.available == 0 {
                return Err(OxiflateError::unexpected_eof("end of header"));
            }
        }
        let byte = self.raw[self.raw_length - self.available];
        self.available -= 1;
        Ok(byte)
    }

    /// Read a little-endian `u16` from the raw bytes.
    pub fn read_le_short(&mut self) -> Result<u16> {
        let low = self.read_le_byte()?;
        let high = self.read_le_byte()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Read a little-endian `u32` from the raw bytes.
    pub fn read_le_int(&mut self) -> Result<u32> {
        let low = self.read_le_short()?;
        let high = self.read_le_short()?;
        Ok(u32::from(low) | (u32::from(high) << 16))
    }

    /// Read a little-endian `u64` from the raw bytes.
    pub fn read_le_long(&mut self) -> Result<u64> {
        let low = self.read_le_int()?;
        let high = self.read_le_int()?;
        Ok(u64::from(low) | (u64::from(high) << 32))
    }
}

impl<R> DecodeInputBuffer<R> {
    /// Hand every undelivered clear text byte to `engine`.
    pub fn set_inflater_input<E: InflateEngine + ?Sized>(&mut self, engine: &mut E) -> Result<()> {
        if self.available > 0 {
            let start = self.clear_length - self.available;
            engine.set_input(&self.clear_text_storage()[start..self.clear_length])?;
            self.available = 0;
        }
        Ok(())
    }

    /// Install or remove the decrypting transform.
    ///
    /// Bytes already buffered but not yet delivered are decrypted immediately,
    /// so a transform activated mid-stream applies from the next undelivered
    /// byte on. `available` is unchanged.
    pub fn set_transform(&mut self, transform: Option<Box<dyn CryptoTransform>>) -> Result<()> {
        self.transform = transform;
        match self.transform.as_mut() {
            Some(transform) => {
                let mut clear = match std::mem::replace(&mut self.clear, ClearText::Raw) {
                    ClearText::Decrypted(clear) => clear,
                    ClearText::Raw => vec![0u8; self.raw.len()],
                };
                self.clear_length = self.raw_length;
                if self.available > 0 {
                    let start = self.raw_length - self.available;
                    transform.transform_block(
                        &self.raw[start..self.raw_length],
                        &mut clear[start..self.raw_length],
                    )?;
                }
                self.clear = ClearText::Decrypted(clear);
                debug!(pending = self.available, "decryption enabled");
            }
            None => {
                self.clear = ClearText::Raw;
                self.clear_length = self.raw_length;
                debug!("decryption disabled");
            }
        }
        Ok(())
    }

    /// Whether a decrypting transform is installed.
    pub fn is_decrypting(&self) -> bool {
        self.transform.is_some()
    }

    /// Undelivered bytes of the current chunk.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Override the undelivered byte count, e.g. to push back bytes that a
    /// decoder did not consume. Clamped to the current chunk.
    pub fn set_available(&mut self, available: usize) {
        self.available = available.min(self.clear_length.max(self.raw_length));
    }

    /// Length of the current raw chunk.
    pub fn raw_length(&self) -> usize {
        self.raw_length
    }

    /// Length of the current clear text chunk.
    pub fn clear_text_length(&self) -> usize {
        self.clear_length
    }

    /// The current raw chunk.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw[..self.raw_length]
    }

    /// The current clear text chunk.
    pub fn clear_text(&self) -> &[u8] {
        &self.clear_text_storage()[..self.clear_length]
    }

    /// The underlying source, unless it has been taken.
    pub fn get_ref(&self) -> Option<&R> {
        self.source.as_ref()
    }

    /// Mutable access to the underlying source, unless it has been taken.
    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.source.as_mut()
    }

    /// Detach the source. Later fills fail with [`OxiflateError::StreamClosed`].
    pub fn take_source(&mut self) -> Option<R> {
        self.available = 0;
        self.source.take()
    }

    fn clear_text_storage(&self) -> &[u8] {
        match &self.clear {
            ClearText::Raw => &self.raw,
            ClearText::Decrypted(clear) => clear,
        }
    }
}
