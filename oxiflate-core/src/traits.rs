//! Engine traits consumed by the stream adapters.
//!
//! The stream layer never looks inside the LZ77/Huffman state machines. It
//! only feeds input chunks, pulls output, and polls a handful of status flags
//! through [`DeflateEngine`] and [`InflateEngine`].

use crate::error::Result;

/// A push-style DEFLATE encoder.
///
/// Input is handed over with [`set_input`](Self::set_input) and compressed
/// bytes are pulled with [`deflate`](Self::deflate) until the engine reports
/// [`is_needing_input`](Self::is_needing_input).
pub trait DeflateEngine {
    /// Supply the next chunk of uncompressed input.
    ///
    /// Fails if the previous chunk has not been fully consumed.
    fn set_input(&mut self, input: &[u8]) -> Result<()>;

    /// Write compressed bytes into `output`, returning how many were written.
    fn deflate(&mut self, output: &mut [u8]) -> Result<usize>;

    /// Request that everything consumed so far be emitted at the next drain.
    fn flush(&mut self);

    /// Mark the end of input; the next drains emit the final block and trailer.
    fn finish(&mut self);

    /// Whether the stream trailer has been written and fully drained.
    fn is_finished(&self) -> bool;

    /// Whether all supplied input has been consumed.
    fn is_needing_input(&self) -> bool;
}

/// A pull-style DEFLATE decoder.
pub trait InflateEngine {
    /// Supply the next chunk of compressed input.
    fn set_input(&mut self, input: &[u8]) -> Result<()>;

    /// Decode into `output`, returning how many bytes were produced.
    ///
    /// Returns 0 when more input or a dictionary is needed, or when the
    /// stream is finished.
    fn inflate(&mut self, output: &mut [u8]) -> Result<usize>;

    /// Whether the end of the stream was reached and all output delivered.
    fn is_finished(&self) -> bool;

    /// Whether the engine has consumed its current input chunk.
    fn is_needing_input(&self) -> bool;

    /// Whether the stream header asked for a preset dictionary.
    fn is_needing_dictionary(&self) -> bool;

    /// Adler-32 id of the wanted dictionary while
    /// [`is_needing_dictionary`](Self::is_needing_dictionary) holds.
    fn adler(&self) -> u32 {
        0
    }
}

impl<E: DeflateEngine + ?Sized> DeflateEngine for Box<E> {
    fn set_input(&mut self, input: &[u8]) -> Result<()> {
        (**self).set_input(input)
    }

    fn deflate(&mut self, output: &mut [u8]) -> Result<usize> {
        (**self).deflate(output)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn is_needing_input(&self) -> bool {
        (**self).is_needing_input()
    }
}

impl<E: InflateEngine + ?Sized> InflateEngine for Box<E> {
    fn set_input(&mut self, input: &[u8]) -> Result<()> {
        (**self).set_input(input)
    }

    fn inflate(&mut self, output: &mut [u8]) -> Result<usize> {
        (**self).inflate(output)
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn is_needing_input(&self) -> bool {
        (**self).is_needing_input()
    }

    fn is_needing_dictionary(&self) -> bool {
        (**self).is_needing_dictionary()
    }

    fn adler(&self) -> u32 {
        (**self).adler()
    }
}

/// Compression level for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (stored blocks only).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Default compression (balanced).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (slowest).
    pub const BEST: Self = Self(9);

    /// Create a custom compression level (0-9).
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
