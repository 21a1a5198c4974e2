//! Sliding history window for DEFLATE decoding.
//!
//! [`HistoryWindow`] is a fixed 32 KB circular buffer. Decoded bytes are
//! written at the cursor, back-references copy from behind it, and the caller
//! drains the oldest undelivered bytes out of it. The window never holds more
//! than [`WINDOW_SIZE`] undelivered bytes; running over that limit is a decoder
//! bug or corrupt input and is always reported as an error.

use crate::bitstream::BitCursor;
use crate::error::{OxiflateError, Result};
use tracing::debug;

/// Size of the DEFLATE history window (32 KB).
pub const WINDOW_SIZE: usize = 1 << 15;

/// Mask for circular indexing.
pub const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// How a back-reference copy is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCopy {
    /// One `copy_within`; neither range wraps and they do not overlap.
    Bulk,
    /// Forward byte-by-byte copy; handles overlap and wraparound.
    Bytewise,
}

impl RepeatCopy {
    /// Pick the copy strategy for `length` bytes from `rep_start` to `window_end`.
    pub fn select(rep_start: usize, window_end: usize, length: usize, capacity: usize) -> Self {
        let no_wrap = rep_start + length <= capacity && window_end + length <= capacity;
        let disjoint = rep_start + length <= window_end || window_end + length <= rep_start;
        if no_wrap && disjoint {
            Self::Bulk
        } else {
            Self::Bytewise
        }
    }
}

/// Circular buffer of decoded output used to satisfy back-references.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    window: Box<[u8]>,
    /// Next write position.
    window_end: usize,
    /// Bytes written but not yet drained.
    filled: usize,
    /// Bytes reachable by a back-reference.
    history: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            window: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            window_end: 0,
            filled: 0,
            history: 0,
        }
    }

    fn advance(&mut self, count: usize) {
        self.window_end = (self.window_end + count) & WINDOW_MASK;
        self.filled += count;
        self.history = (self.history + count).min(WINDOW_SIZE);
    }

    /// Append one byte.
    #[inline]
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        if self.filled == WINDOW_SIZE {
            return Err(OxiflateError::window_overflow(1, 0));
        }
        self.window[self.window_end] = value;
        self.advance(1);
        Ok(())
    }

    /// Copy `length` bytes starting `distance` bytes behind the cursor.
    ///
    /// `length` may exceed `distance`; each output byte then repeats one
    /// written earlier in the same call.
    pub fn repeat(&mut self, length: usize, distance: usize) -> Result<()> {
        if self.filled + length > WINDOW_SIZE {
            return Err(OxiflateError::window_overflow(
                length,
                WINDOW_SIZE - self.filled,
            ));
        }
        if distance == 0 || distance > self.history {
            return Err(OxiflateError::invalid_distance(distance, self.history));
        }

        let rep_start = (self.window_end + WINDOW_SIZE - distance) & WINDOW_MASK;
        match RepeatCopy::select(rep_start, self.window_end, length, WINDOW_SIZE) {
            RepeatCopy::Bulk => {
                self.window
                    .copy_within(rep_start..rep_start + length, self.window_end);
            }
            RepeatCopy::Bytewise => {
                let mut src = rep_start;
                let mut dst = self.window_end;
                for _ in 0..length {
                    self.window[dst] = self.window[src];
                    src = (src + 1) & WINDOW_MASK;
                    dst = (dst + 1) & WINDOW_MASK;
                }
            }
        }

        self.advance(length);
        Ok(())
    }

    /// Copy up to `length` stored-block bytes straight from `cursor`.
    ///
    /// The count is clamped to the free space and to the bytes the cursor
    /// holds. Returns the number of bytes copied.
    pub fn copy_stored(&mut self, cursor: &mut BitCursor, length: usize) -> Result<usize> {
        let length = length
            .min(WINDOW_SIZE - self.filled)
            .min(cursor.available_bytes());
        let tail = WINDOW_SIZE - self.window_end;

        let copied = if length > tail {
            let mut copied = cursor.copy_bytes(&mut self.window[self.window_end..])?;
            if copied == tail {
                copied += cursor.copy_bytes(&mut self.window[..length - tail])?;
            }
            copied
        } else {
            let end = self.window_end;
            cursor.copy_bytes(&mut self.window[end..end + length])?
        };

        self.advance(copied);
        Ok(copied)
    }

    /// Preload a preset dictionary. Only the last 32 KB are kept.
    ///
    /// The window must not hold undelivered output.
    pub fn copy_dict(&mut self, dictionary: &[u8]) -> Result<()> {
        if self.filled > 0 {
            debug!(filled = self.filled, "dictionary rejected: window not empty");
            return Err(OxiflateError::invalid_state(
                "dictionary preload requires an empty window",
            ));
        }

        let dictionary = &dictionary[dictionary.len().saturating_sub(WINDOW_SIZE)..];
        self.window[..dictionary.len()].copy_from_slice(dictionary);
        self.window_end = dictionary.len() & WINDOW_MASK;
        self.history = dictionary.len();
        debug!(len = dictionary.len(), "dictionary preloaded");
        Ok(())
    }

    /// Move the oldest undelivered bytes into `output`.
    pub fn drain_to(&mut self, output: &mut [u8]) -> Result<usize> {
        let length = output.len().min(self.filled);
        let start = (self.window_end + WINDOW_SIZE - self.filled) & WINDOW_MASK;

        let first = length.min(WINDOW_SIZE - start);
        output[..first].copy_from_slice(&self.window[start..start + first]);
        output[first..length].copy_from_slice(&self.window[..length - first]);

        self.filled = self
            .filled
            .checked_sub(length)
            .ok_or_else(|| OxiflateError::invalid_state("history window fill underflow"))?;
        Ok(length)
    }

    /// Bytes that can still be written before draining.
    pub fn free_space(&self) -> usize {
        WINDOW_SIZE - self.filled
    }

    /// Bytes written but not yet drained.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Bytes reachable by back-references.
    pub fn history(&self) -> usize {
        self.history
    }

    /// Forget all contents.
    pub fn reset(&mut self) {
        self.window_end = 0;
        self.filled = 0;
        self.history = 0;
    }
}
