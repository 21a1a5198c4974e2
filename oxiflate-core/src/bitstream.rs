//! Bit-level input cursor for DEFLATE decoding.
//!
//! [`BitCursor`] extracts variable-width bit fields and byte-aligned runs from
//! the chunk of compressed input most recently handed to it with
//! [`BitCursor::set_input`]. It never pulls from an I/O source itself: when it
//! runs dry, `peek_bits` returns `None` and the caller supplies the next chunk.
//!
//! # Bit Ordering
//!
//! DEFLATE packs bits LSB-first. The cursor keeps a 64-bit accumulator and
//! refills it 16 bits (two window bytes) at a time, so the number of unread
//! window bytes is always even. A chunk with an odd length has its first byte
//! loaded straight into the accumulator.
//!
//! A single peek never asks for more than 16 bits, which leaves room in the
//! accumulator for the longest Huffman code (15 bits) plus its extra bits.
//!
//! # Example
//!
//! ```
//! use oxiflate_core::bitstream::BitCursor;
//!
//! let mut cursor = BitCursor::new();
//! cursor.set_input(&[0b1100_0101, 0xFF]).unwrap();
//!
//! assert_eq!(cursor.peek_bits(3), Some(0b101));
//! cursor.drop_bits(3);
//! assert_eq!(cursor.get_bits(5), Some(0b11000));
//! assert_eq!(cursor.available_bits(), 8);
//! ```

use crate::error::{OxiflateError, Result};
use tracing::debug;

/// LSB-first bit cursor over a caller-supplied input chunk.
#[derive(Debug, Clone, Default)]
pub struct BitCursor {
    /// Current input chunk (even length once the odd byte is pre-loaded).
    window: Vec<u8>,
    /// Next unread window byte.
    window_start: usize,
    /// End of valid window bytes.
    window_end: usize,
    /// Bit accumulator (LSB-first).
    buffer: u64,
    /// Number of valid low-order bits in `buffer`.
    bits_in_buffer: u32,
}

impl BitCursor {
    /// Create an empty cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next `count` bits (1-16) without consuming them.
    ///
    /// When fewer than `count` bits are buffered, one 16-bit refill from the
    /// window is attempted. Returns `None` if the window is exhausted.
    ///
    /// Callers must not peek more than 8 bits past the width of the last
    /// successful peek without dropping bits in between.
    #[inline]
    pub fn peek_bits(&mut self, count: u32) -> Option<u32> {
        debug_assert!(count <= 16, "Cannot peek more than 16 bits at once");

        if self.bits_in_buffer < count {
            if self.window_start == self.window_end {
                return None;
            }
            let lo = u64::from(self.window[self.window_start]);
            let hi = u64::from(self.window[self.window_start + 1]);
            self.buffer |= (lo | (hi << 8)) << self.bits_in_buffer;
            self.window_start += 2;
            self.bits_in_buffer += 16;
            if self.bits_in_buffer < count {
                return None;
            }
        }

        Some((self.buffer & ((1u64 << count) - 1)) as u32)
    }

    /// Consume `count` bits previously returned by [`peek_bits`](Self::peek_bits).
    #[inline]
    pub fn drop_bits(&mut self, count: u32) {
        debug_assert!(
            count <= self.bits_in_buffer,
            "Dropping {} bits with only {} buffered",
            count,
            self.bits_in_buffer
        );
        let count = count.min(self.bits_in_buffer);
        self.buffer >>= count;
        self.bits_in_buffer -= count;
    }

    /// Peek and consume `count` bits.
    #[inline]
    pub fn get_bits(&mut self, count: u32) -> Option<u32> {
        let value = self.peek_bits(count)?;
        self.drop_bits(count);
        Some(value)
    }

    /// Consume `count` bits and return them added to `offset`.
    ///
    /// Nothing is consumed when the bits are not available yet.
    #[inline]
    pub fn try_get_bits(&mut self, count: u32, offset: u32) -> Option<u32> {
        self.get_bits(count).map(|value| value + offset)
    }

    /// Drop the 0-7 bits needed to reach the next byte boundary.
    pub fn skip_to_byte_boundary(&mut self) {
        let partial = self.bits_in_buffer & 7;
        self.buffer >>= partial;
        self.bits_in_buffer -= partial;
    }

    /// Copy whole bytes into `output`, returning how many were copied.
    ///
    /// Buffered bytes are delivered first, then bytes straight from the
    /// window. The cursor must be byte aligned.
    pub fn copy_bytes(&mut self, output: &mut [u8]) -> Result<usize> {
        if self.bits_in_buffer & 7 != 0 {
            return Err(OxiflateError::NotByteAligned {
                bits: self.bits_in_buffer,
            });
        }

        let mut copied = 0;
        while self.bits_in_buffer > 0 && copied < output.len() {
            output[copied] = self.buffer as u8;
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
            copied += 1;
        }

        if copied == output.len() {
            return Ok(copied);
        }

        let length = (output.len() - copied).min(self.window_end - self.window_start);
        output[copied..copied + length]
            .copy_from_slice(&self.window[self.window_start..self.window_start + length]);
        self.window_start += length;

        // Keep an even number of window bytes for the 16-bit refill.
        if (self.window_end - self.window_start) & 1 != 0 {
            self.buffer = u64::from(self.window[self.window_start]);
            self.window_start += 1;
            self.bits_in_buffer = 8;
        }

        Ok(copied + length)
    }

    /// Supply the next input chunk.
    ///
    /// Fails with [`OxiflateError::InputNotConsumed`] while bytes of the
    /// previous chunk are still unread.
    pub fn set_input(&mut self, input: &[u8]) -> Result<()> {
        if self.window_start < self.window_end {
            let remaining = self.window_end - self.window_start;
            debug!(remaining, "input rejected: previous chunk not consumed");
            return Err(OxiflateError::InputNotConsumed { remaining });
        }

        let mut input = input;
        if input.len() & 1 != 0 {
            self.buffer |= u64::from(input[0]) << self.bits_in_buffer;
            self.bits_in_buffer += 8;
            input = &input[1..];
        }

        self.window.clear();
        self.window.extend_from_slice(input);
        self.window_start = 0;
        self.window_end = input.len();
        Ok(())
    }

    /// Bits supplied and not yet dropped (buffered plus unread window bits).
    pub fn available_bits(&self) -> usize {
        self.bits_in_buffer as usize + 8 * (self.window_end - self.window_start)
    }

    /// Bits currently held in the accumulator.
    pub fn buffered_bits(&self) -> u32 {
        self.bits_in_buffer
    }

    /// Whole bytes still available: unread window bytes plus buffered bytes.
    pub fn available_bytes(&self) -> usize {
        self.window_end - self.window_start + (self.bits_in_buffer >> 3) as usize
    }

    /// Whether the current chunk has been fully pulled into the accumulator.
    pub fn is_needing_input(&self) -> bool {
        self.window_start == self.window_end
    }

    /// Discard all buffered bits and input.
    pub fn reset(&mut self) {
        self.window.clear();
        self.window_start = 0;
        self.window_end = 0;
        self.buffer = 0;
        self.bits_in_buffer = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_order() {
        // 0b10110101 = 0xB5
        let mut cursor = BitCursor::new();
        cursor.set_input(&[0xB5, 0x00]).unwrap();

        let bits: Vec<u32> = (0..8).map(|_| cursor.get_bits(1).unwrap()).collect();
        assert_eq!(bits, vec![1, 0, 1, 0, 1, 1, 0, 1]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[0xAB, 0xCD]).unwrap();

        assert_eq!(cursor.peek_bits(4), Some(0xB));
        assert_eq!(cursor.peek_bits(4), Some(0xB));
        assert_eq!(cursor.get_bits(4), Some(0xB));
        assert_eq!(cursor.peek_bits(12), Some(0xCDA));
    }

    #[test]
    fn test_bit_accounting_all_widths() {
        let input: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37)).collect();
        for width in 1..=16u32 {
            let mut cursor = BitCursor::new();
            cursor.set_input(&input).unwrap();
            let supplied = input.len() * 8;
            let mut dropped = 0usize;

            while cursor.peek_bits(width).is_some() {
                cursor.drop_bits(width);
                dropped += width as usize;
                assert_eq!(cursor.available_bits(), supplied - dropped);
            }
            assert!(cursor.available_bits() < width as usize);
        }
    }

    #[test]
    fn test_exhausted_window() {
        let mut cursor = BitCursor::new();
        assert!(cursor.is_needing_input());
        assert_eq!(cursor.peek_bits(1), None);

        cursor.set_input(&[0xFF, 0x01]).unwrap();
        assert_eq!(cursor.get_bits(16), Some(0x01FF));
        assert_eq!(cursor.get_bits(1), None);
        assert_eq!(cursor.try_get_bits(1, 3), None);
    }

    #[test]
    fn test_try_get_bits_offset() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[0x05, 0x00]).unwrap();
        assert_eq!(cursor.try_get_bits(3, 3), Some(8));
        assert_eq!(cursor.available_bits(), 13);
    }

    #[test]
    fn test_odd_input_preloads_one_byte() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3]).unwrap();

        assert_eq!(cursor.buffered_bits(), 8);
        assert_eq!(cursor.available_bytes(), 3);
        assert_eq!(cursor.get_bits(8), Some(1));
        assert_eq!(cursor.get_bits(16), Some(0x0302));
    }

    #[test]
    fn test_set_input_requires_consumed_window() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3, 4]).unwrap();
        let err = cursor.set_input(&[5]).unwrap_err();
        assert!(matches!(err, OxiflateError::InputNotConsumed { remaining: 4 }));

        // Buffered bits carry across chunks.
        assert_eq!(cursor.get_bits(4), Some(1));
        cursor.get_bits(16).unwrap();
        cursor.get_bits(12).unwrap();
        assert!(cursor.is_needing_input());
        cursor.set_input(&[0xAA]).unwrap();
        assert_eq!(cursor.get_bits(8), Some(0xAA));
    }

    #[test]
    fn test_skip_to_byte_boundary() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[0xFF, 0xAA]).unwrap();

        cursor.get_bits(3).unwrap();
        cursor.skip_to_byte_boundary();
        assert_eq!(cursor.get_bits(8), Some(0xAA));
    }

    #[test]
    fn test_copy_bytes_requires_alignment() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3, 4]).unwrap();
        cursor.get_bits(3).unwrap();

        let mut out = [0u8; 2];
        let err = cursor.copy_bytes(&mut out).unwrap_err();
        assert!(matches!(err, OxiflateError::NotByteAligned { bits: 13 }));
    }

    #[test]
    fn test_copy_bytes_drains_buffer_then_window() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3, 4]).unwrap();
        assert_eq!(cursor.get_bits(8), Some(1));

        let mut out = [0u8; 3];
        assert_eq!(cursor.copy_bytes(&mut out).unwrap(), 3);
        assert_eq!(out, [2, 3, 4]);
        assert_eq!(cursor.available_bytes(), 0);
    }

    #[test]
    fn test_copy_bytes_restores_even_pairs() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3, 4, 5, 6]).unwrap();

        let mut out = [0u8; 1];
        assert_eq!(cursor.copy_bytes(&mut out).unwrap(), 1);
        assert_eq!(out, [1]);

        // One odd byte was absorbed into the accumulator.
        assert_eq!(cursor.buffered_bits(), 8);
        assert_eq!(cursor.available_bytes(), 5);
        assert_eq!(cursor.get_bits(8), Some(2));
        assert_eq!(cursor.get_bits(16), Some(0x0403));
    }

    #[test]
    fn test_copy_bytes_short_window() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[9, 8]).unwrap();

        let mut out = [0u8; 8];
        assert_eq!(cursor.copy_bytes(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[9, 8]);
        assert_eq!(cursor.copy_bytes(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_reset() {
        let mut cursor = BitCursor::new();
        cursor.set_input(&[1, 2, 3]).unwrap();
        cursor.reset();
        assert_eq!(cursor.available_bits(), 0);
        assert!(cursor.is_needing_input());
        cursor.set_input(&[7, 7]).unwrap();
    }
}
