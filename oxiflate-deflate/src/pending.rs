//! Output staging buffer for the encoder.
//!
//! The encoder writes whole blocks into a [`PendingBuffer`] and the caller
//! drains them in whatever slice sizes it offers. Bits are packed LSB-first;
//! only whole bytes are ever handed out.

/// LSB-first bit writer over a growable byte buffer.
#[derive(Debug, Default, Clone)]
pub struct PendingBuffer {
    /// Completed bytes not yet drained.
    buffer: Vec<u8>,
    /// First undrained byte in `buffer`.
    start: usize,
    /// Bit accumulator (LSB-first).
    bit_buf: u64,
    /// Number of valid bits in `bit_buf`.
    bit_count: u32,
}

impl PendingBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `count` bits of `value` (up to 32).
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32, "Cannot write more than 32 bits at once");
        if count == 0 {
            return;
        }
        let mask = (1u64 << count) - 1;
        self.bit_buf |= (u64::from(value) & mask) << self.bit_count;
        self.bit_count += count;
        while self.bit_count >= 8 {
            self.buffer.push(self.bit_buf as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.buffer.push(self.bit_buf as u8);
            self.bit_buf = 0;
            self.bit_count = 0;
        }
    }

    /// Append raw bytes. The writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bit_count, 0, "write_bytes on unaligned buffer");
        self.buffer.extend_from_slice(bytes);
    }

    /// Append a 16-bit value, least significant byte first.
    pub fn write_u16_le(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a 16-bit value, most significant byte first.
    pub fn write_u16_be(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Append a 32-bit value, most significant byte first.
    pub fn write_u32_be(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Bits written since the last byte boundary.
    pub fn bit_offset(&self) -> u32 {
        self.bit_count
    }

    /// Whole bytes waiting to be drained.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Whether every written bit has been drained.
    pub fn is_flushed(&self) -> bool {
        self.start == self.buffer.len() && self.bit_count == 0
    }

    /// Move completed bytes into `output`, returning how many were moved.
    pub fn flush_to(&mut self, output: &mut [u8]) -> usize {
        let len = output.len().min(self.pending_bytes());
        output[..len].copy_from_slice(&self.buffer[self.start..self.start + len]);
        self.start += len;
        if self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        }
        len
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.start = 0;
        self.bit_buf = 0;
        self.bit_count = 0;
    }
}
