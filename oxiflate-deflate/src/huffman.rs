//! Canonical Huffman codes for DEFLATE (RFC 1951).
//!
//! DEFLATE uses canonical Huffman codes, where codes of the same length are
//! assigned consecutive values in symbol order. Decoding runs directly on a
//! [`BitCursor`] and never blocks: when the cursor cannot supply enough bits to
//! identify a symbol, [`HuffmanTree::decode`] returns `Ok(None)` without
//! consuming anything and the caller retries after supplying more input.
//!
//! # Alphabets
//!
//! DEFLATE uses three Huffman alphabets:
//! - **Literal/Length**: 0-285 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-29 (back-reference distances)
//! - **Code Length**: 0-18 (for encoding dynamic Huffman trees)

use oxiflate_core::BitCursor;
use oxiflate_core::error::{OxiflateError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Size of the literal/length alphabet including the two reserved codes.
pub const LITLEN_ALPHABET_SIZE: usize = 288;

/// Size of the distance alphabet including the two reserved codes.
pub const DISTANCE_ALPHABET_SIZE: usize = 32;

/// Size of the code length alphabet (0-18).
pub const CODELEN_ALPHABET_SIZE: usize = 19;

/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;

/// A canonical Huffman decoding table.
///
/// Codes up to `FAST_BITS` long resolve with one table lookup. Longer codes
/// (and the tail of the input, when fewer than `FAST_BITS` bits remain) walk
/// the canonical code space one bit at a time over a single peek.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    /// Direct lookup table: `(symbol, code_length)`, length 0 for misses.
    fast_table: Vec<(u16, u8)>,
    /// Number of bits indexing `fast_table`.
    fast_bits: u32,
    /// Longest code in this tree.
    max_code_length: u32,
    /// Number of codes of each length.
    counts: [u16; MAX_CODE_LENGTH + 1],
    /// Symbols ordered by (code length, symbol).
    symbols: Vec<u16>,
}

impl HuffmanTree {
    /// Number of bits for fast lookup table.
    const FAST_BITS: u32 = 9;

    /// Build a decoding table from code lengths.
    ///
    /// `code_lengths[i]` is the bit length for symbol `i`; 0 means unused.
    /// Incomplete codes are accepted (RFC 1951 allows a single distance
    /// code); over-subscribed ones are rejected.
    pub fn from_code_lengths(code_lengths: &[u8]) -> Result<Self> {
        if code_lengths.is_empty() {
            return Err(OxiflateError::invalid_header("Empty code lengths"));
        }

        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        let mut max_length = 0u32;
        for &len in code_lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(OxiflateError::invalid_header(format!(
                    "Code length {} exceeds maximum {}",
                    len, MAX_CODE_LENGTH
                )));
            }
            if len > 0 {
                counts[len as usize] += 1;
                max_length = max_length.max(u32::from(len));
            }
        }

        if max_length == 0 {
            // No symbols at all; any decode attempt is an error.
            return Ok(Self {
                fast_table: Vec::new(),
                fast_bits: 0,
                max_code_length: 0,
                counts,
                symbols: Vec::new(),
            });
        }

        // Over-subscription check: remaining code space must never go negative.
        let mut left = 1i32;
        for &count in &counts[1..] {
            left = (left << 1) - i32::from(count);
            if left < 0 {
                return Err(OxiflateError::invalid_header("Over-subscribed Huffman tree"));
            }
        }

        // Symbols sorted by code length, then by symbol value.
        let mut offsets = [0u16; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; usize::from(offsets[MAX_CODE_LENGTH + 1])];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len > 0 {
                let slot = &mut offsets[len as usize];
                symbols[usize::from(*slot)] = symbol as u16;
                *slot += 1;
            }
        }

        let fast_bits = Self::FAST_BITS.min(max_length);
        let mut fast_table = vec![(0u16, 0u8); 1 << fast_bits];
        let codes = canonical_codes(code_lengths);
        for (symbol, &len) in code_lengths.iter().enumerate() {
            let len = u32::from(len);
            if len > 0 && len <= fast_bits {
                let code = usize::from(codes[symbol]);
                for fill in 0..(1usize << (fast_bits - len)) {
                    fast_table[code | (fill << len)] = (symbol as u16, len as u8);
                }
            }
        }

        Ok(Self {
            fast_table,
            fast_bits,
            max_code_length: max_length,
            counts,
            symbols,
        })
    }

    /// Longest code length in this tree.
    pub fn max_code_length(&self) -> u32 {
        self.max_code_length
    }

    /// Decode one symbol.
    ///
    /// Returns `Ok(None)` when the cursor holds too few bits to finish the
    /// code; nothing is consumed in that case. Bits that cannot start any code
    /// of an incomplete tree are an error even when fewer than the longest
    /// code length are buffered.
    #[inline]
    pub fn decode(&self, cursor: &mut BitCursor) -> Result<Option<u16>> {
        if self.max_code_length == 0 {
            return Err(OxiflateError::invalid_huffman("code used with empty tree"));
        }

        if let Some(bits) = cursor.peek_bits(self.fast_bits) {
            let (symbol, len) = self.fast_table[bits as usize];
            if len > 0 {
                cursor.drop_bits(u32::from(len));
                return Ok(Some(symbol));
            }
        }

        self.decode_slow(cursor)
    }

    /// Canonical walk over up to `max_code_length` peeked bits.
    fn decode_slow(&self, cursor: &mut BitCursor) -> Result<Option<u16>> {
        let (bits, available) = match cursor.peek_bits(self.max_code_length) {
            Some(bits) => (bits, self.max_code_length),
            None => {
                let available = cursor.buffered_bits().min(self.max_code_length);
                (cursor.peek_bits(available).unwrap_or(0), available)
            }
        };

        let mut code = 0i32;
        let mut first = 0i32;
        let mut index = 0i32;
        for len in 1..=available {
            code |= ((bits >> (len - 1)) & 1) as i32;
            let count = i32::from(self.counts[len as usize]);
            if code - first < count {
                cursor.drop_bits(len);
                return Ok(Some(self.symbols[(index + code - first) as usize]));
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }

        if available < self.max_code_length && self.is_open_prefix(code - first, available) {
            Ok(None)
        } else {
            Err(OxiflateError::invalid_huffman(format!(
                "no symbol matches the next {} bits",
                available
            )))
        }
    }

    /// Whether an unmatched `len`-bit prefix can still grow into a longer code.
    ///
    /// `shifted_offset` is the prefix's distance past the last code of length
    /// `len`, shifted up one bit as the canonical walk leaves it. Longer codes
    /// occupy the prefixes right after that last code, so the prefix is open
    /// only while it falls inside their share of the code space.
    fn is_open_prefix(&self, shifted_offset: i32, len: u32) -> bool {
        let offset = i64::from(shifted_offset >> 1);
        let longer: i64 = (len + 1..=self.max_code_length)
            .map(|l| i64::from(self.counts[l as usize]) << (self.max_code_length - l))
            .sum();
        (offset << (self.max_code_length - len)) < longer
    }
}

/// Builds length-limited Huffman code lengths from symbol frequencies.
#[derive(Debug, Clone)]
pub struct HuffmanBuilder {
    frequencies: Vec<u32>,
    max_length: u8,
}

impl HuffmanBuilder {
    /// Create a builder for `alphabet_size` symbols and codes of at most `max_length` bits.
    pub fn new(alphabet_size: usize, max_length: u8) -> Self {
        Self {
            frequencies: vec![0; alphabet_size],
            max_length,
        }
    }

    /// Count one occurrence of `symbol`.
    pub fn add(&mut self, symbol: u16) {
        self.add_count(symbol, 1);
    }

    /// Count `count` occurrences of `symbol`.
    pub fn add_count(&mut self, symbol: u16, count: u32) {
        if let Some(freq) = self.frequencies.get_mut(usize::from(symbol)) {
            *freq += count;
        }
    }

    /// Frequency recorded for `symbol`.
    pub fn frequency(&self, symbol: u16) -> u32 {
        self.frequencies.get(usize::from(symbol)).copied().unwrap_or(0)
    }

    /// Build code lengths; `result[i]` is the length for symbol `i`, 0 if unused.
    ///
    /// A lone symbol gets a 1-bit code. The result is never over-subscribed.
    pub fn build_lengths(&self) -> Vec<u8> {
        let mut lengths = vec![0u8; self.frequencies.len()];
        let mut used: Vec<usize> = (0..self.frequencies.len())
            .filter(|&symbol| self.frequencies[symbol] > 0)
            .collect();

        match used.len() {
            0 => return lengths,
            1 => {
                lengths[used[0]] = 1;
                return lengths;
            }
            _ => {}
        }

        let max_length = usize::from(self.max_length).clamp(1, MAX_CODE_LENGTH);
        let bl_count = self.length_counts(&used, max_length);

        // Least frequent symbols take the longest codes.
        used.sort_by_key(|&symbol| (self.frequencies[symbol], symbol));
        let mut symbols = used.into_iter();
        for bits in (1..=max_length).rev() {
            for symbol in symbols.by_ref().take(bl_count[bits] as usize) {
                lengths[symbol] = bits as u8;
            }
        }
        lengths
    }

    /// Number of codes of each length, after limiting to `max_length`.
    fn length_counts(&self, used: &[usize], max_length: usize) -> Vec<u32> {
        let leaves = used.len();
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = used
            .iter()
            .enumerate()
            .map(|(node, &symbol)| Reverse((u64::from(self.frequencies[symbol]), node)))
            .collect();

        // Internal nodes are numbered after the leaves, so a parent always has
        // a larger index than its children.
        let mut parent = vec![0usize; 2 * leaves - 1];
        let mut next = leaves;
        while let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) {
            parent[a] = next;
            parent[b] = next;
            heap.push(Reverse((w1 + w2, next)));
            next += 1;
        }

        let root = next - 1;
        let mut depth = vec![0usize; next];
        for node in (0..root).rev() {
            depth[node] = depth[parent[node]] + 1;
        }

        let mut bl_count = vec![0u32; max_length + 1];
        for &d in &depth[..leaves] {
            bl_count[d.min(max_length)] += 1;
        }

        // Kraft sum in units of 2^-max_length.
        let capacity = 1u64 << max_length;
        let mut kraft: u64 = (1..=max_length)
            .map(|bits| u64::from(bl_count[bits]) << (max_length - bits))
            .sum();

        while kraft > capacity {
            let Some(bits) = (1..max_length).rev().find(|&bits| bl_count[bits] > 0) else {
                break;
            };
            bl_count[bits] -= 1;
            bl_count[bits + 1] += 1;
            kraft -= 1 << (max_length - bits - 1);
        }

        // Give back code space freed by the limiting step.
        while kraft < capacity {
            let Some(bits) = (2..=max_length)
                .rev()
                .find(|&bits| bl_count[bits] > 0 && kraft + (1 << (max_length - bits)) <= capacity)
            else {
                break;
            };
            bl_count[bits] -= 1;
            bl_count[bits - 1] += 1;
            kraft += 1 << (max_length - bits);
        }

        bl_count
    }
}

/// Reverse the low `length` bits of `code`.
pub fn reverse_bits(code: u16, length: u32) -> u16 {
    if length == 0 {
        return 0;
    }
    code.reverse_bits() >> (16 - length)
}

/// Assign canonical codes for `code_lengths`, bit-reversed for LSB-first output.
///
/// Unused symbols get code 0.
pub fn canonical_codes(code_lengths: &[u8]) -> Vec<u16> {
    let mut counts = [0u16; MAX_CODE_LENGTH + 1];
    for &len in code_lengths {
        if len > 0 {
            counts[usize::from(len).min(MAX_CODE_LENGTH)] += 1;
        }
    }

    let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
    let mut code = 0u16;
    for bits in 1..=MAX_CODE_LENGTH {
        code = code.wrapping_add(counts[bits - 1]) << 1;
        next_code[bits] = code;
    }

    code_lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let slot = &mut next_code[usize::from(len).min(MAX_CODE_LENGTH)];
            let assigned = *slot;
            *slot = slot.wrapping_add(1);
            reverse_bits(assigned, u32::from(len))
        })
        .collect()
}
