//! Static DEFLATE tables (RFC 1951).
//!
//! Length and distance base/extra-bit tables, the code length transmission
//! order, and the fixed Huffman codes used by block type 01.

use crate::huffman::{
    DISTANCE_ALPHABET_SIZE, HuffmanTree, LITLEN_ALPHABET_SIZE, canonical_codes,
};
use oxiflate_core::error::{OxiflateError, Result};
use std::sync::OnceLock;

/// Fixed literal/length code lengths (RFC 1951 Section 3.2.6).
///
/// - Symbols 0-143: 8 bits
/// - Symbols 144-255: 9 bits
/// - Symbols 256-279: 7 bits
/// - Symbols 280-287: 8 bits
pub fn fixed_litlen_lengths() -> [u8; LITLEN_ALPHABET_SIZE] {
    std::array::from_fn(|symbol| match symbol {
        0..=143 => 8,
        144..=255 => 9,
        256..=279 => 7,
        _ => 8,
    })
}

/// Fixed distance code lengths: all 32 codes use 5 bits.
pub fn fixed_distance_lengths() -> [u8; DISTANCE_ALPHABET_SIZE] {
    [5u8; DISTANCE_ALPHABET_SIZE]
}

/// Decoding table for the fixed literal/length code.
pub fn fixed_litlen_tree() -> Result<&'static HuffmanTree> {
    static TREE: OnceLock<Option<HuffmanTree>> = OnceLock::new();
    TREE.get_or_init(|| HuffmanTree::from_code_lengths(&fixed_litlen_lengths()).ok())
        .as_ref()
        .ok_or_else(|| OxiflateError::invalid_huffman("fixed literal/length table"))
}

/// Decoding table for the fixed distance code.
pub fn fixed_distance_tree() -> Result<&'static HuffmanTree> {
    static TREE: OnceLock<Option<HuffmanTree>> = OnceLock::new();
    TREE.get_or_init(|| HuffmanTree::from_code_lengths(&fixed_distance_lengths()).ok())
        .as_ref()
        .ok_or_else(|| OxiflateError::invalid_huffman("fixed distance table"))
}

/// Bit-reversed fixed literal/length codes, indexed by symbol.
pub fn fixed_litlen_codes() -> &'static [u16] {
    static CODES: OnceLock<Vec<u16>> = OnceLock::new();
    CODES.get_or_init(|| canonical_codes(&fixed_litlen_lengths()))
}

/// Bit-reversed fixed distance codes, indexed by symbol.
pub fn fixed_distance_codes() -> &'static [u16] {
    static CODES: OnceLock<Vec<u16>> = OnceLock::new();
    CODES.get_or_init(|| canonical_codes(&fixed_distance_lengths()))
}

/// Length code base values for codes 257-285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, // 257-264
    11, 13, 15, 17, // 265-268
    19, 23, 27, 31, // 269-272
    35, 43, 51, 59, // 273-276
    67, 83, 99, 115, // 277-280
    131, 163, 195, 227, // 281-284
    258, // 285
];

/// Number of extra bits for length codes 257-285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance code base values for codes 0-29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Number of extra bits for distance codes 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order in which code length code lengths are transmitted (RFC 1951 Section 3.2.7).
pub const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Map a match length (3-258) to `(symbol, extra_bits, extra_value)`.
pub fn length_to_code(length: u16) -> (u16, u8, u16) {
    debug_assert!((3..=258).contains(&length), "Length out of range: {}", length);

    let index = match LENGTH_BASE.binary_search(&length) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    (
        257 + index as u16,
        LENGTH_EXTRA_BITS[index],
        length - LENGTH_BASE[index],
    )
}

/// Map a distance (1-32768) to `(code, extra_bits, extra_value)`.
pub fn distance_to_code(distance: u16) -> (u16, u8, u16) {
    debug_assert!(
        (1..=32768).contains(&distance),
        "Distance out of range: {}",
        distance
    );

    let index = match DISTANCE_BASE.binary_search(&distance) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    (
        index as u16,
        DISTANCE_EXTRA_BITS[index],
        distance - DISTANCE_BASE[index],
    )
}
