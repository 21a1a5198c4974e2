//! Zlib framing (RFC 1950) around DEFLATE data.
//!
//! # Format
//!
//! ```text
//! +---+---+=========+============+---+---+---+---+
//! |CMF|FLG|[DICTID] | compressed |    ADLER32    |
//! +---+---+=========+============+---+---+---+---+
//! ```
//!
//! - CMF: Compression Method and Flags
//!   - Bits 0-3: CM (Compression Method) - must be 8 for DEFLATE
//!   - Bits 4-7: CINFO (Compression Info) - log2(window size) - 8
//! - FLG: Flags
//!   - Bits 0-4: FCHECK - check bits so (CMF*256 + FLG) mod 31 == 0
//!   - Bit 5: FDICT - preset dictionary present
//!   - Bits 6-7: FLEVEL - compression level (0-3)
//! - DICTID: Adler-32 of the preset dictionary (big-endian), only with FDICT
//! - ADLER32: Adler-32 checksum of uncompressed data (big-endian)
//!
//! The streaming engines produce and consume this framing themselves
//! ([`Deflater::zlib`], [`Inflater::zlib`]); this module holds the checksum,
//! the header codec, and one-shot helpers.

use crate::deflater::Deflater;
use crate::inflater::Inflater;
use oxiflate_core::CompressionLevel;
use oxiflate_core::error::{OxiflateError, Result};

/// Compression method value for DEFLATE.
pub const CM_DEFLATE: u8 = 8;

/// CMF byte for DEFLATE with a 32 KB window.
pub const CMF_DEFLATE_32K: u8 = 0x78;

/// FDICT flag bit in the FLG byte.
pub const FLAG_PRESET_DICT: u8 = 0x20;

/// Zlib compression level indicator in header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZlibLevel {
    /// Fastest compression.
    Fastest = 0,
    /// Fast compression.
    Fast = 1,
    /// Default compression.
    Default = 2,
    /// Maximum compression.
    Maximum = 3,
}

impl From<CompressionLevel> for ZlibLevel {
    fn from(level: CompressionLevel) -> Self {
        match level.level() {
            0..=2 => Self::Fastest,
            3..=5 => Self::Fast,
            6 => Self::Default,
            _ => Self::Maximum,
        }
    }
}

/// Adler-32 checksum calculator.
///
/// Adler-32 is a checksum algorithm designed by Mark Adler.
/// It is faster than CRC-32 but provides less protection against random errors.
#[derive(Clone, Debug)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Number of bytes to process before reducing.
const NMAX: usize = 5552;

impl Adler32 {
    /// Create a new Adler-32 calculator.
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Update the checksum with more data.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += u32::from(byte);
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        self.a = a;
        self.b = b;
    }

    /// Current checksum value.
    pub fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Restart from the empty-input checksum.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Compute Adler-32 checksum of data in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.value()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the two header bytes for `level`.
pub fn encode_header(level: CompressionLevel, preset_dict: bool) -> [u8; 2] {
    let cmf = CMF_DEFLATE_32K;
    let mut flg = (ZlibLevel::from(level) as u8) << 6;
    if preset_dict {
        flg |= FLAG_PRESET_DICT;
    }
    let remainder = ((u16::from(cmf) << 8) | u16::from(flg)) % 31;
    if remainder != 0 {
        flg += (31 - remainder) as u8;
    }
    [cmf, flg]
}

/// Validate a header and report whether it announces a preset dictionary.
pub fn decode_header(cmf: u8, flg: u8) -> Result<bool> {
    if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
        return Err(OxiflateError::invalid_header("zlib header check failed"));
    }
    if cmf & 0x0F != CM_DEFLATE {
        return Err(OxiflateError::invalid_header(format!(
            "unsupported compression method {}",
            cmf & 0x0F
        )));
    }
    if cmf >> 4 > 7 {
        return Err(OxiflateError::invalid_header("invalid window size"));
    }
    Ok(flg & FLAG_PRESET_DICT != 0)
}

/// Compress data using zlib format.
///
/// # Example
///
/// ```
/// use oxiflate_deflate::zlib::{zlib_compress, zlib_decompress};
///
/// let data = b"Hello, World! Hello, World!";
/// let compressed = zlib_compress(data, 6).unwrap();
/// let decompressed = zlib_decompress(&compressed).unwrap();
/// assert_eq!(decompressed, data);
/// ```
pub fn zlib_compress(input: &[u8], level: u8) -> Result<Vec<u8>> {
    Deflater::zlib(level).compress_to_vec(input)
}

/// Compress data using zlib format with a preset dictionary.
///
/// # Example
///
/// ```
/// use oxiflate_deflate::zlib::{zlib_compress_with_dict, zlib_decompress_with_dict};
///
/// let dict = b"common patterns and shared content";
/// let data = b"This text has common patterns that match the dictionary";
/// let compressed = zlib_compress_with_dict(data, 6, dict).unwrap();
/// let decompressed = zlib_decompress_with_dict(&compressed, dict).unwrap();
/// assert_eq!(decompressed, data);
/// ```
pub fn zlib_compress_with_dict(input: &[u8], level: u8, dictionary: &[u8]) -> Result<Vec<u8>> {
    let mut deflater = Deflater::zlib(level);
    deflater.set_dictionary(dictionary)?;
    deflater.compress_to_vec(input)
}

/// Decompress zlib format data.
pub fn zlib_decompress(input: &[u8]) -> Result<Vec<u8>> {
    Inflater::zlib().decompress_to_vec(input, None)
}

/// Decompress zlib format data that was compressed with a preset dictionary.
pub fn zlib_decompress_with_dict(input: &[u8], dictionary: &[u8]) -> Result<Vec<u8>> {
    Inflater::zlib().decompress_to_vec(input, Some(dictionary))
}
