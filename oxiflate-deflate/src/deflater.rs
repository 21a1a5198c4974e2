//! Streaming DEFLATE compression.
//!
//! [`Deflater`] implements DEFLATE (RFC 1951), optionally inside zlib framing
//! (RFC 1950). Input is staged with [`Deflater::set_input`] and compressed
//! output is pulled with [`Deflater::deflate`] in slices of any size. Each
//! block is written in whichever form is smallest:
//! - Stored blocks (no compression)
//! - Fixed Huffman codes
//! - Dynamic Huffman codes
//!
//! Level 0 always produces stored blocks. Output depends only on the input,
//! the level and the sequence of flush/finish calls.

use crate::huffman::{
    CODELEN_ALPHABET_SIZE, END_OF_BLOCK, HuffmanBuilder, MAX_CODE_LENGTH, canonical_codes,
};
use crate::lz77::{Lz77Encoder, Lz77Token};
use crate::pending::PendingBuffer;
use crate::tables::{
    CODE_LENGTH_ORDER, distance_to_code, fixed_distance_codes, fixed_distance_lengths,
    fixed_litlen_codes, fixed_litlen_lengths, length_to_code,
};
use crate::zlib::{self, Adler32};
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{CompressionLevel, DeflateEngine};
use tracing::{debug, trace};

/// Uncompressed bytes collected before a block is emitted.
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Largest payload of one stored block.
const MAX_STORED_BLOCK: usize = 65535;

/// Number of literal/length codes that may appear in a block.
const LITLEN_CODES: usize = 286;

/// Number of distance codes that may appear in a block.
const DISTANCE_CODES: usize = 30;

/// Longest code in the code length alphabet.
const MAX_CODELEN_LENGTH: u8 = 7;

/// One code length symbol with its repeat payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeLengthSymbol {
    symbol: u8,
    extra: u8,
    extra_bits: u8,
}

impl CodeLengthSymbol {
    fn plain(symbol: u8) -> Self {
        Self {
            symbol,
            extra: 0,
            extra_bits: 0,
        }
    }

    fn repeat(symbol: u8, extra: usize, extra_bits: u8) -> Self {
        Self {
            symbol,
            extra: extra as u8,
            extra_bits,
        }
    }
}

/// Everything needed to emit a dynamic block header.
#[derive(Debug)]
struct DynamicCodes {
    litlen_lengths: Vec<u8>,
    dist_lengths: Vec<u8>,
    hlit: usize,
    hdist: usize,
    codelen_lengths: Vec<u8>,
    hclen: usize,
    codelen_symbols: Vec<CodeLengthSymbol>,
}

impl DynamicCodes {
    fn build(tokens: &[Lz77Token]) -> Self {
        let mut litlen = HuffmanBuilder::new(LITLEN_CODES, MAX_CODE_LENGTH as u8);
        let mut dist = HuffmanBuilder::new(DISTANCE_CODES, MAX_CODE_LENGTH as u8);
        for token in tokens {
            match *token {
                Lz77Token::Literal(byte) => litlen.add(u16::from(byte)),
                Lz77Token::Match { length, distance } => {
                    litlen.add(length_to_code(length).0);
                    dist.add(distance_to_code(distance).0);
                }
            }
        }
        litlen.add(END_OF_BLOCK);

        ensure_two_codes(&mut litlen, LITLEN_CODES);
        ensure_two_codes(&mut dist, DISTANCE_CODES);

        let litlen_lengths = litlen.build_lengths();
        let dist_lengths = dist.build_lengths();
        let hlit = last_used(&litlen_lengths, 257);
        let hdist = last_used(&dist_lengths, 1);

        let combined: Vec<u8> = litlen_lengths[..hlit]
            .iter()
            .chain(&dist_lengths[..hdist])
            .copied()
            .collect();
        let codelen_symbols = run_length_encode(&combined);

        let mut codelen = HuffmanBuilder::new(CODELEN_ALPHABET_SIZE, MAX_CODELEN_LENGTH);
        for sym in &codelen_symbols {
            codelen.add(u16::from(sym.symbol));
        }
        let codelen_lengths = codelen.build_lengths();
        let hclen = CODE_LENGTH_ORDER
            .iter()
            .rposition(|&symbol| codelen_lengths[symbol] != 0)
            .map_or(4, |index| (index + 1).max(4));

        Self {
            litlen_lengths,
            dist_lengths,
            hlit,
            hdist,
            codelen_lengths,
            hclen,
            codelen_symbols,
        }
    }

    /// Size of the block header after the 3 block type bits.
    fn header_bits(&self) -> usize {
        14 + 3 * self.hclen
            + self
                .codelen_symbols
                .iter()
                .map(|sym| {
                    usize::from(self.codelen_lengths[usize::from(sym.symbol)])
                        + usize::from(sym.extra_bits)
                })
                .sum::<usize>()
    }

    fn write_header(&self, pending: &mut PendingBuffer) {
        pending.write_bits((self.hlit - 257) as u32, 5);
        pending.write_bits((self.hdist - 1) as u32, 5);
        pending.write_bits((self.hclen - 4) as u32, 4);
        for &symbol in &CODE_LENGTH_ORDER[..self.hclen] {
            pending.write_bits(u32::from(self.codelen_lengths[symbol]), 3);
        }

        let codes = canonical_codes(&self.codelen_lengths);
        for sym in &self.codelen_symbols {
            let index = usize::from(sym.symbol);
            pending.write_bits(
                u32::from(codes[index]),
                u32::from(self.codelen_lengths[index]),
            );
            pending.write_bits(u32::from(sym.extra), u32::from(sym.extra_bits));
        }
    }
}

/// Give the tree at least two codes so none is zero bits long.
fn ensure_two_codes(builder: &mut HuffmanBuilder, alphabet_size: usize) {
    let mut used = (0..alphabet_size as u16)
        .filter(|&symbol| builder.frequency(symbol) > 0)
        .count();
    for symbol in [0u16, 1] {
        if used >= 2 {
            break;
        }
        if builder.frequency(symbol) == 0 {
            builder.add(symbol);
            used += 1;
        }
    }
}

/// Number of leading entries needed to cover every non-zero length, at least `min`.
fn last_used(lengths: &[u8], min: usize) -> usize {
    lengths
        .iter()
        .rposition(|&len| len != 0)
        .map_or(min, |index| (index + 1).max(min))
}

/// Code length run-length encoding (symbols 16, 17, 18).
fn run_length_encode(lengths: &[u8]) -> Vec<CodeLengthSymbol> {
    let mut symbols = Vec::new();
    let mut i = 0;

    while i < lengths.len() {
        let len = lengths[i];
        let run = lengths[i..].iter().take_while(|&&l| l == len).count();
        let mut count = run;

        if len == 0 {
            while count > 0 {
                if count >= 11 {
                    let take = count.min(138);
                    symbols.push(CodeLengthSymbol::repeat(18, take - 11, 7));
                    count -= take;
                } else if count >= 3 {
                    symbols.push(CodeLengthSymbol::repeat(17, count - 3, 3));
                    count = 0;
                } else {
                    symbols.push(CodeLengthSymbol::plain(0));
                    count -= 1;
                }
            }
        } else {
            symbols.push(CodeLengthSymbol::plain(len));
            count -= 1;
            while count > 0 {
                if count >= 3 {
                    let take = count.min(6);
                    symbols.push(CodeLengthSymbol::repeat(16, take - 3, 2));
                    count -= take;
                } else {
                    symbols.push(CodeLengthSymbol::plain(len));
                    count -= 1;
                }
            }
        }

        i += run;
    }

    symbols
}

/// Bits needed to emit `tokens` plus end-of-block with the given code lengths.
fn token_bits(tokens: &[Lz77Token], litlen_lengths: &[u8], dist_lengths: &[u8]) -> usize {
    let mut bits = usize::from(litlen_lengths[usize::from(END_OF_BLOCK)]);
    for token in tokens {
        match *token {
            Lz77Token::Literal(byte) => bits += usize::from(litlen_lengths[usize::from(byte)]),
            Lz77Token::Match { length, distance } => {
                let (len_code, len_extra_bits, _) = length_to_code(length);
                let (dist_code, dist_extra_bits, _) = distance_to_code(distance);
                bits += usize::from(litlen_lengths[usize::from(len_code)])
                    + usize::from(len_extra_bits)
                    + usize::from(dist_lengths[usize::from(dist_code)])
                    + usize::from(dist_extra_bits);
            }
        }
    }
    bits
}

/// Emit `tokens` and end-of-block with the given (bit-reversed) codes.
fn write_tokens(
    pending: &mut PendingBuffer,
    tokens: &[Lz77Token],
    litlen: (&[u16], &[u8]),
    dist: (&[u16], &[u8]),
) {
    let (litlen_codes, litlen_lengths) = litlen;
    let (dist_codes, dist_lengths) = dist;
    fn put(pending: &mut PendingBuffer, codes: &[u16], lengths: &[u8], symbol: u16) {
        let index = usize::from(symbol);
        pending.write_bits(u32::from(codes[index]), u32::from(lengths[index]));
    }

    for token in tokens {
        match *token {
            Lz77Token::Literal(byte) => {
                put(pending, litlen_codes, litlen_lengths, u16::from(byte));
            }
            Lz77Token::Match { length, distance } => {
                let (len_code, len_extra_bits, len_extra) = length_to_code(length);
                put(pending, litlen_codes, litlen_lengths, len_code);
                pending.write_bits(u32::from(len_extra), u32::from(len_extra_bits));

                let (dist_code, dist_extra_bits, dist_extra) = distance_to_code(distance);
                put(pending, dist_codes, dist_lengths, dist_code);
                pending.write_bits(u32::from(dist_extra), u32::from(dist_extra_bits));
            }
        }
    }
    put(pending, litlen_codes, litlen_lengths, END_OF_BLOCK);
}

/// Streaming DEFLATE compressor, raw or zlib framed.
///
/// # Example
///
/// ```
/// use oxiflate_deflate::Deflater;
///
/// let mut deflater = Deflater::new(6);
/// deflater.set_input(b"Hello, World!").unwrap();
/// deflater.finish();
///
/// let mut out = [0u8; 64];
/// let n = deflater.deflate(&mut out).unwrap();
/// assert!(deflater.is_finished());
/// assert!(n > 0);
/// ```
#[derive(Debug, Clone)]
pub struct Deflater {
    level: CompressionLevel,
    /// Emit zlib header and trailer.
    zlib: bool,
    lz77: Lz77Encoder,
    /// Staged caller input.
    input: Vec<u8>,
    input_pos: usize,
    /// Uncompressed bytes of the block being collected.
    block: Vec<u8>,
    pending: PendingBuffer,
    adler: Adler32,
    dict_id: Option<u32>,
    header_written: bool,
    flush_requested: bool,
    finish_requested: bool,
    trailer_written: bool,
    total_in: u64,
    total_out: u64,
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new(CompressionLevel::DEFAULT)
    }
}

impl Deflater {
    /// Create a raw DEFLATE compressor with the specified level (0-9).
    pub fn new(level: impl Into<CompressionLevel>) -> Self {
        Self::with_framing(level.into(), false)
    }

    /// Create a zlib-framed compressor with the specified level (0-9).
    pub fn zlib(level: impl Into<CompressionLevel>) -> Self {
        Self::with_framing(level.into(), true)
    }

    fn with_framing(level: CompressionLevel, zlib: bool) -> Self {
        Self {
            level,
            zlib,
            lz77: Lz77Encoder::with_level(level.level()),
            input: Vec::new(),
            input_pos: 0,
            block: Vec::with_capacity(BLOCK_SIZE),
            pending: PendingBuffer::new(),
            adler: Adler32::new(),
            dict_id: None,
            header_written: false,
            flush_requested: false,
            finish_requested: false,
            trailer_written: false,
            total_in: 0,
            total_out: 0,
        }
    }

    /// Reset the compressor, keeping level and framing.
    pub fn reset(&mut self) {
        *self = Self::with_framing(self.level, self.zlib);
    }

    /// Current compression level.
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Change the level for blocks not yet emitted.
    pub fn set_level(&mut self, level: impl Into<CompressionLevel>) {
        let level = level.into();
        // Stored blocks bypass the matcher, so its history has gaps.
        if self.level == CompressionLevel::NONE && level != CompressionLevel::NONE {
            self.lz77.reset();
        }
        self.level = level;
        self.lz77.set_level(level.level());
    }

    /// Preset a dictionary. Must precede all input.
    ///
    /// Returns the dictionary's Adler-32, which zlib framing announces in the
    /// header.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<u32> {
        if self.header_written || self.total_in > 0 || self.input_pos < self.input.len() {
            return Err(OxiflateError::invalid_state(
                "dictionary must be set before any input",
            ));
        }
        self.lz77.set_dictionary(dictionary);
        let dict_id = Adler32::checksum(dictionary);
        self.dict_id = Some(dict_id);
        debug!(len = dictionary.len(), dict_id, "deflate dictionary set");
        Ok(dict_id)
    }

    /// Stage the next chunk of uncompressed input.
    pub fn set_input(&mut self, input: &[u8]) -> Result<()> {
        if self.input_pos < self.input.len() {
            return Err(OxiflateError::InputNotConsumed {
                remaining: self.input.len() - self.input_pos,
            });
        }
        if self.finish_requested {
            return Err(OxiflateError::invalid_state("input after finish"));
        }
        self.input.clear();
        self.input.extend_from_slice(input);
        self.input_pos = 0;
        Ok(())
    }

    /// Request a sync flush: everything staged becomes decodable output.
    pub fn flush(&mut self) {
        self.flush_requested = true;
    }

    /// Request the end of the stream.
    pub fn finish(&mut self) {
        self.finish_requested = true;
    }

    /// Whether all staged input has been taken in.
    pub fn is_needing_input(&self) -> bool {
        self.input_pos == self.input.len()
    }

    /// Whether the stream is complete and all output delivered.
    pub fn is_finished(&self) -> bool {
        self.trailer_written && self.pending.is_flushed()
    }

    /// Adler-32 of the input taken in so far.
    pub fn adler(&self) -> u32 {
        self.adler.value()
    }

    /// Uncompressed bytes taken in so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Produce compressed output into `output`, returning the bytes written.
    pub fn deflate(&mut self, output: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        loop {
            if self.zlib && !self.header_written {
                self.write_zlib_header();
            }

            written += self.pending.flush_to(&mut output[written..]);
            if written == output.len() || self.trailer_written {
                break;
            }

            if self.input_pos < self.input.len() {
                let take = (BLOCK_SIZE - self.block.len()).min(self.input.len() - self.input_pos);
                let chunk = &self.input[self.input_pos..self.input_pos + take];
                self.adler.update(chunk);
                self.block.extend_from_slice(chunk);
                self.input_pos += take;
                self.total_in += take as u64;
                if self.block.len() == BLOCK_SIZE {
                    self.encode_block(false);
                }
            } else if self.finish_requested {
                self.encode_block(true);
                self.pending.align_to_byte();
                if self.zlib {
                    self.pending.write_u32_be(self.adler.value());
                }
                self.trailer_written = true;
                self.flush_requested = false;
                debug!(total_in = self.total_in, "deflate stream finished");
            } else if self.flush_requested {
                self.encode_block(false);
                // Empty non-final stored block.
                self.pending.write_bits(0, 3);
                self.pending.align_to_byte();
                self.pending.write_u16_le(0);
                self.pending.write_u16_le(0xFFFF);
                self.flush_requested = false;
                trace!(total_in = self.total_in, "sync flush");
            } else {
                break;
            }
        }

        self.total_out += written as u64;
        Ok(written)
    }

    /// Compress a complete input held in memory.
    pub fn compress_to_vec(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.set_input(input)?;
        self.finish();

        let mut output = Vec::with_capacity(input.len() / 2 + 64);
        let mut buffer = vec![0u8; 32 * 1024];
        loop {
            let n = self.deflate(&mut buffer)?;
            output.extend_from_slice(&buffer[..n]);
            if self.is_finished() {
                return Ok(output);
            }
            if n == 0 {
                return Err(OxiflateError::CantDeflateAllInput);
            }
        }
    }

    fn write_zlib_header(&mut self) {
        let header = zlib::encode_header(self.level, self.dict_id.is_some());
        self.pending.write_bytes(&header);
        if let Some(dict_id) = self.dict_id {
            self.pending.write_u32_be(dict_id);
        }
        self.header_written = true;
    }

    /// Emit the collected block. An empty block is skipped unless final.
    fn encode_block(&mut self, is_final: bool) {
        if self.block.is_empty() && !is_final {
            return;
        }
        let block = std::mem::take(&mut self.block);

        if self.level == CompressionLevel::NONE {
            self.write_stored(&block, is_final);
        } else {
            let tokens = self.lz77.compress(&block);
            self.write_compressed(&block, &tokens, is_final);
        }

        self.block = block;
        self.block.clear();
    }

    fn write_stored(&mut self, data: &[u8], is_final: bool) {
        let mut chunks = data.chunks(MAX_STORED_BLOCK).peekable();
        if chunks.peek().is_none() {
            self.write_stored_chunk(&[], is_final);
        }
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.write_stored_chunk(chunk, is_final && last);
        }
        trace!(len = data.len(), is_final, "stored block");
    }

    fn write_stored_chunk(&mut self, chunk: &[u8], is_final: bool) {
        self.pending.write_bits(u32::from(is_final), 3);
        self.pending.align_to_byte();
        let len = chunk.len() as u16;
        self.pending.write_u16_le(len);
        self.pending.write_u16_le(!len);
        self.pending.write_bytes(chunk);
    }

    /// Write the smallest of stored, fixed and dynamic encodings.
    fn write_compressed(&mut self, data: &[u8], tokens: &[Lz77Token], is_final: bool) {
        let fixed_litlen = fixed_litlen_lengths();
        let fixed_dist = fixed_distance_lengths();
        let fixed_bits = 3 + token_bits(tokens, &fixed_litlen, &fixed_dist);

        let dynamic = DynamicCodes::build(tokens);
        let dynamic_bits = 3
            + dynamic.header_bits()
            + token_bits(tokens, &dynamic.litlen_lengths, &dynamic.dist_lengths);

        let stored_blocks = data.len().div_ceil(MAX_STORED_BLOCK).max(1);
        let stored_bits = stored_blocks * (3 + 7 + 32) + 8 * data.len();

        let final_bit = u32::from(is_final);
        if stored_bits < fixed_bits.min(dynamic_bits) {
            self.write_stored(data, is_final);
        } else if dynamic_bits < fixed_bits {
            self.pending.write_bits(final_bit | (0b10 << 1), 3);
            dynamic.write_header(&mut self.pending);
            let litlen_codes = canonical_codes(&dynamic.litlen_lengths);
            let dist_codes = canonical_codes(&dynamic.dist_lengths);
            write_tokens(
                &mut self.pending,
                tokens,
                (&litlen_codes[..], &dynamic.litlen_lengths[..]),
                (&dist_codes[..], &dynamic.dist_lengths[..]),
            );
            trace!(len = data.len(), bits = dynamic_bits, is_final, "dynamic block");
        } else {
            self.pending.write_bits(final_bit | (0b01 << 1), 3);
            write_tokens(
                &mut self.pending,
                tokens,
                (fixed_litlen_codes(), &fixed_litlen[..]),
                (fixed_distance_codes(), &fixed_dist[..]),
            );
            trace!(len = data.len(), bits = fixed_bits, is_final, "fixed block");
        }
    }
}

impl DeflateEngine for Deflater {
    fn set_input(&mut self, input: &[u8]) -> Result<()> {
        Deflater::set_input(self, input)
    }

    fn deflate(&mut self, output: &mut [u8]) -> Result<usize> {
        Deflater::deflate(self, output)
    }

    fn flush(&mut self) {
        Deflater::flush(self);
    }

    fn finish(&mut self) {
        Deflater::finish(self);
    }

    fn is_finished(&self) -> bool {
        Deflater::is_finished(self)
    }

    fn is_needing_input(&self) -> bool {
        Deflater::is_needing_input(self)
    }
}
