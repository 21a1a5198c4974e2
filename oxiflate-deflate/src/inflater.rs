//! Resumable DEFLATE decoder.
//!
//! [`Inflater`] is a push-fed state machine: compressed bytes arrive through
//! [`Inflater::set_input`] in chunks of any size, and [`Inflater::inflate`]
//! decodes as far as the current chunk allows. Every decoding step either
//! completes or leaves the machine in a mode it can resume from once more input
//! arrives, so a stream can be split at any byte boundary.
//!
//! Decoded bytes go through a [`HistoryWindow`] that doubles as the output
//! staging buffer; back-references are resolved against it.

use crate::huffman::{CODELEN_ALPHABET_SIZE, END_OF_BLOCK, HuffmanTree};
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, LENGTH_BASE, LENGTH_EXTRA_BITS,
    fixed_distance_tree, fixed_litlen_tree,
};
use crate::zlib::{self, Adler32};
use oxiflate_core::error::{OxiflateError, Result};
use oxiflate_core::{BitCursor, HistoryWindow, InflateEngine};
use std::borrow::Cow;
use tracing::{debug, trace};

/// Longest match a single length code can produce.
const MAX_MATCH: usize = 258;

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Waiting for the two zlib header bytes.
    Header,
    /// Reading the preset dictionary id, or waiting for the dictionary.
    Dictionary,
    /// Between blocks: next is a 3-bit block header.
    Blocks,
    /// Stored block LEN field.
    StoredLen1,
    /// Stored block NLEN field.
    StoredLen2,
    /// Copying stored block bytes.
    Stored,
    /// Reading a dynamic block's code lengths.
    DynHeader,
    /// Decoding literal/length symbols.
    Huffman,
    /// Reading length extra bits.
    HuffmanLenBits,
    /// Decoding a distance symbol.
    HuffmanDist,
    /// Reading distance extra bits.
    HuffmanDistBits,
    /// Reading the zlib Adler-32 trailer.
    Checksum,
    /// End of stream.
    Finished,
}

/// Progress through a dynamic block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DynStep {
    Counts,
    CodeLengthLengths,
    Lengths,
    Repeat(u16),
}

/// Resumable reader for the code length section of a dynamic block.
#[derive(Debug, Clone)]
struct DynHeader {
    step: DynStep,
    hlit: usize,
    hdist: usize,
    hclen: usize,
    cl_index: usize,
    cl_lengths: [u8; CODELEN_ALPHABET_SIZE],
    cl_tree: Option<HuffmanTree>,
    lengths: Vec<u8>,
}

impl DynHeader {
    fn new() -> Self {
        Self {
            step: DynStep::Counts,
            hlit: 0,
            hdist: 0,
            hclen: 0,
            cl_index: 0,
            cl_lengths: [0; CODELEN_ALPHABET_SIZE],
            cl_tree: None,
            lengths: Vec::new(),
        }
    }

    /// Advance as far as `input` allows; `Ok(true)` once both tables are known.
    fn attempt_read(&mut self, input: &mut BitCursor) -> Result<bool> {
        loop {
            match self.step {
                DynStep::Counts => {
                    let Some(counts) = input.get_bits(14) else {
                        return Ok(false);
                    };
                    self.hlit = (counts & 0x1F) as usize + 257;
                    self.hdist = ((counts >> 5) & 0x1F) as usize + 1;
                    self.hclen = (counts >> 10) as usize + 4;
                    if self.hlit > 286 || self.hdist > 30 {
                        return Err(OxiflateError::corrupted(format!(
                            "too many codes: {} literal/length, {} distance",
                            self.hlit, self.hdist
                        )));
                    }
                    self.lengths.reserve(self.hlit + self.hdist);
                    self.step = DynStep::CodeLengthLengths;
                }
                DynStep::CodeLengthLengths => {
                    while self.cl_index < self.hclen {
                        let Some(len) = input.get_bits(3) else {
                            return Ok(false);
                        };
                        self.cl_lengths[CODE_LENGTH_ORDER[self.cl_index]] = len as u8;
                        self.cl_index += 1;
                    }
                    self.cl_tree = Some(HuffmanTree::from_code_lengths(&self.cl_lengths)?);
                    self.step = DynStep::Lengths;
                }
                DynStep::Lengths => {
                    let total = self.hlit + self.hdist;
                    let Some(tree) = self.cl_tree.as_ref() else {
                        return Err(OxiflateError::invalid_state("code length table missing"));
                    };
                    while self.lengths.len() < total {
                        let Some(symbol) = tree.decode(input)? else {
                            return Ok(false);
                        };
                        if symbol < 16 {
                            self.lengths.push(symbol as u8);
                        } else {
                            self.step = DynStep::Repeat(symbol);
                            break;
                        }
                    }
                    if self.lengths.len() == total {
                        return Ok(true);
                    }
                }
                DynStep::Repeat(symbol) => {
                    let (bits, base, value) = match symbol {
                        16 => {
                            let Some(&last) = self.lengths.last() else {
                                return Err(OxiflateError::corrupted(
                                    "repeat code with no previous length",
                                ));
                            };
                            (2, 3, last)
                        }
                        17 => (3, 3, 0),
                        _ => (7, 11, 0),
                    };
                    let Some(count) = input.try_get_bits(bits, base) else {
                        return Ok(false);
                    };
                    let count = count as usize;
                    if self.lengths.len() + count > self.hlit + self.hdist {
                        return Err(OxiflateError::corrupted("code length repeat overflows"));
                    }
                    self.lengths.resize(self.lengths.len() + count, value);
                    self.step = DynStep::Lengths;
                }
            }
        }
    }

    fn literal_length_tree(&self) -> Result<HuffmanTree> {
        if self.lengths[usize::from(END_OF_BLOCK)] == 0 {
            return Err(OxiflateError::corrupted("missing end-of-block code"));
        }
        HuffmanTree::from_code_lengths(&self.lengths[..self.hlit])
    }

    fn distance_tree(&self) -> Result<HuffmanTree> {
        HuffmanTree::from_code_lengths(&self.lengths[self.hlit..])
    }
}

/// Streaming DEFLATE decoder, raw or zlib framed.
///
/// # Example
///
/// ```
/// use oxiflate_deflate::{Deflater, Inflater};
///
/// let compressed = Deflater::new(6).compress_to_vec(b"hello hello hello").unwrap();
///
/// let mut inflater = Inflater::new();
/// inflater.set_input(&compressed).unwrap();
/// let mut out = [0u8; 64];
/// let n = inflater.inflate(&mut out).unwrap();
/// assert_eq!(&out[..n], b"hello hello hello");
/// assert!(inflater.is_finished());
/// ```
#[derive(Debug, Clone)]
pub struct Inflater {
    mode: Mode,
    /// Expect zlib header and trailer.
    zlib: bool,
    input: BitCursor,
    window: HistoryWindow,
    dyn_header: Option<DynHeader>,
    litlen: Option<Cow<'static, HuffmanTree>>,
    dist: Option<Cow<'static, HuffmanTree>>,
    is_last_block: bool,
    /// Bits still to read for the field in progress.
    needed_bits: u32,
    rep_length: usize,
    rep_dist: usize,
    /// Bytes left in the current stored block.
    stored_len: usize,
    /// Dictionary id or trailer checksum read from the stream.
    read_adler: u32,
    adler: Option<Adler32>,
    /// Total compressed bytes handed to `set_input`.
    supplied: u64,
    total_out: u64,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater {
    /// Create a decoder for raw DEFLATE data (no zlib framing).
    pub fn new() -> Self {
        Self::with_framing(false)
    }

    /// Create a decoder for zlib-framed data.
    pub fn zlib() -> Self {
        Self::with_framing(true)
    }

    fn with_framing(zlib: bool) -> Self {
        Self {
            mode: if zlib { Mode::Header } else { Mode::Blocks },
            zlib,
            input: BitCursor::new(),
            window: HistoryWindow::new(),
            dyn_header: None,
            litlen: None,
            dist: None,
            is_last_block: false,
            needed_bits: 0,
            rep_length: 0,
            rep_dist: 0,
            stored_len: 0,
            read_adler: 0,
            adler: zlib.then(Adler32::new),
            supplied: 0,
            total_out: 0,
        }
    }

    /// Return to the initial state, keeping the framing choice.
    pub fn reset(&mut self) {
        *self = Self::with_framing(self.zlib);
    }

    /// Supply the next chunk of compressed input.
    pub fn set_input(&mut self, input: &[u8]) -> Result<()> {
        self.input.set_input(input)?;
        self.supplied += input.len() as u64;
        Ok(())
    }

    /// Install the preset dictionary announced by the zlib header.
    ///
    /// Its Adler-32 must match the id read from the stream.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if !self.is_needing_dictionary() {
            return Err(OxiflateError::invalid_state("dictionary is not needed"));
        }
        let computed = Adler32::checksum(dictionary);
        if computed != self.read_adler {
            return Err(OxiflateError::checksum_mismatch(self.read_adler, computed));
        }
        self.window.copy_dict(dictionary)?;
        debug!(len = dictionary.len(), "preset dictionary installed");
        self.mode = Mode::Blocks;
        Ok(())
    }

    /// Decode into `output`, returning the number of bytes produced.
    pub fn inflate(&mut self, output: &mut [u8]) -> Result<usize> {
        if output.is_empty() {
            if !self.is_finished() {
                self.decode()?;
            }
            return Ok(0);
        }

        let mut copied = 0;
        loop {
            // Nothing is handed out while the trailer is being verified.
            if self.mode != Mode::Checksum {
                let more = self.window.drain_to(&mut output[copied..])?;
                if more > 0 {
                    if let Some(adler) = self.adler.as_mut() {
                        adler.update(&output[copied..copied + more]);
                    }
                    copied += more;
                    self.total_out += more as u64;
                    if copied == output.len() {
                        return Ok(copied);
                    }
                }
            }

            if !(self.decode()? || (self.window.filled() > 0 && self.mode != Mode::Checksum)) {
                return Ok(copied);
            }
        }
    }

    /// Decompress a complete stream held in memory.
    ///
    /// `dictionary` is installed if the stream asks for one.
    pub fn decompress_to_vec(&mut self, input: &[u8], dictionary: Option<&[u8]>) -> Result<Vec<u8>> {
        self.set_input(input)?;
        let mut output = Vec::with_capacity(input.len().saturating_mul(3));
        let mut buffer = vec![0u8; 32 * 1024];

        loop {
            let n = self.inflate(&mut buffer)?;
            output.extend_from_slice(&buffer[..n]);
            if self.is_finished() {
                return Ok(output);
            }
            if n > 0 {
                continue;
            }
            if self.is_needing_dictionary() {
                match dictionary {
                    Some(dict) => self.set_dictionary(dict)?,
                    None => {
                        return Err(OxiflateError::NeedsDictionary {
                            dict_id: self.read_adler,
                        });
                    }
                }
            } else if self.is_needing_input() {
                return Err(OxiflateError::unexpected_eof("truncated DEFLATE stream"));
            } else {
                return Err(OxiflateError::InvalidInputData);
            }
        }
    }

    /// Whether the end of the stream was reached and all output delivered.
    pub fn is_finished(&self) -> bool {
        self.mode == Mode::Finished && self.window.filled() == 0
    }

    /// Whether the current input chunk has been consumed.
    pub fn is_needing_input(&self) -> bool {
        self.input.is_needing_input()
    }

    /// Whether the stream is waiting for [`set_dictionary`](Self::set_dictionary).
    pub fn is_needing_dictionary(&self) -> bool {
        self.mode == Mode::Dictionary && self.needed_bits == 0
    }

    /// The needed dictionary's id while waiting for one, otherwise the
    /// Adler-32 of the output so far (0 for raw streams).
    pub fn adler(&self) -> u32 {
        if self.is_needing_dictionary() {
            self.read_adler
        } else {
            self.adler.as_ref().map_or(0, Adler32::value)
        }
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.supplied - self.remaining_input() as u64
    }

    /// Decompressed bytes returned so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Supplied bytes not yet consumed (trailing data after the stream end).
    pub fn remaining_input(&self) -> usize {
        self.input.available_bytes()
    }

    /// Run one decoding step. `Ok(true)` means progress may continue.
    fn decode(&mut self) -> Result<bool> {
        match self.mode {
            Mode::Header => self.decode_header(),
            Mode::Dictionary => self.decode_dict(),
            Mode::Checksum => self.decode_checksum(),
            Mode::Blocks => self.decode_block_header(),
            Mode::StoredLen1 => {
                let Some(len) = self.input.get_bits(16) else {
                    return Ok(false);
                };
                self.stored_len = len as usize;
                self.mode = Mode::StoredLen2;
                self.decode()
            }
            Mode::StoredLen2 => {
                let Some(nlen) = self.input.get_bits(16) else {
                    return Ok(false);
                };
                if nlen as usize != self.stored_len ^ 0xFFFF {
                    return Err(OxiflateError::corrupted("broken uncompressed block"));
                }
                self.mode = Mode::Stored;
                self.decode()
            }
            Mode::Stored => {
                let more = self.window.copy_stored(&mut self.input, self.stored_len)?;
                self.stored_len -= more;
                if self.stored_len == 0 {
                    self.mode = Mode::Blocks;
                    return Ok(true);
                }
                Ok(!self.input.is_needing_input())
            }
            Mode::DynHeader => {
                let Some(header) = self.dyn_header.as_mut() else {
                    return Err(OxiflateError::invalid_state("dynamic header missing"));
                };
                if !header.attempt_read(&mut self.input)? {
                    return Ok(false);
                }
                self.litlen = Some(Cow::Owned(header.literal_length_tree()?));
                self.dist = Some(Cow::Owned(header.distance_tree()?));
                self.dyn_header = None;
                self.mode = Mode::Huffman;
                self.decode_huffman()
            }
            Mode::Huffman | Mode::HuffmanLenBits | Mode::HuffmanDist | Mode::HuffmanDistBits => {
                self.decode_huffman()
            }
            Mode::Finished => Ok(false),
        }
    }

    fn decode_header(&mut self) -> Result<bool> {
        let Some(bits) = self.input.get_bits(16) else {
            return Ok(false);
        };
        let preset_dict = zlib::decode_header(bits as u8, (bits >> 8) as u8)?;
        if preset_dict {
            self.mode = Mode::Dictionary;
            self.needed_bits = 32;
        } else {
            self.mode = Mode::Blocks;
        }
        Ok(true)
    }

    /// Read the dictionary id. Always returns `false`: the caller must
    /// supply the dictionary before decoding continues.
    fn decode_dict(&mut self) -> Result<bool> {
        while self.needed_bits > 0 {
            let Some(byte) = self.input.get_bits(8) else {
                return Ok(false);
            };
            self.read_adler = (self.read_adler << 8) | byte;
            self.needed_bits -= 8;
        }
        debug!(dict_id = self.read_adler, "stream requires a preset dictionary");
        Ok(false)
    }

    fn decode_checksum(&mut self) -> Result<bool> {
        while self.needed_bits > 0 {
            let Some(byte) = self.input.get_bits(8) else {
                return Ok(false);
            };
            self.read_adler = (self.read_adler << 8) | byte;
            self.needed_bits -= 8;
        }
        let computed = self.adler.as_ref().map_or(1, Adler32::value);
        if computed != self.read_adler {
            return Err(OxiflateError::checksum_mismatch(self.read_adler, computed));
        }
        debug!(total_out = self.total_out, "zlib stream finished");
        self.mode = Mode::Finished;
        Ok(false)
    }

    fn decode_block_header(&mut self) -> Result<bool> {
        if self.is_last_block {
            if !self.zlib {
                self.mode = Mode::Finished;
                return Ok(false);
            }
            // The trailer covers all output; deliver it first.
            if self.window.filled() > 0 {
                return Ok(false);
            }
            self.input.skip_to_byte_boundary();
            self.needed_bits = 32;
            self.read_adler = 0;
            self.mode = Mode::Checksum;
            return Ok(true);
        }

        let Some(header) = self.input.get_bits(3) else {
            return Ok(false);
        };
        self.is_last_block |= header & 1 != 0;

        match header >> 1 {
            0 => {
                trace!(last = self.is_last_block, "stored block");
                self.input.skip_to_byte_boundary();
                self.mode = Mode::StoredLen1;
            }
            1 => {
                trace!(last = self.is_last_block, "fixed Huffman block");
                self.litlen = Some(Cow::Borrowed(fixed_litlen_tree()?));
                self.dist = Some(Cow::Borrowed(fixed_distance_tree()?));
                self.mode = Mode::Huffman;
            }
            2 => {
                trace!(last = self.is_last_block, "dynamic Huffman block");
                self.dyn_header = Some(DynHeader::new());
                self.mode = Mode::DynHeader;
            }
            other => {
                return Err(OxiflateError::corrupted(format!(
                    "unknown block type {}",
                    other
                )));
            }
        }
        Ok(true)
    }

    /// Decode symbols while at least one maximal match fits in the window.
    fn decode_huffman(&mut self) -> Result<bool> {
        let mut free = self.window.free_space();
        while free >= MAX_MATCH {
            match self.mode {
                Mode::Huffman => {
                    let Some(litlen) = self.litlen.as_deref() else {
                        return Err(OxiflateError::invalid_state("literal/length table missing"));
                    };
                    loop {
                        let Some(symbol) = litlen.decode(&mut self.input)? else {
                            return Ok(false);
                        };
                        if symbol < 256 {
                            self.window.write_byte(symbol as u8)?;
                            free -= 1;
                            if free < MAX_MATCH {
                                return Ok(true);
                            }
                            continue;
                        }
                        if symbol == END_OF_BLOCK {
                            self.litlen = None;
                            self.dist = None;
                            self.mode = Mode::Blocks;
                            return Ok(true);
                        }
                        let index = usize::from(symbol - 257);
                        if index >= LENGTH_BASE.len() {
                            return Err(OxiflateError::corrupted(format!(
                                "illegal length code {}",
                                symbol
                            )));
                        }
                        self.rep_length = usize::from(LENGTH_BASE[index]);
                        self.needed_bits = u32::from(LENGTH_EXTRA_BITS[index]);
                        self.mode = Mode::HuffmanLenBits;
                        break;
                    }
                }
                Mode::HuffmanLenBits => {
                    if self.needed_bits > 0 {
                        let Some(extra) = self.input.get_bits(self.needed_bits) else {
                            return Ok(false);
                        };
                        self.rep_length += extra as usize;
                    }
                    self.mode = Mode::HuffmanDist;
                }
                Mode::HuffmanDist => {
                    let Some(dist) = self.dist.as_deref() else {
                        return Err(OxiflateError::invalid_state("distance table missing"));
                    };
                    let Some(symbol) = dist.decode(&mut self.input)? else {
                        return Ok(false);
                    };
                    let index = usize::from(symbol);
                    if index >= DISTANCE_BASE.len() {
                        return Err(OxiflateError::corrupted(format!(
                            "illegal distance code {}",
                            symbol
                        )));
                    }
                    self.rep_dist = usize::from(DISTANCE_BASE[index]);
                    self.needed_bits = u32::from(DISTANCE_EXTRA_BITS[index]);
                    self.mode = Mode::HuffmanDistBits;
                }
                Mode::HuffmanDistBits => {
                    if self.needed_bits > 0 {
                        let Some(extra) = self.input.get_bits(self.needed_bits) else {
                            return Ok(false);
                        };
                        self.rep_dist += extra as usize;
                    }
                    self.window.repeat(self.rep_length, self.rep_dist)?;
                    free -= self.rep_length;
                    self.mode = Mode::Huffman;
                }
                _ => return Err(OxiflateError::invalid_state("not inside a Huffman block")),
            }
        }
        Ok(true)
    }
}

impl InflateEngine for Inflater {
    fn set_input(&mut self, input: &[u8]) -> Result<()> {
        Inflater::set_input(self, input)
    }

    fn inflate(&mut self, output: &mut [u8]) -> Result<usize> {
        Inflater::inflate(self, output)
    }

    fn is_finished(&self) -> bool {
        Inflater::is_finished(self)
    }

    fn is_needing_input(&self) -> bool {
        Inflater::is_needing_input(self)
    }

    fn is_needing_dictionary(&self) -> bool {
        Inflater::is_needing_dictionary(self)
    }

    fn adler(&self) -> u32 {
        Inflater::adler(self)
    }
}
