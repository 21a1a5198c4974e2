//! LZ77 match finding for DEFLATE.
//!
//! The encoder keeps up to two windows' worth of data (64 KB) and indexes every
//! position by a hash of its next three bytes. Each hash bucket heads a chain
//! of earlier positions with the same hash; matches are found by walking that
//! chain, limited to a per-level depth.
//!
//! # Algorithm
//!
//! For each position the longest match within the last 32 KB is searched and
//! either:
//! - a literal byte is emitted if no acceptable match is found, or
//! - a (length, distance) pair is emitted for a match of `min_match`+ bytes.
//!
//! With lazy matching the next position is also searched; if it yields a
//! longer match, the current byte goes out as a literal instead.

/// Maximum back-reference distance (32 KB).
pub const WINDOW_SIZE: usize = 32768;

/// Minimum match length.
pub const MIN_MATCH: usize = 3;

/// Maximum match length.
pub const MAX_MATCH: usize = 258;

/// Size of the hash table (power of 2).
const HASH_SIZE: usize = 1 << 15;

/// Hash mask.
const HASH_MASK: usize = HASH_SIZE - 1;

/// Chain terminator.
const NIL: u32 = u32::MAX;

/// A token produced by LZ77 compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to previously seen data.
    Match {
        /// Number of bytes to copy (3-258).
        length: u16,
        /// Distance back into the window (1-32768).
        distance: u16,
    },
}

/// Search parameters for one compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelParams {
    /// Hash chain entries examined per search.
    max_chain: usize,
    /// Shortest match accepted.
    min_match: usize,
    /// Whether to try the following position before committing to a match.
    lazy: bool,
}

impl LevelParams {
    fn for_level(level: u8) -> Self {
        let (max_chain, min_match, lazy) = match level.min(9) {
            0 => (0, MAX_MATCH + 1, false),
            1 => (4, 4, false),
            2 => (8, 4, false),
            3 => (16, 4, false),
            4 => (32, 4, false),
            5 => (64, 4, true),
            6 => (128, 4, true),
            7 => (256, 3, true),
            8 => (1024, 3, true),
            _ => (4096, 3, true),
        };
        Self {
            max_chain,
            min_match,
            lazy,
        }
    }
}

/// LZ77 encoder for DEFLATE compression.
///
/// History carries over between [`compress`](Self::compress) calls, so
/// consecutive blocks of one stream can reference each other.
#[derive(Debug, Clone)]
pub struct Lz77Encoder {
    /// Two windows of data; the upper half slides down when full.
    window: Vec<u8>,
    /// End of valid data in `window`.
    window_pos: usize,
    /// Next position to enter into the hash chains.
    insert_pos: usize,
    /// Most recent position for each hash.
    head: Vec<u32>,
    /// Previous position with the same hash, indexed by position mod 32 KB.
    prev: Vec<u32>,
    params: LevelParams,
}

impl Lz77Encoder {
    /// Create a new LZ77 encoder with default settings.
    pub fn new() -> Self {
        Self::with_level(6)
    }

    /// Create a new LZ77 encoder with the specified compression level (0-9).
    pub fn with_level(level: u8) -> Self {
        Self {
            window: vec![0; WINDOW_SIZE * 2],
            window_pos: 0,
            insert_pos: 0,
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; WINDOW_SIZE],
            params: LevelParams::for_level(level),
        }
    }

    /// Change the search parameters; history is kept.
    pub fn set_level(&mut self, level: u8) {
        self.params = LevelParams::for_level(level);
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.window_pos = 0;
        self.insert_pos = 0;
        self.head.fill(NIL);
        self.prev.fill(NIL);
    }

    /// Preload a dictionary so the first bytes can reference it.
    ///
    /// Resets the encoder; only the last 32 KB of `dictionary` are used.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) {
        self.reset();
        let dictionary = &dictionary[dictionary.len().saturating_sub(WINDOW_SIZE)..];
        self.window[..dictionary.len()].copy_from_slice(dictionary);
        self.window_pos = dictionary.len();
        self.insert_up_to(self.window_pos);
    }

    /// Bytes of history currently held.
    pub fn history_len(&self) -> usize {
        self.window_pos.min(WINDOW_SIZE)
    }

    #[inline(always)]
    fn hash(b0: u8, b1: u8, b2: u8) -> usize {
        let h = (u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2);
        (h.wrapping_mul(0x9E37_79B1) >> 17) as usize & HASH_MASK
    }

    /// Enter every position below `limit` whose three hash bytes are known.
    fn insert_up_to(&mut self, limit: usize) {
        let limit = limit.min(self.window_pos.saturating_sub(MIN_MATCH - 1));
        while self.insert_pos < limit {
            let pos = self.insert_pos;
            let h = Self::hash(self.window[pos], self.window[pos + 1], self.window[pos + 2]);
            self.prev[pos & (WINDOW_SIZE - 1)] = self.head[h];
            self.head[h] = pos as u32;
            self.insert_pos += 1;
        }
    }

    /// Longest match for `pos` that ends before `end`, as `(length, distance)`.
    fn find_match(&self, pos: usize, end: usize) -> Option<(u16, u16)> {
        let max_len = (end - pos).min(MAX_MATCH);
        if max_len < self.params.min_match || max_len < MIN_MATCH {
            return None;
        }

        let h = Self::hash(self.window[pos], self.window[pos + 1], self.window[pos + 2]);
        let min_pos = pos.saturating_sub(WINDOW_SIZE);
        let mut candidate = self.head[h];
        let mut best_len = self.params.min_match.max(MIN_MATCH) - 1;
        let mut best_dist = 0;
        let mut chain = 0;

        while candidate != NIL && chain < self.params.max_chain {
            let cand = candidate as usize;
            if cand < min_pos || cand >= pos {
                break;
            }

            // Reject quickly on the byte that would have to extend the best match.
            if self.window[cand + best_len] == self.window[pos + best_len] {
                let len = self.window[cand..cand + max_len]
                    .iter()
                    .zip(&self.window[pos..pos + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();
                if len > best_len {
                    best_len = len;
                    best_dist = pos - cand;
                    if len == max_len {
                        break;
                    }
                }
            }

            let next = self.prev[cand & (WINDOW_SIZE - 1)];
            // A slot reused by a newer position ends the chain.
            if next != NIL && next as usize >= cand {
                break;
            }
            candidate = next;
            chain += 1;
        }

        (best_dist > 0).then(|| (best_len as u16, best_dist as u16))
    }

    /// Compress input data to LZ77 tokens.
    pub fn compress(&mut self, input: &[u8]) -> Vec<Lz77Token> {
        let mut tokens = Vec::with_capacity(input.len());
        let mut input_pos = 0;

        while input_pos < input.len() {
            if self.window_pos == self.window.len() {
                self.slide_window();
            }

            let chunk_size = (self.window.len() - self.window_pos).min(input.len() - input_pos);
            let start = self.window_pos;
            let end = start + chunk_size;
            self.window[start..end].copy_from_slice(&input[input_pos..input_pos + chunk_size]);
            self.window_pos = end;
            input_pos += chunk_size;

            let mut pos = start;
            while pos < end {
                self.insert_up_to(pos);
                let Some((length, distance)) = self.find_match(pos, end) else {
                    tokens.push(Lz77Token::Literal(self.window[pos]));
                    pos += 1;
                    continue;
                };

                if self.params.lazy && usize::from(length) < MAX_MATCH && pos + 1 < end {
                    self.insert_up_to(pos + 1);
                    if let Some((next_len, _)) = self.find_match(pos + 1, end) {
                        if next_len > length {
                            tokens.push(Lz77Token::Literal(self.window[pos]));
                            pos += 1;
                            continue;
                        }
                    }
                }

                tokens.push(Lz77Token::Match { length, distance });
                pos += usize::from(length);
            }
            self.insert_up_to(end);
        }

        tokens
    }

    /// Move the upper window down, keeping 32 KB of history.
    fn slide_window(&mut self) {
        self.window.copy_within(WINDOW_SIZE..self.window_pos, 0);
        self.window_pos -= WINDOW_SIZE;
        self.insert_pos = self.insert_pos.saturating_sub(WINDOW_SIZE);

        let rebase = |entry: &mut u32| {
            *entry = match *entry {
                NIL => NIL,
                pos if pos as usize >= WINDOW_SIZE => pos - WINDOW_SIZE as u32,
                _ => NIL,
            };
        };
        self.head.iter_mut().for_each(rebase);
        self.prev.iter_mut().for_each(rebase);
    }

    /// Compress all data at once (convenience method).
    pub fn compress_all(input: &[u8], level: u8) -> Vec<Lz77Token> {
        let mut encoder = Self::with_level(level);
        encoder.compress(input)
    }
}

impl Default for Lz77Encoder {
    fn default() -> Self {
        Self::new()
    }
}
