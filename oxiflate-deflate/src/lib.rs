//! # OxiFlate Deflate
//!
//! Reference streaming engines for DEFLATE (RFC 1951) and zlib (RFC 1950).
//!
//! [`Deflater`] and [`Inflater`] are push/pull state machines: input is handed
//! over in chunks of any size and output is pulled into caller slices of any
//! size. They implement the [`DeflateEngine`](oxiflate_core::DeflateEngine) and
//! [`InflateEngine`](oxiflate_core::InflateEngine) traits consumed by the
//! stream adapters in `oxiflate-stream`.
//!
//! ## Features
//!
//! - **Decompression**: all DEFLATE block types
//!   - Stored (uncompressed) blocks
//!   - Fixed Huffman codes
//!   - Dynamic Huffman codes
//! - **Compression**: LZ77 + Huffman encoding
//!   - Multiple compression levels (0-9)
//!   - Per-block choice of stored, fixed or dynamic encoding
//!   - Sync flush
//! - **Zlib framing** with Adler-32 and preset dictionaries
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//!
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: No compression (stored blocks)
//! - Level 1-3: Fast compression
//! - Level 4-6: Balanced (default is 6)
//! - Level 7-9: Best compression (slower)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflater;
pub mod huffman;
pub mod inflater;
pub mod lz77;
pub mod pending;
pub mod tables;
pub mod zlib;

use oxiflate_core::Result;

// Re-exports
pub use deflater::{BLOCK_SIZE, Deflater};
pub use huffman::{HuffmanBuilder, HuffmanTree};
pub use inflater::Inflater;
pub use lz77::{Lz77Encoder, Lz77Token};
pub use pending::PendingBuffer;
pub use zlib::{Adler32, zlib_compress, zlib_decompress};

/// Compress data to a raw DEFLATE stream.
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    Deflater::new(level).compress_to_vec(data)
}

/// Decompress a complete raw DEFLATE stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    Inflater::new().decompress_to_vec(data, None)
}
