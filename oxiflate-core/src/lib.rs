//! # OxiFlate Core
//!
//! Core components for the OxiFlate streaming DEFLATE library.
//!
//! This crate provides the bit- and byte-level building blocks shared by the
//! engines and the stream adapters:
//!
//! - [`bitstream`]: LSB-first bit cursor over caller-supplied input chunks
//! - [`window`]: 32 KB circular history window for back-references
//! - [`traits`]: Engine traits consumed by the stream adapters
//! - [`transform`]: Encrypt/decrypt transforms applied to compressed bytes
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Streams                                                 │
//! │     DecompressionStream, CompressionStream (sync/async) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Engines                                                 │
//! │     Inflater, Deflater (LZ77 + Huffman, zlib framing)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     BitCursor, HistoryWindow, transforms, traits        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_core::{BitCursor, HistoryWindow};
//!
//! // A stored run copied straight from the input chunk.
//! let mut cursor = BitCursor::new();
//! cursor.set_input(b"abcd").unwrap();
//!
//! let mut window = HistoryWindow::new();
//! assert_eq!(window.copy_stored(&mut cursor, 4).unwrap(), 4);
//! window.repeat(4, 4).unwrap();
//!
//! let mut out = [0u8; 8];
//! window.drain_to(&mut out).unwrap();
//! assert_eq!(&out, b"abcdabcd");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod error;
pub mod traits;
pub mod transform;
pub mod window;

// Re-exports for convenience
pub use bitstream::BitCursor;
pub use error::{OxiflateError, Result};
pub use traits::{CompressionLevel, DeflateEngine, InflateEngine};
pub use transform::{CryptoTransform, ZipCryptoDecryptor, ZipCryptoEncryptor, ZipCryptoKeys};
pub use window::{HistoryWindow, RepeatCopy, WINDOW_SIZE};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::BitCursor;
    pub use crate::error::{OxiflateError, Result};
    pub use crate::traits::{CompressionLevel, DeflateEngine, InflateEngine};
    pub use crate::transform::CryptoTransform;
    pub use crate::window::HistoryWindow;
}
