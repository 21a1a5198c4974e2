//! # OxiFlate Stream
//!
//! `std::io` adapters that put a DEFLATE engine between a caller and an
//! underlying byte stream.
//!
//! - [`DecompressionStream`]: a [`Read`](std::io::Read) that pulls compressed
//!   bytes from a source through a [`DecodeInputBuffer`] into an
//!   [`InflateEngine`](oxiflate_core::InflateEngine).
//! - [`CompressionStream`]: a [`Write`](std::io::Write) that pushes
//!   everything written through a [`DeflateEngine`](oxiflate_core::DeflateEngine)
//!   into a sink.
//! - `AsyncCompressionStream` (feature `async-io`): the same encoder side over
//!   a tokio `AsyncWrite`, with suspendable and cancellable finish/close.
//!
//! Both directions accept an optional [`CryptoTransform`](oxiflate_core::CryptoTransform):
//! compressed bytes are encrypted on their way to the sink and decrypted on
//! their way out of the source.
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_stream::{CompressionStream, DecompressionStream};
//! use std::io::{Read, Write};
//!
//! let mut compressed = Vec::new();
//! {
//!     let mut writer = CompressionStream::new(&mut compressed);
//!     writer.write_all(b"Hello, stream!").unwrap();
//!     writer.close().unwrap();
//! }
//!
//! let mut reader = DecompressionStream::new(compressed.as_slice());
//! let mut text = String::new();
//! reader.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "Hello, stream!");
//! ```
//!
//! ## Ownership
//!
//! Every stream carries an `is_stream_owner` flag (default `true`). When set,
//! closing the stream drops the underlying reader or writer. When cleared,
//! the underlying stream stays inside the adapter after `close()` and can be
//! recovered with `into_inner()`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "async-io")]
pub mod async_compress;
pub mod compress;
pub mod decompress;
pub mod input_buffer;

// Re-exports
#[cfg(feature = "async-io")]
pub use async_compress::AsyncCompressionStream;
pub use compress::CompressionStream;
pub use decompress::DecompressionStream;
pub use input_buffer::DecodeInputBuffer;

/// Default scratch size for compressed output.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 512;

/// Smallest accepted scratch size for compressed output.
pub const MIN_OUTPUT_BUFFER_SIZE: usize = 512;

/// Default raw input buffer size for decompression.
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 4096;

/// Smallest raw input buffer; requests below it are raised to it.
pub const MIN_INPUT_BUFFER_SIZE: usize = 1024;

/// Chunk size used when skipping over an unseekable source.
pub const SKIP_CHUNK_SIZE: usize = 2048;

/// Report `operation` as unsupported through `std::io`.
pub(crate) fn unsupported(operation: &str) -> std::io::Error {
    oxiflate_core::OxiflateError::unsupported(operation).into()
}
