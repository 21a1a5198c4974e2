//! Error types for OxiFlate operations.
//!
//! Errors fall into two classes. Structural errors (window overflow, corrupt
//! Huffman data, engine contract violations) mean the current stream cannot
//! make further progress and must not be retried by the same call. Per-call
//! errors (truncated metadata, closed streams, cancellation) describe a single
//! failed request. Running out of buffered input is never an error inside the
//! refill loops; it only surfaces as an ordinary end of stream.

use std::io;
use thiserror::Error;

/// The main error type for OxiFlate operations.
#[derive(Debug, Error)]
pub enum OxiflateError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write or back-reference would overflow the history window.
    #[error("Window full: {needed} bytes requested, {free} bytes free")]
    WindowOverflow {
        /// Bytes the operation wanted to store.
        needed: usize,
        /// Free space left in the window.
        free: usize,
    },

    /// Invalid distance in an LZ77 back-reference.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Bytes of history available.
        history_size: usize,
    },

    /// A byte-aligned copy was requested while the bit buffer held a partial byte.
    #[error("Bit buffer is not byte aligned ({bits} bits buffered)")]
    NotByteAligned {
        /// Bits currently buffered.
        bits: u32,
    },

    /// New input was supplied before the previous chunk was consumed.
    #[error("Old input was not completely processed ({remaining} bytes left)")]
    InputNotConsumed {
        /// Unread bytes from the previous chunk.
        remaining: usize,
    },

    /// The encode engine kept input or stopped producing output before finishing.
    #[error("Can't deflate all input")]
    CantDeflateAllInput,

    /// The decode engine produced nothing without asking for more input.
    #[error("Invalid input data")]
    InvalidInputData,

    /// The stream requires a preset dictionary.
    #[error("Need a dictionary (id {dict_id:#010x})")]
    NeedsDictionary {
        /// Adler-32 of the dictionary the stream was compressed with.
        dict_id: u32,
    },

    /// Invalid Huffman code encountered during decompression.
    #[error("Invalid Huffman code: {message}")]
    InvalidHuffmanCode {
        /// Description of the invalid code.
        message: String,
    },

    /// Corrupted compressed data.
    #[error("Corrupted data: {message}")]
    CorruptedData {
        /// Description of the corruption.
        message: String,
    },

    /// Invalid stream header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Checksum mismatch.
    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the stream.
        expected: u32,
        /// Checksum computed from the data.
        computed: u32,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the violated precondition.
        message: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of file: {context}")]
    UnexpectedEof {
        /// What was being read.
        context: String,
    },

    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument error.
        message: String,
    },

    /// The operation is not supported by this stream type.
    #[error("{operation} is not supported")]
    Unsupported {
        /// The rejected operation.
        operation: String,
    },

    /// The stream was already closed.
    #[error("Stream is closed")]
    StreamClosed,

    /// An asynchronous operation was cancelled at a suspension point.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for OxiFlate operations.
pub type Result<T> = std::result::Result<T, OxiflateError>;

impl OxiflateError {
    /// Create a window overflow error.
    pub fn window_overflow(needed: usize, free: usize) -> Self {
        Self::WindowOverflow { needed, free }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history_size: usize) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(message: impl Into<String>) -> Self {
        Self::InvalidHuffmanCode {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedData {
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(context: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            context: context.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Whether the error leaves the stream unable to make further progress.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WindowOverflow { .. }
                | Self::InvalidDistance { .. }
                | Self::NotByteAligned { .. }
                | Self::InputNotConsumed { .. }
                | Self::CantDeflateAllInput
                | Self::InvalidInputData
                | Self::NeedsDictionary { .. }
                | Self::InvalidHuffmanCode { .. }
                | Self::CorruptedData { .. }
                | Self::InvalidHeader { .. }
                | Self::ChecksumMismatch { .. }
                | Self::InvalidState { .. }
        )
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Io(err) => err.kind(),
            Self::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
            Self::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            Self::Unsupported { .. } => io::ErrorKind::Unsupported,
            Self::Cancelled => io::ErrorKind::Interrupted,
            Self::StreamClosed => io::ErrorKind::BrokenPipe,
            Self::InvalidState { .. }
            | Self::InputNotConsumed { .. }
            | Self::NotByteAligned { .. }
            | Self::WindowOverflow { .. }
            | Self::CantDeflateAllInput => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        }
    }
}

impl From<OxiflateError> for io::Error {
    fn from(err: OxiflateError) -> Self {
        match err {
            // Underlying stream errors propagate unchanged.
            OxiflateError::Io(inner) => inner,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}
