//! Integration tests for the blocking compression and decompression streams.
//!
//! These tests drive both adapters together through awkward sources and sinks:
//! one-byte reads, interrupted reads, encrypted payloads, preset dictionaries
//! and engines that misbehave.

use oxiflate_core::{
    CryptoTransform, DeflateEngine, InflateEngine, OxiflateError, Result, ZipCryptoDecryptor,
    ZipCryptoEncryptor,
};
use oxiflate_deflate::zlib::{Adler32, zlib_compress_with_dict};
use oxiflate_deflate::{Deflater, Inflater, deflate, inflate};
use oxiflate_stream::{CompressionStream, DecompressionStream};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn sample_text(size: usize) -> Vec<u8> {
    let words = [
        "deflate ", "window ", "stream ", "cursor ", "block ", "huffman ", "literal ",
    ];
    let mut state = 0x2545_F491u32;
    let mut out = Vec::with_capacity(size + 16);
    while out.len() < size {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        out.extend_from_slice(words[(state % words.len() as u32) as usize].as_bytes());
    }
    out.truncate(size);
    out
}

fn compress_stream(input: &[u8], chunk: usize) -> Vec<u8> {
    let mut writer = CompressionStream::new(Vec::new());
    for piece in input.chunks(chunk.max(1)) {
        writer.write_all(piece).unwrap();
    }
    writer.into_inner().unwrap()
}

/// Hands out one byte per read and interrupts every third call.
struct OneByteReader<'a> {
    data: &'a [u8],
    calls: usize,
}

impl Read for OneByteReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        if self.calls % 3 == 0 {
            return Err(io::Error::new(ErrorKind::Interrupted, "try again"));
        }
        if self.data.is_empty() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[0];
        self.data = &self.data[1..];
        Ok(1)
    }
}

/// A sink that counts how often it has been dropped.
struct TrackedSink {
    data: Vec<u8>,
    drops: Arc<AtomicUsize>,
}

impl Write for TrackedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TrackedSink {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn test_round_trip_default() {
    let input = sample_text(200_000);
    let compressed = compress_stream(&input, 4096);
    assert!(compressed.len() < input.len() / 2);

    let mut reader = DecompressionStream::new(compressed.as_slice());
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_round_trip_empty() {
    let compressed = compress_stream(b"", 1);
    assert!(inflate(&compressed).unwrap().is_empty());

    let mut reader = DecompressionStream::new(compressed.as_slice());
    let mut output = Vec::new();
    assert_eq!(reader.read_to_end(&mut output).unwrap(), 0);
}

#[test]
fn test_round_trip_zlib() {
    let input = sample_text(50_000);
    let mut writer = CompressionStream::zlib(Vec::new(), 9);
    writer.write_all(&input).unwrap();
    let compressed = writer.into_inner().unwrap();
    assert_eq!(compressed[0], 0x78);

    let mut reader = DecompressionStream::zlib(compressed.as_slice());
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
    assert_eq!(reader.engine().adler(), Adler32::checksum(&input));
}

#[test]
fn test_all_levels_through_streams() {
    let input = sample_text(20_000);
    for level in 0..=9u8 {
        let mut writer = CompressionStream::with_level(Vec::new(), level);
        writer.write_all(&input).unwrap();
        let compressed = writer.into_inner().unwrap();
        assert_eq!(compressed, deflate(&input, level).unwrap(), "level {}", level);

        let mut output = Vec::new();
        DecompressionStream::new(compressed.as_slice())
            .read_to_end(&mut output)
            .unwrap();
        assert_eq!(output, input, "level {}", level);
    }
}

#[test]
fn test_determinism_across_runs() {
    let first = compress_stream(b"AAAAAAAAAA", 10);
    let second = compress_stream(b"AAAAAAAAAA", 3);
    assert_eq!(first, second);
    assert_eq!(inflate(&first).unwrap(), b"AAAAAAAAAA");
}

// ============================================================================
// Partial Reads
// ============================================================================

#[test]
fn test_one_byte_source_matches_bulk_read() {
    let input = sample_text(30_000);
    let compressed = deflate(&input, 6).unwrap();

    let mut bulk = Vec::new();
    DecompressionStream::new(compressed.as_slice())
        .read_to_end(&mut bulk)
        .unwrap();

    let source = OneByteReader {
        data: &compressed,
        calls: 0,
    };
    let mut reader = DecompressionStream::with_buffer_size(source, Inflater::new(), 1);
    let mut trickled = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => trickled.push(byte[0]),
            Err(err) => panic!("read failed: {}", err),
        }
    }

    assert_eq!(bulk, input);
    assert_eq!(trickled, bulk);
}

#[test]
fn test_odd_read_sizes() {
    let input = sample_text(70_000);
    let compressed = deflate(&input, 9).unwrap();
    let mut reader = DecompressionStream::new(compressed.as_slice());

    let mut output = Vec::new();
    let mut sizes = [1usize, 7, 4096, 13, 65_536, 2].into_iter().cycle();
    loop {
        let mut buf = vec![0u8; sizes.next().unwrap_or(1)];
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        output.extend_from_slice(&buf[..n]);
    }
    assert_eq!(output, input);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_truncated_stream_is_unexpected_eof() {
    let input = sample_text(10_000);
    let compressed = deflate(&input, 6).unwrap();
    let mut reader = DecompressionStream::new(&compressed[..compressed.len() - 10]);

    let mut output = Vec::new();
    let err = reader.read_to_end(&mut output).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn test_corrupt_stream_is_invalid_data() {
    // Block type 3 is reserved.
    let mut reader = DecompressionStream::new(&[0x07u8, 0x00, 0x00][..]);
    let mut output = Vec::new();
    let err = reader.read_to_end(&mut output).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn test_needs_dictionary_surfaces_then_resumes() {
    let dictionary = b"common prefix shared by every record, ".repeat(4);
    let input = b"common prefix shared by every record, payload 42".to_vec();
    let compressed = zlib_compress_with_dict(&input, 6, &dictionary).unwrap();

    let mut reader = DecompressionStream::zlib(compressed.as_slice());
    let mut buf = [0u8; 256];
    match reader.read_inflated(&mut buf) {
        Err(OxiflateError::NeedsDictionary { dict_id }) => {
            assert_eq!(dict_id, Adler32::checksum(&dictionary));
        }
        other => panic!("expected NeedsDictionary, got {:?}", other),
    }

    reader.engine_mut().set_dictionary(&dictionary).unwrap();
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_unsupported_operations_downcast() {
    let mut writer = CompressionStream::new(Vec::new());
    let err = writer.read(&mut [0u8; 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    let inner = err
        .get_ref()
        .and_then(|e| e.downcast_ref::<OxiflateError>())
        .unwrap();
    assert!(matches!(inner, OxiflateError::Unsupported { .. }));

    let mut reader = DecompressionStream::new(&b""[..]);
    assert_eq!(
        reader.write(b"nope").unwrap_err().kind(),
        ErrorKind::Unsupported
    );
}

/// Accepts input but never produces a byte.
struct StalledDeflater {
    pending: usize,
}

impl DeflateEngine for StalledDeflater {
    fn set_input(&mut self, input: &[u8]) -> Result<()> {
        self.pending += input.len();
        Ok(())
    }

    fn deflate(&mut self, _output: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn flush(&mut self) {}

    fn finish(&mut self) {}

    fn is_finished(&self) -> bool {
        false
    }

    fn is_needing_input(&self) -> bool {
        self.pending == 0
    }
}

#[test]
fn test_stalled_engine_cannot_deflate_all_input() {
    let mut writer =
        CompressionStream::with_engine(Vec::new(), StalledDeflater { pending: 0 }).unwrap();
    assert!(matches!(
        writer.write_input(b"stuck"),
        Err(OxiflateError::CantDeflateAllInput)
    ));

    let mut writer =
        CompressionStream::with_engine(Vec::new(), StalledDeflater { pending: 0 }).unwrap();
    assert!(matches!(
        writer.finish(),
        Err(OxiflateError::CantDeflateAllInput)
    ));
    assert!(matches!(
        writer.close(),
        Err(OxiflateError::CantDeflateAllInput)
    ));
    assert!(writer.close().is_ok());
}

/// Never finishes, never asks for input, never produces output.
struct WedgedInflater;

impl InflateEngine for WedgedInflater {
    fn set_input(&mut self, _input: &[u8]) -> Result<()> {
        Ok(())
    }

    fn inflate(&mut self, _output: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn is_finished(&self) -> bool {
        false
    }

    fn is_needing_input(&self) -> bool {
        false
    }

    fn is_needing_dictionary(&self) -> bool {
        false
    }
}

#[test]
fn test_wedged_engine_is_invalid_input_data() {
    let mut reader = DecompressionStream::with_engine(&b"data"[..], WedgedInflater);
    assert!(matches!(
        reader.read_inflated(&mut [0u8; 8]),
        Err(OxiflateError::InvalidInputData)
    ));
}

// ============================================================================
// Flush And Close
// ============================================================================

#[test]
fn test_flush_makes_output_decodable() {
    let first = sample_text(5_000);
    let mut writer = CompressionStream::new(Vec::new());
    writer.write_all(&first).unwrap();
    writer.flush().unwrap();

    let partial = writer.get_ref().unwrap().clone();
    assert_eq!(&partial[partial.len() - 4..], &[0x00, 0x00, 0xFF, 0xFF]);

    let mut inflater = Inflater::new();
    inflater.set_input(&partial).unwrap();
    let mut decoded = vec![0u8; first.len() + 100];
    let mut produced = 0;
    loop {
        let n = inflater.inflate(&mut decoded[produced..]).unwrap();
        if n == 0 {
            break;
        }
        produced += n;
    }
    assert_eq!(&decoded[..produced], first.as_slice());
    assert!(!inflater.is_finished());

    writer.write_all(b"and the tail").unwrap();
    let compressed = writer.into_inner().unwrap();
    let mut expected = first.clone();
    expected.extend_from_slice(b"and the tail");
    assert_eq!(inflate(&compressed).unwrap(), expected);
}

#[test]
fn test_close_is_idempotent_and_drops_owned_sink() {
    let drops = Arc::new(AtomicUsize::new(0));
    let sink = TrackedSink {
        data: Vec::new(),
        drops: Arc::clone(&drops),
    };

    let mut writer = CompressionStream::new(sink);
    writer.write_all(b"owned sink").unwrap();
    writer.close().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    writer.close().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(writer.get_ref().is_none());

    drop(writer);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_keeps_unowned_sink() {
    let drops = Arc::new(AtomicUsize::new(0));
    let sink = TrackedSink {
        data: Vec::new(),
        drops: Arc::clone(&drops),
    };

    let mut writer = CompressionStream::new(sink);
    writer.set_stream_owner(false);
    writer.write_all(b"borrowed sink").unwrap();
    writer.close().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let sink = writer.into_inner().unwrap();
    assert_eq!(inflate(&sink.data).unwrap(), b"borrowed sink");
    drop(sink);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_finishes_stream() {
    let mut compressed = Vec::new();
    {
        let mut writer = CompressionStream::new(&mut compressed);
        writer.write_all(b"finished by drop").unwrap();
    }
    assert_eq!(inflate(&compressed).unwrap(), b"finished by drop");
}

#[test]
fn test_decompression_close_drops_owned_source() {
    let compressed = deflate(b"abc", 6).unwrap();
    let mut reader = DecompressionStream::new(io::Cursor::new(compressed));
    reader.close();
    reader.close();
    assert!(reader.get_ref().is_none());
    assert!(reader.into_inner().is_none());
}

// ============================================================================
// Encryption
// ============================================================================

#[test]
fn test_zip_crypto_round_trip() {
    let input = sample_text(40_000);

    let mut writer = CompressionStream::new(Vec::new());
    writer.set_encryption(Some(Box::new(ZipCryptoEncryptor::new(b"hunter2"))));
    writer.write_all(&input).unwrap();
    let encrypted = writer.into_inner().unwrap();
    assert_ne!(encrypted, deflate(&input, 6).unwrap());

    let mut reader = DecompressionStream::new(encrypted.as_slice());
    reader
        .set_decryption(Box::new(ZipCryptoDecryptor::new(b"hunter2")))
        .unwrap();
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_decryption_activated_mid_buffer() {
    // A plain length prefix, then an encrypted compressed payload.
    let input = sample_text(3_000);
    let mut payload = deflate(&input, 6).unwrap();
    ZipCryptoEncryptor::new(b"pw")
        .transform_in_place(&mut payload)
        .unwrap();
    let mut framed = (payload.len() as u32).to_le_bytes().to_vec();
    framed.extend_from_slice(&payload);

    let mut reader = DecompressionStream::new(framed.as_slice());
    let length = reader.input_buffer_mut().read_le_int().unwrap();
    assert_eq!(length as usize, payload.len());

    reader
        .set_decryption(Box::new(ZipCryptoDecryptor::new(b"pw")))
        .unwrap();
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
}

#[test]
fn test_stop_decrypting_passes_bytes_through() {
    let input = b"no cipher after all".to_vec();
    let compressed = deflate(&input, 6).unwrap();

    let mut reader = DecompressionStream::new(compressed.as_slice());
    reader
        .set_decryption(Box::new(ZipCryptoDecryptor::new(b"pw")))
        .unwrap();
    reader.stop_decrypting().unwrap();
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, input);
}

/// XOR cipher that reports the number of bytes it processed as its code.
struct CountingXor {
    processed: Arc<AtomicUsize>,
}

impl CryptoTransform for CountingXor {
    fn transform_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        for (out, &byte) in output.iter_mut().zip(input) {
            *out = byte ^ 0x5A;
        }
        self.processed.fetch_add(input.len(), Ordering::SeqCst);
        Ok(input.len())
    }

    fn authentication_code(&mut self) -> Option<Vec<u8>> {
        let count = self.processed.load(Ordering::SeqCst) as u32;
        Some(count.to_be_bytes().to_vec())
    }
}

#[test]
fn test_authentication_code_captured_on_finish() {
    let processed = Arc::new(AtomicUsize::new(0));
    let mut writer = CompressionStream::new(Vec::new());
    writer.set_encryption(Some(Box::new(CountingXor {
        processed: Arc::clone(&processed),
    })));
    writer.write_all(&sample_text(10_000)).unwrap();
    assert!(writer.authentication_code().is_none());

    writer.finish().unwrap();
    let written = writer.get_ref().unwrap().len();
    assert_eq!(processed.load(Ordering::SeqCst), written);
    assert_eq!(
        writer.authentication_code(),
        Some(&(written as u32).to_be_bytes()[..])
    );

    // The transform is gone: closing writes nothing more and keeps the code.
    writer.close().unwrap();
    assert_eq!(processed.load(Ordering::SeqCst), written);
    assert!(writer.authentication_code().is_some());
}

#[test]
fn test_boxed_engines() {
    let engine: Box<dyn DeflateEngine> = Box::new(Deflater::new(3));
    let mut writer = CompressionStream::with_engine(Vec::new(), engine).unwrap();
    writer.write_all(b"boxed engine").unwrap();
    let compressed = writer.into_inner().unwrap();

    let engine: Box<dyn InflateEngine> = Box::new(Inflater::new());
    let mut reader = DecompressionStream::with_engine(compressed.as_slice(), engine);
    let mut output = Vec::new();
    reader.read_to_end(&mut output).unwrap();
    assert_eq!(output, b"boxed engine");
}
