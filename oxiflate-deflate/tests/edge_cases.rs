//! Edge case tests for DEFLATE compression.

use oxiflate_core::OxiflateError;
use oxiflate_deflate::zlib::{zlib_compress, zlib_decompress};
use oxiflate_deflate::{Deflater, Inflater, deflate, inflate};

fn pseudo_random(size: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        })
        .collect()
}

/// Feed `compressed` in `split`-sized chunks and drain through a `out_size` buffer.
fn inflate_chunked(compressed: &[u8], split: usize, out_size: usize) -> Vec<u8> {
    let mut inflater = Inflater::new();
    let mut output = Vec::new();
    let mut buf = vec![0u8; out_size];
    for chunk in compressed.chunks(split) {
        inflater.set_input(chunk).unwrap();
        loop {
            let n = inflater.inflate(&mut buf).unwrap();
            output.extend_from_slice(&buf[..n]);
            if n == 0 {
                break;
            }
        }
    }
    assert!(inflater.is_finished());
    output
}

#[test]
fn test_empty_input() {
    let input = b"";
    let compressed = deflate(input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_single_byte() {
    let input = b"A";
    let compressed = deflate(input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_all_same_byte() {
    let input = vec![255u8; 5000];
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 20);
}

#[test]
fn test_max_match_length() {
    let input = vec![42u8; 258 * 10];
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_all_literals() {
    let input = pseudo_random(10_000, 0xDEAD_BEEF);
    for level in [1, 6, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {}", level);
    }
}

#[test]
fn test_utf8_text() {
    let input = "Grüße aus Zürich! 日本語のテキスト。Ελληνικά κείμενα. ".repeat(200);
    let compressed = deflate(input.as_bytes(), 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input.as_bytes());
}

#[test]
fn test_alternating_pattern() {
    let input: Vec<u8> = (0..1000).map(|i| if i % 2 == 0 { b'A' } else { b'B' }).collect();
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_large_input() {
    // Several MB crosses many blocks and window slides.
    let mut input = b"The quick brown fox jumps over the lazy dog. ".repeat(70_000);
    input.extend(pseudo_random(512 * 1024, 7));
    let compressed = deflate(&input, 5).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed.len(), input.len());
    assert_eq!(decompressed, input);
}

#[test]
fn test_exactly_one_window() {
    let input = pseudo_random(32768, 99);
    for level in [0, 6] {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input);
        assert_eq!(inflate_chunked(&compressed, 1000, 32768), input);
    }
}

#[test]
fn test_incremental_pattern() {
    let input: Vec<u8> = (0..=255u8).flat_map(|i| [i; 10]).collect();
    let compressed = deflate(&input, 1).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_compression_levels() {
    let input = b"Hello, world! This is a test of DEFLATE compression with various levels.";

    for level in 0..=9 {
        let compressed = deflate(input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "Level {} failed", level);
        if level == 0 {
            assert!(compressed.len() > input.len());
        }
    }
}

#[test]
fn test_binary_data() {
    let input: Vec<u8> = (0..=255).cycle().take(5000).collect();
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_long_distance_match() {
    // A match at the maximum distance (32 KB).
    let mut input = vec![0u8; 32768 + 16];
    let pattern = b"PATTERN_TO_MATCH";
    input[..16].copy_from_slice(pattern);
    input[32768..].copy_from_slice(pattern);

    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_arbitrary_chunk_boundaries() {
    let input = b"chunk boundaries can fall anywhere in the bit stream. ".repeat(400);
    let compressed = deflate(&input, 6).unwrap();
    for split in [1, 2, 3, 7, 64, 4095] {
        for out_size in [1, 300, 70_000] {
            assert_eq!(
                inflate_chunked(&compressed, split, out_size),
                input,
                "split {} out {}",
                split,
                out_size
            );
        }
    }
}

#[test]
fn test_deterministic_repeated_run() {
    let first = deflate(b"AAAAAAAAAA", 6).unwrap();
    assert_eq!(first, deflate(b"AAAAAAAAAA", 6).unwrap());
    assert_eq!(inflate(&first).unwrap(), b"AAAAAAAAAA");
}

#[test]
fn test_streaming_deflate_matches_one_shot() {
    let input = pseudo_random(100_000, 3)
        .iter()
        .map(|b| b % 16 + b'a')
        .collect::<Vec<u8>>();

    let mut deflater = Deflater::new(6);
    let mut compressed = Vec::new();
    let mut buf = [0u8; 512];
    for chunk in input.chunks(3000) {
        deflater.set_input(chunk).unwrap();
        while !deflater.is_needing_input() {
            let n = deflater.deflate(&mut buf).unwrap();
            compressed.extend_from_slice(&buf[..n]);
        }
    }
    deflater.finish();
    while !deflater.is_finished() {
        let n = deflater.deflate(&mut buf).unwrap();
        compressed.extend_from_slice(&buf[..n]);
    }

    assert_eq!(compressed, deflate(&input, 6).unwrap());
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_truncated_stream_reports_eof() {
    let compressed = deflate(&b"truncate me please ".repeat(50), 6).unwrap();
    let truncated = &compressed[..compressed.len() - 3];
    assert!(matches!(
        inflate(truncated),
        Err(OxiflateError::UnexpectedEof { .. })
    ));
}

#[test]
fn test_distance_before_stream_start() {
    // Fixed block: literal 'a', then length 3 at distance 2 (only 1 byte of history).
    let mut pending = oxiflate_deflate::PendingBuffer::new();
    let codes = oxiflate_deflate::tables::fixed_litlen_codes();
    pending.write_bits(0b011, 3);
    pending.write_bits(u32::from(codes[usize::from(b'a')]), 8);
    pending.write_bits(u32::from(codes[257]), 7);
    pending.write_bits(u32::from(oxiflate_deflate::tables::fixed_distance_codes()[1]), 5);
    pending.write_bits(u32::from(codes[256]), 7);
    pending.align_to_byte();
    let mut data = vec![0u8; pending.pending_bytes()];
    pending.flush_to(&mut data);

    assert!(matches!(
        inflate(&data),
        Err(OxiflateError::InvalidDistance {
            distance: 2,
            history_size: 1
        })
    ));
}

#[test]
fn test_zlib_large_round_trip() {
    let input = pseudo_random(200_000, 11)
        .iter()
        .map(|b| b % 4)
        .collect::<Vec<u8>>();
    let compressed = zlib_compress(&input, 9).unwrap();
    assert_eq!(zlib_decompress(&compressed).unwrap(), input);
}
