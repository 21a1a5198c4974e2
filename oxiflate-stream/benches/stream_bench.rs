//! Performance benchmarks for oxiflate-stream
//!
//! Measures the adapter overhead on top of the engines:
//! - CompressionStream with different write sizes and output buffers
//! - DecompressionStream with different read sizes and input buffers
//! - ZipCrypto encryption in the write path

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxiflate_core::ZipCryptoEncryptor;
use oxiflate_deflate::{Deflater, Inflater};
use oxiflate_stream::{CompressionStream, DecompressionStream};
use std::hint::black_box;
use std::io::{Read, Write};

fn text_like(size: usize) -> Vec<u8> {
    let words: &[&[u8]] = &[
        b"stream", b"buffer", b"window", b"cursor", b"flush", b"finish", b"close", b"owner",
        b"engine", b"transform",
    ];
    let mut data = Vec::with_capacity(size + 16);
    let mut seed = 7u32;
    while data.len() < size {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        data.extend_from_slice(words[(seed >> 16) as usize % words.len()]);
        data.push(b' ');
    }
    data.truncate(size);
    data
}

fn bench_compress_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_stream");
    let data = text_like(512 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (write_size, buffer_size) in [(64usize, 512usize), (4096, 512), (4096, 8192), (65536, 65536)]
    {
        let id = format!("write{}_buf{}", write_size, buffer_size);
        group.bench_with_input(BenchmarkId::from_parameter(id), &data, |b, data| {
            b.iter(|| {
                let mut writer =
                    CompressionStream::with_buffer_size(Vec::new(), Deflater::new(6), buffer_size)
                        .unwrap();
                for chunk in data.chunks(write_size) {
                    writer.write_all(chunk).unwrap();
                }
                black_box(writer.into_inner().unwrap())
            });
        });
    }

    group.bench_with_input(BenchmarkId::from_parameter("zipcrypto"), &data, |b, data| {
        b.iter(|| {
            let mut writer = CompressionStream::new(Vec::new());
            writer.set_encryption(Some(Box::new(ZipCryptoEncryptor::new(b"bench"))));
            writer.write_all(data).unwrap();
            black_box(writer.into_inner().unwrap())
        });
    });

    group.finish();
}

fn bench_decompress_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress_stream");
    let data = text_like(512 * 1024);
    let compressed = oxiflate_deflate::deflate(&data, 6).unwrap();
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (read_size, buffer_size) in [(1usize, 4096usize), (512, 1024), (8192, 4096), (65536, 65536)]
    {
        let id = format!("read{}_buf{}", read_size, buffer_size);
        group.bench_with_input(BenchmarkId::from_parameter(id), &compressed, |b, compressed| {
            b.iter(|| {
                let mut reader = DecompressionStream::with_buffer_size(
                    compressed.as_slice(),
                    Inflater::new(),
                    buffer_size,
                );
                let mut buf = vec![0u8; read_size];
                let mut total = 0usize;
                loop {
                    let n = reader.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress_stream, bench_decompress_stream);
criterion_main!(benches);
