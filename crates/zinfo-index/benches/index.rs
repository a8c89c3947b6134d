use std::io::Write;

use flate2::{write::GzEncoder, Compression};
use zinfo_index::{build_from_bytes, extract_range, SeekableIndex, SpanIndex};

fn make_data(size: usize) -> Vec<u8> {
    // Semi-realistic data: repeating pattern with some entropy
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3) ^ (i >> 11)) as u8 % 64 + b' ')
        .collect()
}

fn make_gzip(size: usize) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&make_data(size)).unwrap();
    enc.finish().unwrap()
}

#[divan::bench(args = [65536, 1048576, 10485760])]
fn build_index(bencher: divan::Bencher, size: usize) {
    let gz = make_gzip(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| build_from_bytes(divan::black_box(&gz), 256 * 1024).unwrap());
}

#[divan::bench(args = [1048576, 10485760])]
fn extract_4k_from_last_span(bencher: divan::Bencher, size: usize) {
    let gz = make_gzip(size);
    let idx = build_from_bytes(&gz, 256 * 1024).unwrap();
    let offset = idx
        .start_uncompressed_offset(idx.max_span_id())
        .unwrap()
        .min(size as u64 - 4096);
    bencher
        .counter(divan::counter::BytesCount::new(4096usize))
        .bench(|| extract_range(&idx, divan::black_box(&gz), offset, 4096).unwrap());
}

#[divan::bench(args = [1048576, 10485760])]
fn serialize_roundtrip(bencher: divan::Bencher, size: usize) {
    let idx = build_from_bytes(&make_gzip(size), 256 * 1024).unwrap();
    bencher.bench(|| SpanIndex::from_bytes(&divan::black_box(&idx).to_bytes()).unwrap());
}

fn main() {
    divan::main();
}
