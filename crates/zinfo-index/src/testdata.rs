//! Deterministic payloads and reference (flate2) compression for unit tests.

use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::{Compression, GzBuilder};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::io::Write;

const WORDS: [&str; 10] = [
    "layer", "span", "window", "block", "checkpoint", "gzip", "inflate", "mount", "image",
    "offset",
];

/// Text-like data: mostly letters from a small alphabet with repeated words
/// mixed in. Compresses to dynamic Huffman blocks with both literals and
/// matches, and the encoder closes a block every few tens of KB.
pub(crate) fn text(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut out = Vec::with_capacity(size + 16);
    while out.len() < size {
        if rng.gen_ratio(1, 5) {
            out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
            out.push(b' ');
        } else {
            out.push(b'a' + rng.gen_range(0..16u8));
        }
    }
    out.truncate(size);
    out
}

/// Incompressible bytes
pub(crate) fn random(size: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; size];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

pub(crate) fn deflate(data: &[u8], level: u32) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::new(level));
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub(crate) fn gzip(data: &[u8], level: u32) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::new(level));
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// gzip with FNAME and FCOMMENT set, so the header is longer than 10 bytes
pub(crate) fn gzip_named(data: &[u8], name: &str) -> Vec<u8> {
    let mut enc = GzBuilder::new()
        .filename(name)
        .comment("built for tests")
        .write(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}
