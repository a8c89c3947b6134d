//! zinfo-index: random access into gzip streams through a span index
//!
//! # Overview
//! - `inflate`: DEFLATE decoder that reports block boundaries and can resume at one
//! - `gzip`: member header/trailer framing
//! - `builder`: one sequential pass recording a checkpoint every `span_size` bytes
//! - `codec`: the binary index blob (current and legacy layouts)
//! - `index`: checkpoints, span queries and the `SeekableIndex` trait
//! - `extract`: rebuild an uncompressed range from its compressed spans
//! - `fetch`: fetch covering spans concurrently from a `RangeSource`, then extract
//! - `passthrough`: the same queries over an uncompressed layer
//! - `digest`: BLAKE3 digests of each span's compressed bytes

pub mod builder;
pub mod codec;
pub mod digest;
pub mod extract;
pub mod fetch;
pub mod gzip;
pub mod index;
pub mod inflate;
pub mod passthrough;

#[cfg(test)]
mod testdata;

pub use builder::{build_from_bytes, build_from_reader, IndexBuilder};
pub use digest::{span_digests, verify_span, SpanDigests};
pub use extract::{extract_from_buffer, extract_from_reader, extract_range};
pub use fetch::{
    extract_range_from_source, extract_range_from_source_verified, MemorySource, RangeSource,
};
pub use index::{Checkpoint, SeekableIndex, SpanIndex};
pub use inflate::{BlockHook, DecoderState, Inflater, WINDOW_SIZE};
pub use passthrough::{PassthroughIndex, Zinfo};
