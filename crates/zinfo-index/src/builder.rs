//! Span index construction: one sequential decode of the whole gzip member

use std::io::Read;

use tracing::{debug, info, warn};
use zinfo_core::config::{IndexConfig, DEFAULT_SPAN_SIZE};
use zinfo_core::{Offset, ZinfoError, ZinfoResult};

use crate::gzip::{self, Trailer, TRAILER_LEN};
use crate::index::{Checkpoint, SpanIndex};
use crate::inflate::{rebase_offset, BlockHook, DecoderState, Inflater};

const OUTPUT_CHUNK: usize = 256 * 1024;

/// Builds a [`SpanIndex`] with a checkpoint roughly every `span_size`
/// uncompressed bytes.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    span_size: u64,
    verify_trailer: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SPAN_SIZE)
    }
}

impl IndexBuilder {
    pub fn new(span_size: u64) -> Self {
        Self {
            span_size,
            verify_trailer: true,
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            span_size: config.span_size,
            verify_trailer: config.verify_trailer,
        }
    }

    /// Check the gzip CRC-32 and length trailer after decoding (default on).
    pub fn verify_trailer(mut self, verify: bool) -> Self {
        self.verify_trailer = verify;
        self
    }

    /// Buffer all of `reader`, then build.
    pub fn build_from_reader<R: Read>(&self, mut reader: R) -> ZinfoResult<SpanIndex> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.build_from_bytes(&data)
    }

    pub fn build_from_bytes(&self, data: &[u8]) -> ZinfoResult<SpanIndex> {
        if data.is_empty() {
            return Err(ZinfoError::format("empty input"));
        }
        if self.span_size > i64::MAX as u64 {
            return Err(ZinfoError::invalid(format!(
                "span size {} too large",
                self.span_size
            )));
        }

        let header_len = gzip::parse_header(data)?;
        let base = header_len as Offset;
        let recorder = CheckpointRecorder {
            header_len: base,
            span_size: self.span_size,
            points: vec![Checkpoint::stream_start(base)],
        };

        let mut inflater = Inflater::with_hook(&data[header_len..], recorder);
        let mut crc = crc32fast::Hasher::new();
        let mut buf = vec![0u8; OUTPUT_CHUNK];
        loop {
            let n = inflater
                .inflate(&mut buf)
                .map_err(|e| rebase_offset(e, base))?;
            if n == 0 {
                break;
            }
            crc.update(&buf[..n]);
        }

        let state = inflater.state();
        let total_out = state.total_out();
        let deflate_end = base + state.compressed_offset() + u64::from(state.pending_bits().0 > 0);

        if self.verify_trailer {
            Trailer::parse(data, deflate_end)?.verify(crc.finalize(), total_out, deflate_end)?;
        }
        let member_end = deflate_end + TRAILER_LEN as u64;
        if (data.len() as u64) > member_end {
            warn!(
                trailing = data.len() as u64 - member_end,
                "ignoring data after the first gzip member"
            );
        }

        let points = inflater.into_hook().points;
        info!(
            checkpoints = points.len(),
            span_size = self.span_size,
            compressed = data.len(),
            uncompressed = total_out,
            "built span index"
        );
        SpanIndex::new(self.span_size, points)
    }
}

/// Build with default options (trailer verified).
pub fn build_from_bytes(data: &[u8], span_size: u64) -> ZinfoResult<SpanIndex> {
    IndexBuilder::new(span_size).build_from_bytes(data)
}

pub fn build_from_reader<R: Read>(reader: R, span_size: u64) -> ZinfoResult<SpanIndex> {
    IndexBuilder::new(span_size).build_from_reader(reader)
}

struct CheckpointRecorder {
    header_len: Offset,
    span_size: u64,
    points: Vec<Checkpoint>,
}

impl BlockHook for CheckpointRecorder {
    fn on_block_boundary(&mut self, state: &dyn DecoderState, is_final: bool) {
        // Nothing follows the final block, so a checkpoint there is useless.
        if is_final {
            return;
        }
        let last_out = self.points.last().map_or(0, |p| p.out_offset);
        let out_offset = state.total_out();
        if out_offset - last_out <= self.span_size {
            return;
        }
        let (bits, _) = state.pending_bits();
        let in_offset = self.header_len + state.compressed_offset() + u64::from(bits > 0);
        debug!(
            span = self.points.len(),
            in_offset, out_offset, bits, "checkpoint"
        );
        self.points.push(Checkpoint {
            in_offset,
            out_offset,
            bits,
            window: state.window(),
        });
    }
}
