//! Checkpoints, the span index, and the span queries shared by every index kind

use std::fmt;

use zinfo_core::{Offset, SpanId, ZinfoError, ZinfoResult};

use crate::inflate::WINDOW_SIZE;

/// Decoder state captured at a deflate block boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// First whole compressed byte after the boundary
    pub in_offset: Offset,
    /// Uncompressed bytes produced before the boundary
    pub out_offset: Offset,
    /// Unconsumed bits (0..=7) of byte `in_offset - 1`
    pub bits: u8,
    /// The 32 KiB of output preceding `out_offset`, zero-padded at stream start
    pub window: Box<[u8; WINDOW_SIZE]>,
}

impl Checkpoint {
    /// Checkpoint 0 of a stream whose deflate data begins at `in_offset`.
    pub fn stream_start(in_offset: Offset) -> Self {
        Checkpoint {
            in_offset,
            out_offset: 0,
            bits: 0,
            window: Box::new([0u8; WINDOW_SIZE]),
        }
    }

    /// First compressed byte needed to resume here, counting the partial byte.
    pub fn start_compressed_offset(&self) -> Offset {
        self.in_offset.saturating_sub(u64::from(self.bits > 0))
    }

    /// The part of the window that holds real output (all of it once
    /// `out_offset` reaches the window size).
    pub fn dictionary(&self) -> &[u8] {
        let real = self.out_offset.min(WINDOW_SIZE as u64) as usize;
        &self.window[WINDOW_SIZE - real..]
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("in_offset", &self.in_offset)
            .field("out_offset", &self.out_offset)
            .field("bits", &self.bits)
            .finish_non_exhaustive()
    }
}

/// Queries the orchestrator needs from any index variant.
pub trait SeekableIndex: Send + Sync {
    /// Index of the last span.
    fn max_span_id(&self) -> SpanId;

    /// Configured minimum uncompressed span length.
    fn span_size(&self) -> u64;

    /// Span containing uncompressed `offset`. Offsets past the end map to the
    /// last span.
    fn span_for_offset(&self, offset: Offset) -> SpanId;

    fn start_compressed_offset(&self, span: SpanId) -> ZinfoResult<Offset>;

    /// Exclusive end of `span` in the compressed stream. The last span ends at
    /// `compressed_size`.
    fn end_compressed_offset(&self, span: SpanId, compressed_size: u64) -> ZinfoResult<Offset>;

    fn start_uncompressed_offset(&self, span: SpanId) -> ZinfoResult<Offset>;

    /// Exclusive end of `span` in the uncompressed stream. The last span ends
    /// at `uncompressed_size`.
    fn end_uncompressed_offset(&self, span: SpanId, uncompressed_size: u64)
        -> ZinfoResult<Offset>;

    /// Extract `[offset, offset + size)` from `buf`, which holds the compressed
    /// stream starting at `start_compressed_offset(first_span)`.
    fn extract_from_buffer(
        &self,
        buf: &[u8],
        offset: Offset,
        size: u64,
        first_span: SpanId,
    ) -> ZinfoResult<Vec<u8>>;
}

/// Largest span size or offset an index may hold
const MAX_STORED: u64 = i64::MAX as u64;

/// Ordered checkpoints for one gzip stream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIndex {
    span_size: u64,
    points: Vec<Checkpoint>,
}

impl SpanIndex {
    /// Assemble an index, checking that there is at least one checkpoint, that
    /// the first starts the stream, and that `out_offset` strictly increases.
    /// Sizes and offsets must fit the blob's signed 64-bit fields.
    pub fn new(span_size: u64, points: Vec<Checkpoint>) -> ZinfoResult<Self> {
        if span_size > MAX_STORED {
            return Err(ZinfoError::format(format!(
                "span size {span_size} exceeds {MAX_STORED}"
            )));
        }
        let first = points
            .first()
            .ok_or_else(|| ZinfoError::format("span index has no checkpoints"))?;
        if first.out_offset != 0 {
            return Err(ZinfoError::format(format!(
                "first checkpoint starts at uncompressed offset {}, expected 0",
                first.out_offset
            )));
        }
        if u32::try_from(points.len()).is_err() {
            return Err(ZinfoError::format("too many checkpoints"));
        }
        for (i, p) in points.iter().enumerate() {
            if p.in_offset > MAX_STORED || p.out_offset > MAX_STORED {
                return Err(ZinfoError::format(format!(
                    "checkpoint {i} offsets ({}, {}) exceed {MAX_STORED}",
                    p.in_offset, p.out_offset
                )));
            }
            if p.bits > 7 {
                return Err(ZinfoError::format(format!(
                    "checkpoint {i} has {} pending bits",
                    p.bits
                )));
            }
            if p.bits > 0 && p.in_offset == 0 {
                return Err(ZinfoError::format(format!(
                    "checkpoint {i} has pending bits before the first byte"
                )));
            }
        }
        for (i, pair) in points.windows(2).enumerate() {
            if pair[1].out_offset <= pair[0].out_offset {
                return Err(ZinfoError::format(format!(
                    "checkpoint {} does not advance past uncompressed offset {}",
                    i + 1,
                    pair[0].out_offset
                )));
            }
            if pair[1].in_offset < pair[0].in_offset {
                return Err(ZinfoError::format(format!(
                    "checkpoint {} moves backwards in the compressed stream",
                    i + 1
                )));
            }
        }
        Ok(SpanIndex { span_size, points })
    }

    pub fn points(&self) -> &[Checkpoint] {
        &self.points
    }

    pub fn span_count(&self) -> usize {
        self.points.len()
    }

    pub fn checkpoint(&self, span: SpanId) -> ZinfoResult<&Checkpoint> {
        self.points.get(span as usize).ok_or_else(|| {
            ZinfoError::invalid(format!(
                "span {span} out of range (max span id {})",
                self.max_span_id()
            ))
        })
    }
}

impl SeekableIndex for SpanIndex {
    fn max_span_id(&self) -> SpanId {
        (self.points.len() - 1) as SpanId
    }

    fn span_size(&self) -> u64 {
        self.span_size
    }

    fn span_for_offset(&self, offset: Offset) -> SpanId {
        // points[0].out_offset == 0, so at least one point qualifies
        let after = self.points.partition_point(|p| p.out_offset <= offset);
        (after.max(1) - 1) as SpanId
    }

    fn start_compressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        Ok(self.checkpoint(span)?.start_compressed_offset())
    }

    fn end_compressed_offset(&self, span: SpanId, compressed_size: u64) -> ZinfoResult<Offset> {
        self.checkpoint(span)?;
        Ok(match self.points.get(span as usize + 1) {
            Some(next) => next.in_offset,
            None => compressed_size,
        })
    }

    fn start_uncompressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        Ok(self.checkpoint(span)?.out_offset)
    }

    fn end_uncompressed_offset(
        &self,
        span: SpanId,
        uncompressed_size: u64,
    ) -> ZinfoResult<Offset> {
        self.checkpoint(span)?;
        Ok(match self.points.get(span as usize + 1) {
            Some(next) => next.out_offset,
            None => uncompressed_size,
        })
    }

    fn extract_from_buffer(
        &self,
        buf: &[u8],
        offset: Offset,
        size: u64,
        first_span: SpanId,
    ) -> ZinfoResult<Vec<u8>> {
        crate::extract::extract_from_buffer(self, buf, offset, size, first_span)
    }
}
