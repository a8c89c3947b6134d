//! Span queries over uncompressed layers, and the `Zinfo` wrapper choosing
//! between the two index kinds

use zinfo_core::{Offset, SpanId, ZinfoError, ZinfoResult};

use crate::builder::IndexBuilder;
use crate::gzip;
use crate::index::{SeekableIndex, SpanIndex};

/// Fixed `span_size` slices of an uncompressed stream. Compressed and
/// uncompressed offsets coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassthroughIndex {
    span_size: u64,
    size: u64,
}

impl PassthroughIndex {
    pub fn new(span_size: u64, size: u64) -> ZinfoResult<Self> {
        if span_size == 0 {
            return Err(ZinfoError::invalid("passthrough span size must be positive"));
        }
        Ok(Self { span_size, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn check(&self, span: SpanId) -> ZinfoResult<u64> {
        if span > self.max_span_id() {
            return Err(ZinfoError::invalid(format!(
                "span {span} out of range (max span id {})",
                self.max_span_id()
            )));
        }
        Ok(u64::from(span) * self.span_size)
    }

    fn end(&self, span: SpanId, total: u64) -> ZinfoResult<Offset> {
        let start = self.check(span)?;
        Ok(if span == self.max_span_id() {
            total
        } else {
            start + self.span_size
        })
    }
}

impl SeekableIndex for PassthroughIndex {
    fn max_span_id(&self) -> SpanId {
        let spans = self.size.div_ceil(self.span_size).max(1);
        u32::try_from(spans - 1).unwrap_or(u32::MAX)
    }

    fn span_size(&self) -> u64 {
        self.span_size
    }

    fn span_for_offset(&self, offset: Offset) -> SpanId {
        let span = offset / self.span_size;
        span.min(u64::from(self.max_span_id())) as SpanId
    }

    fn start_compressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        self.check(span)
    }

    fn end_compressed_offset(&self, span: SpanId, compressed_size: u64) -> ZinfoResult<Offset> {
        self.end(span, compressed_size)
    }

    fn start_uncompressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        self.check(span)
    }

    fn end_uncompressed_offset(
        &self,
        span: SpanId,
        uncompressed_size: u64,
    ) -> ZinfoResult<Offset> {
        self.end(span, uncompressed_size)
    }

    fn extract_from_buffer(
        &self,
        buf: &[u8],
        offset: Offset,
        size: u64,
        first_span: SpanId,
    ) -> ZinfoResult<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let end = offset
            .checked_add(size)
            .ok_or_else(|| ZinfoError::invalid(format!("range {offset}+{size} overflows")))?;
        let base = self.check(first_span)?;
        if base > offset {
            return Err(ZinfoError::invalid(format!(
                "buffer starts at span {first_span}, after offset {offset}"
            )));
        }
        let lo = (offset - base) as usize;
        let hi = (end - base).min(buf.len() as u64) as usize;
        if hi < lo + size as usize {
            return Err(ZinfoError::ShortRead {
                expected: size,
                actual: hi.saturating_sub(lo) as u64,
            });
        }
        Ok(buf[lo..hi].to_vec())
    }
}

/// Either index kind, chosen by sniffing the layer.
#[derive(Debug, Clone)]
pub enum Zinfo {
    Gzip(SpanIndex),
    Passthrough(PassthroughIndex),
}

impl Zinfo {
    /// Build a gzip span index if `data` is gzip, otherwise a passthrough
    /// index over its raw bytes.
    pub fn build(builder: &IndexBuilder, span_size: u64, data: &[u8]) -> ZinfoResult<Self> {
        if gzip::is_gzip(data) {
            Ok(Zinfo::Gzip(builder.build_from_bytes(data)?))
        } else {
            tracing::debug!(size = data.len(), "not gzip, using passthrough index");
            Ok(Zinfo::Passthrough(PassthroughIndex::new(
                span_size,
                data.len() as u64,
            )?))
        }
    }

    fn inner(&self) -> &dyn SeekableIndex {
        match self {
            Zinfo::Gzip(idx) => idx,
            Zinfo::Passthrough(idx) => idx,
        }
    }
}

impl SeekableIndex for Zinfo {
    fn max_span_id(&self) -> SpanId {
        self.inner().max_span_id()
    }

    fn span_size(&self) -> u64 {
        self.inner().span_size()
    }

    fn span_for_offset(&self, offset: Offset) -> SpanId {
        self.inner().span_for_offset(offset)
    }

    fn start_compressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        self.inner().start_compressed_offset(span)
    }

    fn end_compressed_offset(&self, span: SpanId, compressed_size: u64) -> ZinfoResult<Offset> {
        self.inner().end_compressed_offset(span, compressed_size)
    }

    fn start_uncompressed_offset(&self, span: SpanId) -> ZinfoResult<Offset> {
        self.inner().start_uncompressed_offset(span)
    }

    fn end_uncompressed_offset(
        &self,
        span: SpanId,
        uncompressed_size: u64,
    ) -> ZinfoResult<Offset> {
        self.inner().end_uncompressed_offset(span, uncompressed_size)
    }

    fn extract_from_buffer(
        &self,
        buf: &[u8],
        offset: Offset,
        size: u64,
        first_span: SpanId,
    ) -> ZinfoResult<Vec<u8>> {
        self.inner()
            .extract_from_buffer(buf, offset, size, first_span)
    }
}
