//! Concurrent range extraction from a random-access byte source
//!
//! Each span covering the requested range is fetched by its own future. The
//! futures are polled together on the caller's task and joined fail-fast; the
//! parts are laid out in one buffer in span order and handed to the index's
//! `extract_from_buffer`.

use std::future::Future;

use bytes::Bytes;
use futures::future::try_join_all;
use tracing::debug;
use zinfo_core::{Offset, SpanId, ZinfoError, ZinfoResult};

use crate::digest::{verify_span, SpanDigests};
use crate::index::SeekableIndex;

/// Random-access reads over a compressed layer.
///
/// Implementations own retries and timeouts. A read may return fewer bytes
/// than asked for only when the source ends first.
pub trait RangeSource: Send + Sync {
    /// Total length of the source in bytes.
    fn size(&self) -> u64;

    fn read_range(&self, offset: Offset, len: u64)
        -> impl Future<Output = ZinfoResult<Bytes>> + Send;
}

/// A layer held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource(pub Bytes);

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        MemorySource(data.into())
    }
}

impl RangeSource for MemorySource {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_range(
        &self,
        offset: Offset,
        len: u64,
    ) -> impl Future<Output = ZinfoResult<Bytes>> + Send {
        let total = self.0.len() as u64;
        let start = offset.min(total);
        let end = offset.saturating_add(len).min(total);
        futures::future::ready(Ok(self.0.slice(start as usize..end as usize)))
    }
}

/// Extract `[offset, offset + size)` fetching only the spans that cover it.
pub async fn extract_range_from_source<I, S>(
    index: &I,
    source: &S,
    offset: Offset,
    size: u64,
) -> ZinfoResult<Vec<u8>>
where
    I: SeekableIndex + ?Sized,
    S: RangeSource,
{
    fetch_and_extract(index, source, offset, size, None).await
}

/// Like [`extract_range_from_source`], rejecting any span whose bytes do not
/// match `digests`.
pub async fn extract_range_from_source_verified<I, S>(
    index: &I,
    source: &S,
    offset: Offset,
    size: u64,
    digests: &SpanDigests,
) -> ZinfoResult<Vec<u8>>
where
    I: SeekableIndex + ?Sized,
    S: RangeSource,
{
    fetch_and_extract(index, source, offset, size, Some(digests)).await
}

async fn fetch_and_extract<I, S>(
    index: &I,
    source: &S,
    offset: Offset,
    size: u64,
    digests: Option<&SpanDigests>,
) -> ZinfoResult<Vec<u8>>
where
    I: SeekableIndex + ?Sized,
    S: RangeSource,
{
    if size == 0 {
        return Ok(Vec::new());
    }
    let end = offset
        .checked_add(size)
        .ok_or_else(|| ZinfoError::invalid(format!("range {offset}+{size} overflows")))?;

    let first = index.span_for_offset(offset);
    let last = index.span_for_offset(end);
    let total = source.size();
    let ranges = (first..=last)
        .map(|span| {
            let start = index.start_compressed_offset(span)?;
            let end = index.end_compressed_offset(span, total)?;
            if end < start {
                return Err(ZinfoError::ShortRead {
                    expected: start,
                    actual: total,
                });
            }
            Ok((span, start, end))
        })
        .collect::<ZinfoResult<Vec<(SpanId, Offset, Offset)>>>()?;

    // Dropping the join on the first error drops the remaining fetches.
    let parts = try_join_all(ranges.iter().map(|&(span, start, end)| async move {
        let len = end - start;
        let bytes = source.read_range(start, len).await?;
        if bytes.len() as u64 != len {
            return Err(ZinfoError::ShortRead {
                expected: len,
                actual: bytes.len() as u64,
            });
        }
        if let Some(digests) = digests {
            verify_span(digests, span, &bytes)?;
        }
        debug!(span, start, len, "fetched span");
        Ok::<_, ZinfoError>(bytes)
    }))
    .await?;

    // Adjacent spans share the partial byte at a mid-byte boundary, so each
    // part is placed at its own offset rather than appended.
    let base = ranges[0].1;
    let buf_len = ranges[ranges.len() - 1].2 - base;
    let buf_len =
        usize::try_from(buf_len).map_err(|_| ZinfoError::invalid("span range too large"))?;
    let mut buf = vec![0u8; buf_len];
    for (&(_, start, _), part) in ranges.iter().zip(&parts) {
        let at = (start - base) as usize;
        buf[at..at + part.len()].copy_from_slice(part);
    }
    debug!(
        first_span = first,
        last_span = last,
        fetched = buf.len(),
        offset,
        size,
        "assembled span buffer"
    );

    index.extract_from_buffer(&buf, offset, size, first)
}
