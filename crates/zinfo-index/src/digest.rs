//! BLAKE3 digests of each span's compressed bytes
//!
//! Stored next to an index so that span ranges fetched from untrusted storage
//! can be checked before they reach the decoder.

use zinfo_core::{SpanId, ZinfoError, ZinfoResult};

use crate::index::SeekableIndex;

/// A BLAKE3 hash digest (32 bytes), displayed as 64 hex chars
pub type Hash = blake3::Hash;

/// One digest per span, in span order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanDigests {
    digests: Vec<Hash>,
}

impl SpanDigests {
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn get(&self, span: SpanId) -> Option<&Hash> {
        self.digests.get(span as usize)
    }

    /// One lowercase hex digest per line.
    pub fn to_hex_lines(&self) -> String {
        let mut out = String::with_capacity(self.digests.len() * 65);
        for d in &self.digests {
            out.push_str(&d.to_hex());
            out.push('\n');
        }
        out
    }

    /// Parse the output of [`to_hex_lines`](Self::to_hex_lines). Blank lines
    /// are skipped.
    pub fn from_hex_lines(text: &str) -> ZinfoResult<Self> {
        let digests = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, l)| {
                Hash::from_hex(l).map_err(|e| {
                    ZinfoError::format(format!("invalid BLAKE3 hex for span {i} '{l}': {e}"))
                })
            })
            .collect::<ZinfoResult<Vec<_>>>()?;
        Ok(SpanDigests { digests })
    }
}

/// Digest every span of `index` over the whole compressed stream.
pub fn span_digests<I: SeekableIndex + ?Sized>(
    index: &I,
    compressed: &[u8],
) -> ZinfoResult<SpanDigests> {
    let total = compressed.len() as u64;
    let mut digests = Vec::with_capacity(index.max_span_id() as usize + 1);
    for span in 0..=index.max_span_id() {
        let start = index.start_compressed_offset(span)?;
        let end = index.end_compressed_offset(span, total)?;
        let bytes = compressed
            .get(start as usize..end as usize)
            .ok_or(ZinfoError::ShortRead {
                expected: end,
                actual: total,
            })?;
        digests.push(blake3::hash(bytes));
    }
    Ok(SpanDigests { digests })
}

/// Check the fetched bytes of `span` against its recorded digest.
pub fn verify_span(digests: &SpanDigests, span: SpanId, bytes: &[u8]) -> ZinfoResult<()> {
    let expected = digests.get(span).ok_or_else(|| {
        ZinfoError::invalid(format!(
            "no digest for span {span} ({} recorded)",
            digests.len()
        ))
    })?;
    if blake3::hash(bytes) != *expected {
        return Err(ZinfoError::Digest { span });
    }
    Ok(())
}
