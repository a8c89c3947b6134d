//! Binary index blob
//!
//! ```text
//! offset 0:  u32 LE  checkpoint count
//! offset 4:  i64 LE  span size
//! offset 12: count x { i64 LE in, i64 LE out, u8 bits, [u8; 32768] window }
//! ```
//!
//! Older writers omitted the first record. Such blobs are recognised by
//! length and checkpoint 0 is rebuilt assuming a bare 10-byte gzip header.

use bytes::{Buf, BufMut};
use zinfo_core::{ZinfoError, ZinfoResult};

use crate::gzip::LEGACY_HEADER_LEN;
use crate::index::{Checkpoint, SeekableIndex, SpanIndex};
use crate::inflate::WINDOW_SIZE;

pub const HEADER_LEN: usize = 4 + 8;
pub const RECORD_LEN: usize = 8 + 8 + 1 + WINDOW_SIZE;

impl SpanIndex {
    /// Serialize in the current layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let points = self.points();
        let mut out = Vec::with_capacity(HEADER_LEN + points.len() * RECORD_LEN);
        out.put_u32_le(points.len() as u32);
        out.put_i64_le(self.span_size() as i64);
        for p in points {
            out.put_i64_le(p.in_offset as i64);
            out.put_i64_le(p.out_offset as i64);
            out.put_u8(p.bits);
            out.put_slice(&p.window[..]);
        }
        out
    }

    /// Parse a blob in either the current or the legacy layout.
    pub fn from_bytes(data: &[u8]) -> ZinfoResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(ZinfoError::format(format!(
                "index blob too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let count = buf.get_u32_le() as usize;
        let span_size = non_negative(buf.get_i64_le(), "span size")?;
        if count == 0 {
            return Err(ZinfoError::format("index blob has zero checkpoints"));
        }

        let body = buf.remaining();
        let full = count
            .checked_mul(RECORD_LEN)
            .ok_or_else(|| ZinfoError::format("checkpoint count overflows"))?;
        let legacy = if body == full {
            false
        } else if body + RECORD_LEN == full {
            true
        } else {
            return Err(ZinfoError::format(format!(
                "index blob length {} does not match {count} checkpoints",
                data.len()
            )));
        };

        let mut points = Vec::with_capacity(count);
        if legacy {
            points.push(Checkpoint::stream_start(LEGACY_HEADER_LEN));
        }
        while buf.has_remaining() {
            let in_offset = non_negative(buf.get_i64_le(), "compressed offset")?;
            let out_offset = non_negative(buf.get_i64_le(), "uncompressed offset")?;
            let bits = buf.get_u8();
            let mut window = Box::new([0u8; WINDOW_SIZE]);
            buf.copy_to_slice(&mut window[..]);
            points.push(Checkpoint {
                in_offset,
                out_offset,
                bits,
                window,
            });
        }
        tracing::debug!(checkpoints = count, span_size, legacy, "decoded span index");
        SpanIndex::new(span_size, points)
    }
}

fn non_negative(v: i64, what: &str) -> ZinfoResult<u64> {
    u64::try_from(v).map_err(|_| ZinfoError::format(format!("negative {what}: {v}")))
}
