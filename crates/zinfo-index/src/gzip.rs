//! gzip member framing (RFC 1952): header skipping and trailer checks

use zinfo_core::{Offset, ZinfoError, ZinfoResult};

/// Header length assumed by legacy index blobs (no optional fields)
pub const LEGACY_HEADER_LEN: u64 = 10;

pub const TRAILER_LEN: usize = 8;

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const FRESERVED: u8 = 0xe0;

/// True if `data` starts with the gzip magic bytes
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&MAGIC)
}

/// Parse a gzip member header and return its length in bytes, which is where
/// the raw DEFLATE data begins.
pub fn parse_header(data: &[u8]) -> ZinfoResult<usize> {
    if data.len() < LEGACY_HEADER_LEN as usize {
        return Err(ZinfoError::format(format!(
            "gzip header truncated: {} bytes",
            data.len()
        )));
    }
    if !is_gzip(data) {
        return Err(ZinfoError::format("not a gzip stream (bad magic)"));
    }
    if data[2] != METHOD_DEFLATE {
        return Err(ZinfoError::format(format!(
            "unsupported gzip compression method {}",
            data[2]
        )));
    }
    let flags = data[3];
    if flags & FRESERVED != 0 {
        return Err(ZinfoError::format("reserved gzip header flags set"));
    }

    let truncated = || ZinfoError::format("gzip header truncated");
    let mut pos = LEGACY_HEADER_LEN as usize;

    if flags & FEXTRA != 0 {
        let xlen = data.get(pos..pos + 2).ok_or_else(truncated)?;
        pos += 2 + u16::from_le_bytes([xlen[0], xlen[1]]) as usize;
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let rest = data.get(pos..).ok_or_else(truncated)?;
            let nul = rest.iter().position(|&b| b == 0).ok_or_else(truncated)?;
            pos += nul + 1;
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }

    if pos > data.len() {
        return Err(truncated());
    }
    Ok(pos)
}

/// The 8 bytes following the final deflate block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub crc32: u32,
    /// Uncompressed length modulo 2^32
    pub isize: u32,
}

impl Trailer {
    /// Parse the trailer found at `offset` in `data`.
    pub fn parse(data: &[u8], offset: Offset) -> ZinfoResult<Self> {
        let start = usize::try_from(offset).map_err(|_| ZinfoError::invalid("offset overflow"))?;
        let bytes = data
            .get(start..)
            .and_then(|rest| rest.get(..TRAILER_LEN))
            .ok_or(ZinfoError::Corrupt {
                offset,
                reason: "truncated gzip trailer",
            })?;
        Ok(Trailer {
            crc32: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            isize: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    /// Check the trailer against the decoded stream's CRC-32 and length.
    pub fn verify(&self, crc32: u32, total_out: u64, offset: Offset) -> ZinfoResult<()> {
        if self.crc32 != crc32 {
            return Err(ZinfoError::Corrupt {
                offset,
                reason: "gzip CRC-32 mismatch",
            });
        }
        if self.isize != total_out as u32 {
            return Err(ZinfoError::Corrupt {
                offset: offset + 4,
                reason: "gzip length mismatch",
            });
        }
        Ok(())
    }
}
