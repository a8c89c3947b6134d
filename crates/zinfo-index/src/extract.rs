//! Random-access extraction of an uncompressed range
//!
//! Every entry point picks the span containing `offset`, positions a reader at
//! that span's first compressed byte, resumes the decoder from the span's
//! checkpoint, discards output up to `offset` and returns the next `size`
//! bytes.

use std::io::{Cursor, Read, Seek, SeekFrom};

use zinfo_core::{Offset, SpanId, ZinfoError, ZinfoResult};

use crate::index::{Checkpoint, SeekableIndex, SpanIndex};
use crate::inflate::{rebase_offset, Inflater};

const CHUNK: usize = 64 * 1024;

/// Extract from a seekable reader holding the whole compressed stream.
pub fn extract_from_reader<R: Read + Seek>(
    index: &SpanIndex,
    mut reader: R,
    offset: Offset,
    size: u64,
) -> ZinfoResult<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    check_range(offset, size)?;
    let cp = index.checkpoint(index.span_for_offset(offset))?;
    let start = cp.start_compressed_offset();
    reader.seek(SeekFrom::Start(start))?;
    decode_span(cp, reader, offset, size).map_err(|e| rebase_offset(e, start))
}

/// Extract from the whole compressed stream held in memory.
pub fn extract_range(
    index: &SpanIndex,
    compressed: &[u8],
    offset: Offset,
    size: u64,
) -> ZinfoResult<Vec<u8>> {
    extract_from_reader(index, Cursor::new(compressed), offset, size)
}

/// Extract from a buffer that begins at the compressed start of `first_span`,
/// as assembled from per-span range reads.
pub fn extract_from_buffer(
    index: &SpanIndex,
    buf: &[u8],
    offset: Offset,
    size: u64,
    first_span: SpanId,
) -> ZinfoResult<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    check_range(offset, size)?;
    let span = index.span_for_offset(offset);
    if first_span > span {
        return Err(ZinfoError::invalid(format!(
            "buffer starts at span {first_span}, after span {span} holding offset {offset}"
        )));
    }
    let base = index.start_compressed_offset(first_span)?;
    let cp = index.checkpoint(span)?;
    let start = cp.start_compressed_offset();
    let skip = usize::try_from(start - base)
        .map_err(|_| ZinfoError::invalid("span start does not fit in memory"))?;
    let data = buf.get(skip..).ok_or(ZinfoError::ShortRead {
        expected: size,
        actual: 0,
    })?;
    decode_span(cp, data, offset, size).map_err(|e| rebase_offset(e, start))
}

fn check_range(offset: Offset, size: u64) -> ZinfoResult<()> {
    if offset.checked_add(size).is_none() {
        return Err(ZinfoError::invalid(format!(
            "range {offset}+{size} overflows"
        )));
    }
    if usize::try_from(size).is_err() {
        return Err(ZinfoError::invalid(format!("size {size} does not fit in memory")));
    }
    Ok(())
}

/// Decode `[offset, offset + size)` starting at checkpoint `cp`. `reader` is
/// positioned at `cp.start_compressed_offset()`; corruption offsets in the
/// result are relative to that position.
fn decode_span<R: Read>(
    cp: &Checkpoint,
    mut reader: R,
    offset: Offset,
    size: u64,
) -> ZinfoResult<Vec<u8>> {
    let value = if cp.bits > 0 {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ZinfoError::ShortRead {
                expected: size,
                actual: 0,
            },
            _ => ZinfoError::Io(e),
        })?;
        byte[0] >> (8 - cp.bits)
    } else {
        0
    };
    let mut inflater = Inflater::resume(reader, cp.dictionary(), cp.bits, value)?;

    let mut scratch = vec![0u8; CHUNK];
    let mut skip = offset - cp.out_offset;
    while skip > 0 {
        let want = skip.min(CHUNK as u64) as usize;
        let n = inflater.inflate(&mut scratch[..want])?;
        if n == 0 {
            return Err(ZinfoError::ShortRead {
                expected: size,
                actual: 0,
            });
        }
        skip -= n as u64;
    }

    let size = size as usize;
    let mut out = Vec::with_capacity(size.min(16 * CHUNK));
    while out.len() < size {
        let want = (size - out.len()).min(CHUNK);
        let n = inflater.inflate(&mut scratch[..want])?;
        if n == 0 {
            return Err(ZinfoError::ShortRead {
                expected: size as u64,
                actual: out.len() as u64,
            });
        }
        out.extend_from_slice(&scratch[..n]);
    }
    tracing::trace!(offset, size, in_offset = cp.in_offset, "extracted range");
    Ok(out)
}
