//! DEFLATE decoder (RFC 1951) with block-boundary visibility
//!
//! `Inflater` is an ordinary pull decoder (it implements `Read`), with two
//! additions needed for span indexing:
//!
//! - after each deflate block has been fully written to the sliding window it
//!   calls a [`BlockHook`] with a [`DecoderState`] view: compressed bytes
//!   consumed, the unconsumed bits of the current byte, the 32 KiB window and
//!   the running output count;
//! - [`Inflater::resume`] builds a decoder primed with a preset window and
//!   pending bits, so decoding can restart at any recorded block boundary.
//!
//! Input is pulled lazily: the decoder never reads a byte before a symbol
//! needs it. A caller that stops once it has the bytes it wants never sees an
//! error for a compressed buffer cut right after those bytes.

use std::io::{self, Read};
use std::sync::OnceLock;

use zinfo_core::{Offset, ZinfoError, ZinfoResult};

/// DEFLATE maximum back-reference distance
pub const WINDOW_SIZE: usize = 32768;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

const INPUT_BUF_SIZE: usize = 16 * 1024;

const MAX_CODE_LEN: usize = 15;
const FAST_BITS: u32 = 9;
const FAST_MASK: u32 = (1 << FAST_BITS) - 1;

const END_OF_BLOCK: u16 = 256;
const MAX_LIT_CODES: usize = 286;
const MAX_DIST_CODES: usize = 30;

static LEN_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];

static LEN_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

static DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

static DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order in which code-length code lengths are transmitted
static CL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Read-only view of decoder state at a block boundary.
pub trait DecoderState {
    /// Whole bytes consumed from the input. A partially consumed byte is not
    /// counted; its leftover bits are reported by [`pending_bits`].
    ///
    /// [`pending_bits`]: DecoderState::pending_bits
    fn compressed_offset(&self) -> Offset;

    /// `(count, value)` of the bits of the current byte not yet consumed.
    /// `count` is 0..=7; `value` holds them in its low bits.
    fn pending_bits(&self) -> (u8, u8);

    /// The last 32 KiB of output, oldest byte first.
    fn window(&self) -> Box<[u8; WINDOW_SIZE]>;

    /// Uncompressed bytes produced so far, whether or not the caller has
    /// received them yet.
    fn total_out(&self) -> u64;
}

/// Callback run once per deflate block.
pub trait BlockHook {
    fn on_block_boundary(&mut self, state: &dyn DecoderState, is_final: bool);
}

/// Hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl BlockHook for NoHook {
    fn on_block_boundary(&mut self, _state: &dyn DecoderState, _is_final: bool) {}
}

impl<H: BlockHook + ?Sized> BlockHook for &mut H {
    fn on_block_boundary(&mut self, state: &dyn DecoderState, is_final: bool) {
        (**self).on_block_boundary(state, is_final)
    }
}

// ── Bit input ─────────────────────────────────────────────────────────────────

/// LSB-first bit reader that only pulls bytes on demand.
///
/// Bits of `bitbuf` above `nbits` are always zero.
struct BitInput<R> {
    reader: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    bitbuf: u64,
    nbits: u32,
    /// Bytes moved from the reader into `bitbuf`
    fetched: u64,
}

impl<R> BitInput<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; INPUT_BUF_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
            bitbuf: 0,
            nbits: 0,
            fetched: 0,
        }
    }

    /// Bits consumed by the decoder, counted from the first input byte.
    fn consumed_bits(&self) -> u64 {
        self.fetched * 8 - u64::from(self.nbits)
    }

    fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.nbits);
        self.bitbuf >>= n;
        self.nbits -= n;
    }

    /// Drop the rest of the current partial byte.
    fn align_to_byte(&mut self) {
        let drop = self.nbits % 8;
        self.consume(drop);
    }

    fn eof_error(&self) -> ZinfoError {
        ZinfoError::Corrupt {
            offset: self.consumed_bits() / 8,
            reason: "unexpected end of compressed input",
        }
    }

    fn corrupt(&self, reason: &'static str) -> ZinfoError {
        ZinfoError::Corrupt {
            offset: self.consumed_bits() / 8,
            reason,
        }
    }
}

impl<R: Read> BitInput<R> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if self.pos == self.len {
            self.pos = 0;
            self.len = loop {
                match self.reader.read(&mut self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            if self.len == 0 {
                return Ok(None);
            }
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Try to hold at least `n` bits. Returns false if the input ran out first.
    fn fill(&mut self, n: u32) -> ZinfoResult<bool> {
        while self.nbits < n {
            match self.next_byte()? {
                Some(b) => {
                    self.bitbuf |= u64::from(b) << self.nbits;
                    self.nbits += 8;
                    self.fetched += 1;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn bits(&mut self, n: u32) -> ZinfoResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if !self.fill(n)? {
            return Err(self.eof_error());
        }
        let v = (self.bitbuf & ((1u64 << n) - 1)) as u32;
        self.consume(n);
        Ok(v)
    }
}

// ── Huffman tables ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum CodeKind {
    CodeLengths,
    Literals,
    Distances,
}

/// Canonical Huffman decoding table.
///
/// Codes up to `FAST_BITS` long resolve with one lookup in `fast`
/// (`len << 9 | symbol`, 0 = no short code); longer ones walk `counts`.
struct Huffman {
    counts: [u16; MAX_CODE_LEN + 1],
    symbols: Vec<u16>,
    fast: Vec<u16>,
}

impl Huffman {
    /// Validate `lengths` the way zlib does, then build the table.
    fn new(lengths: &[u8], kind: CodeKind) -> Result<Self, &'static str> {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left <<= 1;
            left -= i32::from(count);
            if left < 0 {
                return Err("over-subscribed Huffman code");
            }
        }
        // Incomplete codes are only legal for a lone 1-bit literal/distance
        // code, or for an empty one.
        let used: u32 = counts[1..].iter().map(|&c| u32::from(c)).sum();
        let lone_code = used == 0 || (used == 1 && counts[1] == 1);
        if left > 0 && (kind == CodeKind::CodeLengths || !lone_code) {
            return Err("incomplete Huffman code");
        }

        Ok(Self::build(lengths))
    }

    fn build(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;
        let used: usize = counts[1..].iter().map(|&c| usize::from(c)).sum();

        let mut offsets = [0u16; MAX_CODE_LEN + 2];
        for len in 1..=MAX_CODE_LEN {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; used];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = sym as u16;
                offsets[len as usize] += 1;
            }
        }

        let mut fast = vec![0u16; 1 << FAST_BITS];
        let mut next_code = [0u32; MAX_CODE_LEN + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code + u32::from(counts[len - 1])) << 1;
            next_code[len] = code;
        }
        for (sym, &len) in lengths.iter().enumerate() {
            let len = u32::from(len);
            if len == 0 || len > FAST_BITS {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            let mut idx = reverse_bits(code, len);
            while idx < (1 << FAST_BITS) {
                fast[idx as usize] = ((len as u16) << 9) | sym as u16;
                idx += 1 << len;
            }
        }

        Huffman {
            counts,
            symbols,
            fast,
        }
    }

    fn decode<R: Read>(&self, input: &mut BitInput<R>) -> ZinfoResult<u16> {
        // Short input is fine as long as the code itself fits.
        input.fill(MAX_CODE_LEN as u32)?;
        let avail = input.nbits.min(MAX_CODE_LEN as u32);
        let bits = input.bitbuf as u32;

        let entry = self.fast[(bits & FAST_MASK) as usize];
        if entry != 0 {
            let len = u32::from(entry >> 9);
            if len > avail {
                return Err(input.eof_error());
            }
            input.consume(len);
            return Ok(entry & 0x1ff);
        }

        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_LEN as u32 {
            if len > avail {
                return Err(input.eof_error());
            }
            code |= ((bits >> (len - 1)) & 1) as i32;
            let count = i32::from(self.counts[len as usize]);
            if code - first < count {
                input.consume(len);
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(input.corrupt("invalid Huffman code"))
    }
}

fn reverse_bits(code: u32, len: u32) -> u32 {
    code.reverse_bits() >> (32 - len)
}

struct Tables {
    lit: Huffman,
    dist: Huffman,
}

fn fixed_tables() -> &'static Tables {
    static FIXED: OnceLock<Tables> = OnceLock::new();
    FIXED.get_or_init(|| {
        let mut lit = [0u8; 288];
        lit[..144].fill(8);
        lit[144..256].fill(9);
        lit[256..280].fill(7);
        lit[280..].fill(8);
        // Distance codes 30 and 31 take part in the code but never decode.
        let dist = [5u8; 32];
        Tables {
            lit: Huffman::build(&lit),
            dist: Huffman::build(&dist),
        }
    })
}

enum CodeSet {
    Fixed,
    Dynamic(Box<Tables>),
}

impl CodeSet {
    fn tables(&self) -> &Tables {
        match self {
            CodeSet::Fixed => fixed_tables(),
            CodeSet::Dynamic(t) => t,
        }
    }
}

// ── Decoder core ──────────────────────────────────────────────────────────────

/// Input, window and output counters: everything a [`BlockHook`] may inspect.
struct Core<R> {
    input: BitInput<R>,
    window: Box<[u8; WINDOW_SIZE]>,
    total_out: u64,
    /// Bytes of preset dictionary placed in the window before any output
    history: u64,
}

impl<R> Core<R> {
    #[inline]
    fn push(&mut self, b: u8) {
        self.window[(self.total_out as usize) & WINDOW_MASK] = b;
        self.total_out += 1;
    }

    fn reachable(&self) -> u64 {
        (self.history + self.total_out).min(WINDOW_SIZE as u64)
    }
}

impl<R> DecoderState for Core<R> {
    fn compressed_offset(&self) -> Offset {
        self.input.consumed_bits() / 8
    }

    fn pending_bits(&self) -> (u8, u8) {
        let count = self.input.nbits % 8;
        let value = (self.input.bitbuf & ((1u64 << count) - 1)) as u8;
        (count as u8, value)
    }

    fn window(&self) -> Box<[u8; WINDOW_SIZE]> {
        let mut out = Box::new([0u8; WINDOW_SIZE]);
        let pos = (self.total_out as usize) & WINDOW_MASK;
        let tail = WINDOW_SIZE - pos;
        out[..tail].copy_from_slice(&self.window[pos..]);
        out[tail..].copy_from_slice(&self.window[..pos]);
        out
    }

    fn total_out(&self) -> u64 {
        self.total_out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    BlockHeader,
    Stored { remaining: u32 },
    Codes,
    Copy { len: u32, dist: u32 },
    Done,
    Failed,
}

/// Streaming DEFLATE decoder. See the module docs.
pub struct Inflater<R, H = NoHook> {
    core: Core<R>,
    stage: Stage,
    last_block: bool,
    codes: CodeSet,
    hook: H,
    /// Error hit after some output was already produced in the same call
    deferred: Option<ZinfoError>,
}

impl<R: Read> Inflater<R, NoHook> {
    /// Decoder for a raw DEFLATE stream starting at its first block.
    pub fn new(reader: R) -> Self {
        Self::build(BitInput::new(reader), Box::new([0u8; WINDOW_SIZE]), 0, NoHook)
    }

    /// Decoder resuming at a block boundary.
    ///
    /// `dictionary` is the output preceding the boundary (only the last
    /// 32 KiB are used). `bits` (0..=7) low bits of `value` are the unconsumed
    /// bits of the byte before `reader`'s first byte. Compressed offsets
    /// reported by this decoder count that byte as byte 0 when `bits > 0`.
    pub fn resume(reader: R, dictionary: &[u8], bits: u8, value: u8) -> ZinfoResult<Self> {
        if bits > 7 {
            return Err(ZinfoError::invalid(format!(
                "pending bit count must be 0..=7, got {bits}"
            )));
        }

        let dict = &dictionary[dictionary.len().saturating_sub(WINDOW_SIZE)..];
        let mut window = Box::new([0u8; WINDOW_SIZE]);
        window[WINDOW_SIZE - dict.len()..].copy_from_slice(dict);

        let mut input = BitInput::new(reader);
        if bits > 0 {
            input.bitbuf = u64::from(value) & ((1u64 << bits) - 1);
            input.nbits = u32::from(bits);
            input.fetched = 1;
        }

        Ok(Self::build(input, window, dict.len() as u64, NoHook))
    }
}

impl<R: Read, H: BlockHook> Inflater<R, H> {
    /// Decoder for a raw DEFLATE stream that reports block boundaries to `hook`.
    pub fn with_hook(reader: R, hook: H) -> Self {
        Self::build(BitInput::new(reader), Box::new([0u8; WINDOW_SIZE]), 0, hook)
    }

    fn build(input: BitInput<R>, window: Box<[u8; WINDOW_SIZE]>, history: u64, hook: H) -> Self {
        Inflater {
            core: Core {
                input,
                window,
                total_out: 0,
                history,
            },
            stage: Stage::BlockHeader,
            last_block: false,
            codes: CodeSet::Fixed,
            hook,
            deferred: None,
        }
    }

    pub fn into_hook(self) -> H {
        self.hook
    }

    pub fn state(&self) -> &dyn DecoderState {
        &self.core
    }

    /// True once the final block has been decoded.
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Decode into `buf`, returning the number of bytes written. `Ok(0)` with
    /// a non-empty `buf` means the stream is finished.
    pub fn inflate(&mut self, buf: &mut [u8]) -> ZinfoResult<usize> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }
        let mut out = 0;
        match self.run(buf, &mut out) {
            Ok(()) => Ok(out),
            Err(e) => {
                self.stage = Stage::Failed;
                if out > 0 {
                    self.deferred = Some(e);
                    Ok(out)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn run(&mut self, buf: &mut [u8], out: &mut usize) -> ZinfoResult<()> {
        while *out < buf.len() {
            match self.stage {
                Stage::Done => break,
                Stage::Failed => {
                    return Err(ZinfoError::Internal(
                        "decoder used after a decode failure".into(),
                    ))
                }
                Stage::BlockHeader => self.read_block_header()?,
                Stage::Stored { remaining } => {
                    if remaining == 0 {
                        self.end_block();
                        continue;
                    }
                    let n = (remaining as usize).min(buf.len() - *out);
                    for slot in &mut buf[*out..*out + n] {
                        let b = self.core.input.bits(8)? as u8;
                        self.core.push(b);
                        *slot = b;
                    }
                    *out += n;
                    self.stage = Stage::Stored {
                        remaining: remaining - n as u32,
                    };
                }
                Stage::Codes => {
                    let tables = self.codes.tables();
                    let input = &mut self.core.input;
                    let sym = tables.lit.decode(input)?;
                    if sym < END_OF_BLOCK {
                        self.core.push(sym as u8);
                        buf[*out] = sym as u8;
                        *out += 1;
                        continue;
                    }
                    if sym == END_OF_BLOCK {
                        self.end_block();
                        continue;
                    }

                    let idx = usize::from(sym - 257);
                    if idx >= LEN_BASE.len() {
                        return Err(input.corrupt("invalid literal/length code"));
                    }
                    let len = u32::from(LEN_BASE[idx]) + input.bits(u32::from(LEN_EXTRA[idx]))?;

                    let dsym = usize::from(tables.dist.decode(input)?);
                    if dsym >= DIST_BASE.len() {
                        return Err(input.corrupt("invalid distance code"));
                    }
                    let dist =
                        u32::from(DIST_BASE[dsym]) + input.bits(u32::from(DIST_EXTRA[dsym]))?;
                    if u64::from(dist) > self.core.reachable() {
                        return Err(self.core.input.corrupt("invalid distance too far back"));
                    }
                    self.stage = Stage::Copy { len, dist };
                }
                Stage::Copy { len, dist } => {
                    let n = (len as usize).min(buf.len() - *out);
                    for slot in &mut buf[*out..*out + n] {
                        let at = (self.core.total_out as usize).wrapping_sub(dist as usize);
                        let b = self.core.window[at & WINDOW_MASK];
                        self.core.push(b);
                        *slot = b;
                    }
                    *out += n;
                    let left = len - n as u32;
                    self.stage = if left == 0 {
                        Stage::Codes
                    } else {
                        Stage::Copy { len: left, dist }
                    };
                }
            }
        }
        Ok(())
    }

    fn read_block_header(&mut self) -> ZinfoResult<()> {
        let input = &mut self.core.input;
        let header = input.bits(3)?;
        self.last_block = header & 1 == 1;
        match header >> 1 {
            0 => {
                input.align_to_byte();
                let len = input.bits(16)?;
                let nlen = input.bits(16)?;
                if len != !nlen & 0xffff {
                    return Err(input.corrupt("stored block length mismatch"));
                }
                self.stage = Stage::Stored { remaining: len };
            }
            1 => {
                self.codes = CodeSet::Fixed;
                self.stage = Stage::Codes;
            }
            2 => {
                self.codes = CodeSet::Dynamic(Box::new(read_dynamic_tables(input)?));
                self.stage = Stage::Codes;
            }
            _ => return Err(input.corrupt("invalid block type")),
        }
        Ok(())
    }

    fn end_block(&mut self) {
        let is_final = self.last_block;
        self.hook.on_block_boundary(&self.core, is_final);
        self.stage = if is_final {
            Stage::Done
        } else {
            Stage::BlockHeader
        };
    }
}

fn read_dynamic_tables<R: Read>(input: &mut BitInput<R>) -> ZinfoResult<Tables> {
    let nlit = input.bits(5)? as usize + 257;
    let ndist = input.bits(5)? as usize + 1;
    let nclen = input.bits(4)? as usize + 4;
    if nlit > MAX_LIT_CODES || ndist > MAX_DIST_CODES {
        return Err(input.corrupt("too many length or distance symbols"));
    }

    let mut cl_lens = [0u8; 19];
    for &slot in &CL_ORDER[..nclen] {
        cl_lens[slot] = input.bits(3)? as u8;
    }
    let cl = Huffman::new(&cl_lens, CodeKind::CodeLengths).map_err(|r| input.corrupt(r))?;

    let total = nlit + ndist;
    let mut lengths = [0u8; MAX_LIT_CODES + MAX_DIST_CODES];
    let mut i = 0;
    while i < total {
        let sym = cl.decode(input)?;
        let (value, repeat) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                if i == 0 {
                    return Err(input.corrupt("repeat of missing code length"));
                }
                (lengths[i - 1], 3 + input.bits(2)? as usize)
            }
            17 => (0, 3 + input.bits(3)? as usize),
            18 => (0, 11 + input.bits(7)? as usize),
            _ => return Err(input.corrupt("invalid code length code")),
        };
        if i + repeat > total {
            return Err(input.corrupt("code length repeat overflows"));
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    if lengths[usize::from(END_OF_BLOCK)] == 0 {
        return Err(input.corrupt("missing end-of-block code"));
    }

    let lit = Huffman::new(&lengths[..nlit], CodeKind::Literals).map_err(|r| input.corrupt(r))?;
    let dist =
        Huffman::new(&lengths[nlit..total], CodeKind::Distances).map_err(|r| input.corrupt(r))?;
    Ok(Tables { lit, dist })
}

impl<R: Read, H: BlockHook> Read for Inflater<R, H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inflate(buf).map_err(|e| match e {
            ZinfoError::Io(io) => io,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}

/// Shift a decoder-relative corruption offset onto an absolute stream offset.
pub(crate) fn rebase_offset(err: ZinfoError, base: Offset) -> ZinfoError {
    match err {
        ZinfoError::Corrupt { offset, reason } => ZinfoError::Corrupt {
            offset: offset + base,
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{deflate, text};
    use proptest::prelude::*;

    fn inflate_all<R: Read, H: BlockHook>(inf: &mut Inflater<R, H>) -> ZinfoResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 7919];
        loop {
            let n = inf.inflate(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[derive(Default)]
    struct Recorder {
        boundaries: Vec<(u64, u8, u8, u64, Box<[u8; WINDOW_SIZE]>)>,
        finals: usize,
    }

    impl BlockHook for Recorder {
        fn on_block_boundary(&mut self, state: &dyn DecoderState, is_final: bool) {
            if is_final {
                self.finals += 1;
                return;
            }
            let (bits, value) = state.pending_bits();
            self.boundaries.push((
                state.compressed_offset(),
                bits,
                value,
                state.total_out(),
                state.window(),
            ));
        }
    }

    #[test]
    fn decodes_fixed_huffman() {
        let data = b"Hello, World!";
        let out = inflate_all(&mut Inflater::new(&deflate(data, 6)[..])).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn decodes_stored_blocks() {
        let data: Vec<u8> = (0u32..200_000).map(|i| (i * 31 % 251) as u8).collect();
        let out = inflate_all(&mut Inflater::new(&deflate(&data, 0)[..])).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn decodes_dynamic_huffman() {
        let data = text(300_000);
        let out = inflate_all(&mut Inflater::new(&deflate(&data, 9)[..])).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_stream() {
        let out = inflate_all(&mut Inflater::new(&deflate(b"", 6)[..])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn read_trait_works_with_std_helpers() {
        let data = text(50_000);
        let mut out = Vec::new();
        Inflater::new(&deflate(&data, 6)[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn hook_sees_every_block_and_one_final() {
        let data = text(400_000);
        let compressed = deflate(&data, 6);
        let mut inf = Inflater::with_hook(&compressed[..], Recorder::default());
        let out = inflate_all(&mut inf).unwrap();
        assert_eq!(out, data);
        assert!(inf.is_done());

        let rec = inf.into_hook();
        assert_eq!(rec.finals, 1);
        assert!(!rec.boundaries.is_empty(), "400KB of text should span several blocks");
        for w in rec.boundaries.windows(2) {
            assert!(w[0].3 <= w[1].3);
            assert!(w[0].0 <= w[1].0);
        }
    }

    #[test]
    fn window_is_zero_padded_at_stream_start() {
        let compressed = deflate(b"abc", 6);
        let mut inf = Inflater::new(&compressed[..]);
        inflate_all(&mut inf).unwrap();
        let w = inf.state().window();
        assert_eq!(&w[WINDOW_SIZE - 3..], b"abc");
        assert!(w[..WINDOW_SIZE - 3].iter().all(|&b| b == 0));
        assert_eq!(inf.state().total_out(), 3);
    }

    #[test]
    fn resume_from_every_boundary_reproduces_the_tail() {
        let data = text(400_000);
        let compressed = deflate(&data, 6);
        let mut inf = Inflater::with_hook(&compressed[..], Recorder::default());
        inflate_all(&mut inf).unwrap();
        let rec = inf.into_hook();

        for (offset, bits, value, out, window) in &rec.boundaries {
            let offset = *offset as usize;
            let start = if *bits > 0 { offset + 1 } else { offset };
            if *bits > 0 {
                assert_eq!(compressed[offset] >> (8 - bits), *value);
            }
            let mut resumed =
                Inflater::resume(&compressed[start..], &window[..], *bits, *value).unwrap();
            let tail = inflate_all(&mut resumed).unwrap();
            assert_eq!(tail, &data[*out as usize..], "resume at out={out}");
        }
    }

    #[test]
    fn rejects_invalid_block_type() {
        let err = inflate_all(&mut Inflater::new(&[0x07u8, 0, 0][..])).unwrap_err();
        assert!(matches!(
            err,
            ZinfoError::Corrupt {
                reason: "invalid block type",
                ..
            }
        ));
    }

    #[test]
    fn rejects_stored_length_mismatch() {
        let err = inflate_all(&mut Inflater::new(&[0x01u8, 5, 0, 0, 0][..])).unwrap_err();
        assert!(matches!(err, ZinfoError::Corrupt { offset: 5, .. }), "{err}");
    }

    // Fixed block: <len 3, dist 1> as the very first symbol, then end-of-block.
    const BACKREF_FIRST: [u8; 3] = [0x03, 0x02, 0x00];

    #[test]
    fn rejects_distance_before_stream_start() {
        let err = inflate_all(&mut Inflater::new(&BACKREF_FIRST[..])).unwrap_err();
        assert!(matches!(
            err,
            ZinfoError::Corrupt {
                reason: "invalid distance too far back",
                ..
            }
        ));
    }

    #[test]
    fn preset_dictionary_satisfies_backreference() {
        let mut inf = Inflater::resume(&BACKREF_FIRST[..], b"xyzabc", 0, 0).unwrap();
        assert_eq!(inflate_all(&mut inf).unwrap(), b"ccc");
    }

    #[test]
    fn resume_rejects_bad_bit_count() {
        assert!(matches!(
            Inflater::resume(&[][..], &[], 8, 0),
            Err(ZinfoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt_not_panic() {
        let data = text(100_000);
        let compressed = deflate(&data, 6);
        let cut = &compressed[..compressed.len() / 2];
        let err = inflate_all(&mut Inflater::new(cut)).unwrap_err();
        assert!(matches!(err, ZinfoError::Corrupt { .. }), "{err}");
    }

    #[test]
    fn output_before_error_is_returned_first() {
        let data = text(100_000);
        let compressed = deflate(&data, 6);
        let cut = &compressed[..compressed.len() / 2];
        let mut inf = Inflater::new(cut);
        let mut buf = vec![0u8; data.len()];
        let n = inf.inflate(&mut buf).unwrap();
        assert!(n > 0);
        assert_eq!(&buf[..n], &data[..n]);
        assert!(inf.inflate(&mut buf).is_err());
        assert!(matches!(
            inf.inflate(&mut buf),
            Err(ZinfoError::Internal(_))
        ));
    }

    #[test]
    fn read_maps_corruption_to_invalid_data() {
        let mut out = Vec::new();
        let err = Inflater::new(&[0x07u8][..])
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rebase_moves_only_corrupt_offsets() {
        let e = rebase_offset(
            ZinfoError::Corrupt {
                offset: 3,
                reason: "x",
            },
            10,
        );
        assert!(matches!(e, ZinfoError::Corrupt { offset: 13, .. }));
        let e = rebase_offset(ZinfoError::invalid("y"), 10);
        assert!(matches!(e, ZinfoError::InvalidArgument(_)));
    }

    proptest! {
        #[test]
        fn matches_reference_decoder(
            data in proptest::collection::vec(any::<u8>(), 0..=20_000),
            level in 0u32..=9,
        ) {
            let out = inflate_all(&mut Inflater::new(&deflate(&data, level)[..])).unwrap();
            prop_assert_eq!(out, data);
        }

        #[test]
        fn garbage_never_panics(data in proptest::collection::vec(any::<u8>(), 0..=2048)) {
            let _ = inflate_all(&mut Inflater::new(&data[..]));
        }
    }
}
