//! Canonical Huffman coding of one run-length-encoded context section.
//!
//! A section of N bytes becomes `runseq` (the symbol of each run) and
//! `runlen` (its length). Frequencies over `runseq` drive the Huffman code;
//! code lengths travel as a compact shape (largest symbol, symbol count,
//! packed maximum length, a binary interpolative code of the symbol list
//! and a unary code per symbol). Code words and Elias-gamma run lengths are
//! packed MSB-first, each sub-stream zero-padded to a byte boundary.
//!
//! Decoding counts leading zeros, then resolves the rest of the code word
//! through a `(leading_zeros, next_byte)` lookup table; the all-zero code
//! word is tracked separately, and code words whose significant part spans
//! more than a byte fall back to a canonical bitwise walk.

use crate::bitstream::{BitReader, BitWriter};
use crate::coders::wavelet_tree::MinimumHeap;
use crate::error::BwError;
use crate::tools::packed_int;
use crate::Result;

/// Largest code length the decoder tables accommodate. A length beyond
/// this would need a run-symbol frequency ratio past the 2^31 section
/// limit, so it only appears in corrupt shapes.
const MAX_CODE_LEN: usize = 48;

/// Encode one section onto `out`.
pub fn encode_section(out: &mut Vec<u8>, section: &[u8]) {
    debug_assert!(!section.is_empty());
    let (runseq, runlen) = run_lengths(section);
    let mut freqs = [0u64; 256];
    for &s in &runseq {
        freqs[s as usize] += 1;
    }
    let clen = calculate_huffman_lengths(&freqs);
    let code = compute_huffman_codes(&clen);

    packed_int::write_packed(out, runseq.len() as u64);

    let mut bw = BitWriter::new(section.len() / 4 + 16);
    serialize_shape(&clen, &mut bw);
    bw.flush();

    // Code words for the run symbols.
    for &s in &runseq {
        bw.push_bits(code[s as usize], clen[s as usize]);
    }
    bw.flush();

    // Elias gamma for the run lengths: floor(log2 L) zeros, then L's
    // binary representation starting at its leading one. Split in two
    // pushes so a huge run cannot overflow the bit queue.
    for &len in &runlen {
        let log = 31 - len.leading_zeros();
        bw.push_bits(0, log);
        bw.push_bits(len as u64, log + 1);
    }
    bw.flush();
    out.extend_from_slice(&bw.output);
}

/// Decode one section of `expected_len` bytes.
pub fn decode_section(
    reader: &mut BitReader<'_>,
    expected_len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let n_runs = packed_int::read_packed(|| reader.read_byte())? as usize;
    if n_runs == 0 || n_runs > expected_len {
        return Err(BwError::MalformedInput("bad run count"));
    }
    let clen = deserialize_shape(reader)?;
    let code = compute_huffman_codes(&clen);
    let decoder = SymbolDecoder::new(&clen, &code)?;

    let mut runseq = Vec::with_capacity(n_runs);
    for _ in 0..n_runs {
        runseq.push(decoder.decode_symbol(reader)?);
    }
    reader.align_to_byte();

    let mut produced = 0usize;
    for k in 0..n_runs {
        let zeros = {
            let mut z = 0u32;
            while !reader.read_bit()? {
                z += 1;
                if z > 31 {
                    return Err(BwError::MalformedInput("gamma code too long"));
                }
            }
            z
        };
        let mut len = 1u64;
        for _ in 0..zeros {
            len = (len << 1) | reader.read_bit()? as u64;
        }
        produced += len as usize;
        if produced > expected_len {
            return Err(BwError::MalformedInput("runs overflow the section"));
        }
        out.extend(std::iter::repeat(runseq[k]).take(len as usize));
    }
    reader.align_to_byte();
    if produced != expected_len {
        return Err(BwError::MalformedInput("runs underflow the section"));
    }
    Ok(())
}

/// Split a section into (run symbols, run lengths).
fn run_lengths(section: &[u8]) -> (Vec<u8>, Vec<u32>) {
    let mut runseq = Vec::new();
    let mut runlen = Vec::new();
    let mut prev = section[0];
    let mut len = 1u32;
    for &b in &section[1..] {
        if b == prev {
            len += 1;
        } else {
            runseq.push(prev);
            runlen.push(len);
            prev = b;
            len = 1;
        }
    }
    runseq.push(prev);
    runlen.push(len);
    (runseq, runlen)
}

/// Code lengths from frequencies by Huffman tree merge (equivalent to
/// package-merge for the unrestricted case). A single used symbol gets
/// length one.
fn calculate_huffman_lengths(freqs: &[u64; 256]) -> [u32; 256] {
    let mut clen = [0u32; 256];
    let used: Vec<u8> = (0..256u32)
        .filter(|&s| freqs[s as usize] > 0)
        .map(|s| s as u8)
        .collect();
    if used.len() == 1 {
        clen[used[0] as usize] = 1;
        return clen;
    }

    // Nodes: 0..used.len() are leaves, the rest internal; depth assigned
    // by walking parents after the merge.
    let mut parent: Vec<usize> = Vec::with_capacity(used.len() * 2);
    let mut heap = MinimumHeap::new();
    for (i, &s) in used.iter().enumerate() {
        parent.push(usize::MAX);
        heap.insert(i, freqs[s as usize]);
    }
    while heap.len() > 1 {
        let (a, wa) = heap.delete_min();
        let (b, wb) = heap.delete_min();
        let node = parent.len();
        parent.push(usize::MAX);
        parent[a] = node;
        parent[b] = node;
        heap.insert(node, wa + wb);
    }
    for (i, &s) in used.iter().enumerate() {
        let mut depth = 0u32;
        let mut n = i;
        while parent[n] != usize::MAX {
            n = parent[n];
            depth += 1;
        }
        clen[s as usize] = depth;
    }
    clen
}

/// Canonical code assignment: ascending (length, symbol); the first code
/// of a new length is the previous code plus one, shifted up. Lengths must
/// satisfy the Kraft inequality (`kraft_ok`), which bounds every code
/// below 2^len.
fn compute_huffman_codes(clen: &[u32; 256]) -> [u64; 256] {
    let mut code = [0u64; 256];
    let mut symbols: Vec<u8> = (0..256u32)
        .filter(|&s| clen[s as usize] > 0)
        .map(|s| s as u8)
        .collect();
    symbols.sort_by_key(|&s| (clen[s as usize], s));
    let mut prev_len = 0u32;
    let mut next = 0u64;
    for &s in &symbols {
        let len = clen[s as usize];
        if prev_len != 0 {
            next = (next + 1) << (len - prev_len);
        }
        code[s as usize] = next;
        prev_len = len;
    }
    code
}

/// Kraft inequality over the used lengths, scaled by 2^max_len.
fn kraft_ok(clen: &[u32; 256], max_len: u32) -> bool {
    let mut sum = 0u64;
    for s in 0..256 {
        if clen[s] > 0 {
            if clen[s] > max_len {
                return false;
            }
            sum += 1u64 << (max_len - clen[s]);
        }
    }
    sum <= 1u64 << max_len
}

fn serialize_shape(clen: &[u32; 256], bw: &mut BitWriter) {
    let symbols: Vec<u8> = (0..256u32)
        .filter(|&s| clen[s as usize] > 0)
        .map(|s| s as u8)
        .collect();
    let max_len = symbols.iter().map(|&s| clen[s as usize]).max().unwrap() as u64;
    let max_sym = *symbols.last().unwrap();

    bw.push_bits(max_sym as u64, 8);
    bw.push_bits((symbols.len() & 0xFF) as u64, 8); // 0 encodes 256
    let mut packed = Vec::new();
    packed_int::write_packed(&mut packed, max_len);
    for b in packed {
        bw.push_bits(b as u64, 8);
    }
    interpolative_encode(bw, &symbols, 0, max_sym as u32);
    for &s in &symbols {
        bw.push_unary((max_len - clen[s as usize] as u64) + 1);
    }
}

fn deserialize_shape(reader: &mut BitReader<'_>) -> Result<[u32; 256]> {
    let max_sym = reader.read_bits(8)? as u32;
    let mut n_syms = reader.read_bits(8)? as usize;
    if n_syms == 0 {
        n_syms = 256;
    }
    if n_syms > max_sym as usize + 1 {
        return Err(BwError::MalformedInput("more symbols than the bound allows"));
    }
    let max_len = packed_int::read_packed(|| Ok(reader.read_bits(8)? as u8))?;
    if max_len == 0 || max_len > MAX_CODE_LEN as u64 {
        return Err(BwError::MalformedInput("huffman length out of range"));
    }
    let mut symbols = Vec::with_capacity(n_syms);
    interpolative_decode(reader, n_syms, 0, max_sym, &mut symbols)?;
    let mut clen = [0u32; 256];
    for &s in &symbols {
        let n = reader.read_unary(max_len)?;
        clen[s as usize] = (max_len - (n - 1)) as u32;
    }
    reader.align_to_byte();
    if !kraft_ok(&clen, max_len as u32) {
        return Err(BwError::MalformedInput("huffman lengths break kraft"));
    }
    Ok(clen)
}

/// Binary interpolative coding of a sorted symbol list within [lo, hi].
fn interpolative_encode(bw: &mut BitWriter, items: &[u8], lo: u32, hi: u32) {
    if items.is_empty() {
        return;
    }
    let mid = items.len() / 2;
    let v = items[mid] as u32;
    let low_bound = lo + mid as u32;
    let high_bound = hi - (items.len() - 1 - mid) as u32;
    write_binary(bw, v - low_bound, high_bound - low_bound + 1);
    interpolative_encode(bw, &items[..mid], lo, v.wrapping_sub(1));
    interpolative_encode(bw, &items[mid + 1..], v + 1, hi);
}

fn interpolative_decode(
    reader: &mut BitReader<'_>,
    count: usize,
    lo: u32,
    hi: u32,
    out: &mut Vec<u8>,
) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    if hi < lo || (hi - lo + 1) < count as u32 {
        return Err(BwError::MalformedInput("interpolative range too small"));
    }
    let mid = count / 2;
    let low_bound = lo + mid as u32;
    let high_bound = hi - (count - 1 - mid) as u32;
    let v = low_bound + read_binary(reader, high_bound - low_bound + 1)?;
    interpolative_decode(reader, mid, lo, v.wrapping_sub(1), out)?;
    out.push(v as u8);
    interpolative_decode(reader, count - 1 - mid, v + 1, hi, out)
}

fn write_binary(bw: &mut BitWriter, value: u32, range: u32) {
    debug_assert!(value < range);
    if range > 1 {
        let bits = 32 - (range - 1).leading_zeros();
        bw.push_bits(value as u64, bits);
    }
}

fn read_binary(reader: &mut BitReader<'_>, range: u32) -> Result<u32> {
    if range <= 1 {
        return Ok(0);
    }
    let bits = 32 - (range - 1).leading_zeros();
    let v = reader.read_bits(bits)? as u32;
    if v >= range {
        return Err(BwError::MalformedInput("binary code out of range"));
    }
    Ok(v)
}

/// Two-level code word lookup: row = leading zero count, column = the next
/// byte (starting at the leading one bit).
struct SymbolDecoder {
    /// `table[z][b]` is (symbol, bits consumed after the zeros) or (256, 0).
    table: Vec<[(u16, u8); 256]>,
    /// Symbol whose code word is all zeros, with its length.
    code0: Option<(u8, u32)>,
    max_len: u32,
    /// Canonical ranges per length for the slow path: (first_code, count,
    /// offset into `by_rank`).
    ranges: Vec<(u64, u32, u32)>,
    by_rank: Vec<u8>,
}

impl SymbolDecoder {
    fn new(clen: &[u32; 256], code: &[u64; 256]) -> Result<Self> {
        let max_len = *clen.iter().max().unwrap();
        if max_len == 0 || max_len > MAX_CODE_LEN as u32 {
            return Err(BwError::MalformedInput("huffman length out of range"));
        }
        let mut table = vec![[(256u16, 0u8); 256]; max_len as usize + 1];
        let mut code0 = None;

        let mut by_rank: Vec<u8> = (0..256u32)
            .filter(|&s| clen[s as usize] > 0)
            .map(|s| s as u8)
            .collect();
        by_rank.sort_by_key(|&s| (clen[s as usize], s));
        let mut ranges = vec![(0u64, 0u32, 0u32); max_len as usize + 1];
        for (rank, &s) in by_rank.iter().enumerate() {
            let len = clen[s as usize] as usize;
            let c = code[s as usize];
            if ranges[len].1 == 0 {
                ranges[len].0 = c;
                ranges[len].2 = rank as u32;
            }
            ranges[len].1 += 1;

            if c == 0 {
                if code0.is_some() {
                    return Err(BwError::MalformedInput("two all-zero codes"));
                }
                code0 = Some((s, clen[s as usize]));
                continue;
            }
            let significant = 64 - c.leading_zeros();
            debug_assert!(significant <= clen[s as usize]);
            let zeros = clen[s as usize] - significant;
            if significant <= 8 {
                let rest = 8 - significant;
                for pad in 0..(1u64 << rest) {
                    let idx = ((c << rest) | pad) as usize;
                    table[zeros as usize][idx] = (s as u16, significant as u8);
                }
            }
        }
        Ok(Self {
            table,
            code0,
            max_len,
            ranges,
            by_rank,
        })
    }

    fn decode_symbol(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let mut zeros = 0u32;
        loop {
            if let Some((sym, len0)) = self.code0 {
                if zeros == len0 {
                    return Ok(sym);
                }
            }
            if zeros >= self.max_len {
                return Err(BwError::MalformedInput("no huffman code matches"));
            }
            if !reader.read_bit()? {
                zeros += 1;
                continue;
            }
            // A leading one: the code word ends within the next byte for
            // all table-resident codes.
            let b = (0x80 | reader.peek_bits(7)) as usize;
            let (sym, used) = self.table[zeros as usize][b];
            if sym < 256 {
                reader.skip_bits(used as u32 - 1)?;
                return Ok(sym as u8);
            }
            return self.decode_long(reader, zeros);
        }
    }

    /// Bitwise canonical walk for code words whose significant part spans
    /// more than one byte.
    fn decode_long(&self, reader: &mut BitReader<'_>, zeros: u32) -> Result<u8> {
        let mut code = 1u64;
        let mut len = zeros + 1;
        loop {
            let (first, count, offset) = self.ranges[len as usize];
            if count > 0 && code >= first && code < first + count as u64 {
                return Ok(self.by_rank[(offset as u64 + (code - first)) as usize]);
            }
            if len >= self.max_len {
                return Err(BwError::MalformedInput("no huffman code matches"));
            }
            code = (code << 1) | reader.read_bit()? as u64;
            len += 1;
        }
    }
}
