//! Entropy coding of transformed BWT blocks.
//!
//! A block on the wire is a 6-byte big-endian length (excluding itself), a
//! section-count byte (0 means 256), the packed section lengths, the
//! entropy payload and the L-F trailer. Consecutive first-column contexts
//! are merged into sections of roughly `SECTION_TARGET` bytes; the decoder
//! reads whatever boundaries the encoder wrote.

pub mod huffman;
pub mod range_coder;
pub mod wavelet;
pub mod wavelet_tree;

use crate::bitstream::{BitReader, BitWriter};
use crate::bwt_algorithms::{BwTransform, BwtBlock};
use crate::error::BwError;
use crate::tools::packed_int;
use crate::Result;
use wavelet::WaveletCoder;

/// Encoding ids accepted on the command line and in the global header.
/// `n m M u b B` pick the wavelet coder's probability model, `h` the
/// canonical Huffman coder.
pub const ENCODING_IDS: &[u8] = b"nmMubBh";

/// Merge consecutive contexts until a section reaches this many bytes.
const SECTION_TARGET: usize = 10_000;

/// Entropy coder for the blocks of one stream, either variant.
pub enum EntropyCoder {
    Wavelet(WaveletCoder),
    Huffman,
}

impl EntropyCoder {
    pub fn new(encoding: u8) -> Self {
        if encoding == b'h' {
            EntropyCoder::Huffman
        } else {
            EntropyCoder::Wavelet(WaveletCoder::new(encoding))
        }
    }

    /// Transform one precompressed slice and append its framed block.
    pub fn transform_and_encode(
        &mut self,
        transform: &dyn BwTransform,
        slice: &[u8],
        out: &mut Vec<u8>,
    ) {
        debug_assert!(!slice.is_empty());
        let mut freqs = [0u32; 256];
        for &b in slice {
            freqs[b as usize] += 1;
        }
        let (data, key) = transform.forward(slice);
        let block = BwtBlock {
            data,
            lf_powers: vec![key],
        };

        let sections = deduce_sections(&freqs);
        let mut body = Vec::with_capacity(slice.len() / 2 + 64);
        body.push(if sections.len() == 256 {
            0
        } else {
            sections.len() as u8
        });
        for &len in &sections {
            packed_int::write_packed(&mut body, len as u64);
        }

        let mut offset = 0usize;
        for &len in &sections {
            let section = &block.data[offset..offset + len];
            match self {
                EntropyCoder::Wavelet(coder) => coder.encode_section(&mut body, section),
                EntropyCoder::Huffman => huffman::encode_section(&mut body, section),
            }
            offset += len;
        }
        debug_assert_eq!(offset, block.data.len());

        write_lf_trailer(&mut body, &block.lf_powers);

        debug_assert!(body.len() < 1usize << 48);
        let framed_len = body.len() as u64;
        for shift in (0..6).rev() {
            out.push((framed_len >> (shift * 8)) as u8);
        }
        out.extend_from_slice(&body);
        log::debug!(
            "encoded BWT block: {} bytes in, {} bytes out, {} sections",
            slice.len(),
            body.len() + 6,
            sections.len()
        );
    }

    /// Read one framed block from `input` and return the recovered slice.
    pub fn decode_block(
        &mut self,
        transform: &dyn BwTransform,
        expected_len: usize,
        read_exact: &mut dyn FnMut(&mut [u8]) -> Result<()>,
    ) -> Result<Vec<u8>> {
        let mut len_bytes = [0u8; 6];
        read_exact(&mut len_bytes)?;
        let mut framed_len = 0u64;
        for &b in &len_bytes {
            framed_len = (framed_len << 8) | b as u64;
        }
        if framed_len < 2 || framed_len > (expected_len as u64 + 64) * 9 + (1 << 16) {
            return Err(BwError::MalformedInput("implausible block length"));
        }
        let mut body = vec![0u8; framed_len as usize];
        read_exact(&mut body)?;
        log::debug!("compressed block size = {}", framed_len + 6);

        let mut reader = BitReader::new(&body);
        let count_byte = reader.read_byte()?;
        let n_sections = if count_byte == 0 {
            256
        } else {
            count_byte as usize
        };
        let mut sections = Vec::with_capacity(n_sections);
        let mut total = 0u64;
        for _ in 0..n_sections {
            let len = packed_int::read_packed(|| reader.read_byte())?;
            if len > expected_len as u64 {
                return Err(BwError::MalformedInput("section longer than its slice"));
            }
            total += len;
            sections.push(len as usize);
        }
        if total != expected_len as u64 {
            return Err(BwError::MalformedInput("section lengths disagree with slice"));
        }

        let mut data = Vec::with_capacity(expected_len);
        for &len in &sections {
            if len == 0 {
                continue;
            }
            match self {
                EntropyCoder::Wavelet(coder) => {
                    coder.decode_section(&mut reader, len, &mut data)?
                }
                EntropyCoder::Huffman => huffman::decode_section(&mut reader, len, &mut data)?,
            }
        }

        let powers = read_lf_trailer(&mut reader)?;
        // The trailer ends the block exactly; anything else is framing
        // corruption.
        if reader.byte_pos() != body.len() {
            return Err(BwError::MalformedInput("block length field mismatch"));
        }
        transform.inverse(&data, powers[0])
    }
}

/// Merge the 256 first-column contexts into encoding sections.
fn deduce_sections(freqs: &[u32; 256]) -> Vec<usize> {
    let mut sections = Vec::new();
    let mut sum = 0usize;
    for &f in freqs.iter() {
        sum += f as usize;
        if sum >= SECTION_TARGET {
            sections.push(sum);
            sum = 0;
        }
    }
    if sum != 0 {
        if let Some(last) = sections.last_mut() {
            *last += sum;
        } else {
            sections.push(sum);
        }
    }
    debug_assert!(sections.len() <= 256);
    sections
}

/// One byte `count - 1`, then each power as 31 bits MSB-first, zero padded
/// to the byte boundary.
fn write_lf_trailer(out: &mut Vec<u8>, powers: &[u32]) {
    debug_assert!(!powers.is_empty() && powers.len() <= 256);
    out.push((powers.len() - 1) as u8);
    let mut bw = BitWriter::new(powers.len() * 4 + 1);
    for &p in powers {
        debug_assert!(p < (1 << 31));
        bw.push_bits(p as u64, 31);
    }
    bw.flush();
    out.extend_from_slice(&bw.output);
}

fn read_lf_trailer(reader: &mut BitReader<'_>) -> Result<Vec<u32>> {
    reader.align_to_byte();
    let count = reader.read_byte()? as usize + 1;
    if count != 1 {
        // This implementation always writes a single starting point.
        return Err(BwError::MalformedInput("unsupported L-F power count"));
    }
    let mut powers = Vec::with_capacity(count);
    for _ in 0..count {
        powers.push(reader.read_bits(31)? as u32);
    }
    reader.align_to_byte();
    Ok(powers)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bwt_algorithms::SaisBwt;

    fn roundtrip(data: &[u8], encoding: u8) {
        let mut coder = EntropyCoder::new(encoding);
        let mut out = Vec::new();
        coder.transform_and_encode(&SaisBwt, data, &mut out);

        // Framing: the 48-bit length matches the body exactly.
        let framed = u64::from_be_bytes([0, 0, out[0], out[1], out[2], out[3], out[4], out[5]]);
        assert_eq!(framed as usize, out.len() - 6);

        let mut pos = 0usize;
        let mut decoder = EntropyCoder::new(encoding);
        let mut read = |buf: &mut [u8]| -> Result<()> {
            buf.copy_from_slice(&out[pos..pos + buf.len()]);
            pos += buf.len();
            Ok(())
        };
        let back = decoder
            .decode_block(&SaisBwt, data.len(), &mut read)
            .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn block_roundtrips_all_encodings() {
        for enc in ENCODING_IDS {
            roundtrip(b"a", *enc);
            roundtrip(b"abracadabra banana mississippi", *enc);
            roundtrip(&[0u8; 300], *enc);
        }
    }

    #[test]
    fn multi_section_block() {
        // Spread bytes so several contexts exceed the section target.
        let mut data = Vec::new();
        for i in 0..40_000u32 {
            data.push((i % 5) as u8 * 40);
        }
        roundtrip(&data, b'h');
        roundtrip(&data, b'B');
    }

    #[test]
    fn sections_cover_the_block() {
        let mut freqs = [0u32; 256];
        freqs[10] = 12_000;
        freqs[20] = 3;
        freqs[200] = 9_000;
        let sections = deduce_sections(&freqs);
        assert_eq!(sections.iter().sum::<usize>(), 21_003);
        assert_eq!(sections[0], 12_000);
    }

    #[test]
    fn trailer_is_byte_exact() {
        let mut out = Vec::new();
        write_lf_trailer(&mut out, &[123_456]);
        assert_eq!(out.len(), 1 + 4);
        let mut reader = BitReader::new(&out);
        let powers = read_lf_trailer(&mut reader).unwrap();
        assert_eq!(powers, vec![123_456]);
        assert_eq!(reader.byte_pos(), out.len());
    }
}
