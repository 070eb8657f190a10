//! Wavelet-tree entropy coding of one context section.
//!
//! Per section the payload is `PackedInt(bits_in_root)`, the tree shape
//! (byte padded), then the internal-node bit vectors breadth-first through
//! the range coder. Vector bits go through the main model; when two equal
//! bits appear in a row the rest of the run is sent as one gamma-coded gap
//! whose prefix bits use the gap model and whose value bits the integer
//! model. All three models are reset at the end of every section and each
//! section's range payload is an independent byte-exact unit.

use crate::bitstream::{BitReader, BitWriter};
use crate::coders::range_coder::{RangeDecoder, RangeEncoder};
use crate::coders::wavelet_tree::{Child, WaveletTree};
use crate::error::BwError;
use crate::probmodels::{AdaptiveBitModel, BitPredictor};
use crate::tools::packed_int;
use crate::Result;

/// Owns the three probability models for the lifetime of a block.
pub struct WaveletCoder {
    main: BitPredictor,
    integer: AdaptiveBitModel,
    gap: AdaptiveBitModel,
}

impl WaveletCoder {
    pub fn new(encoding: u8) -> Self {
        Self {
            main: BitPredictor::for_encoding(encoding),
            integer: AdaptiveBitModel::for_integer_codes(),
            gap: AdaptiveBitModel::for_gaps(),
        }
    }

    /// Reset every model; called at each context block boundary.
    fn end_context_block(&mut self) {
        self.main.reset();
        self.integer.reset();
        self.gap.reset();
    }

    /// Encode one section onto `out`.
    pub fn encode_section(&mut self, out: &mut Vec<u8>, section: &[u8]) {
        debug_assert!(!section.is_empty());
        let mut freqs = [0u64; 256];
        for &b in section {
            freqs[b as usize] += 1;
        }
        let mut tree = WaveletTree::from_frequencies(&freqs);
        tree.fill(section);

        packed_int::write_packed(out, section.len() as u64);

        let mut bw = BitWriter::new(64);
        tree.write_shape(&mut bw);
        bw.flush();
        log::trace!(
            "wavelet shape took {} bytes, tree holds {} bits",
            bw.output.len(),
            tree.total_bits()
        );
        out.extend_from_slice(&bw.output);

        if tree.lone_symbol.is_none() {
            let mut rc = RangeEncoder::new();
            for node in breadth_first(&tree) {
                self.encode_vector(&mut rc, &tree.nodes[node].bits);
            }
            out.extend_from_slice(&rc.finish());
        }
        self.end_context_block();
    }

    /// Decode one section of `expected_len` symbols from `reader`.
    pub fn decode_section(
        &mut self,
        reader: &mut BitReader<'_>,
        expected_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let bits_in_root = packed_int::read_packed(|| reader.read_byte())? as usize;
        if bits_in_root != expected_len {
            return Err(BwError::MalformedInput("wavelet root size mismatch"));
        }
        let mut tree = WaveletTree::read_shape(reader)?;
        reader.align_to_byte();

        if tree.lone_symbol.is_none() {
            // Vector lengths cascade: a child receives as many bits as its
            // side was chosen in the parent.
            let mut lengths = vec![0usize; tree.nodes.len()];
            lengths[0] = bits_in_root;
            let order = breadth_first(&tree);
            let mut rc = RangeDecoder::new(reader)?;
            for id in order {
                let len = lengths[id];
                let bits = self.decode_vector(&mut rc, len)?;
                let ones = bits.iter().filter(|&&b| b).count();
                if let Child::Internal(i) = tree.nodes[id].left {
                    lengths[i] = len - ones;
                }
                if let Child::Internal(i) = tree.nodes[id].right {
                    lengths[i] = ones;
                }
                tree.nodes[id].bits = bits;
            }
        }
        tree.message(expected_len, out)?;
        self.end_context_block();
        Ok(())
    }

    fn encode_vector(&mut self, rc: &mut RangeEncoder, bits: &[bool]) {
        let mut i = 0;
        let mut prev: Option<bool> = None;
        while i < bits.len() {
            let bit = bits[i];
            rc.encode_bit(self.main.probability_of_one(), bit);
            self.main.update(bit);
            if prev == Some(bit) {
                // Two in a row: send the rest of this run as a gap.
                let mut j = i + 1;
                while j < bits.len() && bits[j] == bit {
                    j += 1;
                }
                self.encode_gap(rc, (j - i) as u64);
                i = j;
                prev = None;
            } else {
                prev = Some(bit);
                i += 1;
            }
        }
    }

    fn decode_vector(&mut self, rc: &mut RangeDecoder<'_, '_>, len: usize) -> Result<Vec<bool>> {
        let mut bits = Vec::with_capacity(len);
        let mut prev: Option<bool> = None;
        while bits.len() < len {
            let bit = rc.decode_bit(self.main.probability_of_one())?;
            self.main.update(bit);
            bits.push(bit);
            if prev == Some(bit) {
                let gap = self.decode_gap(rc)? as usize;
                if gap < 1 || bits.len() + gap - 1 > len {
                    return Err(BwError::MalformedInput("wavelet gap overruns vector"));
                }
                for _ in 0..gap - 1 {
                    bits.push(bit);
                }
                prev = None;
            } else {
                prev = Some(bit);
            }
        }
        Ok(bits)
    }

    /// Gamma code with a ones prefix: floor(log2 v) one bits through the
    /// gap model, a zero, then the low bits through the integer model.
    fn encode_gap(&mut self, rc: &mut RangeEncoder, value: u64) {
        for (bit, is_value_bit) in gamma_bits(value) {
            if is_value_bit {
                rc.encode_bit(self.integer.probability_of_one(), bit);
                self.integer.update(bit);
            } else {
                rc.encode_bit(self.gap.probability_of_one(), bit);
                self.gap.update(bit);
            }
        }
    }

    fn decode_gap(&mut self, rc: &mut RangeDecoder<'_, '_>) -> Result<u64> {
        let mut log = 0u32;
        loop {
            let bit = rc.decode_bit(self.gap.probability_of_one())?;
            self.gap.update(bit);
            if !bit {
                break;
            }
            log += 1;
            if log > 40 {
                return Err(BwError::MalformedInput("gap code too long"));
            }
        }
        let mut value = 1u64;
        for _ in 0..log {
            let bit = rc.decode_bit(self.integer.probability_of_one())?;
            self.integer.update(bit);
            value = (value << 1) | bit as u64;
        }
        Ok(value)
    }
}

/// Bits of the gamma code for `value >= 1`: floor(log2 v) ones, a zero,
/// then the value's low bits. The second flag marks the trailing value
/// bits, which go through the integer model instead of the gap model.
fn gamma_bits(value: u64) -> Vec<(bool, bool)> {
    debug_assert!(value >= 1);
    let log = 63 - value.leading_zeros();
    let mut bits = Vec::with_capacity(2 * log as usize + 1);
    for _ in 0..log {
        bits.push((true, false));
    }
    bits.push((false, false));
    for k in (0..log).rev() {
        bits.push(((value >> k) & 1 == 1, true));
    }
    bits
}

/// Node ids level by level from the root.
fn breadth_first(tree: &WaveletTree) -> Vec<usize> {
    let mut order = Vec::with_capacity(tree.nodes.len());
    let mut queue = std::collections::VecDeque::new();
    if !tree.nodes.is_empty() {
        queue.push_back(0usize);
    }
    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Child::Internal(i) = tree.nodes[id].left {
            queue.push_back(i);
        }
        if let Child::Internal(i) = tree.nodes[id].right {
            queue.push_back(i);
        }
    }
    order
}
