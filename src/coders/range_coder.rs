//! Bitwise binary range coder.
//!
//! 32-bit range with byte-wise renormalization and carry propagation
//! through a cache byte plus a run of pending 0xFF bytes. Probabilities are
//! supplied by the caller's models, scaled to 2^12. A finished payload is
//! always exactly `normalizations + 5` bytes and the decoder consumes
//! exactly that many, so section payloads are byte-exact without a length
//! prefix.

use crate::bitstream::BitReader;
use crate::probmodels::PROBABILITY_BITS;
use crate::Result;

const TOP: u32 = 1 << 24;

/// Encoder half. `finish` flushes the remaining state.
pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    /// Pending 0xFF bytes awaiting carry resolution (not counting `cache`).
    pending: u64,
    output: Vec<u8>,
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            cache: 0,
            pending: 0,
            output: Vec::with_capacity(256),
        }
    }

    /// Encode one bit; `p_one` is the probability of a one bit in units of
    /// 2^-12 and must lie in (0, 4096).
    pub fn encode_bit(&mut self, p_one: u16, bit: bool) {
        debug_assert!(p_one >= 1 && (p_one as u32) < (1 << PROBABILITY_BITS));
        let bound = (self.range >> PROBABILITY_BITS) * p_one as u32;
        if bit {
            self.range = bound;
        } else {
            self.low += bound as u64;
            self.range -= bound;
        }
        while self.range < TOP {
            self.shift_low();
            self.range <<= 8;
        }
    }

    fn shift_low(&mut self) {
        let carry = (self.low >> 32) as u8;
        let low32 = self.low as u32;
        if low32 < 0xFF00_0000 || carry != 0 {
            self.output.push(self.cache.wrapping_add(carry));
            let run_byte = 0xFFu8.wrapping_add(carry);
            for _ in 0..self.pending {
                self.output.push(run_byte);
            }
            self.pending = 0;
            self.cache = (low32 >> 24) as u8;
        } else {
            self.pending += 1;
        }
        self.low = ((low32 as u64) << 8) & 0xFFFF_FFFF;
    }

    /// Flush the coder state and return the payload bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.output
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder half, reading bytes from a block-local bit reader. The reader
/// must be byte aligned when the decoder is created.
pub struct RangeDecoder<'r, 'a> {
    range: u32,
    code: u32,
    reader: &'r mut BitReader<'a>,
}

impl<'r, 'a> RangeDecoder<'r, 'a> {
    pub fn new(reader: &'r mut BitReader<'a>) -> Result<Self> {
        // The first payload byte is the encoder's initial zero cache.
        let _ = reader.read_byte()?;
        let mut code = 0u32;
        for _ in 0..4 {
            code = (code << 8) | reader.read_byte()? as u32;
        }
        Ok(Self {
            range: u32::MAX,
            code,
            reader,
        })
    }

    pub fn decode_bit(&mut self, p_one: u16) -> Result<bool> {
        debug_assert!(p_one >= 1 && (p_one as u32) < (1 << PROBABILITY_BITS));
        let bound = (self.range >> PROBABILITY_BITS) * p_one as u32;
        let bit = self.code < bound;
        if bit {
            self.range = bound;
        } else {
            self.code -= bound;
            self.range -= bound;
        }
        while self.range < TOP {
            self.code = (self.code << 8) | self.reader.read_byte()? as u32;
            self.range <<= 8;
        }
        Ok(bit)
    }
}
