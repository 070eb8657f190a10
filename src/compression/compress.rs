//! The compression side of the pipeline.

use std::io::{Read, Write};

use crate::bwt_algorithms::SaisBwt;
use crate::coders::EntropyCoder;
use crate::compression::CompressOptions;
use crate::error::BwError;
use crate::precompress::Precompressor;
use crate::tools::packed_int;
use crate::Result;

/// Drives precompression, the transform and the entropy coder over every
/// block of the input.
pub struct Compressor {
    options: CompressOptions,
}

impl Compressor {
    pub fn new(options: CompressOptions) -> Result<Self> {
        if !crate::coders::ENCODING_IDS.contains(&options.encoding) {
            return Err(BwError::InvalidOption(format!(
                "invalid choice for entropy encoding '{}'",
                options.encoding as char
            )));
        }
        if options.block_size == 0 || options.max_bwt_size == 0 {
            return Err(BwError::InvalidOption("block size must be positive".into()));
        }
        // The L-F trailer stores 31-bit keys, so a slice must fit one.
        if options.max_bwt_size >= 1 << 31 || options.block_size >= 1 << 31 {
            return Err(BwError::InvalidOption(
                "block size exceeds the 31-bit transform limit".into(),
            ));
        }
        if options.preproc.len() > 255 {
            return Err(BwError::InvalidOption("preprocessor string too long".into()));
        }
        Ok(Self { options })
    }

    /// Compress `input` into `output`. Returns the number of bytes read.
    pub fn compress(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<u64> {
        let precompressor =
            Precompressor::new(&self.options.preproc, self.options.escaping)?;
        let mut coder = EntropyCoder::new(self.options.encoding);

        // Global header: length-prefixed pipeline string, encoding byte.
        let mut header = Vec::with_capacity(self.options.preproc.len() + 2);
        header.push(self.options.preproc.len() as u8);
        header.extend_from_slice(self.options.preproc.as_bytes());
        header.push(self.options.encoding);
        output.write_all(&header)?;

        let mut total_in = 0u64;
        let mut blocks = 0usize;
        loop {
            let raw = read_block(input, self.options.block_size)?;
            if raw.is_empty() {
                break;
            }
            total_in += raw.len() as u64;
            blocks += 1;

            let block = precompressor.precompress(raw);

            let mut head = Vec::new();
            packed_int::write_packed(&mut head, block.original_size as u64);
            block.grammar.write_grammar(&mut head);

            let ranges = block.slice_ranges(self.options.max_bwt_size);
            packed_int::write_packed(&mut head, ranges.len() as u64);
            for range in &ranges {
                packed_int::write_packed(&mut head, range.len() as u64);
            }
            output.write_all(&head)?;

            for range in ranges {
                let mut framed = Vec::new();
                coder.transform_and_encode(&SaisBwt, &block.data[range], &mut framed);
                output.write_all(&framed)?;
            }
        }
        if blocks == 0 {
            return Err(BwError::InvalidOption("input is empty".into()));
        }

        // A zero original size terminates the stream.
        output.write_all(&[0u8])?;
        output.flush()?;
        log::info!(
            "read {} block{}, total size {} B",
            blocks,
            if blocks < 2 { "" } else { "s" },
            total_in
        );
        Ok(total_in)
    }
}

/// Fill a block buffer of up to `block_size` bytes from `input`. Grows in
/// chunks so a large configured block size does not allocate up front for
/// a small input.
fn read_block(input: &mut dyn Read, block_size: usize) -> Result<Vec<u8>> {
    const CHUNK: usize = 1 << 20;
    let mut buf = Vec::new();
    while buf.len() < block_size {
        let start = buf.len();
        let want = (block_size - start).min(CHUNK);
        buf.resize(start + want, 0);
        let n = input.read(&mut buf[start..])?;
        buf.truncate(start + n);
        if n == 0 {
            break;
        }
    }
    Ok(buf)
}
