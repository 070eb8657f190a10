//! The decompression side of the pipeline.

use std::io::{Read, Write};

use crate::bwt_algorithms::SaisBwt;
use crate::coders::EntropyCoder;
use crate::error::BwError;
use crate::precompress::grammar::Grammar;
use crate::precompress::postprocess::postprocess;
use crate::precompress::parse_pipeline;
use crate::tools::packed_int;
use crate::Result;

/// Reads the container, routing every slice through the entropy decoder
/// and the inverse transform, then through the grammar postprocessor.
pub struct Decompressor {
    threads: usize,
}

impl Decompressor {
    pub fn new() -> Self {
        Self { threads: 1 }
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads != 1 {
            return Err(BwError::InvalidOption(
                "supporting only a single thread".into(),
            ));
        }
        Ok(Self { threads })
    }

    /// Decompress `input` into `output`. Returns the number of bytes
    /// written.
    pub fn decompress(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<u64> {
        log::trace!("decompressing with {} thread", self.threads);

        // Global header.
        let preproc_len = read_byte(input)? as usize;
        let mut preproc = vec![0u8; preproc_len];
        read_exact(input, &mut preproc)?;
        let preproc = String::from_utf8(preproc)
            .map_err(|_| BwError::MalformedInput("pipeline string is not ascii"))?;
        parse_pipeline(&preproc).map_err(|_| BwError::MalformedInput("unknown pipeline"))?;
        let encoding = read_byte(input)?;
        if !crate::coders::ENCODING_IDS.contains(&encoding) {
            return Err(BwError::MalformedInput("unknown encoding id"));
        }
        log::debug!("pipeline {:?}, encoding {}", preproc, encoding as char);

        let mut coder = EntropyCoder::new(encoding);
        let mut total_out = 0u64;
        let mut blocks = 0usize;
        loop {
            let original_size = packed_int::read_packed(|| read_byte(input))? as usize;
            if original_size == 0 {
                break;
            }
            blocks += 1;

            let mut grammar = Grammar::new();
            grammar.read_grammar(|| read_byte(input))?;

            let n_slices = packed_int::read_packed(|| read_byte(input))? as usize;
            if n_slices == 0 || n_slices > 1 << 20 {
                return Err(BwError::MalformedInput("implausible slice count"));
            }
            let mut slice_lens = Vec::with_capacity(n_slices);
            for _ in 0..n_slices {
                let len = packed_int::read_packed(|| read_byte(input))? as usize;
                if len == 0 {
                    return Err(BwError::MalformedInput("empty slice"));
                }
                slice_lens.push(len);
            }

            let mut data = Vec::with_capacity(slice_lens.iter().sum());
            for &len in &slice_lens {
                let mut read = |buf: &mut [u8]| read_exact(input, buf);
                let slice = coder.decode_block(&SaisBwt, len, &mut read)?;
                data.extend_from_slice(&slice);
            }

            let restored = postprocess(&grammar, data)?;
            if restored.len() != original_size {
                return Err(BwError::MalformedInput("block size disagrees with header"));
            }
            output.write_all(&restored)?;
            total_out += restored.len() as u64;
        }
        output.flush()?;
        log::info!(
            "decompressed {} block{}, {} B",
            blocks,
            if blocks < 2 { "" } else { "s" },
            total_out
        );
        Ok(total_out)
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

fn read_byte(input: &mut dyn Read) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact(input, &mut b)?;
    Ok(b[0])
}

fn read_exact(input: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BwError::MalformedInput("compressed stream ended early")
        } else {
            BwError::Io(e)
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::compress::Compressor;
    use crate::compression::CompressOptions;

    fn roundtrip_with(options: CompressOptions, data: &[u8]) -> Vec<u8> {
        let compressor = Compressor::new(options).unwrap();
        let mut compressed = Vec::new();
        compressor
            .compress(&mut &data[..], &mut compressed)
            .unwrap();
        let mut out = Vec::new();
        Decompressor::new()
            .decompress(&mut &compressed[..], &mut out)
            .unwrap();
        assert_eq!(out, data);
        compressed
    }

    #[test]
    fn single_byte_stream() {
        let compressed = roundtrip_with(CompressOptions::default(), b"x");
        // Header (2) + block + terminator.
        assert_eq!(compressed[0], 0);
        assert_eq!(compressed[1], b'B');
        assert_eq!(*compressed.last().unwrap(), 0);
    }

    #[test]
    fn multi_block_multi_slice() {
        let mut data = Vec::new();
        for i in 0..9000u32 {
            data.push((i % 251) as u8);
        }
        let options = CompressOptions {
            block_size: 4000,
            max_bwt_size: 1500,
            preproc: "c".into(),
            ..Default::default()
        };
        roundtrip_with(options, &data);
    }

    #[test]
    fn empty_input_is_rejected() {
        let compressor = Compressor::new(CompressOptions::default()).unwrap();
        let mut out = Vec::new();
        let err = compressor.compress(&mut &b""[..], &mut out);
        assert!(matches!(err, Err(BwError::InvalidOption(_))));
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let compressed = roundtrip_with(CompressOptions::default(), b"hello world hello");
        for cut in [3, compressed.len() / 2, compressed.len() - 1] {
            let mut out = Vec::new();
            let err = Decompressor::new().decompress(&mut &compressed[..cut], &mut out);
            assert!(err.is_err(), "cut at {} should fail", cut);
        }
    }

    #[test]
    fn unsupported_thread_count_is_rejected() {
        assert!(Decompressor::with_threads(2).is_err());
        assert!(Decompressor::with_threads(1).is_ok());
    }

    #[test]
    fn garbage_header_is_rejected() {
        let mut out = Vec::new();
        let err = Decompressor::new().decompress(&mut &b"\x00Zjunk"[..], &mut out);
        assert!(matches!(err, Err(BwError::MalformedInput(_))));
    }
}
