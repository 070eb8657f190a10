//! The precompressor: grammar-based replacement passes run before the BWT.
//!
//! A pipeline string configures the passes:
//!
//! - `p` — pair replacement
//! - `r` — run replacement
//! - `c` — pair then run replacement
//! - `s` — long recurring sequence replacement
//!
//! Each pass shortens the block and records its replacements in the
//! shared [`grammar::Grammar`]; the postprocessor undoes them in reverse.

pub mod grammar;
pub mod pair_replacer;
pub mod postprocess;
pub mod run_replacer;
pub mod sequence_replacer;

use crate::error::BwError;
use crate::Result;
use grammar::Grammar;

/// One configured pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Pairs,
    Runs,
    PairsAndRuns,
    Sequences,
}

/// Parse and validate a pipeline string.
pub fn parse_pipeline(pipeline: &str) -> Result<Vec<PassKind>> {
    pipeline
        .bytes()
        .map(|c| match c {
            b'p' => Ok(PassKind::Pairs),
            b'r' => Ok(PassKind::Runs),
            b'c' => Ok(PassKind::PairsAndRuns),
            b's' => Ok(PassKind::Sequences),
            other => Err(BwError::InvalidOption(format!(
                "invalid preprocessing choice '{}'",
                other as char
            ))),
        })
        .collect()
}

/// Runs the configured passes over raw blocks.
pub struct Precompressor {
    passes: Vec<PassKind>,
    escaping: bool,
}

impl Precompressor {
    pub fn new(pipeline: &str, escaping: bool) -> Result<Self> {
        Ok(Self {
            passes: parse_pipeline(pipeline)?,
            escaping,
        })
    }

    /// Apply every pass to `data`, producing the precompressed block and
    /// its grammar.
    pub fn precompress(&self, data: Vec<u8>) -> PrecompressorBlock {
        let original_size = data.len();
        let mut grammar = Grammar::new();
        let mut data = data;
        for pass in &self.passes {
            match pass {
                PassKind::Pairs => {
                    data = pair_replacer::compress_common_pairs(&data, &mut grammar, self.escaping)
                }
                PassKind::Runs => {
                    data = run_replacer::compress_long_runs(&data, &mut grammar, self.escaping)
                }
                PassKind::PairsAndRuns => {
                    data = pair_replacer::compress_common_pairs(&data, &mut grammar, self.escaping);
                    data = run_replacer::compress_long_runs(&data, &mut grammar, self.escaping);
                }
                PassKind::Sequences => {
                    data = sequence_replacer::compress_sequences(&data, &mut grammar, self.escaping)
                }
            }
        }
        log::info!(
            "precompressed {} bytes to {} with {} rules",
            original_size,
            data.len(),
            grammar.number_of_rules()
        );
        PrecompressorBlock {
            original_size,
            data,
            grammar,
        }
    }
}

/// One precompressed block, ready to be sliced and transformed.
pub struct PrecompressorBlock {
    pub original_size: usize,
    pub data: Vec<u8>,
    pub grammar: Grammar,
}

impl PrecompressorBlock {
    /// Carve the block into as few slices as possible with each at most
    /// `max_slice` bytes.
    pub fn slice_ranges(&self, max_slice: usize) -> Vec<std::ops::Range<usize>> {
        debug_assert!(max_slice >= 1);
        let mut ranges = Vec::new();
        let mut start = 0usize;
        while start < self.data.len() {
            let end = (start + max_slice).min(self.data.len());
            ranges.push(start..end);
            start = end;
        }
        ranges
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::precompress::postprocess::postprocess;

    #[test]
    fn pipeline_validation() {
        assert!(parse_pipeline("").unwrap().is_empty());
        assert_eq!(
            parse_pipeline("ppr").unwrap(),
            vec![PassKind::Pairs, PassKind::Pairs, PassKind::Runs]
        );
        assert!(parse_pipeline("x").is_err());
        assert!(parse_pipeline("pq").is_err());
    }

    fn roundtrip(pipeline: &str, data: &[u8]) {
        let pre = Precompressor::new(pipeline, true).unwrap();
        let block = pre.precompress(data.to_vec());
        assert_eq!(block.original_size, data.len());
        let back = postprocess(&block.grammar, block.data.clone()).unwrap();
        assert_eq!(back, data, "pipeline {:?}", pipeline);
    }

    #[test]
    fn multi_pass_pipelines_invert() {
        let mut data = Vec::new();
        for _ in 0..200 {
            data.extend_from_slice(b"abababab");
            data.extend_from_slice(&[b'z'; 20]);
            data.extend_from_slice(b"the quick brown fox ");
        }
        for pipeline in ["", "p", "r", "c", "s", "pp", "pr", "rp", "cs", "prs"] {
            roundtrip(pipeline, &data);
        }
    }

    #[test]
    fn grammar_partition_after_passes() {
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
        }
        for _ in 0..2000 {
            data.extend_from_slice(&[1, 2, 3, 3, 3, 3]);
        }
        let pre = Precompressor::new("cp", true).unwrap();
        let block = pre.precompress(data.clone());
        let g = &block.grammar;
        for s in 0..=255u8 {
            assert!(
                !(g.is_special(s) && g.is_variable(s)),
                "symbol {} is both special and variable",
                s
            );
        }
        let back = postprocess(g, block.data).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn slicing_covers_the_block() {
        let pre = Precompressor::new("", true).unwrap();
        let block = pre.precompress(vec![7u8; 1000]);
        let ranges = block.slice_ranges(300);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.last().unwrap().end, block.data.len());
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, block.data.len());
    }
}
