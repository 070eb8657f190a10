//! Command line interface.
//!
//! One binary covers both directions: compression is the default and
//! `-d/--decompress` selects the symmetric decompressor. Validation
//! failures map to [`BwError::InvalidOption`] so the process exits with
//! status 1.

use clap::Parser;

use crate::compression::CompressOptions;
use crate::error::BwError;
use crate::Result;

#[derive(Parser, Debug)]
#[command(
    name = "bwzip",
    version,
    about = "A block-sorting file compressor built on the Burrows-Wheeler Transform",
    long_about = None
)]
pub struct Args {
    /// Input from standard in
    #[arg(short = 'i', long = "stdin")]
    pub stdin: bool,

    /// Output to standard out
    #[arg(short = 'c', long = "stdout")]
    pub stdout: bool,

    /// Decompress instead of compress
    #[arg(short = 'd', long = "decompress")]
    pub decompress: bool,

    /// Block size for compression (in kB)
    #[arg(short = 'b', long = "block", default_value_t = 100_000)]
    pub block: u64,

    /// Verbosity level (0..=3)
    #[arg(short = 'v', long = "verb", default_value_t = 0)]
    pub verbosity: u8,

    /// Whether preprocessing may use escaping (0 to disable)
    #[arg(long = "escape", default_value_t = 1)]
    pub escape: u8,

    /// Preprocessor pipeline: p pairs, r runs, c pairs then runs, s long
    /// recurring sequences. "ppr" runs the pair replacer twice, then the
    /// run replacer once
    #[arg(long = "prepr", default_value = "")]
    pub prepr: String,

    /// Entropy encoding scheme:
    ///   n  predicts probability 0.5 always,
    ///   u  simple predictor with 4 states,
    ///   m  order-1 bit-history predictor,
    ///   M  order-2 bit-history predictor,
    ///   b  FSM with unbiased, equal predictors in each state,
    ///   B  slightly optimised version of the above,
    ///   h  canonical Huffman over run lengths
    #[arg(short = 'e', long = "enc", default_value_t = 'B')]
    pub encoding: char,

    /// Worker threads (only 1 is supported)
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,

    /// File to compress, defaults to stdin
    pub input_file: Option<String>,

    /// Target file
    pub output_file: Option<String>,
}

impl Args {
    /// Validate and convert into compressor options.
    pub fn to_options(&self) -> Result<CompressOptions> {
        crate::precompress::parse_pipeline(&self.prepr)?;
        if !self.encoding.is_ascii()
            || !crate::coders::ENCODING_IDS.contains(&(self.encoding as u8))
        {
            return Err(BwError::InvalidOption(format!(
                "invalid choice for entropy encoding '{}'",
                self.encoding
            )));
        }
        if self.threads != 1 {
            return Err(BwError::InvalidOption(
                "supporting only a single thread".into(),
            ));
        }
        if self.escape > 1 {
            return Err(BwError::InvalidOption(
                "escape takes 0 or 1".into(),
            ));
        }
        let block = if self.block == 0 { 1 } else { self.block };
        let block_size = (block as usize).saturating_mul(1024);
        Ok(CompressOptions {
            block_size,
            max_bwt_size: block_size,
            preproc: self.prepr.clone(),
            encoding: self.encoding as u8,
            escaping: self.escape == 1,
        })
    }

    /// Log level for the chosen verbosity.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("bwzip").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_documented_cli() {
        let args = parse(&["in.txt", "out.bw"]);
        assert_eq!(args.block, 100_000);
        assert_eq!(args.encoding, 'B');
        assert_eq!(args.escape, 1);
        assert_eq!(args.threads, 1);
        let options = args.to_options().unwrap();
        assert_eq!(options.block_size, 100_000 * 1024);
        assert!(options.escaping);
    }

    #[test]
    fn bad_pipeline_and_encoding_are_invalid_options() {
        let args = parse(&["--prepr", "px", "in", "out"]);
        assert!(matches!(
            args.to_options(),
            Err(BwError::InvalidOption(_))
        ));
        let args = parse(&["-e", "z", "in", "out"]);
        assert!(matches!(
            args.to_options(),
            Err(BwError::InvalidOption(_))
        ));
    }

    #[test]
    fn only_one_thread_is_supported() {
        let args = parse(&["-t", "4", "in", "out"]);
        assert!(matches!(
            args.to_options(),
            Err(BwError::InvalidOption(_))
        ));
    }

    #[test]
    fn positional_files_in_order() {
        let args = parse(&["--prepr", "pr", "a.txt", "b.bw"]);
        assert_eq!(args.input_file.as_deref(), Some("a.txt"));
        assert_eq!(args.output_file.as_deref(), Some("b.bw"));
        assert!(args.to_options().is_ok());
    }
}
