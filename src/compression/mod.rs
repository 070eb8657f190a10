//! Stream-level compression and decompression.
//!
//! The compressed file is a global header (pipeline string and encoding
//! id), a sequence of precompressor blocks, and a terminating zero byte.
//! Each precompressor block carries its original size, the grammar, the
//! slice table and one framed BWT block per slice.

pub mod compress;
pub mod decompress;

/// Everything the compressor needs to know, assembled by the CLI.
#[derive(Clone, Debug)]
pub struct CompressOptions {
    /// Raw block size in bytes.
    pub block_size: usize,
    /// Upper bound for one BWT slice in bytes.
    pub max_bwt_size: usize,
    /// Preprocessor pipeline string over {p, r, c, s}.
    pub preproc: String,
    /// Entropy coding id, one of `n m M u b B h`.
    pub encoding: u8,
    /// Whether the precompressor may free symbols via escaping.
    pub escaping: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            block_size: 100_000 * 1024,
            max_bwt_size: 100_000 * 1024,
            preproc: String::new(),
            encoding: b'B',
            escaping: true,
        }
    }
}
