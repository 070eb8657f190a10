//! bwzip — a block-sorting file compressor.
//!
//! Input is read one large block at a time. Each block is run through a
//! grammar-based precompressor (pair, run and long-sequence replacement with
//! symbol freeing), sliced, transformed with the Burrows-Wheeler Transform
//! and entropy coded, either with a wavelet tree driven by a binary range
//! coder and adaptive probability models, or with a canonical Huffman code
//! over a run-length-encoded sequence.
//!
//! Decompression inverts each stage: entropy decode, inverse BWT, then the
//! grammar postprocessor expands the recorded replacements in reverse order.
//!
//! The pipeline is single threaded; blocks are processed one after another
//! and every buffer is released before the next block starts.
#![warn(rust_2018_idioms)]

pub mod bitstream;
pub mod bwt_algorithms;
pub mod coders;
pub mod compression;
pub mod error;
pub mod precompress;
pub mod probmodels;
pub mod tools;

pub use compression::compress::Compressor;
pub use compression::decompress::Decompressor;
pub use compression::CompressOptions;
pub use error::BwError;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, BwError>;
