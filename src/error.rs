//! Error kinds surfaced to the top level.
//!
//! Frequency-table underflow is not represented here: it is recovered
//! locally (`FrequencyTable::decrease` returns `false`). Everything else
//! that can go wrong inside the core is an implementation bug and is
//! guarded by debug assertions instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BwError {
    /// A bad command line value: unknown preprocessor or encoding
    /// character, unsupported thread count, empty input.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Read or write failure on the input or output stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural inconsistency found while decoding.
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),
}
