//! Bit-precise I/O over in-memory buffers.
//!
//! Every BWT block in the container is length prefixed, so both sides work
//! on whole blocks in memory: the writer packs MSB-first bits into a byte
//! vector and the reader walks a byte slice bit by bit. Shape vectors,
//! Huffman code words, gamma codes and the L-F trailer all go through these
//! two types.

pub mod bitreader;
pub mod bitwriter;

pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
