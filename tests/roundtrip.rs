//! End-to-end round trips over the whole container format.

use bwzip::{CompressOptions, Compressor, Decompressor};
use proptest::prelude::*;

const PIPELINES: &[&str] = &["", "p", "r", "c", "pp", "s", "pr"];
const ENCODINGS: &[u8] = b"nmMubBh";

fn options(pipeline: &str, encoding: u8) -> CompressOptions {
    CompressOptions {
        preproc: pipeline.to_string(),
        encoding,
        ..Default::default()
    }
}

fn compress_with(options: CompressOptions, data: &[u8]) -> Vec<u8> {
    let compressor = Compressor::new(options).unwrap();
    let mut compressed = Vec::new();
    compressor
        .compress(&mut &data[..], &mut compressed)
        .unwrap();
    compressed
}

fn decompress(compressed: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    Decompressor::new()
        .decompress(&mut &compressed[..], &mut out)
        .unwrap();
    out
}

fn roundtrip(pipeline: &str, encoding: u8, data: &[u8]) -> Vec<u8> {
    let compressed = compress_with(options(pipeline, encoding), data);
    let out = decompress(&compressed);
    assert_eq!(
        out,
        data,
        "pipeline {:?} encoding {}",
        pipeline,
        encoding as char
    );
    compressed
}

fn xorshift_bytes(mut state: u64, len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        data.push((state >> 32) as u8);
    }
    data
}

proptest! {
    #[test]
    fn random_blocks_roundtrip(
        data in prop::collection::vec(any::<u8>(), 1..800),
        pipeline_idx in 0..PIPELINES.len(),
        encoding_idx in 0..ENCODINGS.len(),
    ) {
        roundtrip(PIPELINES[pipeline_idx], ENCODINGS[encoding_idx], &data);
    }

    #[test]
    fn skewed_blocks_roundtrip(
        data in prop::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(0u8)], 1..2000),
        encoding_idx in 0..ENCODINGS.len(),
    ) {
        roundtrip("c", ENCODINGS[encoding_idx], &data);
    }

    #[test]
    fn small_blocks_force_slicing(
        data in prop::collection::vec(any::<u8>(), 1..3000),
    ) {
        let opts = CompressOptions {
            block_size: 700,
            max_bwt_size: 256,
            preproc: "c".into(),
            ..Default::default()
        };
        let compressed = compress_with(opts, &data);
        prop_assert_eq!(decompress(&compressed), data);
    }
}

#[test]
fn scenario_single_run() {
    // "aaaa": one run, one Huffman symbol with code length 1 and code 0,
    // run length 4 gamma coded as two zeros and 100.
    for enc in ENCODINGS {
        roundtrip("", *enc, b"aaaa");
    }
}

#[test]
fn scenario_pair_frequencies() {
    // Pair (a,a) has frequency 4 but self-pairs never chain; either way
    // the round trip recovers the input.
    for pipeline in PIPELINES {
        roundtrip(pipeline, b'B', b"baaabaaabcb");
    }
}

#[test]
fn scenario_wavelet_alphabets() {
    // Skewed {a,b,h,e} and balanced {a,b,c,d} wavelet shapes.
    for data in [&b"ahahabahbahaeaeabeabababa"[..], b"abcdabcdabcdabcaba"] {
        for enc in ENCODINGS {
            roundtrip("", *enc, data);
        }
    }
}

#[test]
fn scenario_random_hundred_k() {
    let data = xorshift_bytes(0x853C_49E6_748F_EA9B, 100_000);
    for pipeline in ["", "c", "s"] {
        for enc in [b'n', b'B', b'h'] {
            let compressed = roundtrip(pipeline, enc, &data);
            // Incompressible input stays close to its own size. The
            // container has no stored-block mode, so allow the coding
            // overhead plus headers (the Huffman path spends one gamma
            // bit per run on top of the code words).
            assert!(
                compressed.len() <= data.len() + data.len() / 6 + 2048,
                "pipeline {:?} encoding {} blew up to {}",
                pipeline,
                enc as char,
                compressed.len()
            );
        }
    }
}

#[test]
fn boundary_single_byte() {
    for enc in ENCODINGS {
        roundtrip("p", *enc, b"Q");
    }
}

#[test]
fn boundary_identical_bytes() {
    let data = vec![b'z'; 4096];
    for pipeline in ["r", "c", ""] {
        for enc in [b'B', b'h'] {
            let compressed = roundtrip(pipeline, enc, &data);
            assert!(compressed.len() < 256, "runs should collapse");
        }
    }
}

#[test]
fn boundary_empty_input_is_rejected() {
    let compressor = Compressor::new(CompressOptions::default()).unwrap();
    let mut out = Vec::new();
    assert!(compressor.compress(&mut &b""[..], &mut out).is_err());
}

#[test]
fn all_byte_values_roundtrip() {
    let mut data: Vec<u8> = (0..=255u8).collect();
    data.extend((0..=255u8).rev());
    for pipeline in PIPELINES {
        for enc in [b'B', b'h'] {
            roundtrip(pipeline, enc, &data);
        }
    }
}

#[test]
fn repetitive_text_compresses() {
    let mut data = Vec::new();
    for _ in 0..2000 {
        data.extend_from_slice(b"the quick brown fox jumps over the lazy dog. ");
    }
    for enc in [b'B', b'h'] {
        let compressed = roundtrip("c", enc, &data);
        assert!(
            compressed.len() < data.len() / 4,
            "encoding {} got only {} from {}",
            enc as char,
            compressed.len(),
            data.len()
        );
    }
}

#[test]
fn long_sequence_pipeline_on_structured_data() {
    let mut data = Vec::new();
    let unit = xorshift_bytes(42, 64);
    for _ in 0..500 {
        data.extend_from_slice(&unit);
    }
    let compressed = roundtrip("s", b'B', &data);
    assert!(compressed.len() < data.len() / 2);
}
