//! The Burrows-Wheeler Transform and its inverse.
//!
//! The transform sorts the rotations of `data` extended with a unique
//! smallest sentinel. The output is the last column of that sorted matrix
//! with the sentinel removed, plus a key: the row index where the sentinel
//! sat. The key is the single L-F power stored per block (§ trailer); the
//! inverse rebuilds the column, inserts the sentinel back at the key row
//! and walks the LF mapping backwards from row zero.

pub mod sais;

use crate::error::BwError;
use crate::Result;

/// The narrow seam between the pipeline and the transform algorithm.
pub trait BwTransform {
    /// Transform `data` into its BWT last column and the sentinel-row key.
    fn forward(&self, data: &[u8]) -> (Vec<u8>, u32);

    /// Rebuild the original data from a last column and key.
    fn inverse(&self, last_column: &[u8], key: u32) -> Result<Vec<u8>>;
}

/// One transformed slice of a precompressor block together with its
/// inverse-transform keys.
pub struct BwtBlock {
    pub data: Vec<u8>,
    pub lf_powers: Vec<u32>,
}

/// SA-IS backed transform, the default implementation.
pub struct SaisBwt;

impl BwTransform for SaisBwt {
    fn forward(&self, data: &[u8]) -> (Vec<u8>, u32) {
        let n = data.len();
        debug_assert!(n >= 1);
        let sa = sais::suffix_array(data);
        let mut last = Vec::with_capacity(n);
        // Row 0 of the sorted matrix is the sentinel rotation; its last
        // column entry is the final byte of the data.
        last.push(data[n - 1]);
        let mut key = 0u32;
        for (rank, &start) in sa.iter().enumerate() {
            if start == 0 {
                // This row precedes the sentinel; it is dropped from the
                // column and its position becomes the key.
                key = rank as u32 + 1;
            } else {
                last.push(data[start as usize - 1]);
            }
        }
        debug_assert!(key >= 1);
        (last, key)
    }

    fn inverse(&self, last_column: &[u8], key: u32) -> Result<Vec<u8>> {
        let n = last_column.len();
        let key = key as usize;
        if key < 1 || key > n {
            return Err(BwError::MalformedInput("BWT key out of range"));
        }

        // Column entry for each of the n+1 rows; `key` holds the sentinel.
        let column = |row: usize| -> Option<u8> {
            if row == key {
                None
            } else {
                Some(last_column[row - (row > key) as usize])
            }
        };

        let mut counts = [0usize; 256];
        for &b in last_column {
            counts[b as usize] += 1;
        }
        // First-column bucket starts; the sentinel occupies row 0.
        let mut next = [0usize; 256];
        let mut sum = 1usize;
        for b in 0..256 {
            next[b] = sum;
            sum += counts[b];
        }

        // lf[row] is the row whose rotation starts one byte earlier. For
        // the sentinel row that is the sentinel rotation itself, row 0.
        let mut lf = vec![0u32; n + 1];
        for row in 0..=n {
            if let Some(b) = column(row) {
                lf[row] = next[b as usize] as u32;
                next[b as usize] += 1;
            }
        }

        let mut out = vec![0u8; n];
        let mut row = 0usize;
        for i in (0..n).rev() {
            match column(row) {
                Some(b) => out[i] = b,
                None => return Err(BwError::MalformedInput("BWT walk hit the sentinel")),
            }
            row = lf[row] as usize;
        }
        Ok(out)
    }
}
