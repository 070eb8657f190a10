//! Replacement of long runs of a single byte.
//!
//! A run of length L is decomposed over the powers of two of its even
//! part, so each (symbol, 2^k) pair becomes one candidate weighted by
//! `(len-1)·freq`, the bytes it would save. Candidates live in an indexed
//! max-heap: extracting the best run deletes the symbol's longer runs and
//! proportionally consumes its shorter ones, since the chosen run eats
//! them. The (p1)/(p2) profit analysis matches the pair replacer with the
//! saving term `(len-1)·freq`.

use std::collections::BTreeMap;

use crate::precompress::grammar::{Grammar, PassRecord};
use crate::precompress::pair_replacer::pinned_frequencies;
use crate::tools::freq_table::FrequencyTable;

/// Runs longer than this are split.
const MAX_RUN_LEN: u32 = 1 << 15;

#[derive(Clone, Copy, Debug)]
struct Triple {
    symbol: u8,
    len: u32,
    freq: u32,
}

impl Triple {
    fn saving(&self) -> u64 {
        (self.len as u64 - 1) * self.freq as u64
    }
}

/// Run one run replacement pass over `data`.
pub fn compress_long_runs(data: &[u8], grammar: &mut Grammar, escaping: bool) -> Vec<u8> {
    if data.len() < 2 {
        grammar.finish_pass(PassRecord::default());
        return data.to_vec();
    }

    let mut freq = [0u64; 256];
    let mut run_freq: Vec<BTreeMap<u32, u32>> = vec![BTreeMap::new(); 256];
    for (sym, len) in capped_runs(data) {
        freq[sym as usize] += len as u64;
        if len > 1 && !grammar.is_special(sym) {
            update_freqs(&mut run_freq[sym as usize], len);
        }
    }
    let mut freqs = FrequencyTable::new(&pinned_frequencies(&freq, grammar));

    let mut free_symbols = 0usize;
    while free_symbols < 256 && freqs.get(free_symbols) == 0 {
        free_symbols += 1;
    }

    let mut runs = Vec::new();
    for (sym, lengths) in run_freq.iter().enumerate() {
        for (&len, &count) in lengths {
            debug_assert!(len > 1 && count > 0);
            runs.push(Triple {
                symbol: sym as u8,
                len,
                freq: count,
            });
        }
    }
    let longest_runs = find_replaceable_runs(runs, &mut freqs);

    let escape_index = if longest_runs.len() > free_symbols && escaping {
        escape_char_index(&mut freqs, &longest_runs, free_symbols)
    } else {
        free_symbols
    };
    let new_symbols = if escape_index == free_symbols {
        0
    } else {
        escape_index - free_symbols + 1
    };
    let used_runs = if new_symbols > 0 {
        escape_index
    } else {
        free_symbols.min(longest_runs.len())
    };
    let escape_byte = freqs.key(escape_index);

    log::debug!(
        "replacing {} runs, {} symbols made free",
        used_runs,
        new_symbols
    );

    // Per-symbol replacement map: run length to replacement byte. Length
    // one maps to the symbol itself, or to the escape for freed symbols.
    let mut replacements: Vec<BTreeMap<u32, u8>> = vec![BTreeMap::new(); 256];
    for (s, map) in replacements.iter_mut().enumerate() {
        map.insert(1, s as u8);
    }
    let mut freed = Vec::new();
    if new_symbols > 0 {
        for i in free_symbols..=escape_index {
            replacements[freqs.key(i) as usize].insert(1, escape_byte);
            if i < escape_index {
                freed.push(freqs.key(i));
            }
        }
        grammar.add_special_symbol(escape_byte);
    }
    for (i, run) in longest_runs.iter().take(used_runs).enumerate() {
        let sym = freqs.key(i);
        debug_assert!(sym != escape_byte || new_symbols == 0);
        replacements[run.symbol as usize].insert(run.len, sym);
        grammar.add_long_rule(sym, &vec![run.symbol; run.len as usize]);
    }

    let out = if used_runs > 0 || new_symbols > 0 {
        let mut out = Vec::with_capacity(data.len() + 2);
        for (sym, len) in capped_runs(data) {
            write_run_replacement(
                &replacements[sym as usize],
                len,
                new_symbols > 0,
                escape_byte,
                sym,
                &mut out,
            );
        }
        out
    } else {
        data.to_vec()
    };

    grammar.finish_pass(PassRecord {
        rule_count: used_runs,
        escape: (new_symbols > 0).then_some(escape_byte),
        freed,
        uses_special_pairs: false,
    });
    out
}

/// Runs of `data` with lengths capped at `MAX_RUN_LEN`.
fn capped_runs(data: &[u8]) -> impl Iterator<Item = (u8, u32)> + '_ {
    let mut i = 0usize;
    std::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let sym = data[i];
        let mut len = 1u32;
        while i + (len as usize) < data.len()
            && data[i + len as usize] == sym
            && len < MAX_RUN_LEN
        {
            len += 1;
        }
        i += len as usize;
        Some((sym, len))
    })
}

/// Decompose the even part of a run over powers of two.
fn update_freqs(lengths: &mut BTreeMap<u32, u32>, mut len: u32) {
    debug_assert!(len > 1 && len <= MAX_RUN_LEN);
    len -= len % 2;
    let original = len;
    while len > 0 {
        let longest = 1 << (31 - len.leading_zeros());
        *lengths.entry(longest).or_insert(0) += original / longest;
        len -= longest;
    }
}

/// Greedy selection mirroring the pair replacer's (p1).
fn find_replaceable_runs(runs: Vec<Triple>, freqs: &mut FrequencyTable) -> Vec<Triple> {
    let cap = runs.len().min(254);
    let mut heap = SequenceHeap::new(runs);
    let mut longest = Vec::new();
    while longest.len() < cap {
        let best = match heap.delete_max() {
            Some(t) => t,
            None => break,
        };
        if !freqs.decrease(best.symbol, best.len as u64 * best.freq as u64) {
            // Decomposition over-counted this symbol; skip the candidate
            // rather than corrupt the table.
            continue;
        }
        if freqs.get(longest.len()) + 3 >= best.saving() {
            break;
        }
        longest.push(best);
    }
    longest
}

/// Condition (p2) with the run saving term.
fn escape_char_index(freqs: &mut FrequencyTable, runs: &[Triple], free_symbols: usize) -> usize {
    if runs.len() <= free_symbols {
        return free_symbols;
    }
    let mut utility: i64 = 0;
    for i in free_symbols..runs.len() {
        utility += runs[i].saving() as i64 - freqs.get(i) as i64 - 3;
    }
    let mut i = runs.len();
    while i > free_symbols && utility <= freqs.get(i) as i64 {
        i -= 1;
        freqs.increase(runs[i].symbol, runs[i].saving());
        utility -= runs[i].saving() as i64 - freqs.get(i) as i64 - 3;
    }
    i
}

/// Emit one source run, longest replacements first.
fn write_run_replacement(
    map: &BTreeMap<u32, u8>,
    mut run_length: u32,
    escaping: bool,
    escape: u8,
    symbol: u8,
    out: &mut Vec<u8>,
) {
    for (&len, &repl) in map.iter().rev() {
        if run_length == 0 {
            break;
        }
        let times = run_length / len;
        if len == 1 && escaping && repl == escape {
            for _ in 0..times {
                out.push(escape);
                out.push(symbol);
            }
        } else {
            out.extend(std::iter::repeat(repl).take(times as usize));
        }
        run_length -= times * len;
    }
    debug_assert_eq!(run_length, 0);
}

/// Indexed max-heap over the run candidates: a binary heap keyed by the
/// saving, plus a per-(symbol, length) position index kept in lock-step
/// with every move so same-symbol entries can be found and adjusted.
struct SequenceHeap {
    seqs: Vec<Triple>,
    positions: Vec<BTreeMap<u32, usize>>,
}

impl SequenceHeap {
    fn new(seqs: Vec<Triple>) -> Self {
        let mut positions: Vec<BTreeMap<u32, usize>> = vec![BTreeMap::new(); 256];
        for (i, t) in seqs.iter().enumerate() {
            positions[t.symbol as usize].insert(t.len, i);
        }
        let mut heap = Self { seqs, positions };
        if !heap.seqs.is_empty() {
            for i in (0..heap.seqs.len() / 2).rev() {
                heap.sift_down(i);
            }
        }
        heap
    }

    /// Extract the most profitable run, deleting the symbol's longer runs
    /// and consuming its shorter ones proportionally.
    fn delete_max(&mut self) -> Option<Triple> {
        if self.seqs.is_empty() {
            return None;
        }
        let max = self.seqs[0];
        let lengths: Vec<u32> = self.positions[max.symbol as usize].keys().copied().collect();
        for len in lengths {
            let idx = match self.positions[max.symbol as usize].get(&len) {
                Some(&i) => i,
                None => continue,
            };
            if len >= max.len {
                self.delete(idx);
            } else {
                let eaten = (max.len / len) * max.freq;
                self.seqs[idx].freq = self.seqs[idx].freq.saturating_sub(eaten);
                self.sift_down(idx);
            }
        }
        Some(max)
    }

    fn delete(&mut self, idx: usize) {
        let last = self.seqs.len() - 1;
        let gone = self.seqs[idx];
        self.positions[gone.symbol as usize].remove(&gone.len);
        if idx != last {
            let moved = self.seqs[last];
            self.seqs[idx] = moved;
            self.positions[moved.symbol as usize].insert(moved.len, idx);
        }
        self.seqs.pop();
        if idx < self.seqs.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.seqs.swap(i, j);
        let (a, b) = (self.seqs[i], self.seqs[j]);
        self.positions[a.symbol as usize].insert(a.len, i);
        self.positions[b.symbol as usize].insert(b.len, j);
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut largest = i;
            if l < self.seqs.len() && self.seqs[l].saving() > self.seqs[largest].saving() {
                largest = l;
            }
            if r < self.seqs.len() && self.seqs[r].saving() > self.seqs[largest].saving() {
                largest = r;
            }
            if largest == i {
                return;
            }
            self.swap(i, largest);
            i = largest;
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.seqs[parent].saving() >= self.seqs[i].saving() {
                return;
            }
            self.swap(i, parent);
            i = parent;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::precompress::postprocess::postprocess;

    fn roundtrip(data: &[u8], escaping: bool) -> (Vec<u8>, Grammar) {
        let mut grammar = Grammar::new();
        let out = compress_long_runs(data, &mut grammar, escaping);
        let back = postprocess(&grammar, out.clone()).unwrap();
        assert_eq!(back, data, "postprocess must invert the pass");
        (out, grammar)
    }

    #[test]
    fn identical_bytes_collapse_to_one_rule() {
        let data = vec![b'a'; 64];
        let (out, grammar) = roundtrip(&data, true);
        assert_eq!(grammar.number_of_rules(), 1);
        let (_, rhs) = grammar.rule(0);
        assert_eq!(rhs, &data[..]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn mixed_runs_shrink() {
        let mut data = Vec::new();
        for _ in 0..50 {
            data.extend_from_slice(&[b'x'; 32]);
            data.push(b'y');
        }
        let (out, grammar) = roundtrip(&data, true);
        assert!(grammar.number_of_rules() >= 1);
        assert!(out.len() < data.len() / 4);
    }

    #[test]
    fn short_and_runless_inputs_pass_through() {
        for data in [&b""[..], b"a", b"abcabc"] {
            let mut grammar = Grammar::new();
            let out = compress_long_runs(data, &mut grammar, true);
            assert_eq!(out, data);
            assert_eq!(grammar.number_of_rules(), 0);
        }
    }

    #[test]
    fn full_alphabet_runs_need_escaping() {
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
        }
        data.extend(std::iter::repeat(b'z').take(5000));
        let (out, grammar) = roundtrip(&data, true);
        assert!(grammar.number_of_rules() >= 1);
        assert!(grammar.passes()[0].escape.is_some());
        assert!(out.len() < data.len());
    }

    #[test]
    fn runs_longer_than_the_cap_split() {
        let data = vec![0u8; (MAX_RUN_LEN as usize) * 2 + 100];
        roundtrip(&data, true);
    }

    #[test]
    fn update_freqs_decomposes_even_part() {
        let mut lengths = BTreeMap::new();
        update_freqs(&mut lengths, 13);
        // Even part 12 = 8 + 4: one run of 8 (12/8 = 1) and three of 4.
        assert_eq!(lengths.get(&8), Some(&1));
        assert_eq!(lengths.get(&4), Some(&3));
        assert_eq!(lengths.get(&2), None);
    }

    #[test]
    fn heap_deletes_longer_runs_of_the_winner() {
        let runs = vec![
            Triple { symbol: b'a', len: 8, freq: 10 },
            Triple { symbol: b'a', len: 2, freq: 100 },
            Triple { symbol: b'a', len: 16, freq: 1 },
            Triple { symbol: b'b', len: 4, freq: 9 },
        ];
        let mut heap = SequenceHeap::new(runs);
        // Best is (a, 2, 100) with saving 100; the longer a-runs are
        // consumed by it and vanish, b is untouched.
        let best = heap.delete_max().unwrap();
        assert_eq!((best.symbol, best.len), (b'a', 2));
        let next = heap.delete_max().unwrap();
        assert_eq!((next.symbol, next.len), (b'b', 4));
        assert!(heap.delete_max().is_none());
    }

    #[test]
    fn heap_consumes_shorter_runs_proportionally() {
        let runs = vec![
            Triple { symbol: b'a', len: 8, freq: 100 },
            Triple { symbol: b'a', len: 2, freq: 500 },
            Triple { symbol: b'b', len: 4, freq: 9 },
        ];
        let mut heap = SequenceHeap::new(runs);
        // (a, 8) saves 700 and eats (8/2)*100 = 400 of the shorter run's
        // frequency, leaving it at 100 with saving 100.
        let best = heap.delete_max().unwrap();
        assert_eq!((best.symbol, best.len), (b'a', 8));
        let next = heap.delete_max().unwrap();
        assert_eq!((next.symbol, next.len, next.freq), (b'a', 2, 100));
        let last = heap.delete_max().unwrap();
        assert_eq!((last.symbol, last.len), (b'b', 4));
        assert!(heap.delete_max().is_none());
    }
}
