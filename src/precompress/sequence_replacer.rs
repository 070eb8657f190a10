//! Replacement of long recurring sequences.
//!
//! The buffer is chunked into non-overlapping windows of `WINDOW` bytes.
//! Windows are hashed, positions bucketed by hash, and each bucket is
//! ordered by content so equal windows form groups. A group of count c
//! saves `(WINDOW-1)·c` bytes against a rule overhead of `WINDOW + 3`, and
//! the usual (p1)/(p2) analysis decides how many groups are worth a
//! symbol. Accepted groups become long grammar rules; the rewrite replaces
//! their windows and escapes freed symbols elsewhere.

use std::collections::HashMap;

use crate::precompress::grammar::{Grammar, PassRecord};
use crate::precompress::pair_replacer::pinned_frequencies;
use crate::tools::freq_table::FrequencyTable;

/// Window size of the sequence detector.
const WINDOW: usize = 32;

struct Group {
    /// Window-aligned start offsets, ascending.
    positions: Vec<usize>,
}

impl Group {
    fn saving(&self) -> u64 {
        (WINDOW as u64 - 1) * self.positions.len() as u64
    }
}

/// Run one long-sequence replacement pass over `data`.
pub fn compress_sequences(data: &[u8], grammar: &mut Grammar, escaping: bool) -> Vec<u8> {
    if data.len() < 2 * WINDOW {
        grammar.finish_pass(PassRecord::default());
        return data.to_vec();
    }

    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }

    // Bucket window positions by hash, then split buckets into groups of
    // identical content.
    let n_windows = data.len() / WINDOW;
    let mut buckets: HashMap<u64, Vec<usize>> = HashMap::with_capacity(n_windows);
    'windows: for w in 0..n_windows {
        let pos = w * WINDOW;
        let window = &data[pos..pos + WINDOW];
        // Windows touching special symbols stay out of the grammar.
        for &b in window {
            if grammar.is_special(b) {
                continue 'windows;
            }
        }
        buckets.entry(hash_window(window)).or_default().push(pos);
    }
    let mut groups: Vec<Group> = Vec::new();
    for (_, mut positions) in buckets {
        if positions.len() < 2 {
            continue;
        }
        positions.sort_unstable();
        while !positions.is_empty() {
            let head = &data[positions[0]..positions[0] + WINDOW];
            let (same, rest): (Vec<usize>, Vec<usize>) = positions
                .iter()
                .copied()
                .partition(|&p| &data[p..p + WINDOW] == head);
            if same.len() >= 2 {
                groups.push(Group { positions: same });
            }
            positions = rest;
        }
    }
    // Hash buckets come out in arbitrary order; tie-break on position so
    // the output is reproducible.
    groups.sort_by(|a, b| {
        b.saving()
            .cmp(&a.saving())
            .then(a.positions[0].cmp(&b.positions[0]))
    });
    groups.truncate(254);

    let mut freqs = FrequencyTable::new(&pinned_frequencies(&freq, grammar));
    let mut free_symbols = 0usize;
    while free_symbols < 256 && freqs.get(free_symbols) == 0 {
        free_symbols += 1;
    }

    // Greedy selection under (p1) with the rule overhead WINDOW + 3.
    let mut accepted: Vec<Group> = Vec::new();
    for group in groups {
        let counts = window_counts(data, &group);
        let ok = try_decrease_window(&mut freqs, &counts);
        if !ok {
            continue;
        }
        if freqs.get(accepted.len()) + WINDOW as u64 + 3 >= group.saving() {
            restore_window(&mut freqs, &counts);
            break;
        }
        accepted.push(group);
        if accepted.len() == 254 {
            break;
        }
    }

    let escape_index = if accepted.len() > free_symbols && escaping {
        escape_char_index(data, &mut freqs, &accepted, free_symbols)
    } else {
        free_symbols
    };
    let new_symbols = if escape_index == free_symbols {
        0
    } else {
        escape_index - free_symbols + 1
    };
    let used = if new_symbols > 0 {
        escape_index
    } else {
        free_symbols.min(accepted.len())
    };
    let escape_byte = freqs.key(escape_index);

    log::debug!(
        "replacing {} sequences, {} symbols made free",
        used,
        new_symbols
    );
    if used == 0 && new_symbols == 0 {
        grammar.finish_pass(PassRecord::default());
        return data.to_vec();
    }

    let mut needs_escape = [false; 256];
    let mut freed = Vec::new();
    if new_symbols > 0 {
        for i in free_symbols..=escape_index {
            needs_escape[freqs.key(i) as usize] = true;
            if i < escape_index {
                freed.push(freqs.key(i));
            }
        }
        grammar.add_special_symbol(escape_byte);
    }

    let mut replacement_at: HashMap<usize, u8> = HashMap::new();
    for (i, group) in accepted.iter().take(used).enumerate() {
        let sym = freqs.key(i);
        grammar.add_long_rule(sym, &data[group.positions[0]..group.positions[0] + WINDOW]);
        for &p in &group.positions {
            replacement_at.insert(p, sym);
        }
    }

    let mut out = Vec::with_capacity(data.len());
    let mut i = 0usize;
    while i < data.len() {
        if i % WINDOW == 0 {
            if let Some(&sym) = replacement_at.get(&i) {
                out.push(sym);
                i += WINDOW;
                continue;
            }
        }
        let b = data[i];
        if needs_escape[b as usize] {
            out.push(escape_byte);
        }
        out.push(b);
        i += 1;
    }

    grammar.finish_pass(PassRecord {
        rule_count: used,
        escape: (new_symbols > 0).then_some(escape_byte),
        freed,
        uses_special_pairs: false,
    });
    out
}

fn hash_window(window: &[u8]) -> u64 {
    let mut h = 0xCBF2_9CE4_8422_2325u64;
    for &b in window {
        h ^= b as u64;
        h = h.wrapping_mul(0x1000_0000_01B3);
    }
    h
}

/// Per-byte occurrence counts over all of a group's windows.
fn window_counts(data: &[u8], group: &Group) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &b in &data[group.positions[0]..group.positions[0] + WINDOW] {
        counts[b as usize] += group.positions.len() as u64;
    }
    counts
}

fn try_decrease_window(freqs: &mut FrequencyTable, counts: &[u64; 256]) -> bool {
    for s in 0..256 {
        if counts[s] > 0 && !freqs.decrease(s as u8, counts[s]) {
            // Roll back the part already taken.
            for t in 0..s {
                if counts[t] > 0 {
                    freqs.increase(t as u8, counts[t]);
                }
            }
            return false;
        }
    }
    true
}

fn restore_window(freqs: &mut FrequencyTable, counts: &[u64; 256]) {
    for s in 0..256 {
        if counts[s] > 0 {
            freqs.increase(s as u8, counts[s]);
        }
    }
}

/// Condition (p2) with the sequence saving and overhead terms. A rolled
/// back group gets its window frequencies restored before the next
/// utility term is read, as in the pair and run replacers.
fn escape_char_index(
    data: &[u8],
    freqs: &mut FrequencyTable,
    groups: &[Group],
    free_symbols: usize,
) -> usize {
    if groups.len() <= free_symbols {
        return free_symbols;
    }
    let overhead = WINDOW as i64 + 3;
    let mut utility: i64 = 0;
    for i in free_symbols..groups.len() {
        utility += groups[i].saving() as i64 - freqs.get(i) as i64 - overhead;
    }
    let mut i = groups.len();
    while i > free_symbols && utility <= freqs.get(i) as i64 {
        i -= 1;
        restore_window(freqs, &window_counts(data, &groups[i]));
        utility -= groups[i].saving() as i64 - freqs.get(i) as i64 - overhead;
    }
    i
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::precompress::postprocess::postprocess;

    fn roundtrip(data: &[u8], escaping: bool) -> (Vec<u8>, Grammar) {
        let mut grammar = Grammar::new();
        let out = compress_sequences(data, &mut grammar, escaping);
        let back = postprocess(&grammar, out.clone()).unwrap();
        assert_eq!(back, data, "postprocess must invert the pass");
        (out, grammar)
    }

    #[test]
    fn repeated_blocks_become_rules() {
        let mut unit = Vec::new();
        for i in 0..WINDOW {
            unit.push((i % 7) as u8 + b'a');
        }
        let mut data = Vec::new();
        for _ in 0..40 {
            data.extend_from_slice(&unit);
        }
        let (out, grammar) = roundtrip(&data, true);
        assert_eq!(grammar.number_of_rules(), 1);
        let (_, rhs) = grammar.rule(0);
        assert_eq!(rhs, &unit[..]);
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn unaligned_repeats_are_left_alone() {
        // The repeat never lands on the same window phase twice.
        let mut data = Vec::new();
        for i in 0..(WINDOW * 8) {
            data.push((i % 251) as u8);
        }
        let (out, grammar) = roundtrip(&data, true);
        assert_eq!(grammar.number_of_rules(), 0);
        assert_eq!(out, data);
    }

    #[test]
    fn full_alphabet_sequences_need_escaping() {
        // Every byte value occurs, so replacement symbols must be freed
        // and their plain occurrences escaped. Two heavy groups and one
        // marginal group drive the (p2) walk.
        let mut data = Vec::new();
        for _ in 0..60 {
            data.extend_from_slice(&[3u8; WINDOW]);
        }
        for _ in 0..50 {
            data.extend_from_slice(&[7u8; WINDOW]);
        }
        for _ in 0..2 {
            data.extend_from_slice(&[11u8; WINDOW]);
        }
        for i in 0..=255u8 {
            data.push(i);
        }
        let (out, grammar) = roundtrip(&data, true);
        assert!(grammar.number_of_rules() >= 1);
        assert!(grammar.passes()[0].escape.is_some());
        assert!(!grammar.passes()[0].freed.is_empty());
        assert!(out.len() < data.len());
    }

    #[test]
    fn tail_bytes_survive() {
        let mut data = Vec::new();
        for _ in 0..10 {
            data.extend_from_slice(&[b'q'; WINDOW]);
        }
        data.extend_from_slice(b"tail");
        roundtrip(&data, true);
    }

    #[test]
    fn short_input_passes_through() {
        let data = vec![b'x'; WINDOW];
        let mut grammar = Grammar::new();
        let out = compress_sequences(&data, &mut grammar, true);
        assert_eq!(out, data);
    }
}
