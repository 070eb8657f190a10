//! Replacement of the most common byte pairs.
//!
//! Replacing pair P with symbol x costs the header bytes of one rule and
//! an escape for every plain occurrence of x, so a pair is only accepted
//! while
//!
//!   f(x) + 3 < f(P)                                    (p1)
//!
//! and when symbols must be freed for use as variables, the freed band is
//! trimmed until the cumulative saving beats the escape symbol's own
//! frequency:
//!
//!   sum over freed k of (f(P_k) - f(x_k) - 3) > f(escape)   (p2)
//!
//! Accepted pairs must not chain: no pair's second byte is another's
//! first. Finding the optimal set is MAX-CUT, so acceptance is greedy.

use crate::precompress::grammar::{Grammar, PassRecord};
use crate::tools::freq_table::FrequencyTable;

/// Pins a symbol to the top of the frequency table so it is never picked
/// as a replacement target, freed symbol or escape. Applied to special
/// symbols and to variables of earlier passes: a special must stay
/// untouched, and promoting an existing variable to special would break
/// the alphabet partition.
pub const SPECIAL_PIN: u64 = u64::MAX / 4;

/// Table frequencies with claimed symbols pinned.
pub fn pinned_frequencies(freq: &[u64; 256], grammar: &Grammar) -> [u64; 256] {
    let mut table_freq = *freq;
    for s in 0..256 {
        if grammar.is_special(s as u8) || grammar.is_variable(s as u8) {
            table_freq[s] = SPECIAL_PIN;
        }
    }
    table_freq
}

/// Run one pair replacement pass. Returns the rewritten buffer and
/// records the pass in `grammar`.
pub fn compress_common_pairs(data: &[u8], grammar: &mut Grammar, escaping: bool) -> Vec<u8> {
    if data.len() < 2 {
        grammar.finish_pass(PassRecord::default());
        return data.to_vec();
    }

    let mut freq = [0u64; 256];
    let mut pair_freq: Vec<(u16, u32)> = (0..=65535u16).map(|p| (p, 0u32)).collect();
    compute_pair_frequencies(data, &mut freq, &mut pair_freq);

    // Pairs touching special symbols of earlier passes stay untouched, or
    // their escape structure would be torn apart.
    for entry in pair_freq.iter_mut() {
        let (fst, snd) = split_pair(entry.0);
        if grammar.is_special(fst) || grammar.is_special(snd) {
            entry.1 = 0;
        }
    }
    let mut freqs = FrequencyTable::new(&pinned_frequencies(&freq, grammar));

    let mut free_symbols = 0usize;
    while free_symbols < 256 && freqs.get(free_symbols) == 0 {
        free_symbols += 1;
    }

    let replaceable = find_replaceable_pairs(&mut pair_freq, &mut freqs);

    let escape_index = if replaceable.len() > free_symbols && escaping {
        escape_char_index(&mut freqs, &replaceable, free_symbols)
    } else {
        free_symbols
    };

    let common_byte = freqs.key(255);
    let escape_byte = if escape_index > free_symbols {
        freqs.key(escape_index)
    } else {
        common_byte
    };

    let mut replacements = vec![common_byte; 65536];
    let mut needs_escape = [false; 256];
    let mut used_pairs = 0usize;

    for k in 0..free_symbols.min(replaceable.len()) {
        let sym = freqs.key(k);
        debug_assert!(sym != common_byte && sym != escape_byte);
        let (fst, snd) = split_pair(replaceable[k].0);
        replacements[replaceable[k].0 as usize] = sym;
        grammar.add_rule(sym, fst, snd);
        used_pairs += 1;
    }

    let mut freed = Vec::new();
    if free_symbols < escape_index {
        for i in free_symbols..=escape_index {
            // Every pair led by a freed symbol (and by the escape itself)
            // that is not already a replacement gets escaped.
            let lead = (freqs.key(i) as usize) << 8;
            for j in 0..256 {
                if replacements[lead | j] == common_byte {
                    replacements[lead | j] = escape_byte;
                }
            }
            needs_escape[freqs.key(i) as usize] = true;
            if i < escape_index {
                let sym = freqs.key(i);
                debug_assert!(sym != common_byte && sym != escape_byte);
                let (fst, snd) = split_pair(replaceable[i].0);
                replacements[replaceable[i].0 as usize] = sym;
                grammar.add_rule(sym, fst, snd);
                freed.push(sym);
                used_pairs += 1;
            }
        }
        grammar.add_special_symbol(escape_byte);
    }

    let new_symbols = if free_symbols == escape_index {
        0
    } else {
        escape_index - free_symbols + 1
    };
    log::debug!(
        "replacing {} pairs, {} symbols made free",
        used_pairs,
        new_symbols
    );

    let out = if used_pairs > 0 || new_symbols > 0 {
        write_replacements(
            &replacements,
            data,
            common_byte,
            escape_byte,
            &needs_escape,
        )
    } else {
        data.to_vec()
    };

    grammar.finish_pass(PassRecord {
        rule_count: used_pairs,
        escape: (new_symbols > 0).then_some(escape_byte),
        freed,
        uses_special_pairs: false,
    });
    out
}

fn split_pair(pair: u16) -> (u8, u8) {
    ((pair >> 8) as u8, (pair & 0xFF) as u8)
}

fn compute_pair_frequencies(data: &[u8], freq: &mut [u64; 256], pair_freq: &mut [(u16, u32)]) {
    let mut index = data[0] as u16;
    freq[data[0] as usize] += 1;
    for &b in &data[1..] {
        freq[b as usize] += 1;
        index = (index << 8) | b as u16;
        pair_freq[index as usize].1 += 1;
    }
}

/// Greedy candidate selection. `pair_freq` is partially sorted descending
/// in steps of 256 as the scan advances.
fn find_replaceable_pairs(
    pair_freq: &mut [(u16, u32)],
    freqs: &mut FrequencyTable,
) -> Vec<(u16, u32)> {
    const STEP: usize = 256;
    let mut accepted: Vec<(u16, u32)> = Vec::new();
    let mut current_pair = 0usize;
    let mut limit = 0usize;

    while accepted.len() < 254 && current_pair + 1 < 65536 {
        if current_pair + 1 >= limit {
            limit = (limit + STEP).min(65536);
            partial_sort_desc(pair_freq, current_pair, limit);
        }
        let (pair, count) = pair_freq[current_pair];
        if count == 0 {
            break;
        }
        let (fst, snd) = split_pair(pair);
        if fst == snd {
            current_pair += 1;
            continue;
        }
        if !freqs.decrease(fst, count as u64) {
            current_pair += 1;
            continue;
        }
        if !freqs.decrease(snd, count as u64) {
            freqs.increase(fst, count as u64);
            current_pair += 1;
            continue;
        }
        // Condition (p1): no further pair can be profitable once the
        // cheapest replacement symbol costs more than this pair saves.
        if freqs.get(accepted.len()) + 3 >= count as u64 {
            freqs.increase(fst, count as u64);
            freqs.increase(snd, count as u64);
            break;
        }
        // Chained substitutions are rejected outright.
        let conflict = accepted.iter().any(|&(p, _)| {
            let (afst, asnd) = split_pair(p);
            afst == snd || asnd == fst
        });
        if conflict {
            freqs.increase(fst, count as u64);
            freqs.increase(snd, count as u64);
        } else {
            accepted.push((pair, count));
        }
        current_pair += 1;
    }
    accepted
}

/// Sort `range` of the candidate array so the slots `from..to` hold the
/// largest remaining counts in descending order.
fn partial_sort_desc(pair_freq: &mut [(u16, u32)], from: usize, to: usize) {
    if to >= pair_freq.len() {
        pair_freq[from..].sort_unstable_by(|a, b| b.1.cmp(&a.1));
        return;
    }
    let tail = &mut pair_freq[from..];
    let mid = to - from;
    tail.select_nth_unstable_by(mid - 1, |a, b| b.1.cmp(&a.1));
    tail[..mid].sort_unstable_by(|a, b| b.1.cmp(&a.1));
}

/// Condition (p2): walk the freed band backwards while freeing does not
/// pay for the escape symbol, restoring the rolled-back pairs.
fn escape_char_index(
    freqs: &mut FrequencyTable,
    pairs: &[(u16, u32)],
    free_symbols: usize,
) -> usize {
    if pairs.len() <= free_symbols {
        return free_symbols;
    }
    let mut utility: i64 = 0;
    for i in free_symbols..pairs.len() {
        utility += pairs[i].1 as i64 - freqs.get(i) as i64 - 3;
    }
    let mut i = pairs.len();
    while i > free_symbols && utility <= freqs.get(i) as i64 {
        i -= 1;
        let (fst, snd) = split_pair(pairs[i].0);
        freqs.increase(fst, pairs[i].1 as u64);
        freqs.increase(snd, pairs[i].1 as u64);
        utility -= pairs[i].1 as i64 - freqs.get(i) as i64 - 3;
    }
    i
}

/// Rewrite `from` through the 65536-entry pair table. An entry equal to
/// `common_byte` copies the leading byte, `escape_byte` quotes it, and
/// anything else replaces the whole pair.
fn write_replacements(
    replacements: &[u8],
    from: &[u8],
    common_byte: u8,
    escape_byte: u8,
    needs_escape: &[bool; 256],
) -> Vec<u8> {
    let mut to = Vec::with_capacity(from.len() + 3);
    let len = from.len();
    debug_assert!(len >= 2);
    let mut pair = from[0] as usize;
    let mut i = 1usize;
    loop {
        pair = ((pair << 8) | from[i] as usize) & 0xFFFF;
        let r = replacements[pair];
        if r == common_byte {
            to.push(from[i - 1]);
        } else if r == escape_byte {
            to.push(escape_byte);
            to.push(from[i - 1]);
        } else {
            to.push(r);
            if i == len - 1 {
                return to;
            }
            i += 1;
            pair = from[i] as usize;
        }
        if i >= len - 1 {
            // Last byte: freed symbols still need their escape here.
            if needs_escape[from[len - 1] as usize] {
                to.push(escape_byte);
            }
            to.push(from[len - 1]);
            return to;
        }
        i += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::precompress::postprocess::postprocess;

    fn roundtrip(data: &[u8], escaping: bool) -> (Vec<u8>, Grammar) {
        let mut grammar = Grammar::new();
        let out = compress_common_pairs(data, &mut grammar, escaping);
        let back = postprocess(&grammar, out.clone()).unwrap();
        assert_eq!(back, data, "postprocess must invert the pass");
        (out, grammar)
    }

    #[test]
    fn frequent_pair_is_replaced() {
        let data = b"abababababababababab".to_vec();
        let (out, grammar) = roundtrip(&data, true);
        assert_eq!(grammar.number_of_rules(), 1);
        let (_, rhs) = grammar.rule(0);
        assert_eq!(rhs, b"ab");
        assert_eq!(out.len(), data.len() / 2);
    }

    #[test]
    fn self_pairs_are_skipped() {
        // Pair (a,a) dominates but never chains with itself.
        let (out, grammar) = roundtrip(b"baaabaaabcb", true);
        assert_eq!(grammar.number_of_rules(), 0);
        assert_eq!(out, b"baaabaaabcb");
    }

    #[test]
    fn no_chained_pairs_are_accepted() {
        let mut data = Vec::new();
        for _ in 0..60 {
            data.extend_from_slice(b"abc");
        }
        let (_, grammar) = roundtrip(&data, true);
        for i in 0..grammar.number_of_rules() {
            let (_, rhs_i) = grammar.rule(i);
            for j in 0..grammar.number_of_rules() {
                if i == j {
                    continue;
                }
                let (_, rhs_j) = grammar.rule(j);
                assert_ne!(rhs_i[1], rhs_j[0], "chained substitution accepted");
            }
        }
    }

    #[test]
    fn escaping_frees_symbols_on_a_full_alphabet() {
        // Every byte value occurs, so replacements must free symbols.
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
        }
        for _ in 0..3000 {
            data.extend_from_slice(&[17, 201]);
        }
        let (out, grammar) = roundtrip(&data, true);
        assert!(grammar.number_of_rules() >= 1);
        assert!(grammar.passes()[0].escape.is_some());
        assert!(out.len() < data.len());
    }

    #[test]
    fn escaping_disabled_uses_only_free_symbols() {
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
        }
        for _ in 0..3000 {
            data.extend_from_slice(&[17, 201]);
        }
        let (out, grammar) = roundtrip(&data, false);
        assert_eq!(grammar.number_of_rules(), 0);
        assert_eq!(grammar.passes()[0].escape, None);
        assert_eq!(out, data);
    }

    #[test]
    fn trailing_freed_symbol_is_escaped() {
        // Build data where some byte gets freed and also ends the buffer.
        let mut data = Vec::new();
        for i in 0..=255u8 {
            data.push(i);
        }
        for _ in 0..3000 {
            data.extend_from_slice(&[17, 201]);
        }
        // Append every byte once more so whichever symbol was freed also
        // appears at the very end at least for some suffix choice.
        for suffix in 0..=255u8 {
            let mut with_suffix = data.clone();
            with_suffix.push(suffix);
            let mut grammar = Grammar::new();
            let out = compress_common_pairs(&with_suffix, &mut grammar, true);
            let back = postprocess(&grammar, out).unwrap();
            assert_eq!(back, with_suffix, "suffix {}", suffix);
        }
    }

    #[test]
    fn short_inputs_pass_through() {
        for data in [&b""[..], b"a", b"ab"] {
            let mut grammar = Grammar::new();
            let out = compress_common_pairs(data, &mut grammar, true);
            assert_eq!(out, data);
            assert_eq!(grammar.number_of_rules(), 0);
        }
    }
}
