//! Undoes the precompressor passes.
//!
//! Each pass is inverted by a single scan over the data, last pass first:
//! the pass's escape byte quotes the following byte, its variables expand
//! to their right-hand sides, its special pairs resolve to a freed symbol
//! or a large rule, and everything else (including other passes' escape
//! bytes and pairs) is copied untouched. Right-hand sides are content from
//! the previous layer, so the next iteration keeps unwinding them.

use crate::error::BwError;
use crate::precompress::grammar::Grammar;
use crate::Result;

/// Expand every recorded pass of `grammar` in reverse, recovering the
/// block the precompressor started from.
pub fn postprocess(grammar: &Grammar, data: Vec<u8>) -> Result<Vec<u8>> {
    let mut data = data;
    let mut rule_end: usize = grammar.passes().iter().map(|p| p.rule_count).sum();
    if rule_end != grammar.number_of_rules() {
        return Err(BwError::MalformedInput("pass records disagree with rules"));
    }

    for pass in grammar.passes().iter().rev() {
        let rule_start = rule_end - pass.rule_count;

        // Per-pass lookup: one small map for byte variables, one for
        // large (special pair) variables.
        let mut var_rhs: [Option<&[u8]>; 256] = [None; 256];
        let mut pair_rhs: Vec<(u16, &[u8])> = Vec::new();
        for index in rule_start..rule_end {
            let (rule, rhs) = grammar.rule(index);
            if rule.large {
                pair_rhs.push((rule.variable, rhs));
            } else {
                var_rhs[rule.variable as usize] = Some(rhs);
            }
        }

        let mut out = Vec::with_capacity(data.len() * 2);
        let mut i = 0usize;
        while i < data.len() {
            let b = data[i];
            if pass.escape == Some(b) {
                let lit = *data
                    .get(i + 1)
                    .ok_or(BwError::MalformedInput("escape at end of block"))?;
                out.push(lit);
                i += 2;
            } else if pass.uses_special_pairs && grammar.is_special(b) {
                let snd = *data
                    .get(i + 1)
                    .ok_or(BwError::MalformedInput("special pair cut short"))?;
                let pair = ((b as u16) << 8) | snd as u16;
                if let Some(ord) = pair_ordinal(grammar, pair) {
                    if let Some(freed) = grammar.freed_symbol_of_pair(ord) {
                        out.push(freed);
                        i += 2;
                        continue;
                    }
                }
                if let Some(&(_, rhs)) = pair_rhs.iter().find(|&&(p, _)| p == pair) {
                    out.extend_from_slice(rhs);
                    i += 2;
                    continue;
                }
                return Err(BwError::MalformedInput("unresolved special pair"));
            } else if let Some(rhs) = var_rhs[b as usize] {
                out.extend_from_slice(rhs);
                i += 1;
            } else {
                out.push(b);
                i += 1;
            }
        }
        data = out;
        rule_end = rule_start;
    }
    Ok(data)
}

/// Ordinal of a pair of special symbols, if both bytes are specials.
fn pair_ordinal(grammar: &Grammar, pair: u16) -> Option<u32> {
    let fst = (pair >> 8) as u8;
    let snd = (pair & 0xFF) as u8;
    let i = grammar.special_index(fst)?;
    let j = grammar.special_index(snd)?;
    Some(grammar.number_of_special_pair(i, j))
}
