// Mon Feb 09 2026 - Alex

use crate::ahocorasick::AcMatch;
use crate::error::Error;
use crate::rules::{Rules, StringDef, StringModifiers, StringPattern};
use crate::scan::{Match, ScanContext, ScanFlags};
use std::time::Instant;

/// Bytes of matched data kept with each match.
pub const MAX_MATCH_DATA: usize = 512;

/// Confirms the string owning `ac_match` at `offset` inside `data` and
/// records the match in the context.
pub fn verify_match(
    rules: &Rules,
    context: &mut ScanContext,
    ac_match: &AcMatch,
    data: &[u8],
    base: u64,
    offset: usize,
) -> Result<(), Error> {
    if !context.profiling() {
        return confirm(rules, context, ac_match, data, base, offset);
    }

    let start = Instant::now();
    let result = confirm(rules, context, ac_match, data, base, offset);
    context.add_string_time(ac_match.string, start.elapsed());
    result
}

fn confirm(
    rules: &Rules,
    context: &mut ScanContext,
    ac_match: &AcMatch,
    data: &[u8],
    base: u64,
    offset: usize,
) -> Result<(), Error> {
    let string_id = ac_match.string;
    let string = rules
        .strings()
        .get(string_id)
        .ok_or_else(|| Error::corrupt(format!("match references unknown string {}", string_id)))?;

    if context.flags().contains(ScanFlags::FAST_MODE) && context.match_count(string_id) > 0 {
        return Ok(());
    }
    // Candidates for one position arrive back to back unless the string's
    // atoms have different backtracks; those strings keep a seen set.
    let mixed = rules.has_mixed_backtrack(string_id);
    if mixed {
        if context.is_recorded(string_id, base, offset as u64) {
            return Ok(());
        }
    } else if let Some(last) = context.last_match(string_id) {
        if last.base == base && last.offset == offset as u64 {
            return Ok(());
        }
    }

    let length = match match_length(string, data, offset) {
        Some(length) => length,
        None => return Ok(()),
    };

    if mixed {
        context.mark_recorded(string_id, base, offset as u64)?;
    }
    let excerpt = &data[offset..offset + length.min(MAX_MATCH_DATA)];
    context.add_match(
        string_id,
        Match {
            base,
            offset: offset as u64,
            length,
            data: excerpt.to_vec(),
        },
    )
}

/// Length of the occurrence of `string` starting at `offset`, if any.
pub fn match_length(string: &StringDef, data: &[u8], offset: usize) -> Option<usize> {
    if offset >= data.len() {
        return None;
    }
    let modifiers = string.modifiers();

    match string.pattern() {
        StringPattern::Text(text) => {
            let try_ascii = modifiers.contains(StringModifiers::ASCII)
                || !modifiers.contains(StringModifiers::WIDE);
            if try_ascii {
                if let Some(len) = text_length(text, data, offset, modifiers, false) {
                    return Some(len);
                }
            }
            if modifiers.contains(StringModifiers::WIDE) {
                return text_length(text, data, offset, modifiers, true);
            }
            None
        }
        StringPattern::Hex { bytes, mask } => {
            let window = data.get(offset..offset + bytes.len())?;
            let hit = window
                .iter()
                .zip(bytes.iter().zip(mask.iter()))
                .all(|(d, (b, m))| d & m == *b);
            hit.then_some(bytes.len())
        }
        StringPattern::Regex { regex, .. } => {
            let found = regex.find(&data[offset..])?;
            (found.start() == 0 && found.end() > 0).then_some(found.end())
        }
    }
}

fn text_length(
    text: &[u8],
    data: &[u8],
    offset: usize,
    modifiers: StringModifiers,
    wide: bool,
) -> Option<usize> {
    let width = if wide { 2 } else { 1 };
    let len = text.len() * width;
    let window = data.get(offset..offset + len)?;
    let nocase = modifiers.contains(StringModifiers::NOCASE);

    for (i, expected) in text.iter().enumerate() {
        let actual = window[i * width];
        let same = if nocase {
            actual.eq_ignore_ascii_case(expected)
        } else {
            actual == *expected
        };
        if !same || (wide && window[i * width + 1] != 0) {
            return None;
        }
    }

    if modifiers.contains(StringModifiers::FULLWORD) {
        let before = offset.checked_sub(width).map(|p| data[p]);
        let after = data.get(offset + len).copied();
        let is_word = |b: Option<u8>| b.map_or(false, |b| b.is_ascii_alphanumeric());
        if is_word(before) || is_word(after) {
            return None;
        }
    }

    Some(len)
}
