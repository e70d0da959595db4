// Mon Feb 09 2026 - Alex

use crate::rules::{StringDef, StringModifiers, StringPattern};

pub const MAX_ATOM_LENGTH: usize = 4;

/// Longest fixed jump accepted in a hex string.
pub const MAX_HEX_JUMP: usize = 0x7fff;

/// Upper bound on the expanded length of a hex string.
pub const MAX_HEX_LENGTH: usize = 0xffff;

/// Nocase permutations are only generated up to this many alphabetic bytes.
const MAX_CASE_PERMUTATIONS: usize = 16;

/// Fixed bytes fed to the automaton for one string. The string starts
/// `backtrack` bytes before the position right after the atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub bytes: Vec<u8>,
    pub backtrack: u16,
}

impl Atom {
    fn at(bytes: &[u8], start: usize) -> Option<Self> {
        let backtrack = u16::try_from(start + bytes.len()).ok()?;
        Some(Self {
            bytes: bytes.to_vec(),
            backtrack,
        })
    }

    fn root() -> Self {
        Self {
            bytes: Vec::new(),
            backtrack: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPattern {
    pub bytes: Vec<u8>,
    pub mask: Vec<u8>,
}

impl HexPattern {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parses `4D 5A ?? 9? [2] E8`. Tokens are byte pairs where either nibble
/// may be `?`, and fixed jumps `[n]` or `[n-n]`.
pub fn parse_hex(source: &str) -> Result<HexPattern, String> {
    let mut bytes = Vec::new();
    let mut mask = Vec::new();

    let mut chars = source.chars().filter(|c| !c.is_whitespace()).peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let mut range = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(rc) => range.push(rc),
                        None => return Err("unterminated jump".to_string()),
                    }
                }
                let (lo, hi) = range
                    .split_once('-')
                    .unwrap_or((range.as_str(), range.as_str()));
                let lo: usize = lo
                    .parse()
                    .map_err(|_| format!("invalid jump [{}]", range))?;
                let hi: usize = hi
                    .parse()
                    .map_err(|_| format!("invalid jump [{}]", range))?;
                if lo != hi {
                    return Err(format!("variable jump [{}] is not supported", range));
                }
                if lo > MAX_HEX_JUMP {
                    return Err(format!("jump [{}] exceeds {} bytes", range, MAX_HEX_JUMP));
                }
                let len = bytes
                    .len()
                    .checked_add(lo)
                    .filter(|len| *len <= MAX_HEX_LENGTH)
                    .ok_or_else(|| format!("hex string longer than {} bytes", MAX_HEX_LENGTH))?;
                bytes.resize(len, 0);
                mask.resize(len, 0);
            }
            '(' | '|' | ')' => return Err("alternatives are not supported".to_string()),
            _ => {
                let low = chars
                    .next()
                    .ok_or_else(|| format!("dangling nibble '{}'", c))?;
                let (high_value, high_mask) = nibble(c)?;
                let (low_value, low_mask) = nibble(low)?;
                bytes.push(high_value << 4 | low_value);
                mask.push(high_mask << 4 | low_mask);
            }
        }
    }

    Ok(HexPattern { bytes, mask })
}

fn nibble(c: char) -> Result<(u8, u8), String> {
    if c == '?' {
        return Ok((0, 0));
    }
    c.to_digit(16)
        .map(|d| (d as u8, 0xf))
        .ok_or_else(|| format!("invalid hex digit '{}'", c))
}

/// Returns the literal bytes a regex must start with.
pub fn regex_prefix(source: &str) -> Vec<u8> {
    if source.contains('|') {
        return Vec::new();
    }

    let mut prefix = Vec::new();
    let mut rest = source.chars().peekable();
    while let Some(&c) = rest.peek() {
        if !c.is_ascii() || "\\.^$|()[]{}*+?".contains(c) {
            break;
        }
        prefix.push(c as u8);
        rest.next();
    }

    if matches!(rest.peek(), Some('*') | Some('?') | Some('{')) {
        prefix.pop();
    }
    prefix
}

fn case_permutations(atom: &[u8]) -> Vec<Vec<u8>> {
    let mut permutations = vec![Vec::with_capacity(atom.len())];
    for &byte in atom {
        let lower = byte.to_ascii_lowercase();
        let upper = byte.to_ascii_uppercase();
        if lower != upper && permutations.len() >= MAX_CASE_PERMUTATIONS {
            // Atom ends at the first letter past the cap.
            break;
        }
        if lower != upper {
            let mut flipped = permutations.clone();
            for p in &mut permutations {
                p.push(lower);
            }
            for p in &mut flipped {
                p.push(upper);
            }
            permutations.extend(flipped);
        } else {
            for p in &mut permutations {
                p.push(byte);
            }
        }
    }
    permutations
}

fn widen(text: &[u8]) -> Vec<u8> {
    text.iter().flat_map(|&b| [b, 0]).collect()
}

/// Atoms for a literal prefix at the start of the string.
fn prefix_atoms(prefix: &[u8], nocase: bool) -> Vec<Atom> {
    let prefix = &prefix[..prefix.len().min(MAX_ATOM_LENGTH)];
    let forms = if nocase {
        case_permutations(prefix)
    } else {
        vec![prefix.to_vec()]
    };
    forms.iter().filter_map(|f| Atom::at(f, 0)).collect()
}

/// Every atom registered for `string`. An empty atom attaches the string to
/// the root state.
pub fn extract_atoms(string: &StringDef) -> Vec<Atom> {
    let modifiers = string.modifiers();
    let nocase = modifiers.contains(StringModifiers::NOCASE);

    let mut atoms = match string.pattern() {
        StringPattern::Text(text) => {
            let mut atoms = Vec::new();
            if modifiers.contains(StringModifiers::ASCII) || !modifiers.contains(StringModifiers::WIDE) {
                atoms.extend(prefix_atoms(text, nocase));
            }
            if modifiers.contains(StringModifiers::WIDE) {
                let wide = widen(&text[..text.len().min(MAX_ATOM_LENGTH / 2)]);
                let forms = if nocase {
                    case_permutations(&wide)
                } else {
                    vec![wide]
                };
                atoms.extend(forms.iter().filter_map(|f| Atom::at(f, 0)));
            }
            atoms
        }
        StringPattern::Hex { bytes, mask } => match longest_fixed_run(mask) {
            Some((start, len)) => {
                let len = len.min(MAX_ATOM_LENGTH);
                Atom::at(&bytes[start..start + len], start)
                    .into_iter()
                    .collect()
            }
            None => Vec::new(),
        },
        StringPattern::Regex { source, .. } => prefix_atoms(&regex_prefix(source), nocase),
    };

    atoms.sort_by(|a, b| a.bytes.cmp(&b.bytes));
    atoms.dedup();
    if atoms.is_empty() || atoms.iter().any(|a| a.bytes.is_empty()) {
        return vec![Atom::root()];
    }
    atoms
}

fn longest_fixed_run(mask: &[u8]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut start = 0;
    for i in 0..=mask.len() {
        let fixed = mask.get(i).map_or(false, |m| *m == 0xff);
        if fixed {
            continue;
        }
        let len = i - start;
        if len > 0 && best.map_or(true, |(_, l)| len > l) {
            best = Some((start, len));
        }
        start = i + 1;
    }
    best
}
