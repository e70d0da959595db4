// Mon Feb 09 2026 - Alex

//! Packed Aho-Corasick automaton.
//!
//! States are offsets into a single table of 64-bit cells. For a state `s`
//! and input byte `b`, the cell `table[s + b + 1]` is a valid transition
//! iff its low 16 bits equal `b + 1`; its high 32 bits are the next state.
//! `table[s]` holds the failure link of `s` in its high 32 bits and zero in
//! its low half, which no input byte can match.

use crate::error::Error;
use crate::rules::StringId;
use std::collections::VecDeque;

pub const ROOT_STATE: u32 = 0;

/// Number of cells after a state's own cell that a transition may touch.
pub const STATE_SPAN: usize = 257;

const INDEX_MASK: u64 = 0xFFFF;

/// One candidate match attached to a state. `backtrack` is the distance
/// from the cursor back to the first byte of the owning string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcMatch {
    pub backtrack: u16,
    pub string: StringId,
    pub next: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Automaton {
    transition_table: Vec<u64>,
    match_table: Vec<Option<u32>>,
    matches: Vec<AcMatch>,
}

#[inline]
pub fn pack_transition(next_state: u32, index: u16) -> u64 {
    ((next_state as u64) << 32) | index as u64
}

#[inline]
pub fn pack_failure(failure: u32) -> u64 {
    (failure as u64) << 32
}

#[inline]
pub fn next_state(cell: u64) -> u32 {
    (cell >> 32) as u32
}

#[inline]
pub fn is_valid_transition(cell: u64, index: u16) -> bool {
    cell & INDEX_MASK == index as u64
}

impl Automaton {
    /// Checks that every state, failure link and match list stays inside
    /// the tables, so the scan loop can index without bounds failures.
    pub fn from_parts(
        transition_table: Vec<u64>,
        match_table: Vec<Option<u32>>,
        matches: Vec<AcMatch>,
        num_strings: usize,
    ) -> Result<Self, Error> {
        if transition_table.len() < STATE_SPAN {
            return Err(Error::corrupt("transition table shorter than the root state"));
        }
        if match_table.len() != transition_table.len() {
            return Err(Error::corrupt("match table and transition table sizes differ"));
        }

        let last_state = transition_table.len() - STATE_SPAN;
        for (i, cell) in transition_table.iter().enumerate() {
            if next_state(*cell) as usize > last_state {
                return Err(Error::corrupt(format!("cell {} points outside the table", i)));
            }
        }
        check_failure_links(&transition_table)?;
        for head in match_table.iter().flatten() {
            if *head as usize >= matches.len() {
                return Err(Error::corrupt("match table head out of range"));
            }
        }
        for (i, m) in matches.iter().enumerate() {
            if m.string >= num_strings {
                return Err(Error::corrupt(format!("match {} references unknown string", i)));
            }
            // Lists only link backwards, which also rules out cycles.
            if let Some(next) = m.next {
                if next as usize >= i {
                    return Err(Error::corrupt(format!("match {} links forward", i)));
                }
            }
        }

        Ok(Self {
            transition_table,
            match_table,
            matches,
        })
    }

    pub fn transition_table(&self) -> &[u64] {
        &self.transition_table
    }

    pub fn match_table(&self) -> &[Option<u32>] {
        &self.match_table
    }

    pub fn ac_matches(&self) -> &[AcMatch] {
        &self.matches
    }

    pub fn match_head(&self, state: u32) -> Option<u32> {
        self.match_table.get(state as usize).copied().flatten()
    }

    pub fn matches_of(&self, state: u32) -> AcMatchIter<'_> {
        AcMatchIter {
            matches: &self.matches,
            next: self.match_head(state),
        }
    }

    /// Follows transitions and failure links from `state` on `byte`.
    #[inline]
    pub fn step(&self, state: u32, byte: u8) -> u32 {
        let table = &self.transition_table;
        let index = byte as u16 + 1;
        let mut state = state;
        let mut cell = table[state as usize + index as usize];

        while !is_valid_transition(cell, index) {
            if state != ROOT_STATE {
                state = next_state(table[state as usize]);
                cell = table[state as usize + index as usize];
            } else {
                cell = 0;
                break;
            }
        }

        next_state(cell)
    }

    pub fn num_states(&self) -> usize {
        let mut states = 1;
        for (i, cell) in self.transition_table.iter().enumerate() {
            let index = (cell & INDEX_MASK) as usize;
            if index != 0 && i >= index {
                states += 1;
            }
        }
        states
    }
}

/// The goto graph must be a tree rooted at state 0, and every failure link
/// must point to a strictly shallower state. `step` terminates only then.
fn check_failure_links(table: &[u64]) -> Result<(), Error> {
    let mut depth = vec![u32::MAX; table.len()];
    depth[ROOT_STATE as usize] = 0;
    let mut order = Vec::new();
    let mut queue = VecDeque::from([ROOT_STATE as usize]);

    while let Some(state) = queue.pop_front() {
        for index in 1..STATE_SPAN as u16 {
            let cell = table[state + index as usize];
            if !is_valid_transition(cell, index) {
                continue;
            }
            let child = next_state(cell) as usize;
            if depth[child] != u32::MAX {
                return Err(Error::corrupt(format!("state {} reached twice", child)));
            }
            depth[child] = depth[state] + 1;
            order.push(child);
            queue.push_back(child);
        }
    }

    for state in order {
        let failure = next_state(table[state]) as usize;
        if depth[failure] >= depth[state] {
            return Err(Error::corrupt(format!(
                "failure link of state {} does not lead to the root",
                state
            )));
        }
    }
    Ok(())
}

pub struct AcMatchIter<'a> {
    matches: &'a [AcMatch],
    next: Option<u32>,
}

impl<'a> Iterator for AcMatchIter<'a> {
    type Item = &'a AcMatch;

    fn next(&mut self) -> Option<Self::Item> {
        let m = self.matches.get(self.next? as usize)?;
        self.next = m.next;
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let cell = pack_transition(0x1234, 0x42);
        assert_eq!(next_state(cell), 0x1234);
        assert!(is_valid_transition(cell, 0x42));
        assert!(!is_valid_transition(cell, 0x43));

        let failure = pack_failure(77);
        assert_eq!(next_state(failure), 77);
        for index in 1..=256u16 {
            assert!(!is_valid_transition(failure, index));
        }
    }

    #[test]
    fn test_rejects_short_table() {
        let result = Automaton::from_parts(vec![0; 10], vec![None; 10], Vec::new(), 0);
        assert!(matches!(result, Err(Error::CorruptRules(_))));
    }

    #[test]
    fn test_rejects_forward_links() {
        let matches = vec![
            AcMatch { backtrack: 1, string: 0, next: Some(1) },
            AcMatch { backtrack: 1, string: 0, next: None },
        ];
        let result = Automaton::from_parts(vec![0; STATE_SPAN], vec![None; STATE_SPAN], matches, 1);
        assert!(matches!(result, Err(Error::CorruptRules(_))));
    }

    fn two_state_table() -> (Vec<u64>, usize, usize) {
        // root -A-> a -B-> b
        let a = 1;
        let b = 300;
        let mut table = vec![0u64; b + STATE_SPAN];
        table[b'A' as usize + 1] = pack_transition(a as u32, b'A' as u16 + 1);
        table[a + b'B' as usize + 1] = pack_transition(b as u32, b'B' as u16 + 1);
        (table, a, b)
    }

    fn from_table(table: Vec<u64>) -> Result<Automaton, Error> {
        let len = table.len();
        Automaton::from_parts(table, vec![None; len], Vec::new(), 0)
    }

    #[test]
    fn test_accepts_links_to_shallower_states() {
        let (table, a, b) = two_state_table();
        let automaton = from_table(table).unwrap();
        assert_eq!(automaton.step(ROOT_STATE, b'A'), a as u32);
        assert_eq!(automaton.step(a as u32, b'B'), b as u32);
        assert_eq!(automaton.step(b as u32, b'C'), ROOT_STATE);
    }

    #[test]
    fn test_rejects_failure_cycles() {
        let (mut table, a, _) = two_state_table();
        table[a] = pack_failure(a as u32);
        assert!(matches!(from_table(table), Err(Error::CorruptRules(_))));

        let (mut table, a, b) = two_state_table();
        table[a] = pack_failure(b as u32);
        table[b] = pack_failure(a as u32);
        assert!(matches!(from_table(table), Err(Error::CorruptRules(_))));
    }

    #[test]
    fn test_rejects_failure_outside_states() {
        let (mut table, _, b) = two_state_table();
        table[b] = pack_failure(5);
        assert!(matches!(from_table(table), Err(Error::CorruptRules(_))));
    }

    #[test]
    fn test_rejects_shared_goto_targets() {
        let (mut table, a, _) = two_state_table();
        table[b'Z' as usize + 1] = pack_transition(a as u32, b'Z' as u16 + 1);
        assert!(matches!(from_table(table), Err(Error::CorruptRules(_))));
    }

    #[test]
    fn test_root_only_stays_at_root() {
        let automaton =
            Automaton::from_parts(vec![0; STATE_SPAN], vec![None; STATE_SPAN], Vec::new(), 0).unwrap();
        for byte in [0u8, 0x41, 0xff] {
            assert_eq!(automaton.step(ROOT_STATE, byte), ROOT_STATE);
        }
        assert_eq!(automaton.num_states(), 1);
    }
}
