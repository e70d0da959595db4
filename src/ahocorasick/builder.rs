// Mon Feb 09 2026 - Alex

use crate::ahocorasick::automaton::{pack_failure, pack_transition, AcMatch, Automaton, STATE_SPAN};
use crate::error::Error;
use crate::rules::StringId;
use std::collections::{BTreeMap, VecDeque};

const ROOT: usize = 0;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<u8, usize>,
    failure: usize,
    matches: Vec<(u16, StringId)>,
}

/// Builds the packed automaton from atoms: a trie, breadth-first failure
/// links, then a first-fit placement of every state into the shared table.
#[derive(Debug)]
pub struct AutomatonBuilder {
    nodes: Vec<TrieNode>,
}

impl AutomatonBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    /// An empty atom attaches the match to the root, so the string is
    /// verified at every position.
    pub fn add_atom(&mut self, atom: &[u8], backtrack: u16, string: StringId) {
        let mut node = ROOT;
        for &byte in atom {
            node = match self.nodes[node].children.get(&byte) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(byte, child);
                    child
                }
            };
        }
        self.nodes[node].matches.push((backtrack, string));
    }

    fn breadth_first_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([ROOT]);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(self.nodes[node].children.values().copied());
        }
        order
    }

    fn link_failures(&mut self, order: &[usize]) {
        for &node in order {
            let children: Vec<(u8, usize)> =
                self.nodes[node].children.iter().map(|(b, c)| (*b, *c)).collect();
            for (byte, child) in children {
                let failure = if node == ROOT {
                    ROOT
                } else {
                    let mut f = self.nodes[node].failure;
                    loop {
                        if let Some(&next) = self.nodes[f].children.get(&byte) {
                            break next;
                        }
                        if f == ROOT {
                            break ROOT;
                        }
                        f = self.nodes[f].failure;
                    }
                };
                self.nodes[child].failure = failure;
            }
        }
    }

    fn place_states(&self, order: &[usize]) -> Vec<usize> {
        let mut used: Vec<bool> = Vec::new();
        let mut positions = vec![0usize; self.nodes.len()];
        let mut first_free = 0usize;

        let occupy = |used: &mut Vec<bool>, cell: usize| {
            if cell >= used.len() {
                used.resize(cell + 1, false);
            }
            used[cell] = true;
        };
        let is_free = |used: &Vec<bool>, cell: usize| used.get(cell).map_or(true, |u| !u);

        for &node in order {
            let offsets: Vec<usize> = self.nodes[node]
                .children
                .keys()
                .map(|b| *b as usize + 1)
                .collect();

            let mut pos = if node == ROOT { 0 } else { first_free };
            while !(is_free(&used, pos) && offsets.iter().all(|o| is_free(&used, pos + o))) {
                pos += 1;
            }

            occupy(&mut used, pos);
            for o in &offsets {
                occupy(&mut used, pos + o);
            }
            positions[node] = pos;

            while !is_free(&used, first_free) {
                first_free += 1;
            }
        }

        positions
    }

    pub fn build(mut self, num_strings: usize) -> Result<Automaton, Error> {
        let order = self.breadth_first_order();
        self.link_failures(&order);
        let positions = self.place_states(&order);

        let table_len = positions.iter().max().copied().unwrap_or(0) + STATE_SPAN;
        if table_len > u32::MAX as usize {
            return Err(Error::InsufficientMemory);
        }

        let mut table = vec![0u64; table_len];
        let mut match_table: Vec<Option<u32>> = vec![None; table_len];
        let mut matches: Vec<AcMatch> = Vec::new();

        for &node in &order {
            let pos = positions[node];
            let trie = &self.nodes[node];
            table[pos] = pack_failure(positions[trie.failure] as u32);
            for (&byte, &child) in &trie.children {
                let index = byte as u16 + 1;
                table[pos + index as usize] = pack_transition(positions[child] as u32, index);
            }

            // Failure states sit closer to the root, so their lists are final.
            let mut head = if node == ROOT {
                None
            } else {
                match_table[positions[trie.failure]]
            };
            for &(backtrack, string) in trie.matches.iter().rev() {
                let index = matches.len() as u32;
                matches.push(AcMatch {
                    backtrack,
                    string,
                    next: head,
                });
                head = Some(index);
            }
            match_table[pos] = head;
        }

        log::debug!(
            "automaton: {} states, {} cells, {} match records",
            self.nodes.len(),
            table_len,
            matches.len()
        );

        Automaton::from_parts(table, match_table, matches, num_strings)
    }
}

impl Default for AutomatonBuilder {
    fn default() -> Self {
        Self::new()
    }
}
