// Mon Feb 09 2026 - Alex

pub mod externals;
pub mod profile;
pub mod scan;
pub mod stream;
pub mod types;

pub use profile::RuleProfile;
pub use scan::{CallbackMessage, CallbackResult, RuleResult};
pub use types::{
    compile_regex, ExternalValue, ExternalVariable, Namespace, NamespaceId, Rule, RuleFlags,
    RuleId, StringDef, StringId, StringModifiers, StringPattern,
};

use crate::ahocorasick::Automaton;
use crate::scan::ScanSlots;
use profile::ProfileCounters;

/// A compiled rule set. Immutable while scans run; external variable
/// values can only change through `&mut self`.
pub struct Rules {
    pub(crate) namespaces: Vec<Namespace>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) strings: Vec<StringDef>,
    pub(crate) externals: Vec<ExternalVariable>,
    pub(crate) automaton: Automaton,
    pub(crate) code: Vec<u8>,
    pub(crate) code_start: usize,
    pub(crate) slots: ScanSlots,
    pub(crate) profile: ProfileCounters,
    mixed_backtrack: Vec<bool>,
}

impl Rules {
    pub(crate) fn from_parts(
        namespaces: Vec<Namespace>,
        rules: Vec<Rule>,
        strings: Vec<StringDef>,
        externals: Vec<ExternalVariable>,
        automaton: Automaton,
        code: Vec<u8>,
        code_start: usize,
    ) -> Self {
        let profile = ProfileCounters::new(rules.len(), strings.len());
        let mixed_backtrack = mixed_backtracks(&automaton, strings.len());
        Self {
            namespaces,
            rules,
            strings,
            externals,
            automaton,
            code,
            code_start,
            slots: ScanSlots::new(),
            profile,
            mixed_backtrack,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn strings(&self) -> &[StringDef] {
        &self.strings
    }

    pub fn externals(&self) -> &[ExternalVariable] {
        &self.externals
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn code_start(&self) -> usize {
        self.code_start
    }

    /// Bit `i` is set while scan slot `i` is held.
    pub fn active_scans_mask(&self) -> u32 {
        self.slots.mask()
    }

    pub fn namespace_of(&self, rule: &Rule) -> &Namespace {
        &self.namespaces[rule.namespace()]
    }

    /// True when the atoms of `string` sit at different distances from its
    /// start, so candidates for one offset can arrive out of order.
    pub fn has_mixed_backtrack(&self, string: StringId) -> bool {
        self.mixed_backtrack.get(string).copied().unwrap_or(false)
    }
}

fn mixed_backtracks(automaton: &Automaton, num_strings: usize) -> Vec<bool> {
    let mut first: Vec<Option<u16>> = vec![None; num_strings];
    let mut mixed = vec![false; num_strings];
    for m in automaton.ac_matches() {
        let (Some(seen), Some(flag)) = (first.get_mut(m.string), mixed.get_mut(m.string)) else {
            continue;
        };
        match *seen {
            None => *seen = Some(m.backtrack),
            Some(b) if b != m.backtrack => *flag = true,
            _ => {}
        }
    }
    mixed
}

impl std::fmt::Debug for Rules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rules")
            .field("namespaces", &self.namespaces.len())
            .field("rules", &self.rules.len())
            .field("strings", &self.strings.len())
            .field("externals", &self.externals.len())
            .field("states", &self.automaton.num_states())
            .field("code", &self.code.len())
            .finish()
    }
}
