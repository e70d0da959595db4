// Mon Feb 09 2026 - Alex

use crate::error::Error;
use crate::exec::Object;
use crate::rules::{ExternalVariable, NamespaceId, RuleId, Rules, StringId};
use crate::scan::{Arena, ArenaIndex, ScanFlags};
use ahash::{AHashMap, AHashSet};
use bitflags::bitflags;
use std::time::{Duration, Instant};

const MATCHES_ARENA_CHUNK: usize = 1024;
const MATCHING_STRINGS_ARENA_CHUNK: usize = 8;
const OBJECTS_TABLE_CAPACITY: usize = 64;

/// Upper bound on recorded matches per string and scan.
pub const MAX_STRING_MATCHES: usize = 1_000_000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RuleScanFlags: u8 {
        const MATCH = 0x1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NamespaceScanFlags: u8 {
        const UNSATISFIED_GLOBAL = 0x1;
    }
}

/// A confirmed occurrence of a string. `offset` is relative to the block
/// identified by `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub base: u64,
    pub offset: u64,
    pub length: usize,
    pub data: Vec<u8>,
}

impl Match {
    pub fn address(&self) -> u64 {
        self.base + self.offset
    }
}

#[derive(Debug)]
struct MatchRecord {
    value: Match,
    next: Option<ArenaIndex>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchList {
    head: Option<ArenaIndex>,
    tail: Option<ArenaIndex>,
    count: usize,
}

impl MatchList {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Transient state of one scan. Everything the scan mutates lives here so
/// the rule set stays shared and read-only across concurrent scans.
pub struct ScanContext {
    slot: usize,
    flags: ScanFlags,
    file_size: u64,
    entry_point: Option<u64>,
    timeout: Duration,
    start_time: Instant,
    objects: AHashMap<String, Object>,
    matches_arena: Arena<MatchRecord>,
    matching_strings_arena: Arena<StringId>,
    matches: Vec<MatchList>,
    rule_flags: Vec<RuleScanFlags>,
    namespace_flags: Vec<NamespaceScanFlags>,
    string_time: Vec<Duration>,
    rule_time: Vec<Duration>,
    recorded: AHashSet<(StringId, u64, u64)>,
}

impl ScanContext {
    pub fn new(
        rules: &Rules,
        slot: usize,
        flags: ScanFlags,
        file_size: u64,
        timeout: Duration,
    ) -> Result<Self, Error> {
        Ok(Self {
            slot,
            flags,
            file_size,
            entry_point: None,
            timeout,
            start_time: Instant::now(),
            objects: AHashMap::with_capacity(OBJECTS_TABLE_CAPACITY),
            matches_arena: Arena::with_capacity(MATCHES_ARENA_CHUNK)?,
            matching_strings_arena: Arena::with_capacity(MATCHING_STRINGS_ARENA_CHUNK)?,
            matches: vec![MatchList::default(); rules.strings().len()],
            rule_flags: vec![RuleScanFlags::empty(); rules.rules().len()],
            namespace_flags: vec![NamespaceScanFlags::empty(); rules.namespaces().len()],
            string_time: vec![Duration::ZERO; rules.strings().len()],
            rule_time: vec![Duration::ZERO; rules.rules().len()],
            recorded: AHashSet::new(),
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn profiling(&self) -> bool {
        self.flags.contains(ScanFlags::PROFILE)
    }

    pub fn add_string_time(&mut self, string: StringId, elapsed: Duration) {
        if let Some(total) = self.string_time.get_mut(string) {
            *total = total.saturating_add(elapsed);
        }
    }

    pub fn add_rule_time(&mut self, rule: RuleId, elapsed: Duration) {
        if let Some(total) = self.rule_time.get_mut(rule) {
            *total = total.saturating_add(elapsed);
        }
    }

    pub fn string_time(&self, string: StringId) -> Duration {
        self.string_time.get(string).copied().unwrap_or_default()
    }

    pub fn rule_time(&self, rule: RuleId) -> Duration {
        self.rule_time.get(rule).copied().unwrap_or_default()
    }

    pub fn flags(&self) -> ScanFlags {
        self.flags
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn entry_point(&self) -> Option<u64> {
        self.entry_point
    }

    pub fn set_entry_point(&mut self, entry_point: Option<u64>) {
        self.entry_point = entry_point;
    }

    pub fn start_clock(&mut self) {
        self.start_time = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// A zero timeout means no deadline.
    pub fn check_deadline(&self) -> Result<(), Error> {
        if !self.timeout.is_zero() && self.start_time.elapsed() > self.timeout {
            return Err(Error::ScanTimeout);
        }
        Ok(())
    }

    pub fn bind_externals(&mut self, externals: &[ExternalVariable]) -> Result<(), Error> {
        for external in externals {
            let object = Object::from_external(external)?;
            if self
                .objects
                .insert(external.identifier().to_string(), object)
                .is_some()
            {
                return Err(Error::InvalidArgument(format!(
                    "external variable '{}' bound twice",
                    external.identifier()
                )));
            }
        }
        Ok(())
    }

    pub fn object(&self, identifier: &str) -> Option<&Object> {
        self.objects.get(identifier)
    }

    pub fn add_match(&mut self, string: StringId, value: Match) -> Result<(), Error> {
        let list = self.matches[string];
        if list.count >= MAX_STRING_MATCHES {
            return Err(Error::InsufficientMemory);
        }

        let index = self.matches_arena.push(MatchRecord { value, next: None })?;

        if list.count == 0 {
            self.matching_strings_arena.push(string)?;
        }
        if let Some(tail) = list.tail {
            if let Some(record) = self.matches_arena.get_mut(tail) {
                record.next = Some(index);
            }
        }

        let list = &mut self.matches[string];
        list.head = list.head.or(Some(index));
        list.tail = Some(index);
        list.count += 1;
        Ok(())
    }

    /// Remembers a verified position of a string whose candidates may
    /// arrive out of order.
    pub fn mark_recorded(&mut self, string: StringId, base: u64, offset: u64) -> Result<(), Error> {
        self.recorded
            .try_reserve(1)
            .map_err(|_| Error::InsufficientMemory)?;
        self.recorded.insert((string, base, offset));
        Ok(())
    }

    pub fn is_recorded(&self, string: StringId, base: u64, offset: u64) -> bool {
        self.recorded.contains(&(string, base, offset))
    }

    pub fn matches(&self, string: StringId) -> MatchIter<'_> {
        MatchIter {
            arena: &self.matches_arena,
            next: self.matches.get(string).and_then(|l| l.head),
        }
    }

    pub fn match_count(&self, string: StringId) -> usize {
        self.matches.get(string).map_or(0, |l| l.count)
    }

    pub fn last_match(&self, string: StringId) -> Option<&Match> {
        let tail = self.matches.get(string)?.tail?;
        self.matches_arena.get(tail).map(|r| &r.value)
    }

    pub fn matching_strings(&self) -> impl Iterator<Item = StringId> + '_ {
        self.matching_strings_arena.iter().copied()
    }

    pub fn rule_matched(&self, rule: RuleId) -> bool {
        self.rule_flags
            .get(rule)
            .map_or(false, |f| f.contains(RuleScanFlags::MATCH))
    }

    pub fn set_rule_matched(&mut self, rule: RuleId) {
        if let Some(flags) = self.rule_flags.get_mut(rule) {
            flags.insert(RuleScanFlags::MATCH);
        }
    }

    pub fn namespace_unsatisfied(&self, namespace: NamespaceId) -> bool {
        self.namespace_flags
            .get(namespace)
            .map_or(false, |f| f.contains(NamespaceScanFlags::UNSATISFIED_GLOBAL))
    }

    pub fn set_namespace_unsatisfied(&mut self, namespace: NamespaceId) {
        if let Some(flags) = self.namespace_flags.get_mut(namespace) {
            flags.insert(NamespaceScanFlags::UNSATISFIED_GLOBAL);
        }
    }

    /// Resets every flag and the match list of each string registered in
    /// the matching-strings arena, then empties both arenas.
    pub fn clean_matches(&mut self) {
        for flags in &mut self.rule_flags {
            flags.remove(RuleScanFlags::MATCH);
        }
        for flags in &mut self.namespace_flags {
            flags.remove(NamespaceScanFlags::UNSATISFIED_GLOBAL);
        }

        let Self {
            matching_strings_arena,
            matches,
            ..
        } = self;
        for string in matching_strings_arena.iter() {
            if let Some(list) = matches.get_mut(*string) {
                *list = MatchList::default();
            }
        }

        self.matching_strings_arena.clear();
        self.matches_arena.clear();
        self.string_time.fill(Duration::ZERO);
        self.rule_time.fill(Duration::ZERO);
        self.recorded.clear();
    }

    pub fn is_clean(&self) -> bool {
        self.rule_flags.iter().all(|f| f.is_empty())
            && self.namespace_flags.iter().all(|f| f.is_empty())
            && self.matches.iter().all(MatchList::is_empty)
            && self.matches_arena.is_empty()
            && self.matching_strings_arena.is_empty()
            && self.string_time.iter().all(Duration::is_zero)
            && self.rule_time.iter().all(Duration::is_zero)
            && self.recorded.is_empty()
    }
}

pub struct MatchIter<'a> {
    arena: &'a Arena<MatchRecord>,
    next: Option<ArenaIndex>,
}

impl<'a> Iterator for MatchIter<'a> {
    type Item = &'a Match;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.arena.get(self.next?)?;
        self.next = record.next;
        Some(&record.value)
    }
}
