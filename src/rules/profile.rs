// Mon Feb 09 2026 - Alex

//! Cumulative per-rule timing across every scan run with
//! [`ScanFlags::PROFILE`](crate::scan::ScanFlags::PROFILE).
//!
//! A rule's cost is the time spent evaluating its condition plus the time
//! spent verifying candidate matches of its strings.

use crate::rules::{RuleId, Rules, StringId};
use crate::scan::ScanContext;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Nanosecond counters shared by concurrent scans.
#[derive(Debug, Default)]
pub struct ProfileCounters {
    rules: Vec<AtomicU64>,
    strings: Vec<AtomicU64>,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn add(counter: &AtomicU64, duration: Duration) {
    let delta = nanos(duration);
    if delta == 0 {
        return;
    }
    // fetch_update never fails when the closure always returns Some.
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(delta))
    });
}

impl ProfileCounters {
    pub fn new(num_rules: usize, num_strings: usize) -> Self {
        Self {
            rules: (0..num_rules).map(|_| AtomicU64::new(0)).collect(),
            strings: (0..num_strings).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Adds the timings a finished scan collected in its context.
    pub fn record(&self, context: &ScanContext) {
        for (rule, counter) in self.rules.iter().enumerate() {
            add(counter, context.rule_time(rule));
        }
        for (string, counter) in self.strings.iter().enumerate() {
            add(counter, context.string_time(string));
        }
    }

    pub fn rule_time(&self, rule: RuleId) -> Duration {
        self.rules
            .get(rule)
            .map_or(Duration::ZERO, |c| Duration::from_nanos(c.load(Ordering::Relaxed)))
    }

    pub fn string_time(&self, string: StringId) -> Duration {
        self.strings
            .get(string)
            .map_or(Duration::ZERO, |c| Duration::from_nanos(c.load(Ordering::Relaxed)))
    }

    pub fn reset(&self) {
        for counter in self.rules.iter().chain(self.strings.iter()) {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Time charged to one rule, printed as `namespace:rule: <time>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProfile {
    pub namespace: String,
    pub identifier: String,
    pub time: Duration,
}

impl fmt::Display for RuleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.namespace, self.identifier, self.time.as_micros())
    }
}

impl Rules {
    /// One entry per rule in declaration order.
    pub fn profiling_info(&self) -> Vec<RuleProfile> {
        self.rules
            .iter()
            .enumerate()
            .map(|(id, rule)| {
                let strings = rule
                    .strings()
                    .iter()
                    .map(|s| self.profile.string_time(*s))
                    .fold(Duration::ZERO, Duration::saturating_add);
                RuleProfile {
                    namespace: self.namespace_of(rule).name().to_string(),
                    identifier: rule.identifier().to_string(),
                    time: self.profile.rule_time(id).saturating_add(strings),
                }
            })
            .collect()
    }

    pub fn reset_profiling_info(&self) {
        self.profile.reset();
    }
}
