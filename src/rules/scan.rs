// Mon Feb 09 2026 - Alex

use crate::ahocorasick::scan_mem_block;
use crate::entrypoint;
use crate::error::Error;
use crate::exec::execute_code;
use crate::memory::{MappedFile, MemoryBlock, MemoryError, OwnedBlock, ProcessMemory};
use crate::rules::{Namespace, Rule, Rules, StringDef};
use crate::scan::context::MatchIter;
use crate::scan::exception::protect;
use crate::scan::{ScanContext, ScanFlags};
use std::path::Path;
use std::time::Duration;

/// Verdict of one rule, with access to the matches recorded for its
/// strings. Only valid inside the callback.
pub struct RuleResult<'a> {
    rule: &'a Rule,
    rules: &'a Rules,
    context: &'a ScanContext,
}

impl<'a> RuleResult<'a> {
    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn identifier(&self) -> &'a str {
        self.rule.identifier()
    }

    pub fn namespace(&self) -> &'a Namespace {
        self.rules.namespace_of(self.rule)
    }

    pub fn tags(&self) -> &'a [String] {
        self.rule.tags()
    }

    /// Strings of the rule that matched at least once, with their matches.
    pub fn matched_strings(&self) -> impl Iterator<Item = (&'a StringDef, MatchIter<'a>)> + '_ {
        let rules = self.rules;
        let context = self.context;
        self.rule
            .strings()
            .iter()
            .filter(move |id| context.match_count(**id) > 0)
            .map(move |id| (&rules.strings()[*id], context.matches(*id)))
    }
}

pub enum CallbackMessage<'a> {
    RuleMatching(RuleResult<'a>),
    RuleNotMatching(RuleResult<'a>),
    ScanFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Continue,
    /// Stop the scan and report success.
    Abort,
    /// Stop the scan and report [`Error::CallbackError`].
    Error,
}

impl Rules {
    /// Scans `blocks` in order as one logical target. A zero `timeout`
    /// disables the deadline.
    pub fn scan_mem_blocks<F>(
        &self,
        blocks: &[MemoryBlock<'_>],
        flags: ScanFlags,
        timeout: Duration,
        mut callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        if blocks.is_empty() {
            return Ok(());
        }

        let slot = self.slots.acquire()?;
        let mut context = ScanContext::new(self, slot.index(), flags, blocks[0].size() as u64, timeout)?;
        log::debug!(
            "scan started on slot {} ({} blocks, {} bytes in first)",
            context.slot(),
            blocks.len(),
            blocks[0].size()
        );

        let result = self.run_scan(blocks, &mut context, &mut callback);

        context.clean_matches();
        let elapsed = context.elapsed();
        drop(context);
        drop(slot);

        match &result {
            Ok(()) => log::debug!("scan finished in {:?}", elapsed),
            Err(e @ Error::ScanTimeout) | Err(e @ Error::CallbackError) => {
                log::warn!("scan stopped after {:?}: {}", elapsed, e)
            }
            Err(e) => log::debug!("scan failed after {:?}: {}", elapsed, e),
        }
        result
    }

    fn run_scan<F>(
        &self,
        blocks: &[MemoryBlock<'_>],
        context: &mut ScanContext,
        callback: &mut F,
    ) -> Result<(), Error>
    where
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        context.bind_externals(&self.externals)?;
        context.start_clock();

        for block in blocks {
            if context.entry_point().is_none() {
                let in_process = context.flags().contains(ScanFlags::PROCESS_MEMORY);
                let detected = protect(|| {
                    if in_process {
                        entrypoint::entry_point_address(block.data, block.base)
                    } else {
                        entrypoint::entry_point_offset(block.data)
                    }
                });
                if let Ok(entry_point) = detected {
                    context.set_entry_point(entry_point);
                }
            }

            let candidates = protect(|| scan_mem_block(self, block, context))??;
            log::trace!(
                "block at 0x{:x}: {} bytes, {} candidates",
                block.base,
                block.size(),
                candidates
            );
        }

        protect(|| execute_code(self, context))??;
        if context.profiling() {
            self.profile.record(context);
        }

        for (id, rule) in self.rules.iter().enumerate() {
            if rule.is_private() {
                continue;
            }
            let matched = context.rule_matched(id) && !context.namespace_unsatisfied(rule.namespace());
            let result = RuleResult {
                rule,
                rules: self,
                context,
            };
            let message = if matched {
                CallbackMessage::RuleMatching(result)
            } else {
                CallbackMessage::RuleNotMatching(result)
            };

            match callback(message) {
                CallbackResult::Continue => {}
                CallbackResult::Abort => return Ok(()),
                CallbackResult::Error => return Err(Error::CallbackError),
            }
        }

        // The scan is complete; the answer to the final message is ignored.
        callback(CallbackMessage::ScanFinished);
        Ok(())
    }

    pub fn scan_mem<F>(&self, data: &[u8], flags: ScanFlags, timeout: Duration, callback: F) -> Result<(), Error>
    where
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        self.scan_mem_blocks(&[MemoryBlock::new(data, 0)], flags, timeout, callback)
    }

    pub fn scan_file<P, F>(&self, path: P, flags: ScanFlags, timeout: Duration, callback: F) -> Result<(), Error>
    where
        P: AsRef<Path>,
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        let mapped = MappedFile::open(path)?;
        self.scan_mem(mapped.as_slice(), flags, timeout, callback)
    }

    #[cfg(unix)]
    pub fn scan_fd<D, F>(&self, fd: &D, flags: ScanFlags, timeout: Duration, callback: F) -> Result<(), Error>
    where
        D: std::os::fd::AsFd,
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        let mapped = MappedFile::from_fd(fd)?;
        self.scan_mem(mapped.as_slice(), flags, timeout, callback)
    }

    /// Copies the readable memory of `pid` and scans it with
    /// [`ScanFlags::PROCESS_MEMORY`] set.
    pub fn scan_proc<F>(&self, pid: u32, flags: ScanFlags, timeout: Duration, callback: F) -> Result<(), Error>
    where
        F: FnMut(CallbackMessage<'_>) -> CallbackResult,
    {
        let attach_failed = |e: MemoryError| {
            log::debug!("could not read process {}: {}", pid, e);
            Error::CouldNotAttachToProcess(pid)
        };
        let process = ProcessMemory::attach(pid).map_err(attach_failed)?;
        let owned: Vec<OwnedBlock> = process.read_blocks().map_err(attach_failed)?;
        let blocks: Vec<MemoryBlock<'_>> = owned.iter().map(OwnedBlock::as_block).collect();

        self.scan_mem_blocks(&blocks, flags | ScanFlags::PROCESS_MEMORY, timeout, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Expr, RuleBuilder, RulesCompiler};
    use crate::scan::MAX_THREADS;
    use std::sync::Barrier;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Matching(String),
        NotMatching(String),
        Finished,
    }

    fn record(events: &mut Vec<Event>, message: CallbackMessage<'_>) {
        events.push(match message {
            CallbackMessage::RuleMatching(r) => Event::Matching(r.identifier().to_string()),
            CallbackMessage::RuleNotMatching(r) => Event::NotMatching(r.identifier().to_string()),
            CallbackMessage::ScanFinished => Event::Finished,
        });
    }

    fn scan_events(rules: &Rules, data: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        rules
            .scan_mem(data, ScanFlags::empty(), Duration::ZERO, |m| {
                record(&mut events, m);
                CallbackResult::Continue
            })
            .unwrap();
        events
    }

    fn matching(name: &str) -> Event {
        Event::Matching(name.to_string())
    }

    fn not_matching(name: &str) -> Event {
        Event::NotMatching(name.to_string())
    }

    fn sample_rules() -> Rules {
        RulesCompiler::new()
            .add_rule(RuleBuilder::new("ab").text("a", "AB").build())
            .add_rule(RuleBuilder::new("cd").text("c", "CD").build())
            .add_rule(
                RuleBuilder::new("both")
                    .text("x", "AB")
                    .text("y", "CD")
                    .condition(Expr::AllOfThem)
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_text_rule() {
        let rules = RulesCompiler::new()
            .add_rule(RuleBuilder::new("r1").text("a", "AB").build())
            .build()
            .unwrap();
        assert_eq!(scan_events(&rules, b"XXAB"), vec![matching("r1"), Event::Finished]);
    }

    #[test]
    fn test_private_rule_suppressed_but_evaluated() {
        let rules = RulesCompiler::new()
            .add_rule(RuleBuilder::new("r1").private().text("a", "AB").build())
            .add_rule(
                RuleBuilder::new("r2")
                    .text("a", "AB")
                    .condition(Expr::and(Expr::StringMatch("a".into()), Expr::Rule("r1".into())))
                    .build(),
            )
            .build()
            .unwrap();
        assert_eq!(scan_events(&rules, b"AB"), vec![matching("r2"), Event::Finished]);
    }

    #[test]
    fn test_failed_global_invalidates_namespace() {
        let rules = RulesCompiler::new()
            .namespace("N")
            .add_rule(RuleBuilder::new("g").global().condition(Expr::False).build())
            .add_rule(RuleBuilder::new("r").condition(Expr::True).build())
            .namespace("M")
            .add_rule(RuleBuilder::new("other").condition(Expr::True).build())
            .build()
            .unwrap();
        assert_eq!(
            scan_events(&rules, b"anything"),
            vec![not_matching("g"), not_matching("r"), matching("other"), Event::Finished]
        );
    }

    #[test]
    fn test_concurrent_scans_match_serial() {
        let rules = sample_rules();
        let mut data = vec![b'.'; 1 << 20];
        data[1000..1002].copy_from_slice(b"AB");
        data[500_000..500_002].copy_from_slice(b"CD");
        let inputs: Vec<&[u8]> = vec![data.as_slice(), &b"AB"[..], &b"CD"[..], &b"ABCD"[..], &b""[..]];

        let serial: Vec<Vec<Event>> = inputs.iter().map(|d| scan_events(&rules, d)).collect();

        let concurrent: Vec<Vec<Event>> = std::thread::scope(|s| {
            let handles: Vec<_> = inputs
                .iter()
                .chain(inputs.iter())
                .map(|d| {
                    let rules = &rules;
                    s.spawn(move || scan_events(rules, d))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(concurrent[..inputs.len()], serial[..]);
        assert_eq!(concurrent[inputs.len()..], serial[..]);
        assert_eq!(serial[0], vec![matching("ab"), matching("cd"), matching("both"), Event::Finished]);
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_abort_skips_remaining_callbacks() {
        let rules = sample_rules();
        let mut events = Vec::new();
        let result = rules.scan_mem(b"ABCD", ScanFlags::empty(), Duration::ZERO, |m| {
            let is_match = matches!(m, CallbackMessage::RuleMatching(_));
            record(&mut events, m);
            if is_match {
                CallbackResult::Abort
            } else {
                CallbackResult::Continue
            }
        });
        assert!(result.is_ok());
        assert_eq!(events, vec![matching("ab")]);
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_callback_error() {
        let rules = sample_rules();
        let result = rules.scan_mem(b"AB", ScanFlags::empty(), Duration::ZERO, |_| CallbackResult::Error);
        assert!(matches!(result, Err(Error::CallbackError)));
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_scan_finished_result_ignored() {
        let rules = sample_rules();
        let mut events = Vec::new();
        let result = rules.scan_mem(b"AB", ScanFlags::empty(), Duration::ZERO, |m| {
            let finished = matches!(m, CallbackMessage::ScanFinished);
            record(&mut events, m);
            if finished {
                CallbackResult::Error
            } else {
                CallbackResult::Continue
            }
        });
        assert!(result.is_ok());
        assert_eq!(events.last(), Some(&Event::Finished));
        assert!(events.contains(&matching("ab")));
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_redefined_string_external() {
        let mut rules = RulesCompiler::new()
            .define_string("x", "default")
            .add_rule(
                RuleBuilder::new("is_bye")
                    .condition(Expr::cmp(
                        crate::compiler::Comparison::Equal,
                        Expr::External("x".into()),
                        Expr::Str("bye".into()),
                    ))
                    .build(),
            )
            .add_rule(
                RuleBuilder::new("has_hi")
                    .condition(Expr::Contains(
                        Box::new(Expr::External("x".into())),
                        Box::new(Expr::Str("hi".into())),
                    ))
                    .build(),
            )
            .build()
            .unwrap();

        rules.define_string_variable("x", "hi").unwrap();
        rules.define_string_variable("x", "bye").unwrap();
        assert_eq!(
            scan_events(&rules, b""),
            vec![matching("is_bye"), not_matching("has_hi"), Event::Finished]
        );
    }

    #[test]
    fn test_empty_block_list() {
        let rules = sample_rules();
        let mut called = false;
        rules
            .scan_mem_blocks(&[], ScanFlags::empty(), Duration::ZERO, |_| {
                called = true;
                CallbackResult::Continue
            })
            .unwrap();
        assert!(!called);
    }

    #[test]
    fn test_multiple_blocks_report_addresses() {
        let rules = sample_rules();
        let first = b"..AB";
        let second = b"CD..";
        let blocks = [MemoryBlock::new(first, 0x1000), MemoryBlock::new(second, 0x2000)];

        let mut addresses = Vec::new();
        rules
            .scan_mem_blocks(&blocks, ScanFlags::empty(), Duration::ZERO, |m| {
                if let CallbackMessage::RuleMatching(r) = m {
                    for (_, matches) in r.matched_strings() {
                        addresses.extend(matches.map(|m| m.address()));
                    }
                }
                CallbackResult::Continue
            })
            .unwrap();
        assert_eq!(addresses, vec![0x1002, 0x2000, 0x1002, 0x2000]);
    }

    #[test]
    fn test_timeout() {
        let rules = sample_rules();
        let data = vec![0u8; 64 << 20];
        let result = rules.scan_mem(&data, ScanFlags::empty(), Duration::from_nanos(1), |_| {
            CallbackResult::Continue
        });
        assert!(matches!(result, Err(Error::ScanTimeout)));
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_one_scan_too_many() {
        let rules = RulesCompiler::new()
            .add_rule(RuleBuilder::new("always").condition(Expr::True).build())
            .build()
            .unwrap();
        let entered = Barrier::new(MAX_THREADS + 1);
        let release = Barrier::new(MAX_THREADS + 1);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..MAX_THREADS)
                .map(|_| {
                    s.spawn(|| {
                        let mut waited = false;
                        rules.scan_mem(b"data", ScanFlags::empty(), Duration::ZERO, |_| {
                            if !waited {
                                waited = true;
                                entered.wait();
                                release.wait();
                            }
                            CallbackResult::Continue
                        })
                    })
                })
                .collect();

            entered.wait();
            assert_eq!(rules.active_scans_mask(), u32::MAX);
            let extra = rules.scan_mem(b"data", ScanFlags::empty(), Duration::ZERO, |_| {
                CallbackResult::Continue
            });
            assert!(matches!(extra, Err(Error::TooManyScanThreads)));
            release.wait();

            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });
        assert_eq!(rules.active_scans_mask(), 0);
    }

    #[test]
    fn test_scan_file_and_fd() {
        let rules = sample_rules();
        let path = std::env::temp_dir().join(format!("rulescan-scan-{}.bin", std::process::id()));
        std::fs::write(&path, b"xxABxx").unwrap();

        let mut events = Vec::new();
        rules
            .scan_file(&path, ScanFlags::empty(), Duration::ZERO, |m| {
                record(&mut events, m);
                CallbackResult::Continue
            })
            .unwrap();
        assert_eq!(events[0], matching("ab"));

        #[cfg(unix)]
        {
            let file = std::fs::File::open(&path).unwrap();
            let mut events = Vec::new();
            rules
                .scan_fd(&file, ScanFlags::empty(), Duration::ZERO, |m| {
                    record(&mut events, m);
                    CallbackResult::Continue
                })
                .unwrap();
            assert_eq!(events[0], matching("ab"));
        }

        std::fs::remove_file(&path).ok();
        let missing = rules.scan_file(&path, ScanFlags::empty(), Duration::ZERO, |_| CallbackResult::Continue);
        assert!(matches!(missing, Err(Error::CouldNotOpenFile(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_scan_own_process() {
        let rules = RulesCompiler::new()
            .add_rule(RuleBuilder::new("marker").text("m", "rulescan-process-marker").build())
            .build()
            .unwrap();
        let marker = std::hint::black_box(b"rulescan-process-marker".to_vec());

        let mut found = false;
        rules
            .scan_proc(std::process::id(), ScanFlags::FAST_MODE, Duration::ZERO, |m| {
                if let CallbackMessage::RuleMatching(_) = m {
                    found = true;
                }
                CallbackResult::Continue
            })
            .unwrap();
        assert!(found);
        drop(marker);
    }
}
