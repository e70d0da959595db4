// Mon Feb 09 2026 - Alex

use crate::ahocorasick::ROOT_STATE;
use crate::error::Error;
use crate::memory::MemoryBlock;
use crate::rules::Rules;
use crate::scan::verify::verify_match;
use crate::scan::ScanContext;

/// The deadline is checked each time the cursor crosses a multiple of this.
pub const DEADLINE_STRIDE: usize = 4096;

/// Runs the automaton over one block. Matches of the current state are
/// emitted before the next byte is consumed, and once more for the final
/// state after the last byte. Returns how many candidates were verified.
pub fn scan_mem_block(
    rules: &Rules,
    block: &MemoryBlock<'_>,
    context: &mut ScanContext,
) -> Result<u64, Error> {
    let automaton = rules.automaton();
    let data = block.data;

    let mut state = ROOT_STATE;
    let mut i = 0usize;
    let mut candidates = 0u64;

    while i < data.len() {
        if i % DEADLINE_STRIDE == 0 {
            context.check_deadline()?;
        }

        candidates += emit_matches(rules, block, context, state, i)?;

        state = automaton.step(state, data[i]);
        i += 1;
    }

    candidates += emit_matches(rules, block, context, state, i)?;
    Ok(candidates)
}

fn emit_matches(
    rules: &Rules,
    block: &MemoryBlock<'_>,
    context: &mut ScanContext,
    state: u32,
    i: usize,
) -> Result<u64, Error> {
    let mut emitted = 0;
    for ac_match in rules.automaton().matches_of(state) {
        let backtrack = ac_match.backtrack as usize;
        if backtrack <= i {
            verify_match(rules, context, ac_match, block.data, block.base, i - backtrack)?;
            emitted += 1;
        }
    }
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Expr, RuleBuilder, RulesCompiler};
    use crate::scan::ScanFlags;
    use std::time::Duration;

    fn context(rules: &Rules, timeout: Duration) -> ScanContext {
        let mut ctx = ScanContext::new(rules, 0, ScanFlags::empty(), 0, timeout).unwrap();
        ctx.start_clock();
        ctx
    }

    fn single_string(pattern: &str) -> Rules {
        RulesCompiler::new()
            .add_rule(
                RuleBuilder::new("r")
                    .text("a", pattern)
                    .condition(Expr::StringMatch("a".into()))
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_reports_offsets_in_order() {
        let rules = single_string("AB");
        let mut ctx = context(&rules, Duration::ZERO);
        let block = MemoryBlock::new(b"ABxxABAB", 0x400);
        scan_mem_block(&rules, &block, &mut ctx).unwrap();

        let offsets: Vec<_> = ctx.matches(0).map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 6]);
        assert!(ctx.matches(0).all(|m| m.base == 0x400 && m.data == b"AB"));
    }

    #[test]
    fn test_long_string_verified_past_atom() {
        let rules = single_string("ABCDEFGH");
        let mut ctx = context(&rules, Duration::ZERO);
        scan_mem_block(&rules, &MemoryBlock::new(b"..ABCDEFGH..ABCDxxxx", 0), &mut ctx).unwrap();

        let offsets: Vec<_> = ctx.matches(0).map(|m| m.offset).collect();
        assert_eq!(offsets, vec![2]);
    }

    #[test]
    fn test_single_byte_block_flushes_final_state() {
        let rules = single_string("A");
        let mut ctx = context(&rules, Duration::ZERO);
        scan_mem_block(&rules, &MemoryBlock::new(b"A", 0), &mut ctx).unwrap();
        assert_eq!(ctx.match_count(0), 1);
    }

    #[test]
    fn test_empty_block() {
        let rules = single_string("A");
        let mut ctx = context(&rules, Duration::ZERO);
        let candidates = scan_mem_block(&rules, &MemoryBlock::new(b"", 0), &mut ctx).unwrap();
        assert_eq!(candidates, 0);
        assert_eq!(ctx.match_count(0), 0);
    }

    fn root_attached(builder: RuleBuilder) -> Rules {
        RulesCompiler::new()
            .add_rule(builder.condition(Expr::AnyOfThem).build())
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_block_emits_root_matches_once() {
        for rules in [
            root_attached(RuleBuilder::new("r").hex("h", "?? ??")),
            root_attached(RuleBuilder::new("r").regex("x", "[a-z]+")),
        ] {
            assert_eq!(rules.automaton().matches_of(ROOT_STATE).count(), 1);

            let mut ctx = context(&rules, Duration::ZERO);
            let candidates = scan_mem_block(&rules, &MemoryBlock::new(b"", 0), &mut ctx).unwrap();
            assert_eq!(candidates, 1);
            assert_eq!(ctx.match_count(0), 0);
            assert_eq!(ctx.matching_strings().count(), 0);
        }
    }

    #[test]
    fn test_root_matches_emitted_at_every_position() {
        let rules = root_attached(RuleBuilder::new("r").hex("h", "?? ??"));
        let mut ctx = context(&rules, Duration::ZERO);
        let candidates = scan_mem_block(&rules, &MemoryBlock::new(b"abcd", 0), &mut ctx).unwrap();
        assert_eq!(candidates, 5);
        assert_eq!(ctx.match_count(0), 3);
    }

    #[test]
    fn test_root_attached_hex_string() {
        let rules = RulesCompiler::new()
            .add_rule(
                RuleBuilder::new("r")
                    .hex("h", "?? ??")
                    .condition(Expr::StringMatch("h".into()))
                    .build(),
            )
            .build()
            .unwrap();
        let mut ctx = context(&rules, Duration::ZERO);
        scan_mem_block(&rules, &MemoryBlock::new(b"abcd", 0), &mut ctx).unwrap();

        let offsets: Vec<_> = ctx.matches(0).map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_timeout_within_one_stride() {
        let rules = single_string("never-present");
        let mut ctx = context(&rules, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        let data = vec![0u8; DEADLINE_STRIDE * 4];
        let result = scan_mem_block(&rules, &MemoryBlock::new(&data, 0), &mut ctx);
        assert!(matches!(result, Err(Error::ScanTimeout)));
    }
}
