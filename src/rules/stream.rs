// Mon Feb 09 2026 - Alex

//! Compiled rule file. Little endian throughout:
//!
//! ```text
//! header: "RSCN" | version | code_start | n_namespaces | n_rules | n_strings
//!         | n_externals | n_states | n_ac_matches | table_len | code_len
//! body:   namespaces | rules | strings | externals | transition table
//!         | match table | ac matches | code
//! ```
//!
//! Variable-length fields carry a `u32` length prefix. Optional indices are
//! stored as `index + 1` with zero meaning none.

use crate::ahocorasick::{AcMatch, Automaton};
use crate::error::Error;
use crate::rules::{
    compile_regex, ExternalValue, ExternalVariable, Namespace, Rule, RuleFlags, Rules, StringDef,
    StringModifiers, StringPattern,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"RSCN";
pub const FILE_VERSION: u32 = 1;

const KIND_TEXT: u8 = 0;
const KIND_HEX: u8 = 1;
const KIND_REGEX: u8 = 2;

const EXTERNAL_INTEGER: u8 = 0;
const EXTERNAL_BOOLEAN: u8 = 1;
const EXTERNAL_FLOAT: u8 = 2;
const EXTERNAL_STRING: u8 = 3;
const EXTERNAL_OWNED_STRING: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    code_start: u32,
    n_namespaces: u32,
    n_rules: u32,
    n_strings: u32,
    n_externals: u32,
    n_states: u32,
    n_ac_matches: u32,
    table_len: u32,
    code_len: u32,
}

fn put_bytes(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value);
}

fn put_optional(buf: &mut BytesMut, value: Option<u32>) {
    buf.put_u32_le(value.map_or(0, |v| v + 1));
}

struct Reader {
    buf: Bytes,
}

impl Reader {
    fn need(&self, n: usize, what: &str) -> Result<(), Error> {
        if self.buf.remaining() < n {
            return Err(Error::corrupt(format!("truncated {}", what)));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8, Error> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, what: &str) -> Result<u16, Error> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self, what: &str) -> Result<u32, Error> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self, what: &str) -> Result<u64, Error> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    fn optional(&mut self, what: &str) -> Result<Option<u32>, Error> {
        Ok(self.u32(what)?.checked_sub(1))
    }

    /// A count of items that each take at least `item_size` bytes.
    fn count(&mut self, item_size: usize, what: &str) -> Result<usize, Error> {
        let n = self.u32(what)? as usize;
        self.check_count(n, item_size, what)
    }

    fn check_count(&self, n: usize, item_size: usize, what: &str) -> Result<usize, Error> {
        match n.checked_mul(item_size) {
            Some(size) if size <= self.buf.remaining() => Ok(n),
            _ => Err(Error::corrupt(format!("{} count {} exceeds the data", what, n))),
        }
    }

    fn bytes(&mut self, what: &str) -> Result<Vec<u8>, Error> {
        let len = self.count(1, what)?;
        Ok(self.buf.split_to(len).to_vec())
    }

    fn string(&mut self, what: &str) -> Result<String, Error> {
        String::from_utf8(self.bytes(what)?).map_err(|_| Error::corrupt(format!("{} is not UTF-8", what)))
    }
}

impl Rules {
    fn header(&self) -> Header {
        Header {
            code_start: self.code_start as u32,
            n_namespaces: self.namespaces.len() as u32,
            n_rules: self.rules.len() as u32,
            n_strings: self.strings.len() as u32,
            n_externals: self.externals.len() as u32,
            n_states: self.automaton.num_states() as u32,
            n_ac_matches: self.automaton.ac_matches().len() as u32,
            table_len: self.automaton.transition_table().len() as u32,
            code_len: self.code.len() as u32,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let header = self.header();
        let mut buf = BytesMut::with_capacity(
            64 + self.code.len() + self.automaton.transition_table().len() * 12,
        );

        buf.put_slice(MAGIC);
        buf.put_u32_le(FILE_VERSION);
        for field in [
            header.code_start,
            header.n_namespaces,
            header.n_rules,
            header.n_strings,
            header.n_externals,
            header.n_states,
            header.n_ac_matches,
            header.table_len,
            header.code_len,
        ] {
            buf.put_u32_le(field);
        }

        for namespace in &self.namespaces {
            put_bytes(&mut buf, namespace.name().as_bytes());
        }

        for rule in &self.rules {
            put_bytes(&mut buf, rule.identifier().as_bytes());
            buf.put_u32_le(rule.namespace() as u32);
            buf.put_u8(rule.flags().bits());
            buf.put_u32_le(rule.strings().len() as u32);
            for string in rule.strings() {
                buf.put_u32_le(*string as u32);
            }
            buf.put_u32_le(rule.tags().len() as u32);
            for tag in rule.tags() {
                put_bytes(&mut buf, tag.as_bytes());
            }
        }

        for string in &self.strings {
            put_bytes(&mut buf, string.identifier().as_bytes());
            buf.put_u32_le(string.rule() as u32);
            buf.put_u8(string.modifiers().bits());
            match string.pattern() {
                StringPattern::Text(text) => {
                    buf.put_u8(KIND_TEXT);
                    put_bytes(&mut buf, text);
                }
                StringPattern::Hex { bytes, mask } => {
                    buf.put_u8(KIND_HEX);
                    put_bytes(&mut buf, bytes);
                    put_bytes(&mut buf, mask);
                }
                StringPattern::Regex { source, .. } => {
                    buf.put_u8(KIND_REGEX);
                    put_bytes(&mut buf, source.as_bytes());
                }
            }
        }

        for external in &self.externals {
            put_bytes(&mut buf, external.identifier().as_bytes());
            match external.value() {
                ExternalValue::Integer(i) => {
                    buf.put_u8(EXTERNAL_INTEGER);
                    buf.put_i64_le(*i);
                }
                ExternalValue::Boolean(b) => {
                    buf.put_u8(EXTERNAL_BOOLEAN);
                    buf.put_u8(*b as u8);
                }
                ExternalValue::Float(f) => {
                    buf.put_u8(EXTERNAL_FLOAT);
                    buf.put_f64_le(*f);
                }
                ExternalValue::String(s) => {
                    buf.put_u8(EXTERNAL_STRING);
                    put_bytes(&mut buf, s);
                }
                ExternalValue::OwnedString(s) => {
                    buf.put_u8(EXTERNAL_OWNED_STRING);
                    put_bytes(&mut buf, s);
                }
            }
        }

        for cell in self.automaton.transition_table() {
            buf.put_u64_le(*cell);
        }
        for head in self.automaton.match_table() {
            put_optional(&mut buf, *head);
        }
        for m in self.automaton.ac_matches() {
            buf.put_u16_le(m.backtrack);
            buf.put_u32_le(m.string as u32);
            put_optional(&mut buf, m.next);
        }
        buf.put_slice(&self.code);

        buf.freeze()
    }

    pub fn from_bytes(data: Bytes) -> Result<Rules, Error> {
        let mut reader = Reader { buf: data };

        reader.need(8, "header")?;
        if &reader.buf[..4] != MAGIC {
            return Err(Error::UnsupportedFileVersion);
        }
        reader.buf.advance(4);
        if reader.u32("header")? != FILE_VERSION {
            return Err(Error::UnsupportedFileVersion);
        }

        let header = Header {
            code_start: reader.u32("header")?,
            n_namespaces: reader.u32("header")?,
            n_rules: reader.u32("header")?,
            n_strings: reader.u32("header")?,
            n_externals: reader.u32("header")?,
            n_states: reader.u32("header")?,
            n_ac_matches: reader.u32("header")?,
            table_len: reader.u32("header")?,
            code_len: reader.u32("header")?,
        };

        let n_namespaces = reader.check_count(header.n_namespaces as usize, 4, "namespace")?;
        let mut namespaces = Vec::with_capacity(n_namespaces);
        for _ in 0..n_namespaces {
            namespaces.push(Namespace::new(&reader.string("namespace name")?));
        }

        let n_rules = reader.check_count(header.n_rules as usize, 17, "rule")?;
        let n_strings = header.n_strings as usize;
        let mut rules = Vec::with_capacity(n_rules);
        for _ in 0..n_rules {
            let identifier = reader.string("rule identifier")?;
            let namespace = reader.u32("rule namespace")? as usize;
            if namespace >= namespaces.len() {
                return Err(Error::corrupt(format!("rule {} has unknown namespace", identifier)));
            }
            let flags = RuleFlags::from_bits(reader.u8("rule flags")?)
                .ok_or_else(|| Error::corrupt(format!("rule {} has unknown flags", identifier)))?;
            let n = reader.count(4, "rule strings")?;
            let mut strings = Vec::with_capacity(n);
            for _ in 0..n {
                let id = reader.u32("rule string")? as usize;
                if id >= n_strings {
                    return Err(Error::corrupt(format!("rule {} has unknown string", identifier)));
                }
                strings.push(id);
            }
            let n = reader.count(4, "rule tags")?;
            let mut tags = Vec::with_capacity(n);
            for _ in 0..n {
                tags.push(reader.string("rule tag")?);
            }
            rules.push(Rule {
                identifier,
                namespace,
                flags,
                strings,
                tags,
            });
        }

        let n_strings = reader.check_count(n_strings, 10, "string")?;
        let mut strings = Vec::with_capacity(n_strings);
        for _ in 0..n_strings {
            strings.push(read_string(&mut reader, rules.len())?);
        }

        let n_externals = reader.check_count(header.n_externals as usize, 5, "external")?;
        let mut externals = Vec::with_capacity(n_externals);
        for _ in 0..n_externals {
            let identifier = reader.string("external identifier")?;
            let value = match reader.u8("external kind")? {
                EXTERNAL_INTEGER => ExternalValue::Integer(reader.u64("external value")? as i64),
                EXTERNAL_BOOLEAN => ExternalValue::Boolean(reader.u8("external value")? != 0),
                EXTERNAL_FLOAT => ExternalValue::Float(f64::from_bits(reader.u64("external value")?)),
                EXTERNAL_STRING => ExternalValue::String(reader.bytes("external value")?),
                EXTERNAL_OWNED_STRING => ExternalValue::OwnedString(reader.bytes("external value")?),
                other => return Err(Error::corrupt(format!("unknown external kind {}", other))),
            };
            externals.push(ExternalVariable { identifier, value });
        }

        let table_len = reader.check_count(header.table_len as usize, 12, "transition table")?;
        let mut table = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            table.push(reader.u64("transition table")?);
        }
        let mut match_table = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            match_table.push(reader.optional("match table")?);
        }

        let n_ac_matches = reader.check_count(header.n_ac_matches as usize, 10, "ac match")?;
        let mut ac_matches = Vec::with_capacity(n_ac_matches);
        for _ in 0..n_ac_matches {
            ac_matches.push(AcMatch {
                backtrack: reader.u16("ac match")?,
                string: reader.u32("ac match")? as usize,
                next: reader.optional("ac match")?,
            });
        }

        let code_len = header.code_len as usize;
        reader.need(code_len, "code")?;
        let code = reader.buf.split_to(code_len).to_vec();
        if reader.buf.has_remaining() {
            return Err(Error::corrupt("trailing data after code"));
        }
        if header.code_start as usize >= code.len() {
            return Err(Error::corrupt("code start outside the code section"));
        }

        let automaton = Automaton::from_parts(table, match_table, ac_matches, strings.len())?;
        if automaton.num_states() != header.n_states as usize {
            return Err(Error::corrupt("state count does not match the header"));
        }

        Ok(Rules::from_parts(
            namespaces,
            rules,
            strings,
            externals,
            automaton,
            code,
            header.code_start as usize,
        ))
    }

    pub fn load_stream<R: Read>(mut reader: R) -> Result<Rules, Error> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| Error::corrupt(format!("read failed: {}", e)))?;
        let rules = Self::from_bytes(Bytes::from(data))?;
        log::debug!("loaded {:?}", rules);
        Ok(rules)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Rules, Error> {
        let file = File::open(path.as_ref()).map_err(Error::CouldNotOpenFile)?;
        Self::load_stream(BufReader::new(file))
    }

    /// Panics if a scan is in flight.
    pub fn save_stream<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        assert_eq!(self.active_scans_mask(), 0, "rules saved while a scan is in flight");
        writer
            .write_all(&self.to_bytes())
            .and_then(|_| writer.flush())
            .map_err(Error::CouldNotOpenFile)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = File::create(path.as_ref()).map_err(Error::CouldNotOpenFile)?;
        self.save_stream(BufWriter::new(file))
    }
}

fn read_string(reader: &mut Reader, n_rules: usize) -> Result<StringDef, Error> {
    let identifier = reader.string("string identifier")?;
    let rule = reader.u32("string rule")? as usize;
    if rule >= n_rules {
        return Err(Error::corrupt(format!("string {} has unknown rule", identifier)));
    }
    let modifiers = StringModifiers::from_bits(reader.u8("string modifiers")?)
        .ok_or_else(|| Error::corrupt(format!("string {} has unknown modifiers", identifier)))?;

    let pattern = match reader.u8("string kind")? {
        KIND_TEXT => StringPattern::Text(reader.bytes("text string")?),
        KIND_HEX => {
            let bytes = reader.bytes("hex string")?;
            let mask = reader.bytes("hex mask")?;
            if bytes.len() != mask.len() {
                return Err(Error::corrupt(format!("string {} has a mismatched mask", identifier)));
            }
            StringPattern::Hex { bytes, mask }
        }
        KIND_REGEX => {
            let source = reader.string("regex source")?;
            let regex = compile_regex(&source, modifiers.contains(StringModifiers::NOCASE))
                .map_err(|e| Error::corrupt(format!("string {} has an invalid regex: {}", identifier, e)))?;
            StringPattern::Regex { source, regex }
        }
        other => return Err(Error::corrupt(format!("unknown string kind {}", other))),
    };

    Ok(StringDef {
        identifier,
        rule,
        pattern,
        modifiers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ahocorasick::automaton::pack_failure;
    use crate::ahocorasick::ROOT_STATE;
    use crate::compiler::{Comparison, Expr, Modifiers, RuleBuilder, RulesCompiler};
    use crate::rules::{CallbackMessage, CallbackResult};
    use crate::scan::ScanFlags;
    use std::time::Duration;

    fn sample_rules() -> Rules {
        RulesCompiler::new()
            .define_integer("limit", 3)
            .define_string("label", "sample")
            .add_rule(
                RuleBuilder::new("text")
                    .tag("t")
                    .text_with("a", "Hello", Modifiers::nocase())
                    .text_with("w", "hi", Modifiers::wide())
                    .build(),
            )
            .add_rule(
                RuleBuilder::new("hex")
                    .private()
                    .hex("h", "4D 5A ?? 0?")
                    .build(),
            )
            .namespace("second")
            .add_rule(
                RuleBuilder::new("regex")
                    .regex("r", "ab[0-9]+c")
                    .condition(Expr::and(
                        Expr::StringMatch("r".into()),
                        Expr::cmp(Comparison::LessThan, Expr::Filesize, Expr::External("limit".into())),
                    ))
                    .build(),
            )
            .add_rule(RuleBuilder::new("global").global().condition(Expr::True).build())
            .build()
            .unwrap()
    }

    fn verdicts(rules: &Rules, data: &[u8]) -> Vec<(bool, String, Vec<u64>)> {
        let mut out = Vec::new();
        rules
            .scan_mem(data, ScanFlags::empty(), Duration::ZERO, |m| {
                let (matched, r) = match m {
                    CallbackMessage::RuleMatching(r) => (true, r),
                    CallbackMessage::RuleNotMatching(r) => (false, r),
                    CallbackMessage::ScanFinished => return CallbackResult::Continue,
                };
                let offsets = r.matched_strings().flat_map(|(_, ms)| ms.map(|m| m.offset)).collect();
                out.push((matched, r.identifier().to_string(), offsets));
                CallbackResult::Continue
            })
            .unwrap();
        out
    }

    #[test]
    fn test_round_trip_preserves_verdicts() {
        let rules = sample_rules();
        let mut saved = Vec::new();
        rules.save_stream(&mut saved).unwrap();
        let loaded = Rules::load_stream(saved.as_slice()).unwrap();

        assert_eq!(loaded.rules(), rules.rules());
        assert_eq!(loaded.externals(), rules.externals());
        assert_eq!(loaded.code(), rules.code());
        assert_eq!(loaded.automaton().transition_table(), rules.automaton().transition_table());

        for data in [&b"hELLo h\0i\0 MZ\x90\x01"[..], &b"ab12c"[..], &b"nothing here"[..], &b""[..]] {
            assert_eq!(verdicts(&loaded, data), verdicts(&rules, data));
        }
    }

    #[test]
    fn test_save_and_load_file() {
        let rules = sample_rules();
        let path = std::env::temp_dir().join(format!("rulescan-stream-{}.rscn", std::process::id()));
        rules.save(&path).unwrap();
        let loaded = Rules::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(verdicts(&loaded, b"ab1c"), verdicts(&rules, b"ab1c"));
        assert!(matches!(Rules::load(&path), Err(Error::CouldNotOpenFile(_))));
    }

    #[test]
    fn test_rejects_foreign_data() {
        let rules = sample_rules();
        let mut data = rules.to_bytes().to_vec();

        data[0] = b'X';
        assert!(matches!(Rules::from_bytes(Bytes::from(data.clone())), Err(Error::UnsupportedFileVersion)));

        data[0] = b'R';
        data[4] = 2;
        assert!(matches!(Rules::from_bytes(Bytes::from(data)), Err(Error::UnsupportedFileVersion)));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let data = sample_rules().to_bytes();
        for len in [0, 3, 8, 20, 48, data.len() / 2, data.len() - 1] {
            let result = Rules::from_bytes(data.slice(..len));
            assert!(matches!(result, Err(Error::CorruptRules(_))), "length {}", len);
        }
    }

    #[test]
    fn test_rejects_out_of_range_table() {
        let rules = sample_rules();
        let mut data = rules.to_bytes().to_vec();
        let code_len = rules.code().len();
        let matches_len = rules.automaton().ac_matches().len() * 10;
        let table_len = rules.automaton().transition_table().len();
        let table_start = data.len() - code_len - matches_len - table_len * 4 - table_len * 8;

        data[table_start + 4..table_start + 8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(Rules::from_bytes(Bytes::from(data)), Err(Error::CorruptRules(_))));
    }

    #[test]
    fn test_rejects_failure_link_cycle() {
        let rules = RulesCompiler::new()
            .add_rule(RuleBuilder::new("r").text("a", "AB").build())
            .build()
            .unwrap();
        let mut data = rules.to_bytes().to_vec();
        let code_len = rules.code().len();
        let matches_len = rules.automaton().ac_matches().len() * 10;
        let table_len = rules.automaton().transition_table().len();
        let table_start = data.len() - code_len - matches_len - table_len * 4 - table_len * 8;

        let state = rules.automaton().step(ROOT_STATE, b'A') as usize;
        let cell = table_start + state * 8;
        data[cell..cell + 8].copy_from_slice(&pack_failure(state as u32).to_le_bytes());
        assert!(matches!(Rules::from_bytes(Bytes::from(data)), Err(Error::CorruptRules(_))));
    }

    #[test]
    #[should_panic]
    fn test_save_during_scan_panics() {
        let rules = sample_rules();
        let _slot = rules.slots.acquire().unwrap();
        let _ = rules.save_stream(Vec::new());
    }
}
