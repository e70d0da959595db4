// Mon Feb 09 2026 - Alex

use bitflags::bitflags;
use regex::bytes::{Regex, RegexBuilder};
use std::fmt;

pub type RuleId = usize;
pub type StringId = usize;
pub type NamespaceId = usize;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u8 {
        /// Verdict is only visible to other rules, never to the callback.
        const PRIVATE = 0x1;
        /// A failing global rule invalidates every rule in its namespace.
        const GLOBAL = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StringModifiers: u8 {
        const NOCASE = 0x1;
        const ASCII = 0x2;
        const WIDE = 0x4;
        const FULLWORD = 0x8;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub(crate) name: String,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub(crate) identifier: String,
    pub(crate) namespace: NamespaceId,
    pub(crate) flags: RuleFlags,
    pub(crate) strings: Vec<StringId>,
    pub(crate) tags: Vec<String>,
}

impl Rule {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(RuleFlags::PRIVATE)
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains(RuleFlags::GLOBAL)
    }

    pub fn strings(&self) -> &[StringId] {
        &self.strings
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

#[derive(Debug, Clone)]
pub enum StringPattern {
    Text(Vec<u8>),
    /// `bytes` are stored pre-masked so verification is `data & mask == bytes`.
    Hex { bytes: Vec<u8>, mask: Vec<u8> },
    Regex { source: String, regex: Regex },
}

impl StringPattern {
    pub fn kind(&self) -> &'static str {
        match self {
            StringPattern::Text(_) => "text",
            StringPattern::Hex { .. } => "hex",
            StringPattern::Regex { .. } => "regex",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StringDef {
    pub(crate) identifier: String,
    pub(crate) rule: RuleId,
    pub(crate) pattern: StringPattern,
    pub(crate) modifiers: StringModifiers,
}

impl StringDef {
    pub fn new(identifier: &str, rule: RuleId, pattern: StringPattern, modifiers: StringModifiers) -> Self {
        Self {
            identifier: identifier.to_string(),
            rule,
            pattern,
            modifiers,
        }
    }

    pub fn regex(
        identifier: &str,
        rule: RuleId,
        source: &str,
        modifiers: StringModifiers,
    ) -> Result<Self, regex::Error> {
        let regex = compile_regex(source, modifiers.contains(StringModifiers::NOCASE))?;
        Ok(Self::new(
            identifier,
            rule,
            StringPattern::Regex {
                source: source.to_string(),
                regex,
            },
            modifiers,
        ))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn rule(&self) -> RuleId {
        self.rule
    }

    pub fn pattern(&self) -> &StringPattern {
        &self.pattern
    }

    pub fn modifiers(&self) -> StringModifiers {
        self.modifiers
    }
}

/// Compiles a regex anchored at the position where verification starts.
pub fn compile_regex(source: &str, nocase: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{})", source))
        .case_insensitive(nocase)
        .unicode(false)
        .build()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalValue {
    Integer(i64),
    Boolean(bool),
    Float(f64),
    /// Default value compiled into the rule set.
    String(Vec<u8>),
    /// Value defined by the host after compilation.
    OwnedString(Vec<u8>),
}

impl ExternalValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ExternalValue::Integer(_) => "integer",
            ExternalValue::Boolean(_) => "boolean",
            ExternalValue::Float(_) => "float",
            ExternalValue::String(_) | ExternalValue::OwnedString(_) => "string",
        }
    }
}

impl fmt::Display for ExternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalValue::Integer(i) => write!(f, "{}", i),
            ExternalValue::Boolean(b) => write!(f, "{}", b),
            ExternalValue::Float(v) => write!(f, "{}", v),
            ExternalValue::String(s) | ExternalValue::OwnedString(s) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(s))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVariable {
    pub(crate) identifier: String,
    pub(crate) value: ExternalValue,
}

impl ExternalVariable {
    pub fn new(identifier: &str, value: ExternalValue) -> Self {
        Self {
            identifier: identifier.to_string(),
            value,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn value(&self) -> &ExternalValue {
        &self.value
    }
}
