// Mon Feb 09 2026 - Alex

pub mod atoms;
pub mod codegen;
pub mod rule;

pub use rule::{Comparison, Expr, Modifiers, PatternDecl, RuleBuilder, RuleDef, StringDecl};

use crate::ahocorasick::AutomatonBuilder;
use crate::exec::{CodeEmitter, Opcode};
use crate::rules::{
    ExternalValue, ExternalVariable, Namespace, NamespaceId, Rule, RuleFlags, RuleId, Rules,
    StringDef, StringId, StringPattern,
};
use ahash::AHashMap;
use codegen::Scope;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unknown string ${string} in rule {rule}")]
    UnknownString { rule: String, string: String },
    #[error("Unknown rule {reference} referenced by {rule}")]
    UnknownRule { rule: String, reference: String },
    #[error("Unknown external variable {external} referenced by {rule}")]
    UnknownExternal { rule: String, external: String },
    #[error("Duplicate rule {0}")]
    DuplicateRule(String),
    #[error("Duplicate string ${string} in rule {rule}")]
    DuplicateString { rule: String, string: String },
    #[error("Duplicate external variable {0}")]
    DuplicateExternal(String),
    #[error("Empty string ${string} in rule {rule}")]
    EmptyString { rule: String, string: String },
    #[error("Invalid hex string ${string} in rule {rule}: {reason}")]
    InvalidHex {
        rule: String,
        string: String,
        reason: String,
    },
    #[error("Invalid regex ${string} in rule {rule}: {source}")]
    InvalidRegex {
        rule: String,
        string: String,
        #[source]
        source: regex::Error,
    },
    #[error("Rule {0} uses 'of them' but declares no strings")]
    NoStrings(String),
    #[error("Invalid rule description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not read rule description: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rules(#[from] crate::error::Error),
}

/// Default value of an external variable in a JSON rule description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalDefault {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDef {
    pub name: String,
    pub value: ExternalDefault,
}

/// Top level of a JSON rule description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDef {
    #[serde(default)]
    pub externals: Vec<ExternalDef>,
    pub rules: Vec<RuleDef>,
}

pub struct RulesCompiler {
    namespace: String,
    externals: Vec<ExternalVariable>,
    rules: Vec<(String, RuleDef)>,
}

impl RulesCompiler {
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            externals: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Rules added afterwards land in `name` unless they name their own.
    pub fn namespace(mut self, name: &str) -> Self {
        self.namespace = name.to_string();
        self
    }

    fn define(mut self, name: &str, value: ExternalValue) -> Self {
        self.externals.push(ExternalVariable::new(name, value));
        self
    }

    pub fn define_integer(self, name: &str, value: i64) -> Self {
        self.define(name, ExternalValue::Integer(value))
    }

    pub fn define_boolean(self, name: &str, value: bool) -> Self {
        self.define(name, ExternalValue::Boolean(value))
    }

    pub fn define_float(self, name: &str, value: f64) -> Self {
        self.define(name, ExternalValue::Float(value))
    }

    pub fn define_string(self, name: &str, value: &str) -> Self {
        self.define(name, ExternalValue::String(value.as_bytes().to_vec()))
    }

    pub fn add_rule(mut self, rule: RuleDef) -> Self {
        let namespace = rule.namespace.clone().unwrap_or_else(|| self.namespace.clone());
        self.rules.push((namespace, rule));
        self
    }

    pub fn add_rules(self, rules: impl IntoIterator<Item = RuleDef>) -> Self {
        rules.into_iter().fold(self, RulesCompiler::add_rule)
    }

    pub fn from_definition(definition: RuleSetDef) -> Self {
        let compiler = definition
            .externals
            .into_iter()
            .fold(Self::new(), |compiler, external| match external.value {
                ExternalDefault::Boolean(b) => compiler.define_boolean(&external.name, b),
                ExternalDefault::Integer(i) => compiler.define_integer(&external.name, i),
                ExternalDefault::Float(f) => compiler.define_float(&external.name, f),
                ExternalDefault::String(s) => compiler.define_string(&external.name, &s),
            });
        compiler.add_rules(definition.rules)
    }

    pub fn from_json(json: &str) -> Result<Self, CompileError> {
        let definition: RuleSetDef = serde_json::from_str(json)?;
        Ok(Self::from_definition(definition))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn build(self) -> Result<Rules, CompileError> {
        let mut seen_externals = AHashMap::new();
        for external in &self.externals {
            if seen_externals.insert(external.identifier(), ()).is_some() {
                return Err(CompileError::DuplicateExternal(external.identifier().to_string()));
            }
        }

        let mut namespaces: Vec<Namespace> = Vec::new();
        let mut namespace_ids: AHashMap<String, NamespaceId> = AHashMap::new();
        let mut rule_ids: Vec<AHashMap<String, RuleId>> = Vec::new();
        let mut rules: Vec<Rule> = Vec::new();
        let mut strings: Vec<StringDef> = Vec::new();
        let mut automaton = AutomatonBuilder::new();
        let mut emitter = CodeEmitter::new();

        for (namespace_name, def) in &self.rules {
            let namespace = *namespace_ids
                .entry(namespace_name.clone())
                .or_insert_with(|| {
                    namespaces.push(Namespace::new(namespace_name));
                    rule_ids.push(AHashMap::new());
                    namespaces.len() - 1
                });

            if rule_ids[namespace].contains_key(&def.name) {
                return Err(CompileError::DuplicateRule(def.name.clone()));
            }

            let rule_id = rules.len();
            let mut string_ids: AHashMap<String, StringId> = AHashMap::new();
            let mut rule_strings = Vec::with_capacity(def.strings.len());

            for decl in &def.strings {
                if string_ids.contains_key(&decl.id) {
                    return Err(CompileError::DuplicateString {
                        rule: def.name.clone(),
                        string: decl.id.clone(),
                    });
                }
                let string = compile_string(&def.name, rule_id, decl)?;
                let string_id = strings.len();
                for atom in atoms::extract_atoms(&string) {
                    automaton.add_atom(&atom.bytes, atom.backtrack, string_id);
                }
                string_ids.insert(decl.id.clone(), string_id);
                rule_strings.push(string_id);
                strings.push(string);
            }

            let scope = Scope {
                rule: &def.name,
                rule_id,
                strings: &string_ids,
                num_strings: rule_strings.len(),
                rules: &rule_ids[namespace],
                externals: &self.externals,
            };
            codegen::emit_rule(&mut emitter, &scope, &def.condition)?;

            let mut flags = RuleFlags::empty();
            flags.set(RuleFlags::PRIVATE, def.private);
            flags.set(RuleFlags::GLOBAL, def.global);
            rules.push(Rule {
                identifier: def.name.clone(),
                namespace,
                flags,
                strings: rule_strings,
                tags: def.tags.clone(),
            });
            rule_ids[namespace].insert(def.name.clone(), rule_id);
        }

        emitter.op(Opcode::Halt);
        let automaton = automaton.build(strings.len())?;

        log::info!(
            "Compiled {} rules ({} strings) into {} automaton states",
            rules.len(),
            strings.len(),
            automaton.num_states()
        );

        Ok(Rules::from_parts(
            namespaces,
            rules,
            strings,
            self.externals,
            automaton,
            emitter.finish(),
            0,
        ))
    }
}

impl Default for RulesCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_string(rule: &str, rule_id: RuleId, decl: &StringDecl) -> Result<StringDef, CompileError> {
    let modifiers = decl.modifiers.to_flags();
    let empty = || CompileError::EmptyString {
        rule: rule.to_string(),
        string: decl.id.clone(),
    };

    match &decl.pattern {
        PatternDecl::Text(text) => {
            if text.is_empty() {
                return Err(empty());
            }
            Ok(StringDef::new(
                &decl.id,
                rule_id,
                StringPattern::Text(text.as_bytes().to_vec()),
                modifiers,
            ))
        }
        PatternDecl::Hex(source) => {
            let parsed = atoms::parse_hex(source).map_err(|reason| CompileError::InvalidHex {
                rule: rule.to_string(),
                string: decl.id.clone(),
                reason,
            })?;
            if parsed.is_empty() {
                return Err(empty());
            }
            let bytes = parsed
                .bytes
                .iter()
                .zip(&parsed.mask)
                .map(|(b, m)| b & m)
                .collect();
            Ok(StringDef::new(
                &decl.id,
                rule_id,
                StringPattern::Hex {
                    bytes,
                    mask: parsed.mask,
                },
                modifiers,
            ))
        }
        PatternDecl::Regex(source) => {
            if source.is_empty() {
                return Err(empty());
            }
            StringDef::regex(&decl.id, rule_id, source, modifiers).map_err(|source| {
                CompileError::InvalidRegex {
                    rule: rule.to_string(),
                    string: decl.id.clone(),
                    source,
                }
            })
        }
    }
}
