// Mon Feb 09 2026 - Alex

use crate::rules::StringModifiers;
use serde::{Deserialize, Serialize};

/// Rule description consumed by the compiler, either built in code with
/// [`RuleBuilder`] or read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    /// Overrides the compiler's current namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub strings: Vec<StringDecl>,
    pub condition: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringDecl {
    pub id: String,
    pub pattern: PatternDecl,
    #[serde(default)]
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDecl {
    Text(String),
    Hex(String),
    Regex(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub nocase: bool,
    pub ascii: bool,
    pub wide: bool,
    pub fullword: bool,
}

impl Modifiers {
    pub fn nocase() -> Self {
        Self {
            nocase: true,
            ..Self::default()
        }
    }

    pub fn wide() -> Self {
        Self {
            wide: true,
            ..Self::default()
        }
    }

    pub fn to_flags(self) -> StringModifiers {
        let mut flags = StringModifiers::empty();
        flags.set(StringModifiers::NOCASE, self.nocase);
        flags.set(StringModifiers::ASCII, self.ascii);
        flags.set(StringModifiers::WIDE, self.wide);
        flags.set(StringModifiers::FULLWORD, self.fullword);
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

/// Rule condition. String identifiers are given without the leading `$`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    True,
    False,
    Integer(i64),
    Float(f64),
    Str(String),
    StringMatch(String),
    StringCount(String),
    StringAt(String, Box<Expr>),
    StringIn(String, Box<Expr>, Box<Expr>),
    AnyOfThem,
    AllOfThem,
    OfThem(u32),
    Filesize,
    Entrypoint,
    /// A rule declared earlier in the same namespace.
    Rule(String),
    External(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(Comparison, Box<Expr>, Box<Expr>),
    Contains(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn cmp(op: Comparison, a: Expr, b: Expr) -> Self {
        Expr::Cmp(op, Box::new(a), Box::new(b))
    }

    pub fn and(a: Expr, b: Expr) -> Self {
        Expr::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Expr, b: Expr) -> Self {
        Expr::Or(Box::new(a), Box::new(b))
    }

    pub fn not(a: Expr) -> Self {
        Expr::Not(Box::new(a))
    }
}

pub struct RuleBuilder {
    rule: RuleDef,
}

impl RuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            rule: RuleDef {
                name: name.to_string(),
                namespace: None,
                private: false,
                global: false,
                tags: Vec::new(),
                strings: Vec::new(),
                condition: Expr::AnyOfThem,
            },
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.rule.namespace = Some(namespace.to_string());
        self
    }

    pub fn private(mut self) -> Self {
        self.rule.private = true;
        self
    }

    pub fn global(mut self) -> Self {
        self.rule.global = true;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.rule.tags.push(tag.to_string());
        self
    }

    pub fn text(self, id: &str, text: &str) -> Self {
        self.text_with(id, text, Modifiers::default())
    }

    pub fn text_with(mut self, id: &str, text: &str, modifiers: Modifiers) -> Self {
        self.rule.strings.push(StringDecl {
            id: id.to_string(),
            pattern: PatternDecl::Text(text.to_string()),
            modifiers,
        });
        self
    }

    pub fn hex(mut self, id: &str, hex: &str) -> Self {
        self.rule.strings.push(StringDecl {
            id: id.to_string(),
            pattern: PatternDecl::Hex(hex.to_string()),
            modifiers: Modifiers::default(),
        });
        self
    }

    pub fn regex(self, id: &str, regex: &str) -> Self {
        self.regex_with(id, regex, Modifiers::default())
    }

    pub fn regex_with(mut self, id: &str, regex: &str, modifiers: Modifiers) -> Self {
        self.rule.strings.push(StringDecl {
            id: id.to_string(),
            pattern: PatternDecl::Regex(regex.to_string()),
            modifiers,
        });
        self
    }

    pub fn condition(mut self, condition: Expr) -> Self {
        self.rule.condition = condition;
        self
    }

    pub fn build(self) -> RuleDef {
        self.rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builder() {
        let rule = RuleBuilder::new("test_rule")
            .hex("pattern1", "48 8B ?? ?? 89")
            .text_with("s", "evil", Modifiers::nocase())
            .condition(Expr::AnyOfThem)
            .tag("malware")
            .global()
            .build();

        assert_eq!(rule.name, "test_rule");
        assert_eq!(rule.strings.len(), 2);
        assert_eq!(rule.tags, vec!["malware".to_string()]);
        assert!(rule.global && !rule.private);
        assert_eq!(rule.strings[1].modifiers.to_flags(), StringModifiers::NOCASE);
    }

    #[test]
    fn test_rule_from_json() {
        let rule: RuleDef = serde_json::from_str(
            r#"{
                "name": "big_pe",
                "tags": ["pe"],
                "strings": [{"id": "mz", "pattern": {"hex": "4D 5A"}}],
                "condition": {"and": [
                    {"string_at": ["mz", {"integer": 0}]},
                    {"cmp": ["greater_than", "filesize", {"integer": 1024}]}
                ]}
            }"#,
        )
        .unwrap();

        assert_eq!(rule.namespace, None);
        assert_eq!(rule.strings[0].pattern, PatternDecl::Hex("4D 5A".into()));
        assert_eq!(
            rule.condition,
            Expr::and(
                Expr::StringAt("mz".into(), Box::new(Expr::Integer(0))),
                Expr::cmp(Comparison::GreaterThan, Expr::Filesize, Expr::Integer(1024)),
            )
        );
    }
}
