// Mon Feb 09 2026 - Alex

use crate::compiler::{CompileError, Comparison, Expr};
use crate::exec::{CodeEmitter, Opcode};
use crate::rules::{ExternalVariable, RuleId, StringId};
use ahash::AHashMap;

/// Names visible to one rule's condition.
pub struct Scope<'a> {
    pub rule: &'a str,
    pub rule_id: RuleId,
    pub strings: &'a AHashMap<String, StringId>,
    pub num_strings: usize,
    /// Rules declared earlier in the same namespace.
    pub rules: &'a AHashMap<String, RuleId>,
    pub externals: &'a [ExternalVariable],
}

impl<'a> Scope<'a> {
    fn string(&self, id: &str) -> Result<u32, CompileError> {
        self.strings
            .get(id)
            .map(|s| *s as u32)
            .ok_or_else(|| CompileError::UnknownString {
                rule: self.rule.to_string(),
                string: id.to_string(),
            })
    }

    fn of_them(&self, minimum: u32) -> Result<u32, CompileError> {
        if self.num_strings == 0 {
            return Err(CompileError::NoStrings(self.rule.to_string()));
        }
        Ok(minimum)
    }
}

fn comparison_opcode(op: Comparison) -> Opcode {
    match op {
        Comparison::Equal => Opcode::Eq,
        Comparison::NotEqual => Opcode::Neq,
        Comparison::LessThan => Opcode::Lt,
        Comparison::LessEqual => Opcode::Le,
        Comparison::GreaterThan => Opcode::Gt,
        Comparison::GreaterEqual => Opcode::Ge,
    }
}

/// Emits `expr` so that its value is left on top of the stack.
pub fn emit_expr(emitter: &mut CodeEmitter, scope: &Scope<'_>, expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::True => {
            emitter.op(Opcode::PushBool).u8(1);
        }
        Expr::False => {
            emitter.op(Opcode::PushBool).u8(0);
        }
        Expr::Integer(value) => {
            emitter.op(Opcode::PushInt).i64(*value);
        }
        Expr::Float(value) => {
            emitter.op(Opcode::PushFloat).f64(*value);
        }
        Expr::Str(value) => {
            emitter.op(Opcode::PushBytes).bytes(value.as_bytes());
        }
        Expr::StringMatch(id) => {
            let string = scope.string(id)?;
            emitter.op(Opcode::StrFound).u32(string);
        }
        Expr::StringCount(id) => {
            let string = scope.string(id)?;
            emitter.op(Opcode::StrCount).u32(string);
        }
        Expr::StringAt(id, offset) => {
            let string = scope.string(id)?;
            emit_expr(emitter, scope, offset)?;
            emitter.op(Opcode::StrFoundAt).u32(string);
        }
        Expr::StringIn(id, lo, hi) => {
            let string = scope.string(id)?;
            emit_expr(emitter, scope, lo)?;
            emit_expr(emitter, scope, hi)?;
            emitter.op(Opcode::StrFoundIn).u32(string);
        }
        Expr::AnyOfThem => {
            let minimum = scope.of_them(1)?;
            emitter.op(Opcode::OfThem).u32(scope.rule_id as u32).u32(minimum);
        }
        Expr::AllOfThem => {
            let minimum = scope.of_them(scope.num_strings as u32)?;
            emitter.op(Opcode::OfThem).u32(scope.rule_id as u32).u32(minimum);
        }
        Expr::OfThem(n) => {
            let minimum = scope.of_them(*n)?;
            emitter.op(Opcode::OfThem).u32(scope.rule_id as u32).u32(minimum);
        }
        Expr::Filesize => {
            emitter.op(Opcode::Filesize);
        }
        Expr::Entrypoint => {
            emitter.op(Opcode::Entrypoint);
        }
        Expr::Rule(name) => {
            let rule = scope
                .rules
                .get(name)
                .ok_or_else(|| CompileError::UnknownRule {
                    rule: scope.rule.to_string(),
                    reference: name.clone(),
                })?;
            emitter.op(Opcode::RuleRef).u32(*rule as u32);
        }
        Expr::External(name) => {
            let index = scope
                .externals
                .iter()
                .position(|e| e.identifier() == name)
                .ok_or_else(|| CompileError::UnknownExternal {
                    rule: scope.rule.to_string(),
                    external: name.clone(),
                })?;
            emitter.op(Opcode::External).u32(index as u32);
        }
        Expr::Not(inner) => {
            emit_expr(emitter, scope, inner)?;
            emitter.op(Opcode::Not);
        }
        Expr::And(a, b) => emit_binary(emitter, scope, Opcode::And, a, b)?,
        Expr::Or(a, b) => emit_binary(emitter, scope, Opcode::Or, a, b)?,
        Expr::Cmp(op, a, b) => emit_binary(emitter, scope, comparison_opcode(*op), a, b)?,
        Expr::Contains(a, b) => emit_binary(emitter, scope, Opcode::Contains, a, b)?,
    }
    Ok(())
}

fn emit_binary(
    emitter: &mut CodeEmitter,
    scope: &Scope<'_>,
    op: Opcode,
    a: &Expr,
    b: &Expr,
) -> Result<(), CompileError> {
    emit_expr(emitter, scope, a)?;
    emit_expr(emitter, scope, b)?;
    emitter.op(op);
    Ok(())
}

/// Emits the condition followed by the verdict instruction for the rule.
pub fn emit_rule(emitter: &mut CodeEmitter, scope: &Scope<'_>, condition: &Expr) -> Result<(), CompileError> {
    emit_expr(emitter, scope, condition)?;
    emitter.op(Opcode::MatchRule).u32(scope.rule_id as u32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope<'a>(
        strings: &'a AHashMap<String, StringId>,
        rules: &'a AHashMap<String, RuleId>,
        externals: &'a [ExternalVariable],
    ) -> Scope<'a> {
        Scope {
            rule: "r",
            rule_id: 2,
            strings,
            num_strings: strings.len(),
            rules,
            externals,
        }
    }

    #[test]
    fn test_emit_rule_layout() {
        let strings: AHashMap<String, StringId> = [("a".to_string(), 5)].into_iter().collect();
        let rules = AHashMap::new();
        let mut emitter = CodeEmitter::new();

        emit_rule(
            &mut emitter,
            &scope(&strings, &rules, &[]),
            &Expr::not(Expr::StringMatch("a".into())),
        )
        .unwrap();

        let code = emitter.finish();
        assert_eq!(
            code,
            vec![
                Opcode::StrFound as u8, 5, 0, 0, 0,
                Opcode::Not as u8,
                Opcode::MatchRule as u8, 2, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_unknown_names() {
        let strings = AHashMap::new();
        let rules = AHashMap::new();
        let scope = scope(&strings, &rules, &[]);
        let mut emitter = CodeEmitter::new();

        assert!(matches!(
            emit_expr(&mut emitter, &scope, &Expr::StringMatch("x".into())),
            Err(CompileError::UnknownString { .. })
        ));
        assert!(matches!(
            emit_expr(&mut emitter, &scope, &Expr::Rule("other".into())),
            Err(CompileError::UnknownRule { .. })
        ));
        assert!(matches!(
            emit_expr(&mut emitter, &scope, &Expr::External("ext".into())),
            Err(CompileError::UnknownExternal { .. })
        ));
        assert!(matches!(
            emit_expr(&mut emitter, &scope, &Expr::AnyOfThem),
            Err(CompileError::NoStrings(_))
        ));
    }
}
