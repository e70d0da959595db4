// Mon Feb 09 2026 - Alex

use crate::error::Error;
use crate::exec::{Object, Opcode};
use crate::rules::{RuleId, Rules, StringId};
use crate::scan::ScanContext;
use std::cmp::Ordering;
use std::time::Instant;

const STACK_SIZE: usize = 16384;
const DEADLINE_INSTRUCTIONS: u64 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl Value {
    /// Undefined is false in boolean context.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Boolean(b) => *b,
            Value::Bytes(b) => !b.is_empty(),
        }
    }

    fn from_object(object: &Object) -> Self {
        match object {
            Object::Integer(i) => Value::Integer(*i),
            Object::Boolean(b) => Value::Boolean(*b),
            Object::Float(f) => Value::Float(*f),
            Object::String(s) => Value::Bytes(s.clone()),
        }
    }

    fn ordering(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

struct CodeReader<'a> {
    code: &'a [u8],
    ip: usize,
}

impl<'a> CodeReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.ip.checked_add(len).filter(|end| *end <= self.code.len());
        match end {
            Some(end) => {
                let bytes = &self.code[self.ip..end];
                self.ip = end;
                Ok(bytes)
            }
            None => Err(Error::corrupt(format!("truncated instruction at {}", self.ip))),
        }
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, Error> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    fn f64(&mut self) -> Result<f64, Error> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buf))
    }

    fn string_id(&mut self, rules: &Rules) -> Result<StringId, Error> {
        let id = self.u32()? as usize;
        if id >= rules.strings().len() {
            return Err(Error::corrupt(format!("unknown string {} in code", id)));
        }
        Ok(id)
    }

    fn rule_id(&mut self, rules: &Rules) -> Result<RuleId, Error> {
        let id = self.u32()? as usize;
        if id >= rules.rules().len() {
            return Err(Error::corrupt(format!("unknown rule {} in code", id)));
        }
        Ok(id)
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, Error> {
    stack.pop().ok_or_else(|| Error::corrupt("stack underflow"))
}

fn compare(op: Opcode, a: &Value, b: &Value) -> Value {
    let ordering = match a.ordering(b) {
        Some(ordering) => ordering,
        None => return Value::Undefined,
    };
    Value::Boolean(match op {
        Opcode::Eq => ordering == Ordering::Equal,
        Opcode::Neq => ordering != Ordering::Equal,
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Le => ordering != Ordering::Greater,
        Opcode::Gt => ordering == Ordering::Greater,
        Opcode::Ge => ordering != Ordering::Less,
        _ => false,
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Evaluates every rule condition, leaving verdicts in the context.
pub fn execute_code(rules: &Rules, context: &mut ScanContext) -> Result<(), Error> {
    let mut reader = CodeReader {
        code: rules.code(),
        ip: rules.code_start(),
    };
    let mut stack: Vec<Value> = Vec::with_capacity(64);
    let mut executed: u64 = 0;
    // Code of each rule ends with its MatchRule; time since the previous one
    // is charged to that rule.
    let mut rule_start = context.profiling().then(Instant::now);

    loop {
        executed += 1;
        if executed % DEADLINE_INSTRUCTIONS == 0 {
            context.check_deadline()?;
        }

        let at = reader.ip;
        let op = Opcode::try_from(reader.u8()?)
            .map_err(|b| Error::corrupt(format!("unknown opcode 0x{:02x} at {}", b, at)))?;

        let value = match op {
            Opcode::Halt => break,
            Opcode::PushInt => Value::Integer(reader.i64()?),
            Opcode::PushFloat => Value::Float(reader.f64()?),
            Opcode::PushBool => Value::Boolean(reader.u8()? != 0),
            Opcode::PushUndefined => Value::Undefined,
            Opcode::PushBytes => {
                let len = reader.u32()? as usize;
                Value::Bytes(reader.take(len)?.to_vec())
            }
            Opcode::StrFound => {
                let string = reader.string_id(rules)?;
                Value::Boolean(context.match_count(string) > 0)
            }
            Opcode::StrCount => {
                let string = reader.string_id(rules)?;
                Value::Integer(context.match_count(string) as i64)
            }
            Opcode::StrFoundAt => {
                let string = reader.string_id(rules)?;
                match pop(&mut stack)? {
                    Value::Integer(at) => {
                        Value::Boolean(context.matches(string).any(|m| m.address() as i64 == at))
                    }
                    _ => Value::Undefined,
                }
            }
            Opcode::StrFoundIn => {
                let string = reader.string_id(rules)?;
                let hi = pop(&mut stack)?;
                let lo = pop(&mut stack)?;
                match (lo, hi) {
                    (Value::Integer(lo), Value::Integer(hi)) => Value::Boolean(
                        context
                            .matches(string)
                            .any(|m| (lo..=hi).contains(&(m.address() as i64))),
                    ),
                    _ => Value::Undefined,
                }
            }
            Opcode::OfThem => {
                let rule = reader.rule_id(rules)?;
                let minimum = reader.u32()? as usize;
                let found = rules.rules()[rule]
                    .strings()
                    .iter()
                    .filter(|s| context.match_count(**s) > 0)
                    .count();
                Value::Boolean(found >= minimum)
            }
            Opcode::Filesize => Value::Integer(context.file_size() as i64),
            Opcode::Entrypoint => context
                .entry_point()
                .map_or(Value::Undefined, |ep| Value::Integer(ep as i64)),
            Opcode::RuleRef => {
                let rule = reader.rule_id(rules)?;
                Value::Boolean(context.rule_matched(rule))
            }
            Opcode::External => {
                let index = reader.u32()? as usize;
                let external = rules
                    .externals()
                    .get(index)
                    .ok_or_else(|| Error::corrupt(format!("unknown external {} in code", index)))?;
                context
                    .object(external.identifier())
                    .map_or(Value::Undefined, Value::from_object)
            }
            Opcode::Not => match pop(&mut stack)? {
                Value::Undefined => Value::Undefined,
                v => Value::Boolean(!v.is_truthy()),
            },
            Opcode::And => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                Value::Boolean(a.is_truthy() && b.is_truthy())
            }
            Opcode::Or => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                Value::Boolean(a.is_truthy() || b.is_truthy())
            }
            Opcode::Eq | Opcode::Neq | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                compare(op, &a, &b)
            }
            Opcode::Contains => {
                let needle = pop(&mut stack)?;
                let haystack = pop(&mut stack)?;
                match (haystack, needle) {
                    (Value::Bytes(h), Value::Bytes(n)) => Value::Boolean(contains(&h, &n)),
                    _ => Value::Undefined,
                }
            }
            Opcode::MatchRule => {
                let rule = reader.rule_id(rules)?;
                if pop(&mut stack)?.is_truthy() {
                    context.set_rule_matched(rule);
                } else if rules.rules()[rule].is_global() {
                    context.set_namespace_unsatisfied(rules.rules()[rule].namespace());
                }
                if let Some(start) = rule_start {
                    let now = Instant::now();
                    context.add_rule_time(rule, now - start);
                    rule_start = Some(now);
                }
                continue;
            }
        };

        if stack.len() >= STACK_SIZE {
            return Err(Error::corrupt("stack overflow"));
        }
        stack.push(value);
    }

    Ok(())
}
