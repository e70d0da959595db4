// Mon Feb 09 2026 - Alex

use crate::error::Error;
use crate::rules::{ExternalValue, ExternalVariable};

/// Value of an external variable as seen by the VM during one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    Float(f64),
    String(Vec<u8>),
}

impl Object {
    pub fn from_external(external: &ExternalVariable) -> Result<Self, Error> {
        Ok(match external.value() {
            ExternalValue::Integer(i) => Object::Integer(*i),
            ExternalValue::Boolean(b) => Object::Boolean(*b),
            ExternalValue::Float(f) => Object::Float(*f),
            ExternalValue::String(s) | ExternalValue::OwnedString(s) => {
                let mut copy = Vec::new();
                copy.try_reserve_exact(s.len())
                    .map_err(|_| Error::InsufficientMemory)?;
                copy.extend_from_slice(s);
                Object::String(copy)
            }
        })
    }
}
