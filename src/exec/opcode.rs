// Mon Feb 09 2026 - Alex

//! Condition bytecode. Each instruction is a one-byte opcode followed by
//! little-endian operands:
//!
//! | opcode | operands |
//! |---|---|
//! | `PushInt` | `i64` |
//! | `PushFloat` | `f64` |
//! | `PushBool` | `u8` |
//! | `PushBytes` | `u32` length, bytes |
//! | `StrFound`, `StrCount`, `StrFoundAt`, `StrFoundIn` | `u32` string id |
//! | `OfThem` | `u32` rule id, `u32` minimum |
//! | `RuleRef`, `MatchRule` | `u32` rule id |
//! | `External` | `u32` external index |
//!
//! Every other opcode has no operands.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Halt = 0x00,
    PushInt = 0x01,
    PushFloat = 0x02,
    PushBool = 0x03,
    PushUndefined = 0x04,
    PushBytes = 0x05,
    StrFound = 0x10,
    StrCount = 0x11,
    StrFoundAt = 0x12,
    StrFoundIn = 0x13,
    OfThem = 0x14,
    Filesize = 0x20,
    Entrypoint = 0x21,
    RuleRef = 0x22,
    External = 0x23,
    Not = 0x30,
    And = 0x31,
    Or = 0x32,
    Eq = 0x40,
    Neq = 0x41,
    Lt = 0x42,
    Le = 0x43,
    Gt = 0x44,
    Ge = 0x45,
    Contains = 0x46,
    MatchRule = 0x50,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Ok(match byte {
            0x00 => Opcode::Halt,
            0x01 => Opcode::PushInt,
            0x02 => Opcode::PushFloat,
            0x03 => Opcode::PushBool,
            0x04 => Opcode::PushUndefined,
            0x05 => Opcode::PushBytes,
            0x10 => Opcode::StrFound,
            0x11 => Opcode::StrCount,
            0x12 => Opcode::StrFoundAt,
            0x13 => Opcode::StrFoundIn,
            0x14 => Opcode::OfThem,
            0x20 => Opcode::Filesize,
            0x21 => Opcode::Entrypoint,
            0x22 => Opcode::RuleRef,
            0x23 => Opcode::External,
            0x30 => Opcode::Not,
            0x31 => Opcode::And,
            0x32 => Opcode::Or,
            0x40 => Opcode::Eq,
            0x41 => Opcode::Neq,
            0x42 => Opcode::Lt,
            0x43 => Opcode::Le,
            0x44 => Opcode::Gt,
            0x45 => Opcode::Ge,
            0x46 => Opcode::Contains,
            0x50 => Opcode::MatchRule,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Default)]
pub struct CodeEmitter {
    code: Vec<u8>,
}

impl CodeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.code.push(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.u32(value.len() as u32);
        self.code.extend_from_slice(value);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_round_trip() {
        for op in [Opcode::Halt, Opcode::OfThem, Opcode::Contains, Opcode::MatchRule] {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
        assert_eq!(Opcode::try_from(0xee), Err(0xee));
    }

    #[test]
    fn test_emitter_layout() {
        let mut emitter = CodeEmitter::new();
        emitter.op(Opcode::PushInt).i64(-2).op(Opcode::PushBytes).bytes(b"hi");
        let code = emitter.finish();
        assert_eq!(code[0], Opcode::PushInt as u8);
        assert_eq!(&code[1..9], &(-2i64).to_le_bytes());
        assert_eq!(code[9], Opcode::PushBytes as u8);
        assert_eq!(&code[10..14], &2u32.to_le_bytes());
        assert_eq!(&code[14..], b"hi");
    }
}
