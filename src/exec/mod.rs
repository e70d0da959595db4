// Mon Feb 09 2026 - Alex

pub mod object;
pub mod opcode;
pub mod vm;

pub use object::Object;
pub use opcode::{CodeEmitter, Opcode};
pub use vm::{execute_code, Value};
