// Mon Feb 09 2026 - Alex

pub mod automaton;
pub mod builder;
pub mod driver;

pub use automaton::{AcMatch, Automaton, ROOT_STATE};
pub use builder::AutomatonBuilder;
pub use driver::{scan_mem_block, DEADLINE_STRIDE};
