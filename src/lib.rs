// Mon Feb 09 2026 - Alex

pub mod ahocorasick;
pub mod compiler;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod exec;
pub mod memory;
pub mod rules;
pub mod scan;
pub mod utils;

pub use compiler::{CompileError, Expr, RuleBuilder, RuleDef, RulesCompiler};
pub use config::Config;
pub use error::Error;
pub use memory::MemoryBlock;
pub use rules::{
    CallbackMessage, CallbackResult, ExternalValue, ExternalVariable, Namespace, Rule, RuleFlags,
    RuleProfile, RuleResult, Rules, StringDef, StringModifiers,
};
pub use scan::{Match, ScanFlags, MAX_THREADS};
