// Mon Feb 09 2026 - Alex

use crate::error::Error;
use crate::rules::Rules;
use crate::scan::{ScanFlags, MAX_THREADS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Zero disables the deadline.
    pub timeout_seconds: u64,
    pub fast_mode: bool,
    pub max_threads: usize,
    pub print_tags: bool,
    pub print_strings: bool,
    /// Report rules that did not match instead of those that did.
    pub negate: bool,
    pub show_progress: bool,
    /// Collect per-rule timings and print them after the scan.
    pub profile: bool,
    /// Values are parsed according to the type of the compiled external.
    pub externals: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            fast_mode: false,
            max_threads: num_cpus::get().min(MAX_THREADS),
            print_tags: false,
            print_strings: false,
            negate: false,
            show_progress: true,
            profile: false,
            externals: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_fast_mode(mut self, enabled: bool) -> Self {
        self.fast_mode = enabled;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    pub fn with_external(mut self, name: &str, value: &str) -> Self {
        self.externals.insert(name.to_string(), value.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".to_string());
        }
        if self.max_threads > MAX_THREADS {
            return Err(format!("max_threads cannot exceed {}", MAX_THREADS));
        }
        if let Some(name) = self.externals.keys().find(|k| k.is_empty()) {
            return Err(format!("invalid external name '{}'", name));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn scan_flags(&self) -> ScanFlags {
        let mut flags = ScanFlags::empty();
        flags.set(ScanFlags::FAST_MODE, self.fast_mode);
        flags.set(ScanFlags::PROFILE, self.profile);
        flags
    }

    /// Overrides the compiled defaults of every external named here.
    pub fn apply_externals(&self, rules: &mut Rules) -> Result<(), Error> {
        for (name, value) in &self.externals {
            rules.define_variable_from_str(name, value)?;
        }
        Ok(())
    }
}
