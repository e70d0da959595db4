// Mon Feb 09 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Insufficient memory")]
    InsufficientMemory,
    #[error("Too many concurrent scans on the same rule set")]
    TooManyScanThreads,
    #[error("Scan timed out")]
    ScanTimeout,
    #[error("Could not map file or memory block")]
    CouldNotMapFile,
    #[error("Callback returned an error")]
    CallbackError,
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[source] std::io::Error),
    #[error("Could not attach to process {0}")]
    CouldNotAttachToProcess(u32),
    #[error("Corrupt compiled rules: {0}")]
    CorruptRules(String),
    #[error("Unsupported compiled rules file version")]
    UnsupportedFileVersion,
}

impl Error {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptRules(msg.into())
    }
}
