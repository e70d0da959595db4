// Mon Feb 09 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Process not found: {0}")]
    ProcessNotFound(u32),
    #[error("Permission denied for process {0}")]
    PermissionDenied(u32),
    #[error("Read failed at address 0x{0:x}")]
    ReadFailed(u64),
    #[error("Malformed memory map line: {0}")]
    InvalidMapsLine(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}
