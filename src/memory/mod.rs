// Mon Feb 09 2026 - Alex

pub mod block;
pub mod error;
pub mod mmap;
pub mod process;
pub mod region;

pub use block::{MemoryBlock, OwnedBlock};
pub use error::MemoryError;
pub use mmap::MappedFile;
pub use process::ProcessMemory;
pub use region::{MemoryRegion, Protection};
