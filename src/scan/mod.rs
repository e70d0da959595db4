// Mon Feb 09 2026 - Alex

pub mod arena;
pub mod context;
pub mod exception;
pub mod slots;
pub mod verify;

pub use arena::{Arena, ArenaIndex};
pub use context::{Match, MatchList, ScanContext};
pub use slots::{ScanSlots, SlotGuard, MAX_THREADS};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ScanFlags: u32 {
        /// Blocks come from a live process; entry point detection works on
        /// loaded images instead of file offsets.
        const PROCESS_MEMORY = 0x1;
        /// Stop recording matches for a string after its first one.
        const FAST_MODE = 0x2;
        /// Time string verification and condition evaluation per rule.
        const PROFILE = 0x4;
    }
}
