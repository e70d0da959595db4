// Mon Feb 09 2026 - Alex

use crate::error::Error;
use parking_lot::Mutex;

/// Maximum number of scans that may run concurrently on one rule set.
pub const MAX_THREADS: usize = 32;

/// Bitmask of scan slots in use. Bit `t` is set while slot `t` is held.
#[derive(Debug, Default)]
pub struct ScanSlots {
    mask: Mutex<u32>,
}

impl ScanSlots {
    pub fn new() -> Self {
        Self {
            mask: Mutex::new(0),
        }
    }

    /// Reserves the lowest free slot.
    pub fn acquire(&self) -> Result<SlotGuard<'_>, Error> {
        let mut mask = self.mask.lock();
        let index = mask.trailing_ones() as usize;
        if index >= MAX_THREADS {
            return Err(Error::TooManyScanThreads);
        }
        *mask |= 1 << index;
        Ok(SlotGuard { slots: self, index })
    }

    fn release(&self, index: usize) {
        let mut mask = self.mask.lock();
        *mask &= !(1u32 << index);
    }

    pub fn mask(&self) -> u32 {
        *self.mask.lock()
    }

    pub fn in_use(&self) -> usize {
        self.mask().count_ones() as usize
    }
}

/// Holds a slot for the duration of one scan and frees it on drop, whatever
/// path the scan leaves through.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slots: &'a ScanSlots,
    index: usize,
}

impl SlotGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slots.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_slot() {
        let slots = ScanSlots::new();
        let a = slots.acquire().unwrap();
        let b = slots.acquire().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(slots.mask(), 0b11);

        drop(a);
        assert_eq!(slots.mask(), 0b10);
        let c = slots.acquire().unwrap();
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let slots = ScanSlots::new();
        let guards: Vec<_> = (0..MAX_THREADS).map(|_| slots.acquire().unwrap()).collect();
        assert_eq!(slots.mask(), u32::MAX);
        assert!(matches!(slots.acquire(), Err(Error::TooManyScanThreads)));

        drop(guards);
        assert_eq!(slots.mask(), 0);
        assert_eq!(slots.in_use(), 0);
    }
}
