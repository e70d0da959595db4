// Mon Feb 09 2026 - Alex

/// A contiguous chunk of scanned data. `base` is the position of the first
/// byte in the logical address space being scanned.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBlock<'a> {
    pub data: &'a [u8],
    pub base: u64,
}

impl<'a> MemoryBlock<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, base }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }
}

/// Block whose bytes were copied out of another address space.
#[derive(Debug, Clone)]
pub struct OwnedBlock {
    pub data: Vec<u8>,
    pub base: u64,
}

impl OwnedBlock {
    pub fn new(data: Vec<u8>, base: u64) -> Self {
        Self { data, base }
    }

    pub fn as_block(&self) -> MemoryBlock<'_> {
        MemoryBlock::new(&self.data, self.base)
    }
}
