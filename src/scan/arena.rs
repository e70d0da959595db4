// Mon Feb 09 2026 - Alex

//! Append-only storage for per-scan records.
//!
//! Items live in chunks that are never reallocated, so an [`ArenaIndex`]
//! stays valid until the arena is cleared or dropped. Each new chunk doubles
//! the previous capacity. Allocation failures surface as
//! [`Error::InsufficientMemory`] instead of aborting the process.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaIndex(u32);

impl ArenaIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Arena<T> {
    chunks: Vec<Vec<T>>,
    initial_capacity: usize,
    len: usize,
}

impl<T> Arena<T> {
    pub fn with_capacity(initial_capacity: usize) -> Result<Self, Error> {
        let initial_capacity = initial_capacity.max(1);
        let first = Self::alloc_chunk(initial_capacity)?;
        Ok(Self {
            chunks: vec![first],
            initial_capacity,
            len: 0,
        })
    }

    fn alloc_chunk(capacity: usize) -> Result<Vec<T>, Error> {
        let mut chunk = Vec::new();
        chunk
            .try_reserve_exact(capacity)
            .map_err(|_| Error::InsufficientMemory)?;
        Ok(chunk)
    }

    pub fn push(&mut self, value: T) -> Result<ArenaIndex, Error> {
        if self.len >= u32::MAX as usize {
            return Err(Error::InsufficientMemory);
        }

        let full = match self.chunks.last() {
            Some(chunk) => chunk.len() == chunk.capacity(),
            None => true,
        };
        if full {
            let capacity = self
                .chunks
                .last()
                .map_or(self.initial_capacity, |c| c.capacity().saturating_mul(2));
            self.chunks.push(Self::alloc_chunk(capacity)?);
        }

        let index = ArenaIndex(self.len as u32);
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.push(value);
        }
        self.len += 1;
        Ok(index)
    }

    fn locate(&self, index: ArenaIndex) -> Option<(usize, usize)> {
        let mut offset = index.as_usize();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if offset < chunk.len() {
                return Some((i, offset));
            }
            offset -= chunk.len();
        }
        None
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        let (chunk, offset) = self.locate(index)?;
        self.chunks[chunk].get(offset)
    }

    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        let (chunk, offset) = self.locate(index)?;
        self.chunks[chunk].get_mut(offset)
    }

    /// Walks every item from the base of the arena in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every item but keeps the first chunk for reuse.
    pub fn clear(&mut self) {
        self.chunks.truncate(1);
        if let Some(first) = self.chunks.first_mut() {
            first.clear();
        }
        self.len = 0;
    }
}
