// Mon Feb 09 2026 - Alex

use crate::memory::MemoryError;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

impl Protection {
    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Self::WRITE)
    }

    pub fn can_execute(self) -> bool {
        self.contains(Self::EXECUTE)
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.can_read() { 'r' } else { '-' };
        let w = if self.can_write() { 'w' } else { '-' };
        let x = if self.can_execute() { 'x' } else { '-' };
        write!(f, "{}{}{}", r, w, x)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRegion {
    start: u64,
    end: u64,
    protection: Protection,
    offset: u64,
    path: Option<String>,
}

impl MemoryRegion {
    pub fn new(start: u64, end: u64, protection: Protection) -> Self {
        Self {
            start,
            end,
            protection,
            offset: 0,
            path: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    /// Parses one line of `/proc/<pid>/maps`:
    /// `start-end perms offset dev inode [path]`.
    pub fn parse_maps_line(line: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidMapsLine(line.to_string());
        let mut fields = line.split_whitespace();

        let range = fields.next().ok_or_else(invalid)?;
        let perms = fields.next().ok_or_else(invalid)?;
        let offset = fields.next().ok_or_else(invalid)?;
        let _dev = fields.next().ok_or_else(invalid)?;
        let _inode = fields.next().ok_or_else(invalid)?;
        let path = fields.collect::<Vec<_>>().join(" ");

        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| invalid())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| invalid())?;
        let offset = u64::from_str_radix(offset, 16).map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }

        let mut protection = Protection::empty();
        for (c, flag) in perms.chars().zip([Protection::READ, Protection::WRITE, Protection::EXECUTE]) {
            if c != '-' {
                protection |= flag;
            }
        }

        let region = Self::new(start, end, protection).with_offset(offset);
        Ok(if path.is_empty() { region } else { region.with_path(path) })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn is_readable(&self) -> bool {
        self.protection.can_read()
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x} {}", self.start, self.end, self.protection)?;
        if let Some(path) = &self.path {
            write!(f, " {}", path)?;
        }
        Ok(())
    }
}
