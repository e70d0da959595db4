// Mon Feb 09 2026 - Alex

use crate::memory::{MemoryError, MemoryRegion, OwnedBlock};

#[cfg(target_os = "linux")]
use std::fs::File;
#[cfg(target_os = "linux")]
use std::os::unix::fs::FileExt;

/// Pseudo-regions the kernel exposes in maps but refuses to read through
/// `/proc/<pid>/mem`.
const SKIPPED_REGIONS: &[&str] = &["[vvar]", "[vsyscall]", "[vvar_vclock]"];

#[cfg(target_os = "linux")]
pub struct ProcessMemory {
    pid: u32,
    mem: File,
}

#[cfg(target_os = "linux")]
impl ProcessMemory {
    pub fn attach(pid: u32) -> Result<Self, MemoryError> {
        let alive = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if alive != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Err(MemoryError::ProcessNotFound(pid));
            }
            // EPERM still means the process exists; /proc may grant access anyway.
        }

        let mem = File::open(format!("/proc/{}/mem", pid)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MemoryError::ProcessNotFound(pid),
            std::io::ErrorKind::PermissionDenied => MemoryError::PermissionDenied(pid),
            _ => MemoryError::Io(e),
        })?;

        Ok(Self { pid, mem })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn enumerate_regions(&self) -> Result<Vec<MemoryRegion>, MemoryError> {
        let maps = std::fs::read_to_string(format!("/proc/{}/maps", self.pid))?;
        maps.lines()
            .filter(|line| !line.trim().is_empty())
            .map(MemoryRegion::parse_maps_line)
            .collect()
    }

    pub fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| MemoryError::ReadFailed(address))?;
        buffer.resize(size, 0);
        self.mem
            .read_exact_at(&mut buffer, address)
            .map_err(|_| MemoryError::ReadFailed(address))?;
        Ok(buffer)
    }

    /// Copies every readable region into an owned block. Regions that vanish
    /// or fault between enumeration and read are skipped.
    pub fn read_blocks(&self) -> Result<Vec<OwnedBlock>, MemoryError> {
        let mut blocks = Vec::new();

        for region in self.enumerate_regions()? {
            if !region.is_readable() || region.size() == 0 {
                continue;
            }
            if region.path().map_or(false, |p| SKIPPED_REGIONS.contains(&p)) {
                continue;
            }

            match self.read_memory(region.start(), region.size() as usize) {
                Ok(data) => blocks.push(OwnedBlock::new(data, region.start())),
                Err(e) => log::debug!("skipping region {}: {}", region, e),
            }
        }

        log::debug!("read {} blocks from process {}", blocks.len(), self.pid);
        Ok(blocks)
    }
}

#[cfg(not(target_os = "linux"))]
pub struct ProcessMemory {
    pid: u32,
}

#[cfg(not(target_os = "linux"))]
impl ProcessMemory {
    pub fn attach(pid: u32) -> Result<Self, MemoryError> {
        let _ = SKIPPED_REGIONS;
        Err(MemoryError::NotSupported(format!(
            "process memory scanning is not available on this platform (pid {})",
            pid
        )))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn enumerate_regions(&self) -> Result<Vec<MemoryRegion>, MemoryError> {
        Err(MemoryError::NotSupported("enumerate_regions".to_string()))
    }

    pub fn read_memory(&self, address: u64, _size: usize) -> Result<Vec<u8>, MemoryError> {
        Err(MemoryError::ReadFailed(address))
    }

    pub fn read_blocks(&self) -> Result<Vec<OwnedBlock>, MemoryError> {
        Err(MemoryError::NotSupported("read_blocks".to_string()))
    }
}
