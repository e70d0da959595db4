// Mon Feb 09 2026 - Alex

use crate::error::Error;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Read-only view of a file's contents. Empty files are not mapped at all
/// since the kernel refuses zero-length mappings.
pub struct MappedFile {
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref()).map_err(Error::CouldNotOpenFile)?;
        Self::from_file(&file)
    }

    #[cfg(unix)]
    pub fn from_fd<F: std::os::fd::AsFd>(fd: &F) -> Result<Self, Error> {
        let owned = fd
            .as_fd()
            .try_clone_to_owned()
            .map_err(Error::CouldNotOpenFile)?;
        let file = File::from(owned);
        Self::from_file(&file)
    }

    pub fn from_file(file: &File) -> Result<Self, Error> {
        let len = file
            .metadata()
            .map_err(|e| {
                log::debug!("fstat failed before mapping: {}", e);
                Error::CouldNotMapFile
            })?
            .len();
        if len == 0 {
            return Ok(Self { mmap: None });
        }

        let mmap = unsafe { Mmap::map(file) }.map_err(|e| {
            log::debug!("mmap failed: {}", e);
            Error::CouldNotMapFile
        })?;
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn size(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => mmap.as_ref(),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rulescan-mmap-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_map_file_contents() {
        let path = temp_path("contents");
        File::create(&path).unwrap().write_all(b"mapped bytes").unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert_eq!(mapped.as_slice(), b"mapped bytes");
        assert_eq!(mapped.size(), 12);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_map_empty_file() {
        let path = temp_path("empty");
        File::create(&path).unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert!(mapped.as_slice().is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_missing_file() {
        let result = MappedFile::open(temp_path("does-not-exist"));
        assert!(matches!(result, Err(Error::CouldNotOpenFile(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_map_from_descriptor() {
        let path = temp_path("fd");
        File::create(&path).unwrap().write_all(b"via fd").unwrap();

        let file = File::open(&path).unwrap();
        let mapped = MappedFile::from_fd(&file).unwrap();
        assert_eq!(mapped.as_slice(), b"via fd");

        std::fs::remove_file(&path).ok();
    }
}
