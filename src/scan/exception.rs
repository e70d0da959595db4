// Mon Feb 09 2026 - Alex

use crate::error::Error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Runs `f` inside a fault frame. A panic raised while touching block memory
/// is caught here and reported as [`Error::CouldNotMapFile`]; execution
/// resumes in the caller. Frames nest.
pub fn protect<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        log::warn!("fault inside protected region: {}", describe(payload.as_ref()));
        Error::CouldNotMapFile
    })
}

fn describe(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown fault"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_value_through() {
        assert_eq!(protect(|| 41 + 1).unwrap(), 42);
    }

    #[test]
    fn test_fault_becomes_map_error() {
        let data: Vec<u8> = Vec::new();
        let result = protect(|| data[10]);
        assert!(matches!(result, Err(Error::CouldNotMapFile)));
    }

    #[test]
    fn test_nested_frames() {
        let outer = protect(|| {
            let inner = protect(|| -> u8 { panic!("inner fault") });
            assert!(inner.is_err());
            7
        });
        assert_eq!(outer.unwrap(), 7);
    }
}
