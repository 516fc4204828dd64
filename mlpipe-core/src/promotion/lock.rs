//! Exclusive lock file held while a model is being promoted.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::PipelineError;

/// Held for the duration of a promotion; the lock file is removed on drop.
///
/// A process killed mid-promotion leaves the file behind. It must then be
/// removed by hand before the next promotion.
#[derive(Debug)]
pub struct PromotionLock {
    path: PathBuf,
}

impl PromotionLock {
    /// Take the lock, failing with `PromotionLocked` if another run holds it.
    pub fn acquire(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::PromotionLocked {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(PipelineError::io(path, e)),
        };
        writeln!(file, "pid={} acquired_at={}", std::process::id(), Utc::now().to_rfc3339())
            .map_err(|e| PipelineError::io(path, e))?;
        tracing::debug!(path = %path.display(), "Promotion lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PromotionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release promotion lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".promotion.lock");

        let lock = PromotionLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            PromotionLock::acquire(&path).unwrap_err(),
            PipelineError::PromotionLocked { .. }
        ));

        drop(lock);
        assert!(!path.exists());
        PromotionLock::acquire(&path).unwrap();
    }
}
