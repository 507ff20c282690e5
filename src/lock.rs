//! Sentinel-file write lock.
//!
//! A container `data/run.nst` is guarded by a zero-byte sentinel
//! `data/run.lock`. Its existence is the whole protocol: no owner, no expiry,
//! no content. Acquisition fails fast with [`NestoreError::LockHeld`]; nothing
//! here waits or retries.
//!
//! The sentinel is created with `create_new`, so the existence check and the
//! creation are one filesystem operation and two racing writers cannot both
//! win. A sentinel left behind by a killed process has to be removed by hand.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{NestoreError, Result};

/// Extension of the sentinel file.
pub const LOCK_EXTENSION: &str = "lock";

/// Entry points for the sentinel lock.
#[derive(Debug)]
pub struct LockFile;

impl LockFile {
    /// Sentinel path for a container: the container path with its extension
    /// replaced by [`LOCK_EXTENSION`].
    pub fn sentinel_path(path: &Path) -> PathBuf {
        path.with_extension(LOCK_EXTENSION)
    }

    /// True if a sentinel currently exists for `path`.
    pub fn is_locked(path: &Path) -> bool {
        Self::sentinel_path(path).exists()
    }

    /// Creates the sentinel for `path` and returns a guard that removes it.
    ///
    /// # Errors
    /// * [`NestoreError::LockHeld`] if the sentinel already exists.
    /// * [`NestoreError::Io`] if it cannot be created (e.g. missing directory).
    pub fn acquire(path: &Path) -> Result<LockGuard> {
        let sentinel = Self::sentinel_path(path);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&sentinel)
        {
            Ok(_) => {
                debug!(sentinel = %sentinel.display(), "lock acquired");
                Ok(LockGuard {
                    sentinel,
                    released: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(sentinel = %sentinel.display(), "lock held by another writer");
                Err(NestoreError::LockHeld(sentinel))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Scoped ownership of a sentinel. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    sentinel: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Path of the sentinel this guard owns.
    pub fn sentinel(&self) -> &Path {
        &self.sentinel
    }

    /// Releases the lock now, reporting I/O failures other than a sentinel
    /// that has already disappeared.
    pub fn release(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match std::fs::remove_file(&self.sentinel) {
            Ok(()) => {
                debug!(sentinel = %self.sentinel.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(sentinel = %self.sentinel.display(), error = %e, "failed to remove lock sentinel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_replaces_extension() {
        assert_eq!(
            LockFile::sentinel_path(Path::new("data/run.nst")),
            PathBuf::from("data/run.lock")
        );
        assert_eq!(
            LockFile::sentinel_path(Path::new("data/run")),
            PathBuf::from("data/run.lock")
        );
        assert_eq!(
            LockFile::sentinel_path(Path::new("a.b.h5")),
            PathBuf::from("a.b.lock")
        );
    }

    #[test]
    fn second_acquire_fails_until_release() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.nst");

        let guard = LockFile::acquire(&path)?;
        assert!(LockFile::is_locked(&path));
        assert!(matches!(
            LockFile::acquire(&path),
            Err(NestoreError::LockHeld(_))
        ));

        guard.release()?;
        assert!(!LockFile::is_locked(&path));
        let _again = LockFile::acquire(&path)?;
        Ok(())
    }

    #[test]
    fn release_is_idempotent_when_sentinel_vanished() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.nst");
        let guard = LockFile::acquire(&path)?;
        std::fs::remove_file(guard.sentinel())?;
        guard.release()?;
        Ok(())
    }

    #[test]
    fn drop_releases() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.nst");
        {
            let _guard = LockFile::acquire(&path)?;
        }
        assert!(!LockFile::is_locked(&path));
        Ok(())
    }

    #[test]
    fn missing_directory_is_io_error() {
        let path = Path::new("/definitely/not/here/c.nst");
        assert!(matches!(
            LockFile::acquire(path),
            Err(NestoreError::Io(_))
        ));
    }
}
