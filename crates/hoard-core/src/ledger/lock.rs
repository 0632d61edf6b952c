//! Exclusive advisory lock held for the whole run.
//!
//! Reconciliation treats every `InProgress` item as stale, which is only
//! sound when no other process is working on the same ledger. The lock is a
//! `flock` on `<ledger>.lock`; the OS releases it if the process dies, so a
//! crashed run never blocks the next one.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::snapshot::lock_path_for;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another hoard run holds {}", .0.display())]
    Busy(PathBuf),
    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Held while a run owns the ledger. Unlocks on drop.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Try to lock the ledger at `ledger_path` without blocking.
    pub fn acquire(ledger_path: &Path) -> Result<Self, LockError> {
        let path = lock_path_for(ledger_path);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "ledger lock acquired");
                Ok(Self {
                    file,
                    path: path.clone(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::Busy(path.clone())),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(LockError::Busy(path.clone()))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
