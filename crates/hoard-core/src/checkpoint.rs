//! Periodic ledger snapshots.
//!
//! The ledger is serialized while its lock is held, so a snapshot never mixes
//! half-applied transitions; the file write happens after the lock is released.
//! A failed write is logged and remembered, never fatal: the next successful
//! flush makes the run durable again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};

use crate::ledger::{write_atomic, SharedLedger};

pub struct Checkpointer {
    path: PathBuf,
    ledger: SharedLedger,
    flushes: AtomicU64,
    failures: AtomicU64,
    durable: AtomicBool,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, ledger: SharedLedger) -> Self {
        Self {
            path: path.into(),
            ledger,
            flushes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            durable: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot. Returns whether it reached disk; failures are logged.
    pub async fn flush(&self) -> bool {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        match self.try_flush().await {
            Ok(()) => {
                self.durable.store(true, Ordering::SeqCst);
                tracing::debug!(path = %self.path.display(), "checkpoint written");
                true
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.durable.store(false, Ordering::SeqCst);
                tracing::warn!(
                    path = %self.path.display(),
                    "checkpoint failed, progress since the last snapshot is not durable: {:#}",
                    e
                );
                false
            }
        }
    }

    async fn try_flush(&self) -> Result<()> {
        let bytes = {
            let ledger = self.ledger.lock().await;
            ledger.to_json().context("serialize ledger")?
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .context("checkpoint task join")?
    }

    /// Flushes attempted so far (successful or not).
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// False while the most recent flush failed.
    pub fn is_durable(&self) -> bool {
        self.durable.load(Ordering::SeqCst)
    }
}
