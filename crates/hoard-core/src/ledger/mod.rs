//! Persistent, ordered status ledger.
//!
//! The ledger holds every work item in catalog order. Order never changes
//! across runs because shard placement is derived from an item's index.
//! During a run the ledger is shared by all fetch tasks behind one
//! `tokio::sync::Mutex` ([`SharedLedger`]); status transitions go through
//! [`Ledger::begin`] and [`Ledger::finish`], which only allow
//! `Pending -> InProgress -> {Done | Failed}`.

mod lock;
mod snapshot;
mod types;

pub use lock::{LedgerLock, LockError};
pub use snapshot::{lock_path_for, remove_snapshot, temp_path_for};
pub(crate) use snapshot::write_atomic;
pub use types::{ItemStatus, StatusCounts, WorkItem};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::CatalogListing;

/// Snapshot format version written to disk.
pub const LEDGER_VERSION: u32 = 1;

/// Ledger shared between the dispatcher, fetch tasks and the checkpointer.
pub type SharedLedger = Arc<tokio::sync::Mutex<Ledger>>;

/// Rejected status transition.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("no ledger item at index {0}")]
    OutOfRange(usize),
    #[error("item {key}: cannot move from {from} to {to}")]
    Invalid {
        key: String,
        from: ItemStatus,
        to: ItemStatus,
    },
}

/// Ordered collection of work items with their persisted status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    version: u32,
    items: Vec<WorkItem>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            items: Vec::new(),
        }
    }
}

impl Ledger {
    pub fn from_items(items: Vec<WorkItem>) -> Self {
        Self {
            version: LEDGER_VERSION,
            items,
        }
    }

    /// Build a fresh ledger from a catalog listing: every item `Pending`, no attempts.
    /// Entries without a size hint get `default_min_bytes`.
    pub fn seed(listing: &CatalogListing, default_min_bytes: u64) -> Self {
        let items = listing
            .entries
            .iter()
            .map(|e| {
                WorkItem::new(
                    e.key.clone(),
                    e.format.clone(),
                    e.url.clone(),
                    e.min_bytes.unwrap_or(default_min_bytes),
                )
            })
            .collect();
        Self::from_items(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.items.get(index)
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::InProgress => counts.in_progress += 1,
                ItemStatus::Done => counts.done += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Number of items currently marked `InProgress`.
    pub fn in_progress(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::InProgress)
            .count()
    }

    /// Move an item from `Pending` to `InProgress` and count the attempt.
    /// Returns a copy of the item for the fetch task.
    pub fn begin(&mut self, index: usize) -> Result<WorkItem, TransitionError> {
        let item = self
            .items
            .get_mut(index)
            .ok_or(TransitionError::OutOfRange(index))?;
        match item.status {
            ItemStatus::Pending => {
                item.status = ItemStatus::InProgress;
                item.attempts = item.attempts.saturating_add(1);
                Ok(item.clone())
            }
            from @ (ItemStatus::InProgress | ItemStatus::Done | ItemStatus::Failed) => {
                Err(TransitionError::Invalid {
                    key: item.key.clone(),
                    from,
                    to: ItemStatus::InProgress,
                })
            }
        }
    }

    /// Record the terminal status of an `InProgress` item.
    pub fn finish(&mut self, index: usize, outcome: ItemStatus) -> Result<(), TransitionError> {
        let item = self
            .items
            .get_mut(index)
            .ok_or(TransitionError::OutOfRange(index))?;
        match (item.status, outcome) {
            (ItemStatus::InProgress, ItemStatus::Done | ItemStatus::Failed) => {
                item.status = outcome;
                Ok(())
            }
            (from, to) => Err(TransitionError::Invalid {
                key: item.key.clone(),
                from,
                to,
            }),
        }
    }

    /// Return an item to `Pending`. Used by reconciliation (stale `InProgress`,
    /// missing files, retry of `Failed`) and when a run aborts mid-transfer.
    /// The attempt counter is kept.
    pub fn reset_to_pending(&mut self, index: usize) -> Result<(), TransitionError> {
        let item = self
            .items
            .get_mut(index)
            .ok_or(TransitionError::OutOfRange(index))?;
        item.status = ItemStatus::Pending;
        Ok(())
    }

    /// Serialize to pretty JSON (the snapshot format).
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
