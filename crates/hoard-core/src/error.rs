//! Run-level errors. Per-item failures live in [`crate::fetch::FetchError`]
//! and never reach this type unless they are authentication failures.

use std::path::PathBuf;

use crate::fetch::FetchError;
use crate::ledger::{LockError, TransitionError};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Credentials were rejected or could not be produced. The run stopped
    /// after draining in-flight transfers and checkpointing.
    #[error(
        "authentication failed while fetching {key}: {source}\n\
         Re-authorize (refresh the token in the config file or set HOARD_TOKEN) and run again; \
         completed items are kept."
    )]
    Authentication {
        key: String,
        #[source]
        source: FetchError,
    },
    /// Another run holds the ledger.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// No snapshot exists and no catalog was supplied to seed one.
    #[error("no ledger at {} and no catalog given to create one", .0.display())]
    NoLedger(PathBuf),
    /// Catalog could not be read or is inconsistent.
    #[error("catalog: {0:#}")]
    Catalog(anyhow::Error),
    /// Snapshot could not be read, or the initial snapshot could not be written.
    #[error("ledger: {0:#}")]
    Ledger(anyhow::Error),
    /// Ledger refused a status transition; indicates a dispatcher bug.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// A fetch task panicked or was cancelled.
    #[error("fetch task join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ArchiveError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ArchiveError::Authentication { .. })
    }
}
