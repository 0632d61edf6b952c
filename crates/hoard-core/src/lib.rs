//! Resumable, bounded-concurrency media archiving.
//!
//! A persistent [`ledger`] records every item of a remote library in catalog
//! order. Each run [`reconcile`]s it against the files on disk, then
//! [`dispatch`]es the remaining items to the [`fetch`] unit with at most K
//! transfers in flight, checkpointing the ledger as it goes.

pub mod archive;
pub mod auth;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod ledger;
pub mod logging;
pub mod progress;
pub mod reconcile;

pub use error::ArchiveError;
