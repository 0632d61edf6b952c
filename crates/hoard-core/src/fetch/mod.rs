//! Fetch unit: one item, all-or-nothing.
//!
//! Create the destination, stream the body into it, validate the size, and
//! either keep the file (`Done`) or delete it (`Failed`). The file handle and
//! the curl handle are dropped on every path; only a clean success leaves a
//! file on disk.

mod error;
mod transport;

pub use error::{FailureKind, FetchError, TransferError};
pub use transport::{CurlTransport, Transport};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::ledger::WorkItem;

const WRITE_BUF: usize = 64 * 1024;

/// Runs single-item transfers with a shared transport. Cheap to clone into
/// blocking tasks.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Download `item` to `dest`. Returns the number of bytes kept on success.
    /// Blocking: call from `spawn_blocking`.
    pub fn fetch(&self, item: &WorkItem, dest: &Path) -> Result<u64, FetchError> {
        self.fetch_signalled(item, dest, || {})
    }

    /// Like [`Fetcher::fetch`], calling `on_transfer_start` right before the GET
    /// is issued. Not called when the destination cannot be created.
    pub fn fetch_signalled(
        &self,
        item: &WorkItem,
        dest: &Path,
        on_transfer_start: impl FnOnce(),
    ) -> Result<u64, FetchError> {
        if let Some(dir) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| FetchError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = match File::create(dest) {
            Ok(f) => f,
            Err(source) => {
                remove_partial(dest);
                return Err(FetchError::CreateFile {
                    path: dest.to_path_buf(),
                    source,
                });
            }
        };

        match self.stream_into(item, file, dest, on_transfer_start) {
            Ok(received) if received < item.expected_min_bytes => {
                remove_partial(dest);
                Err(FetchError::TooSmall {
                    received,
                    expected: item.expected_min_bytes,
                })
            }
            Ok(received) => Ok(received),
            Err(e) => {
                remove_partial(dest);
                Err(e)
            }
        }
    }

    /// Streams the body into `file` and syncs it. Consumes (and so closes) the file.
    fn stream_into(
        &self,
        item: &WorkItem,
        file: File,
        dest: &Path,
        on_transfer_start: impl FnOnce(),
    ) -> Result<u64, FetchError> {
        let mut out = BufWriter::with_capacity(WRITE_BUF, file);
        on_transfer_start();
        let received = self.transport.get(&item.remote_location, &mut out)?;
        out.flush().map_err(TransferError::Write)?;
        let file = out
            .into_inner()
            .map_err(|e| TransferError::Write(e.into_error()))?;
        file.sync_all().map_err(|source| FetchError::Sync {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(received)
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove partial file: {}", e),
    }
}
