//! Types stored in the ledger snapshot.

use serde::{Deserialize, Serialize};

/// Per-item status. Serialized as a lowercase string in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }

    /// True for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        match self {
            ItemStatus::Done | ItemStatus::Failed => true,
            ItemStatus::Pending | ItemStatus::InProgress => false,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable unique identifier; also the local filename stem.
    pub key: String,
    /// File extension, e.g. `jpg` or `mp4`.
    pub format: String,
    /// Resolved URI of the binary payload.
    pub remote_location: String,
    /// Bodies shorter than this are treated as truncated or error pages.
    pub expected_min_bytes: u64,
    #[serde(default)]
    pub status: ItemStatus,
    /// Fetch attempts made so far, across runs.
    #[serde(default)]
    pub attempts: u32,
}

impl WorkItem {
    pub fn new(
        key: impl Into<String>,
        format: impl Into<String>,
        remote_location: impl Into<String>,
        expected_min_bytes: u64,
    ) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            remote_location: remote_location.into(),
            expected_min_bytes,
            status: ItemStatus::Pending,
            attempts: 0,
        }
    }
}

/// Per-status counts, used by `hoard status` and the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.failed
    }
}
