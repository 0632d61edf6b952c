//! Per-item error types.

use std::path::PathBuf;

use crate::auth::CredentialsError;

/// Failure of the authenticated GET itself.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Server rejected the credentials (HTTP 401).
    #[error("HTTP {0}: credentials rejected")]
    Unauthorized(u32),
    /// Credentials could not be produced for the request.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    /// Non-2xx response other than 401.
    #[error("HTTP {0}")]
    Http(u32),
    /// Curl reported an error (timeout, connection, TLS, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Writing the body to the destination failed.
    #[error("write body: {0}")]
    Write(#[source] std::io::Error),
}

impl TransferError {
    /// True when the run must stop: the credentials, not this item, are bad.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            TransferError::Unauthorized(_) | TransferError::Credentials(_)
        )
    }
}

/// Why one item did not end up `Done`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sync file {path}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// The transfer "succeeded" but the body is implausibly small
    /// (truncated download or an error page served with 200).
    #[error("body too small: {received} bytes, expected at least {expected}")]
    TooSmall { received: u64, expected: u64 },
}

/// Coarse classification used for logging and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    Transfer,
    Validation,
    Storage,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::CreateDir { .. } | FetchError::CreateFile { .. } | FetchError::Sync { .. } => {
                FailureKind::Storage
            }
            FetchError::Transfer(TransferError::Write(_)) => FailureKind::Storage,
            FetchError::Transfer(t) if t.is_authentication() => FailureKind::Authentication,
            FetchError::Transfer(_) => FailureKind::Transfer,
            FetchError::TooSmall { .. } => FailureKind::Validation,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind() == FailureKind::Authentication
    }
}
