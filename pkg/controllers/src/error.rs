use thiserror::Error;

/// How the work queue treats a failed sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry with per-key exponential backoff.
    Transient,
    /// Retrying cannot help; drop the key until the next event for it.
    Permanent,
}

/// Failure of a single DaemonSet sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Some create/delete calls failed; the rest ran to completion.
    #[error("{failed} of {total} pod operations failed: {}", .errors.join("; "))]
    Convergence {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },

    #[error("failed to update DaemonSet status: {0}")]
    StatusUpdate(#[source] anyhow::Error),

    #[error("invalid DaemonSet key {0:?}")]
    InvalidKey(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Convergence { .. } | SyncError::StatusUpdate(_) => ErrorKind::Transient,
            SyncError::InvalidKey(_) => ErrorKind::Permanent,
        }
    }
}
