//! Error types for the commit protocol

use thiserror::Error;

/// Result type for commit protocol operations
pub type Result<T> = std::result::Result<T, CommitError>;

/// Errors raised by the commit coordinator
#[derive(Error, Debug)]
pub enum CommitError {
    /// Another client's artifact was observed at a checkpoint, or the
    /// adjudicator fenced the attempt. The only recoverable kind: callers
    /// retry the whole `commit` call, which re-resolves the target version.
    #[error("Concurrent commit detected; retry from a fresh version resolution")]
    ConcurrentCommit,

    /// A filename in the catalog tree does not parse as the protocol
    /// requires (integer stem, or `@`-suffixed tombstone). Fatal; the
    /// coordinator does not attempt to repair the layout.
    #[error("Corrupt catalog layout: {0}")]
    Corrupt(String),

    /// Storage failure, propagated unchanged from the driver.
    #[error(transparent)]
    Storage(#[from] tidelock_core::Error),
}

impl CommitError {
    /// Create a corrupt-layout error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        CommitError::Corrupt(msg.into())
    }

    /// Whether the caller may retry the commit after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::ConcurrentCommit)
    }
}
