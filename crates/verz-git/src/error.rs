//! Clone pipeline error types.

use thiserror::Error;

/// Errors that can occur while cloning.
///
/// None of these are retried; each one ends the clone.
#[derive(Debug, Error)]
pub enum GitError {
    /// Transport failure: connection, TLS, non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed pkt-line framing or unexpected protocol input.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed packfile or delta stream.
    #[error("invalid pack file: {0}")]
    Format(String),

    /// The remote sent a fatal error on side-band channel 3.
    #[error("remote error: {0}")]
    Remote(String),

    /// No usable default branch, or the clone target is already a repository.
    #[error("repository error: {0}")]
    Repository(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] verz_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
