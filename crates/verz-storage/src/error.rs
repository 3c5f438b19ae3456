//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The object bytes are not a well-formed git object.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A stored object does not hash to its own name.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// The requested reference does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A reference name or file is malformed.
    #[error("invalid ref: {0}")]
    InvalidRef(String),
}
