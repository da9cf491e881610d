//! Storage error types.
//!
//! Defines errors that can occur during storage operations:
//! - `NotFound`: Requested document doesn't exist
//! - `DuplicateId`: Insert collided with an existing document
//! - `Conflict`: Compare-and-set lost (status changed underneath)
//! - `Transition`: The state machine rejected a mutation
//! - `Serialization`: Failed to encode/decode a record
//! - `InvalidKey`: Blob key is not a safe file name
//! - `Io`: Underlying storage system errors

use oneshare_core::{DocumentStatus, TransitionError};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Document not found
    #[error("document not found: {0}")]
    NotFound(String),

    /// Document id already taken
    #[error("document already exists: {0}")]
    DuplicateId(String),

    /// Status did not match the expected value at update time.
    ///
    /// Another caller won the compare-and-set. `actual` is the status that
    /// caller left behind.
    #[error("status conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Document that was being updated
        id: String,
        /// Status the caller expected
        expected: DocumentStatus,
        /// Status actually stored
        actual: DocumentStatus,
    },

    /// Mutation rejected by the document state machine
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Blob key contains characters outside the identifier alphabet
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
