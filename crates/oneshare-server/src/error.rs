//! Server error types.

use std::fmt;

use oneshare_crypto::CryptoError;

use crate::storage::StorageError;

/// Errors that stop the server from starting or serving.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (bad bind address, invalid crypto parameters).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept failure).
    Transport(String),

    /// Storage could not be opened.
    Storage(StorageError),

    /// Internal error (background task panicked, etc.).
    ///
    /// Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("key length must be 16 or 32".to_string());
        assert_eq!(err.to_string(), "configuration error: key length must be 16 or 32");

        let err = ServerError::from(StorageError::Io("disk full".to_string()));
        assert_eq!(err.to_string(), "storage error: I/O error: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }
}
