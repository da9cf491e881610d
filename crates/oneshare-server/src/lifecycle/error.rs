//! Lifecycle error taxonomy.

use oneshare_core::DocumentStatus;
use oneshare_crypto::CryptoError;

use crate::storage::StorageError;

/// Broad class of a [`LifecycleError`], for callers choosing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller sent unusable input; retrying with corrected input may succeed
    Validation,
    /// Upload quota exhausted; retry after the window elapses
    RateLimited,
    /// Unknown id
    NotFound,
    /// Document can never be retrieved again
    Terminal,
    /// Wrong passphrase; retry with the right one while attempts remain
    WrongPassphrase,
    /// Collaborator failure
    Storage,
}

/// Errors from lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Plaintext exceeds the configured ceiling
    #[error("file size is too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Submitted size
        size: u64,
        /// Configured ceiling
        max: u64,
    },

    /// Zero-byte upload
    #[error("no file uploaded")]
    NoPayload,

    /// Uploaded parts could not be read or bundled into an archive
    #[error("can't get file from upload: {0}")]
    Bundle(String),

    /// Too many uploads from one requester inside the window
    #[error("allowed number of uploads exceeded: {limit} per {window_secs}s")]
    RateLimited {
        /// Uploads allowed per window
        limit: u64,
        /// Window length in seconds
        window_secs: u64,
    },

    /// No document with this id
    #[error("document not found")]
    NotFound,

    /// Already consumed
    #[error("document was already downloaded")]
    AlreadyDownloaded,

    /// Removed by the expiry sweep
    #[error("document has expired")]
    Expired,

    /// Failed-attempt ceiling reached; the blob is gone
    #[error("document reached max failed attempts")]
    Locked,

    /// Decryption failed; the attempt was counted
    #[error("wrong key, {remaining} attempts remaining")]
    WrongPassphrase {
        /// Attempts left before the document locks
        remaining: u32,
    },

    /// Blob of a `Ready` document could not be read
    #[error("can't read file: {0}")]
    StorageRead(StorageError),

    /// Repository or blob store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encryption failed during upload
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl LifecycleError {
    /// Error for a document found in `status`, or `None` if it is `Ready`.
    pub fn for_status(status: DocumentStatus) -> Option<Self> {
        match status {
            DocumentStatus::Ready => None,
            DocumentStatus::Downloaded => Some(Self::AlreadyDownloaded),
            DocumentStatus::Expired => Some(Self::Expired),
            DocumentStatus::MaxFailedAttempts => Some(Self::Locked),
        }
    }

    /// Stable numeric code reported to clients.
    pub fn code(&self) -> u16 {
        match self {
            Self::PayloadTooLarge { .. } => 1005,
            Self::NoPayload => 1010,
            Self::Bundle(_) => 1020,
            Self::Storage(_) | Self::Crypto(_) => 1030,
            Self::RateLimited { .. } => 1040,
            Self::NotFound => 2000,
            Self::AlreadyDownloaded => 2010,
            Self::Expired => 2020,
            Self::Locked => 2030,
            Self::StorageRead(_) => 2040,
            Self::WrongPassphrase { .. } => 2080,
        }
    }

    /// Broad class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PayloadTooLarge { .. } | Self::NoPayload | Self::Bundle(_) => {
                ErrorClass::Validation
            },
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::NotFound => ErrorClass::NotFound,
            Self::AlreadyDownloaded | Self::Expired | Self::Locked => ErrorClass::Terminal,
            Self::WrongPassphrase { .. } => ErrorClass::WrongPassphrase,
            Self::StorageRead(_) | Self::Storage(_) | Self::Crypto(_) => ErrorClass::Storage,
        }
    }

    /// Message safe to show a client. Collaborator details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Crypto(_) => "can't process file".to_string(),
            Self::StorageRead(_) => "can't read file".to_string(),
            Self::Bundle(_) => "can't get file from upload".to_string(),
            other => other.to_string(),
        }
    }
}
