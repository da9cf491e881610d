//! Crypto error types.

use thiserror::Error;

/// Errors produced by the crypto engine.
///
/// `AuthenticationFailure` and `MalformedEnvelope` are deliberately coarse:
/// neither carries information about *why* an envelope failed to open, so
/// callers cannot build a passphrase oracle out of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD open failed: wrong passphrase, tampered data, or truncated tag.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Envelope is too short to contain the salt and IV.
    #[error("malformed envelope: {len} bytes, need at least {min}")]
    MalformedEnvelope {
        /// Length of the rejected envelope
        len: usize,
        /// Minimum length (`salt_len + IV_LEN`)
        min: usize,
    },

    /// Configuration rejected at construction time.
    #[error("invalid crypto configuration: {0}")]
    InvalidConfig(String),

    /// AEAD seal failed (payload exceeds the cipher's limits).
    #[error("encryption failed")]
    EncryptionFailed,

    /// OS random source unavailable.
    #[error("random source failure: {0}")]
    Rng(String),
}
