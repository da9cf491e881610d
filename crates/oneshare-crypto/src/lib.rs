//! Oneshare Cryptographic Primitives
//!
//! Passphrase-based envelope encryption for one-time documents. A document is
//! sealed under a key derived from a one-time passphrase and a random salt;
//! the salt and IV travel with the ciphertext so the passphrase alone is
//! enough to open it.
//!
//! ```text
//! passphrase ─┐
//!             ├─ PBKDF2-HMAC-SHA256 ─► key ─┐
//! salt ───────┘                             ├─ AES-GCM ─► ciphertext || tag
//! iv ───────────────────────────────────────┘
//!
//! envelope = salt || iv || ciphertext || tag
//! ```
//!
//! # Security
//!
//! - Fresh salt and IV per envelope, drawn from the OS CSPRNG: identical
//!   payloads never produce correlated envelopes
//! - Wrong passphrase, truncation and tampering all collapse into
//!   `AuthenticationFailure`, so decryption offers no oracle beyond pass/fail
//! - Derived keys are zeroized on drop
//! - The fingerprint hash salt is never used for document encryption

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod engine;
pub mod envelope;
mod error;
pub mod kdf;

pub use config::{
    CryptoConfig, DEFAULT_ITERATIONS, DEFAULT_KEY_LEN, DEFAULT_SALT_LEN, IV_LEN, TAG_LEN,
};
pub use engine::CryptoEngine;
pub use envelope::EnvelopeParts;
pub use error::CryptoError;
pub use kdf::DerivedKey;
