//! Crypto engine configuration.

use crate::error::CryptoError;

/// IV length in bytes. Fixed by the AES-GCM nonce size.
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Default derived key length (AES-256).
pub const DEFAULT_KEY_LEN: usize = 32;

/// Default salt length in bytes.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Process-wide crypto parameters, fixed at startup.
#[derive(Clone)]
pub struct CryptoConfig {
    /// PBKDF2 iteration count
    pub iterations: u32,
    /// Derived key length in bytes (16 or 32)
    pub key_len: usize,
    /// Salt length in bytes
    pub salt_len: usize,
    /// Server-side secret mixed into requester fingerprints. Never used for
    /// document encryption.
    pub hash_salt: String,
}

impl CryptoConfig {
    /// Check the parameters are usable with AES-GCM and PBKDF2.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.iterations == 0 {
            return Err(CryptoError::InvalidConfig("iterations must be non-zero".to_string()));
        }
        if !matches!(self.key_len, 16 | 32) {
            return Err(CryptoError::InvalidConfig(format!(
                "key length must be 16 or 32 bytes, got {}",
                self.key_len
            )));
        }
        if self.salt_len == 0 {
            return Err(CryptoError::InvalidConfig("salt length must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Smallest envelope that can be split into salt, IV and data.
    pub fn header_len(&self) -> usize {
        self.salt_len + IV_LEN
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            key_len: DEFAULT_KEY_LEN,
            salt_len: DEFAULT_SALT_LEN,
            hash_salt: String::new(),
        }
    }
}

// Hand-written so the hash salt never lands in logs.
impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("iterations", &self.iterations)
            .field("key_len", &self.key_len)
            .field("salt_len", &self.salt_len)
            .field("hash_salt", &"<redacted>")
            .finish()
    }
}
