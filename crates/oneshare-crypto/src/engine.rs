//! Passphrase envelope encryption.

use sha2::{Digest, Sha256};

use crate::{
    config::{CryptoConfig, IV_LEN},
    envelope::{self, EnvelopeParts},
    error::CryptoError,
    kdf::{self, DerivedKey},
};

/// Encrypts and decrypts document payloads under one-time passphrases.
///
/// Holds only configuration; cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct CryptoEngine {
    config: CryptoConfig,
}

impl CryptoEngine {
    /// Create an engine, validating the configuration once.
    pub fn new(config: CryptoConfig) -> Result<Self, CryptoError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    /// Derive a key from `passphrase`.
    ///
    /// When `salt` is `None` a fresh `salt_len`-byte salt is drawn from the OS
    /// CSPRNG. Returns the key together with the salt that produced it.
    pub fn derive_key(
        &self,
        passphrase: &str,
        salt: Option<&[u8]>,
    ) -> Result<(DerivedKey, Vec<u8>), CryptoError> {
        let salt = match salt {
            Some(salt) => salt.to_vec(),
            None => {
                let mut fresh = vec![0u8; self.config.salt_len];
                fill_random(&mut fresh)?;
                fresh
            },
        };

        let key = kdf::derive_key(
            passphrase.as_bytes(),
            &salt,
            self.config.iterations,
            self.config.key_len,
        );
        Ok((key, salt))
    }

    /// Encrypt `plaintext` into a fresh envelope.
    ///
    /// Every call draws a new salt and IV, so identical inputs never produce
    /// identical envelopes.
    pub fn encrypt(&self, passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut salt = vec![0u8; self.config.salt_len];
        let mut iv = [0u8; IV_LEN];
        fill_random(&mut salt)?;
        fill_random(&mut iv)?;

        self.encrypt_with(passphrase, plaintext, &salt, &iv)
    }

    /// Encrypt with caller-provided salt and IV.
    ///
    /// Deterministic. Callers MUST supply cryptographically random, never
    /// reused values outside of tests.
    pub fn encrypt_with(
        &self,
        passphrase: &str,
        plaintext: &[u8],
        salt: &[u8],
        iv: &[u8; IV_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        if salt.len() != self.config.salt_len {
            return Err(CryptoError::InvalidConfig(format!(
                "salt must be {} bytes, got {}",
                self.config.salt_len,
                salt.len()
            )));
        }

        let (key, _) = self.derive_key(passphrase, Some(salt))?;
        let data = envelope::seal(&key, iv, plaintext)?;

        Ok(envelope::assemble(salt, iv, &data))
    }

    /// Open an envelope produced by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// - `MalformedEnvelope` if the envelope is shorter than salt + IV
    /// - `AuthenticationFailure` on wrong passphrase or any tampering
    pub fn decrypt(&self, passphrase: &str, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let parts = EnvelopeParts::split(envelope, self.config.salt_len)?;
        let (key, _) = self.derive_key(passphrase, Some(parts.salt))?;

        envelope::open(&key, parts.iv, parts.data)
    }

    /// Salted SHA-256 of `value`, hex encoded.
    ///
    /// Used to identify requesters for rate limiting without storing their
    /// network identity in recoverable form.
    pub fn fingerprint(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(self.config.hash_salt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn fill_random(buffer: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::fill(buffer).map_err(|e| CryptoError::Rng(e.to_string()))
}
