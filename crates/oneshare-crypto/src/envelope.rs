//! Cipher envelope layout and AES-GCM seal/open.
//!
//! Wire format: `[salt: salt_len][iv: 12][ciphertext || tag: N + 16]`
//!
//! All functions here are pure - salt, IV and key are provided by the caller.

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{
    config::{IV_LEN, TAG_LEN},
    error::CryptoError,
};

/// Borrowed view of an envelope split into its three parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    /// KDF salt
    pub salt: &'a [u8],
    /// AES-GCM nonce
    pub iv: &'a [u8; IV_LEN],
    /// Ciphertext with trailing authentication tag
    pub data: &'a [u8],
}

impl<'a> EnvelopeParts<'a> {
    /// Split `envelope` at `salt_len` and `salt_len + IV_LEN`.
    ///
    /// # Errors
    ///
    /// - `MalformedEnvelope` if the envelope cannot hold a salt and IV
    pub fn split(envelope: &'a [u8], salt_len: usize) -> Result<Self, CryptoError> {
        let malformed = || CryptoError::MalformedEnvelope {
            len: envelope.len(),
            min: salt_len.saturating_add(IV_LEN),
        };

        let (salt, rest) = envelope.split_at_checked(salt_len).ok_or_else(malformed)?;
        let (iv, data) = rest.split_first_chunk::<IV_LEN>().ok_or_else(malformed)?;

        Ok(Self { salt, iv, data })
    }
}

/// Assemble `salt || iv || data`.
pub fn assemble(salt: &[u8], iv: &[u8; IV_LEN], data: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(salt.len() + IV_LEN + data.len());
    envelope.extend_from_slice(salt);
    envelope.extend_from_slice(iv);
    envelope.extend_from_slice(data);
    envelope
}

/// Encrypt `plaintext` under `key` with no associated data.
///
/// Returns ciphertext with the 16-byte tag appended.
///
/// # Errors
///
/// - `InvalidConfig` if the key is not 16 or 32 bytes
/// - `EncryptionFailed` if the payload exceeds AES-GCM limits
pub fn seal(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = Nonce::from_slice(iv);
    let sealed = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|_| invalid_key_len(key.len()))?
            .encrypt(nonce, plaintext),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|_| invalid_key_len(key.len()))?
            .encrypt(nonce, plaintext),
        other => return Err(invalid_key_len(other)),
    };

    sealed.map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt and authenticate `data` under `key`.
///
/// # Errors
///
/// - `AuthenticationFailure` on wrong key, tampering, or truncated tag
/// - `InvalidConfig` if the key is not 16 or 32 bytes
pub fn open(key: &[u8], iv: &[u8; IV_LEN], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < TAG_LEN {
        return Err(CryptoError::AuthenticationFailure);
    }

    let nonce = Nonce::from_slice(iv);
    let opened = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .map_err(|_| invalid_key_len(key.len()))?
            .decrypt(nonce, data),
        32 => Aes256Gcm::new_from_slice(key)
            .map_err(|_| invalid_key_len(key.len()))?
            .decrypt(nonce, data),
        other => return Err(invalid_key_len(other)),
    };

    opened.map_err(|_| CryptoError::AuthenticationFailure)
}

fn invalid_key_len(len: usize) -> CryptoError {
    CryptoError::InvalidConfig(format!("key length must be 16 or 32 bytes, got {len}"))
}
