//! Passphrase key derivation using PBKDF2-HMAC-SHA256

use sha2::Sha256;
use zeroize::Zeroizing;

/// Symmetric key derived from a passphrase. Zeroized on drop.
pub type DerivedKey = Zeroizing<Vec<u8>>;

/// Derive a `key_len`-byte key from `passphrase` and `salt`.
///
/// Deterministic: same passphrase, salt and parameters always produce the
/// same key. The caller owns salt generation.
pub fn derive_key(passphrase: &[u8], salt: &[u8], iterations: u32, key_len: usize) -> DerivedKey {
    let mut key = Zeroizing::new(vec![0u8; key_len]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = derive_key(b"passphrase", b"salt-salt-salt-s", 10, 32);
        let b = derive_key(b"passphrase", b"salt-salt-salt-s", 10, 32);
        assert_eq!(*a, *b, "same inputs must produce same output");
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = derive_key(b"passphrase", b"salt-a", 10, 32);
        let b = derive_key(b"passphrase", b"salt-b", 10, 32);
        assert_ne!(*a, *b);
    }

    #[test]
    fn different_passphrases_produce_different_keys() {
        let a = derive_key(b"passphrase-a", b"salt", 10, 32);
        let b = derive_key(b"passphrase-b", b"salt", 10, 32);
        assert_ne!(*a, *b);
    }

    #[test]
    fn output_has_requested_length() {
        assert_eq!(derive_key(b"p", b"s", 1, 16).len(), 16);
        assert_eq!(derive_key(b"p", b"s", 1, 32).len(), 32);
    }

    // RFC 7914 section 11 test vector for PBKDF2-HMAC-SHA256
    #[test]
    fn matches_known_vector() {
        let key = derive_key(b"passwd", b"salt", 1, 64);
        let expected = [
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc, 0x49, 0xca, 0x9c, 0xcc, 0xf1, 0x79, 0xb6, 0x45, 0x99, 0x16,
            0x64, 0xb3, 0x9d, 0x77, 0xef, 0x31, 0x7c, 0x71, 0xb8, 0x45, 0xb1, 0xe3, 0x0b, 0xd5,
            0x09, 0x11, 0x20, 0x41, 0xd3, 0xa1, 0x97, 0x83,
        ];
        assert_eq!(key.as_slice(), expected.as_slice());
    }
}
