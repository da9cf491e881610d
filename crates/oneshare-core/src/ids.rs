//! Document identifiers and one-time passphrases.
//!
//! Both are drawn from the environment RNG with rejection sampling, so every
//! character of the alphabet is equally likely. These are not key material:
//! the passphrase is stretched through PBKDF2 before it touches a cipher.

use crate::env::Environment;

/// Type tag prepended to every document id.
pub const DOCUMENT_ID_PREFIX: &str = "doc";

/// Length of the random part of a document id.
pub const DOCUMENT_ID_LEN: usize = 25;

/// Alphabet for the random part of a document id.
pub const DOCUMENT_ID_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Passphrase length.
pub const PASSPHRASE_LEN: usize = 12;

/// Passphrase alphabet: alphanumerics plus symbols that survive copy-paste.
pub const PASSPHRASE_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-<>!$()=*:;";

/// New document id, e.g. `doc_Xq3...` (29 characters).
///
/// 62^25 possibilities; the repository's uniqueness check is the backstop.
pub fn new_document_id<E: Environment>(env: &E) -> String {
    let mut id = String::with_capacity(DOCUMENT_ID_PREFIX.len() + 1 + DOCUMENT_ID_LEN);
    id.push_str(DOCUMENT_ID_PREFIX);
    id.push('_');
    id.push_str(&random_string(env, DOCUMENT_ID_LEN, DOCUMENT_ID_CHARSET));
    id
}

/// New one-time passphrase (about 74 bits of entropy).
pub fn new_passphrase<E: Environment>(env: &E) -> String {
    random_string(env, PASSPHRASE_LEN, PASSPHRASE_CHARSET)
}

/// Whether `id` has the shape produced by [`new_document_id`].
///
/// Lets callers reject garbage before touching storage, and guarantees ids
/// are safe to use as file names.
pub fn is_valid_document_id(id: &str) -> bool {
    let Some(random) =
        id.strip_prefix(DOCUMENT_ID_PREFIX).and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    random.len() == DOCUMENT_ID_LEN && random.bytes().all(|b| DOCUMENT_ID_CHARSET.contains(&b))
}

/// Uniform string of `len` characters from `charset`.
///
/// Bytes at or above the largest multiple of `charset.len()` are discarded,
/// removing the modulo bias.
fn random_string<E: Environment>(env: &E, len: usize, charset: &[u8]) -> String {
    debug_assert!(!charset.is_empty() && charset.len() <= 256);

    let limit = 256 - (256 % charset.len());
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        env.random_bytes(&mut buf);
        for &byte in &buf {
            if usize::from(byte) >= limit {
                continue;
            }
            out.push(char::from(charset[usize::from(byte) % charset.len()]));
            if out.len() == len {
                break;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[derive(Clone)]
    struct TestEnv {
        rng: Arc<Mutex<ChaCha8Rng>>,
    }

    impl TestEnv {
        fn with_seed(seed: u64) -> Self {
            Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.rng.lock().unwrap().fill_bytes(buffer);
        }

        fn wall_clock_secs(&self) -> u64 {
            0
        }
    }

    #[test]
    fn document_id_shape() {
        let env = TestEnv::with_seed(1);
        let id = new_document_id(&env);

        assert_eq!(id.len(), 4 + DOCUMENT_ID_LEN);
        assert!(id.starts_with("doc_"));
        assert!(is_valid_document_id(&id));
    }

    #[test]
    fn passphrase_shape() {
        let env = TestEnv::with_seed(2);
        let passphrase = new_passphrase(&env);

        assert_eq!(passphrase.len(), PASSPHRASE_LEN);
        assert!(passphrase.bytes().all(|b| PASSPHRASE_CHARSET.contains(&b)));
    }

    #[test]
    fn ids_do_not_repeat() {
        let env = TestEnv::with_seed(3);
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| new_document_id(&env)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn same_seed_same_ids() {
        let a = TestEnv::with_seed(42);
        let b = TestEnv::with_seed(42);
        assert_eq!(new_document_id(&a), new_document_id(&b));
        assert_eq!(new_passphrase(&a), new_passphrase(&b));
    }

    #[test]
    fn every_character_is_reachable() {
        let env = TestEnv::with_seed(7);
        let sample: String = (0..200).map(|_| new_passphrase(&env)).collect();

        for &c in PASSPHRASE_CHARSET {
            assert!(sample.as_bytes().contains(&c), "character {} never drawn", c as char);
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_document_id(""));
        assert!(!is_valid_document_id("doc_"));
        assert!(!is_valid_document_id("doc_short"));
        assert!(!is_valid_document_id("img_aaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert!(!is_valid_document_id("doc_aaaaaaaaaaaaaaaaaaaaaaaa/"));
        assert!(!is_valid_document_id("doc_../../../../etc/passwd...."));
        assert!(is_valid_document_id("doc_aaaaaaaaaaaaaaaaaaaaaaaaa"));
    }
}
