//! Fuzz target for envelope decryption
//!
//! A stored blob is attacker-adjacent: a corrupted disk or a swapped file must
//! never crash the server.
//!
//! # Invariants
//!
//! - `decrypt` NEVER panics on arbitrary bytes
//! - Envelopes shorter than salt + IV are rejected as malformed
//! - A tampered envelope never decrypts

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oneshare_crypto::{CryptoConfig, CryptoEngine, CryptoError, IV_LEN};

#[derive(Debug, Arbitrary)]
struct Input {
    passphrase: String,
    envelope: Vec<u8>,
    plaintext: Vec<u8>,
    flip_at: u16,
    short_key: bool,
}

fuzz_target!(|input: Input| {
    let config = CryptoConfig {
        iterations: 1,
        key_len: if input.short_key { 16 } else { 32 },
        ..CryptoConfig::default()
    };
    let salt_len = config.salt_len;
    let Ok(engine) = CryptoEngine::new(config) else {
        return;
    };

    match engine.decrypt(&input.passphrase, &input.envelope) {
        Err(CryptoError::MalformedEnvelope { .. }) => {
            assert!(input.envelope.len() < salt_len + IV_LEN);
        },
        Err(_) | Ok(_) => {},
    }

    let Ok(mut sealed) = engine.encrypt(&input.passphrase, &input.plaintext) else {
        return;
    };
    let index = usize::from(input.flip_at) % sealed.len();
    sealed[index] ^= 0x01;
    assert!(engine.decrypt(&input.passphrase, &sealed).is_err(), "tampered envelope opened");
});
