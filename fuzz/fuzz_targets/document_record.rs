//! Fuzz target for persisted document records
//!
//! # Strategy
//!
//! - Random bytes through the CBOR decoder used by the redb repository
//! - Random transition sequences against a decoded (or fresh) document
//!
//! # Invariants
//!
//! - Decoding NEVER panics
//! - A terminal status never changes again
//! - `failed_attempts` never exceeds the ceiling on the Ready path

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oneshare_core::{AttemptOutcome, Document, DocumentStatus};

#[derive(Debug, Arbitrary)]
struct Input {
    record: Vec<u8>,
    max_attempts: u8,
    events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Event {
    WrongPassphrase,
    Download,
    Expire,
}

fuzz_target!(|input: Input| {
    let decoded: Option<Document> = ciborium::from_reader(input.record.as_slice()).ok();
    let mut doc = decoded.unwrap_or_else(|| {
        Document::new(
            "doc_fuzz".to_string(),
            "f".to_string(),
            "application/octet-stream".to_string(),
            0,
            "fp".to_string(),
            0,
        )
    });
    let max_attempts = u32::from(input.max_attempts.max(1));

    for (now, event) in (1u64..).zip(input.events) {
        let before = doc.clone();
        let result = match event {
            Event::WrongPassphrase => doc.record_failed_attempt(max_attempts, now).map(|outcome| {
                if let AttemptOutcome::Retry { remaining } = outcome {
                    assert!(remaining > 0);
                }
            }),
            Event::Download => doc.mark_downloaded(now),
            Event::Expire => doc.mark_expired(now),
        };

        if before.status.is_terminal() {
            assert!(result.is_err());
            assert_eq!(doc.status, before.status);
        }
        if result.is_ok() && doc.status == DocumentStatus::Ready {
            assert!(doc.failed_attempts < max_attempts);
        }
    }
});
