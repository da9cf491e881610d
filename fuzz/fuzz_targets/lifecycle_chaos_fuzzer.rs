//! Fuzz target for the lifecycle engine under storage failures
//!
//! Uses ChaoticStorage on both the repository and the blob store to inject
//! I/O errors at configurable rates.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Uploads, right and wrong retrievals, clock jumps and sweeps interleaved
//!
//! # Invariants
//!
//! - The engine NEVER panics on storage errors
//! - A failed upload leaves no record behind
//! - A document is decrypted at most once
//! - A retrieval that succeeds returns exactly what was uploaded

#![no_main]

use std::{collections::HashSet, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oneshare_crypto::{CryptoConfig, CryptoEngine};
use oneshare_harness::SimEnv;
use oneshare_server::{
    ChaoticStorage, DocumentRepository, Lifecycle, LifecycleConfig, MemoryBlobStore,
    MemoryRepository, UploadFile, UploadRequest,
};

#[derive(Debug, Clone, Arbitrary)]
struct ChaosScenario {
    /// Seed for SimEnv and ChaoticStorage RNGs
    seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Clone, Arbitrary)]
enum ChaosOperation {
    Upload { requester: u8, body: Vec<u8> },
    Retrieve { target: u8, correct: bool },
    Advance { hours: u8 },
    Sweep,
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let env = SimEnv::with_seed(scenario.seed);
    let documents =
        ChaoticStorage::with_seed(MemoryRepository::new(), failure_rate, scenario.seed);
    let blobs = ChaoticStorage::with_seed(MemoryBlobStore::new(), failure_rate, !scenario.seed);
    let Ok(crypto) = CryptoEngine::new(CryptoConfig { iterations: 1, ..CryptoConfig::default() })
    else {
        return;
    };
    let engine = Lifecycle::new(
        env.clone(),
        documents.clone(),
        blobs.clone(),
        crypto,
        LifecycleConfig::default(),
    );

    let mut uploaded: Vec<(String, String, Vec<u8>)> = Vec::new();
    let mut consumed: HashSet<String> = HashSet::new();

    for op in scenario.operations {
        match op {
            ChaosOperation::Upload { requester, body } => {
                let before = documents.inner().document_count();
                let request = UploadRequest::single(
                    format!("fp{}", requester % 4),
                    UploadFile::new("f", "application/octet-stream", body.clone()),
                );
                match engine.upload(request) {
                    Ok(receipt) => uploaded.push((receipt.id, receipt.passphrase, body)),
                    Err(_) => assert_eq!(documents.inner().document_count(), before),
                }
            },

            ChaosOperation::Retrieve { target, correct } => {
                if uploaded.is_empty() {
                    continue;
                }
                let (id, passphrase, body) = &uploaded[usize::from(target) % uploaded.len()];
                let attempt = if correct { passphrase.as_str() } else { "wrong" };

                if let Ok(retrieved) = engine.retrieve(id, attempt) {
                    assert!(correct, "wrong passphrase opened {id}");
                    assert_eq!(&retrieved.plaintext, body);
                    assert!(consumed.insert(id.clone()), "{id} decrypted twice");
                }
            },

            ChaosOperation::Advance { hours } => {
                env.advance(Duration::from_secs(u64::from(hours) * 3600));
            },

            ChaosOperation::Sweep => {
                // This is expected to fail under chaos
                let _ = engine.expiry_sweep();
            },
        }
    }

    for id in &consumed {
        let record = documents.inner().find_by_id(id);
        assert!(matches!(record, Ok(Some(doc)) if doc.status.is_terminal()));
    }
});
