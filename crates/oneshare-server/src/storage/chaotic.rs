//! Chaotic storage wrapper for fault injection testing
//!
//! Wraps a repository or blob store and fails operations, either at random
//! with a configured rate or deterministically for chosen operation kinds.
//! Used to verify that the lifecycle engine never leaves a consumed document
//! readable or a committed record without its blob.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use oneshare_core::{Document, DocumentStatus, TransitionError};

use super::{BlobStore, DocumentRepository, StorageError};

/// Storage operation kinds, for targeted failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// [`DocumentRepository::insert`]
    Insert,
    /// [`DocumentRepository::find_by_id`]
    FindById,
    /// [`DocumentRepository::update_if_status`]
    UpdateIfStatus,
    /// [`DocumentRepository::find_stale_ready`]
    FindStaleReady,
    /// [`DocumentRepository::count_recent_by_fingerprint`]
    CountRecent,
    /// [`BlobStore::write`]
    BlobWrite,
    /// [`BlobStore::read`]
    BlobRead,
    /// [`BlobStore::delete`]
    BlobDelete,
}

/// Chaotic storage wrapper that injects failures
///
/// Delegates to an underlying repository or blob store. Random failures use a
/// seeded LCG so chaos runs are reproducible. Uses Arc<Mutex<>> for shared
/// state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Operations that always fail, regardless of rate
    always_fail: Arc<[StorageOp]>,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S> ChaoticStorage<S> {
    /// Create a wrapper failing at random with `failure_rate`
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            always_fail: Arc::from(Vec::<StorageOp>::new()),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Create a wrapper that fails exactly the listed operations, every time
    pub fn failing(inner: S, ops: &[StorageOp]) -> Self {
        let mut storage = Self::with_seed(inner, 0.0, 0);
        storage.always_fail = Arc::from(ops);
        storage
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails
    fn inject(&self, op: StorageOp) -> Result<(), StorageError> {
        {
            #[allow(clippy::expect_used)]
            let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
            *count += 1;
        }

        if self.always_fail.contains(&op) || self.roll() {
            return Err(StorageError::Io(format!("chaotic failure injection ({op:?})")));
        }
        Ok(())
    }

    fn roll(&self) -> bool {
        #[allow(clippy::expect_used)]
        let mut rng = self.rng.lock().expect("ChaoticRng mutex poisoned");
        rng.next() < self.failure_rate
    }
}

impl<S: DocumentRepository> DocumentRepository for ChaoticStorage<S> {
    fn insert(&self, document: &Document) -> Result<(), StorageError> {
        self.inject(StorageOp::Insert)?;
        self.inner.insert(document)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Document>, StorageError> {
        self.inject(StorageOp::FindById)?;
        self.inner.find_by_id(id)
    }

    fn update_if_status<F>(
        &self,
        id: &str,
        expected: DocumentStatus,
        mutate: F,
    ) -> Result<Document, StorageError>
    where
        F: FnOnce(&mut Document) -> Result<(), TransitionError>,
    {
        self.inject(StorageOp::UpdateIfStatus)?;
        self.inner.update_if_status(id, expected, mutate)
    }

    fn find_stale_ready(&self, uploaded_before: u64) -> Result<Vec<Document>, StorageError> {
        self.inject(StorageOp::FindStaleReady)?;
        self.inner.find_stale_ready(uploaded_before)
    }

    fn count_recent_by_fingerprint(
        &self,
        fingerprint: &str,
        since: u64,
    ) -> Result<u64, StorageError> {
        self.inject(StorageOp::CountRecent)?;
        self.inner.count_recent_by_fingerprint(fingerprint, since)
    }
}

impl<S: BlobStore> BlobStore for ChaoticStorage<S> {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.inject(StorageOp::BlobWrite)?;
        self.inner.write(key, bytes)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inject(StorageOp::BlobRead)?;
        self.inner.read(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.inject(StorageOp::BlobDelete)?;
        self.inner.delete(key)
    }
}
