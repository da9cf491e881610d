//! Lifecycle Engine
//!
//! Owns the rules that take a document from upload to its single terminal
//! status. Every status change goes through the repository's compare-and-set
//! on `Ready`, so concurrent retrievals, lock-outs and the expiry sweep race
//! on one row and exactly one of them wins. Only the winner deletes the blob.
//!
//! The engine is synchronous and performs blocking I/O through its
//! collaborators. Async callers run it on a blocking pool.

mod bundle;
mod error;
mod pending;

use oneshare_core::{
    AttemptOutcome, Document, DocumentStatus, Environment,
    ids::{new_document_id, new_passphrase},
};
use oneshare_crypto::{CryptoEngine, CryptoError};
use pending::PendingBlob;
use tracing::{debug, error, info, warn};

pub use self::{
    bundle::{ARCHIVE_CONTENT_TYPE, ARCHIVE_FILENAME, UploadFile},
    error::{ErrorClass, LifecycleError},
};
use crate::{
    config::LifecycleConfig,
    storage::{BlobStore, DocumentRepository, StorageError},
};

/// Fresh ids tried before an upload gives up on a collision.
const ID_ATTEMPTS: usize = 3;

/// A new document to seal and store.
///
/// Several files are bundled into one zip archive before encryption.
#[derive(Clone)]
pub struct UploadRequest {
    /// Salted hash of the uploader's network identity
    pub fingerprint: String,
    /// Uploaded files, in submission order
    pub files: Vec<UploadFile>,
}

impl UploadRequest {
    /// Request carrying one file.
    pub fn single(fingerprint: impl Into<String>, file: UploadFile) -> Self {
        Self { fingerprint: fingerprint.into(), files: vec![file] }
    }
}

/// Result of a successful upload.
///
/// The passphrase exists only here; it is never persisted.
pub struct UploadReceipt {
    /// New document id
    pub id: String,
    /// One-time passphrase for the recipient
    pub passphrase: String,
    /// Stored record
    pub document: Document,
}

/// Result of a successful retrieval.
pub struct Retrieved {
    /// Decrypted file contents
    pub plaintext: Vec<u8>,
    /// Record after the `Downloaded` transition
    pub document: Document,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Documents the stale query returned
    pub candidates: usize,
    /// Documents moved to `Expired` with their blob removed
    pub expired: usize,
    /// Documents another operation finished first
    pub skipped: usize,
    /// Documents whose update or blob delete failed
    pub failed: usize,
}

/// Document lifecycle over a repository and a blob store.
///
/// Generic over the environment so tests drive time and identifiers, and over
/// the collaborators so tests can swap in memory or fault-injecting storage.
pub struct Lifecycle<E, R, B> {
    env: E,
    documents: R,
    blobs: B,
    crypto: CryptoEngine,
    config: LifecycleConfig,
}

impl<E, R, B> Lifecycle<E, R, B>
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    /// Create an engine over the given collaborators.
    pub fn new(
        env: E,
        documents: R,
        blobs: B,
        crypto: CryptoEngine,
        config: LifecycleConfig,
    ) -> Self {
        Self { env, documents, blobs, crypto, config }
    }

    /// Engine configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Document repository.
    pub fn documents(&self) -> &R {
        &self.documents
    }

    /// Blob store.
    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Fingerprint a requester's network identity for rate limiting.
    pub fn fingerprint(&self, requester: &str) -> String {
        self.crypto.fingerprint(requester)
    }

    /// Seal and store a new document.
    ///
    /// Validation and the rate limit are checked before any write. The size
    /// ceiling applies to the total of all files, before bundling. The blob is
    /// written first and removed again if the metadata insert fails, so a
    /// `Ready` record never exists without its blob.
    ///
    /// The count-then-insert is not serialized per fingerprint; concurrent
    /// uploads can overshoot the limit slightly.
    pub fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, LifecycleError> {
        let total = bundle::total_size(&request.files);
        if total > self.config.max_upload_bytes {
            return Err(LifecycleError::PayloadTooLarge {
                size: total,
                max: self.config.max_upload_bytes,
            });
        }
        if total == 0 {
            return Err(LifecycleError::NoPayload);
        }

        let now = self.env.wall_clock_secs();
        let window_secs = self.config.rate_limit_window.as_secs();
        let recent = self
            .documents
            .count_recent_by_fingerprint(&request.fingerprint, now.saturating_sub(window_secs))
            .inspect_err(|e| error!(error = %e, "rate limit query failed"))?;
        if recent >= self.config.uploads_per_window {
            warn!(fingerprint = %request.fingerprint, recent, "upload rate limited");
            return Err(LifecycleError::RateLimited {
                limit: self.config.uploads_per_window,
                window_secs,
            });
        }

        let parts = request.files.len();
        let file = bundle::bundle(request.files).inspect_err(|e| {
            warn!(parts, error = %e, "failed to bundle upload");
        })?;
        let size = file.bytes.len() as u64;

        let id = self.unused_id()?;
        let passphrase = new_passphrase(&self.env);
        let envelope = self.crypto.encrypt(&passphrase, &file.bytes)?;

        self.blobs.write(&id, &envelope).inspect_err(|e| {
            error!(document_id = %id, error = %e, "failed to write blob");
        })?;
        let pending = PendingBlob::new(&self.blobs, &id);

        let document = Document::new(
            id.clone(),
            file.filename,
            file.content_type,
            size,
            request.fingerprint,
            now,
        );
        self.documents.insert(&document).inspect_err(|e| {
            error!(document_id = %id, error = %e, "failed to insert document");
        })?;
        pending.commit();

        info!(document_id = %id, size, parts, "document uploaded");
        Ok(UploadReceipt { id, passphrase, document })
    }

    /// Fetch a document if it can still be retrieved.
    ///
    /// Pure read; no attempt is counted.
    pub fn check(&self, id: &str) -> Result<Document, LifecycleError> {
        let document = self.documents.find_by_id(id)?.ok_or(LifecycleError::NotFound)?;
        match LifecycleError::for_status(document.status) {
            Some(err) => Err(err),
            None => Ok(document),
        }
    }

    /// Decrypt and consume a document.
    ///
    /// A wrong passphrase counts one failed attempt and, at the ceiling, locks
    /// the document and destroys its blob. A right one moves the document to
    /// `Downloaded` and destroys its blob. The plaintext is returned only if
    /// both steps succeed.
    pub fn retrieve(&self, id: &str, passphrase: &str) -> Result<Retrieved, LifecycleError> {
        self.check(id)?;

        let envelope = match self.blobs.read(id) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Err(self.missing_blob(id)),
            Err(e) => {
                error!(document_id = %id, error = %e, "failed to read blob");
                return Err(LifecycleError::StorageRead(e));
            },
        };

        match self.crypto.decrypt(passphrase, &envelope) {
            Ok(plaintext) => self.consume(id, plaintext),
            Err(CryptoError::AuthenticationFailure | CryptoError::MalformedEnvelope { .. }) => {
                self.record_failed_attempt(id)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Expire every `Ready` document older than the retention window.
    ///
    /// Continues past per-document failures. A document whose status changed
    /// since the query is skipped, so a concurrent retrieval always wins.
    pub fn expiry_sweep(&self) -> Result<SweepReport, LifecycleError> {
        let started = self.env.now();
        let now = self.env.wall_clock_secs();
        let cutoff = now.saturating_sub(self.config.retention.as_secs());

        let candidates = self.documents.find_stale_ready(cutoff).inspect_err(|e| {
            error!(error = %e, "stale document query failed");
        })?;

        let mut report = SweepReport { candidates: candidates.len(), ..SweepReport::default() };

        for candidate in candidates {
            let id = candidate.id.as_str();
            match self.documents.update_if_status(id, DocumentStatus::Ready, |doc| {
                doc.mark_expired(now)
            }) {
                Ok(_) => match self.blobs.delete(id) {
                    Ok(_) => report.expired += 1,
                    Err(e) => {
                        error!(document_id = %id, error = %e, "expired document left an orphaned blob");
                        report.failed += 1;
                    },
                },
                Err(StorageError::Conflict { actual, .. }) => {
                    debug!(document_id = %id, status = %actual, "document left Ready before sweep");
                    report.skipped += 1;
                },
                Err(e) => {
                    error!(document_id = %id, error = %e, "failed to expire document");
                    report.failed += 1;
                },
            }
        }

        if report.candidates > 0 {
            info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                elapsed_ms = (self.env.now() - started).as_millis() as u64,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    fn unused_id(&self) -> Result<String, LifecycleError> {
        for _ in 0..ID_ATTEMPTS {
            let id = new_document_id(&self.env);
            if self.documents.find_by_id(&id)?.is_none() {
                return Ok(id);
            }
            warn!(document_id = %id, "document id collision");
        }
        Err(StorageError::DuplicateId("no unused document id".to_string()).into())
    }

    fn consume(&self, id: &str, plaintext: Vec<u8>) -> Result<Retrieved, LifecycleError> {
        let now = self.env.wall_clock_secs();
        let document = self
            .documents
            .update_if_status(id, DocumentStatus::Ready, |doc| doc.mark_downloaded(now))
            .map_err(|e| self.lost_race(id, e))?;

        // The record is terminal from here on; a failed delete cannot undo it
        if let Err(e) = self.blobs.delete(id) {
            error!(document_id = %id, error = %e, "downloaded document left an orphaned blob");
            return Err(LifecycleError::Storage(e));
        }

        info!(document_id = %id, "document downloaded");
        Ok(Retrieved { plaintext, document })
    }

    fn record_failed_attempt(&self, id: &str) -> Result<Retrieved, LifecycleError> {
        let now = self.env.wall_clock_secs();
        let max_attempts = self.config.max_failed_attempts;

        let document = self
            .documents
            .update_if_status(id, DocumentStatus::Ready, |doc| {
                doc.record_failed_attempt(max_attempts, now).map(|_| ())
            })
            .map_err(|e| self.lost_race(id, e))?;

        match attempt_outcome(&document, max_attempts) {
            AttemptOutcome::Retry { remaining } => {
                debug!(document_id = %id, remaining, "wrong passphrase");
                Err(LifecycleError::WrongPassphrase { remaining })
            },
            AttemptOutcome::Locked => {
                if let Err(e) = self.blobs.delete(id) {
                    error!(document_id = %id, error = %e, "locked document left an orphaned blob");
                    return Err(LifecycleError::Storage(e));
                }
                warn!(document_id = %id, "document locked after max failed attempts");
                Err(LifecycleError::Locked)
            },
        }
    }

    /// Map a failed compare-and-set to the status the winner left behind.
    fn lost_race(&self, id: &str, err: StorageError) -> LifecycleError {
        match err {
            StorageError::Conflict { actual, .. } => {
                debug!(document_id = %id, status = %actual, "lost status race");
                LifecycleError::for_status(actual).unwrap_or(LifecycleError::Storage(
                    StorageError::Conflict {
                        id: id.to_string(),
                        expected: DocumentStatus::Ready,
                        actual,
                    },
                ))
            },
            StorageError::NotFound(_) => LifecycleError::NotFound,
            other => {
                error!(document_id = %id, error = %other, "failed to update document");
                LifecycleError::Storage(other)
            },
        }
    }

    /// A `Ready` document had no blob at read time.
    ///
    /// A concurrent winner may have just deleted it, in which case the record
    /// now says so. Otherwise the blob is genuinely missing.
    fn missing_blob(&self, id: &str) -> LifecycleError {
        match self.documents.find_by_id(id) {
            Ok(Some(document)) => {
                LifecycleError::for_status(document.status).unwrap_or_else(|| {
                    error!(document_id = %id, "ready document has no blob");
                    LifecycleError::StorageRead(StorageError::NotFound(id.to_string()))
                })
            },
            Ok(None) => LifecycleError::NotFound,
            Err(e) => LifecycleError::StorageRead(e),
        }
    }
}

/// Outcome of a failed attempt, read back from the stored record.
fn attempt_outcome(document: &Document, max_attempts: u32) -> AttemptOutcome {
    if document.status == DocumentStatus::MaxFailedAttempts {
        AttemptOutcome::Locked
    } else {
        AttemptOutcome::Retry { remaining: max_attempts.saturating_sub(document.failed_attempts) }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use oneshare_crypto::CryptoConfig;

    use super::*;
    use crate::storage::{MemoryBlobStore, MemoryRepository};

    /// Minimal clock for unit tests; the integration tests use `SimEnv`.
    #[derive(Clone)]
    struct FixedEnv {
        secs: u64,
    }

    impl Environment for FixedEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::from_secs(self.secs)
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            getrandom::fill(buffer).unwrap();
        }

        fn wall_clock_secs(&self) -> u64 {
            self.secs
        }
    }

    fn engine() -> Lifecycle<FixedEnv, MemoryRepository, MemoryBlobStore> {
        let crypto =
            CryptoEngine::new(CryptoConfig { iterations: 1_000, ..CryptoConfig::default() })
                .unwrap();
        Lifecycle::new(
            FixedEnv { secs: 1_000_000 },
            MemoryRepository::new(),
            MemoryBlobStore::new(),
            crypto,
            LifecycleConfig::default(),
        )
    }

    fn request(body: &[u8]) -> UploadRequest {
        UploadRequest::single("fp", UploadFile::new("note.txt", "text/plain", body))
    }

    #[test]
    fn upload_then_retrieve() {
        let engine = engine();
        let receipt = engine.upload(request(b"hello")).unwrap();

        assert_eq!(engine.check(&receipt.id).unwrap().status, DocumentStatus::Ready);

        let retrieved = engine.retrieve(&receipt.id, &receipt.passphrase).unwrap();
        assert_eq!(retrieved.plaintext, b"hello");
        assert_eq!(retrieved.document.status, DocumentStatus::Downloaded);
        assert_eq!(retrieved.document.downloaded_at, Some(1_000_000));
        assert!(!engine.blobs().contains(&receipt.id));
    }

    #[test]
    fn empty_and_oversized_rejected_before_io() {
        let mut engine = engine();
        engine.config.max_upload_bytes = 4;

        assert!(matches!(engine.upload(request(b"")), Err(LifecycleError::NoPayload)));
        assert!(matches!(
            engine.upload(request(b"12345")),
            Err(LifecycleError::PayloadTooLarge { size: 5, max: 4 })
        ));
        assert_eq!(engine.blobs().blob_count(), 0);
        assert_eq!(engine.documents().document_count(), 0);
    }

    #[test]
    fn unknown_id_not_found() {
        let engine = engine();
        assert!(matches!(engine.check("doc_missing"), Err(LifecycleError::NotFound)));
        assert!(matches!(engine.retrieve("doc_missing", "x"), Err(LifecycleError::NotFound)));
    }

    #[test]
    fn passphrase_is_not_stored() {
        let engine = engine();
        let receipt = engine.upload(request(b"secret")).unwrap();

        let stored = engine.documents().find_by_id(&receipt.id).unwrap().unwrap();
        let debug = format!("{stored:?}");
        assert!(!debug.contains(&receipt.passphrase));
    }

    #[test]
    fn missing_blob_on_ready_document_is_storage_read() {
        let engine = engine();
        let receipt = engine.upload(request(b"hello")).unwrap();
        engine.blobs().delete(&receipt.id).unwrap();

        let err = engine.retrieve(&receipt.id, &receipt.passphrase).err().unwrap();
        assert!(matches!(err, LifecycleError::StorageRead(_)));
        assert_eq!(err.code(), 2040);
        assert_eq!(engine.check(&receipt.id).unwrap().failed_attempts, 0);
    }

    #[test]
    fn attempt_outcome_follows_stored_status() {
        let mut doc = Document::new(
            "doc_a".to_string(),
            "f".to_string(),
            "text/plain".to_string(),
            1,
            "fp".to_string(),
            0,
        );

        doc.record_failed_attempt(3, 1).unwrap();
        assert_eq!(attempt_outcome(&doc, 3), AttemptOutcome::Retry { remaining: 2 });

        doc.record_failed_attempt(3, 2).unwrap();
        doc.record_failed_attempt(3, 3).unwrap();
        assert_eq!(doc.status, DocumentStatus::MaxFailedAttempts);
        assert_eq!(attempt_outcome(&doc, 3), AttemptOutcome::Locked);
    }

    #[test]
    fn lock_deletes_blob_exactly_once() {
        let mut engine = engine();
        engine.config.max_failed_attempts = 2;
        let receipt = engine.upload(request(b"hello")).unwrap();

        assert!(matches!(
            engine.retrieve(&receipt.id, "wrong"),
            Err(LifecycleError::WrongPassphrase { remaining: 1 })
        ));
        assert_eq!(engine.blobs().delete_calls(), 0);

        assert!(matches!(engine.retrieve(&receipt.id, "wrong"), Err(LifecycleError::Locked)));
        assert_eq!(engine.blobs().delete_calls(), 1);
        assert!(!engine.blobs().contains(&receipt.id));
    }
}
