//! Storage collaborators for the document lifecycle
//!
//! Two synchronous traits split persistence along its natural seam:
//! [`DocumentRepository`] holds metadata records and [`BlobStore`] holds the
//! encrypted envelopes, keyed by document id. The lifecycle engine is the only
//! caller and never assumes a transaction spans both.

mod chaotic;
mod error;
mod fs;
mod memory;
mod redb;

pub use chaotic::{ChaoticStorage, StorageOp};
pub use error::StorageError;
pub use fs::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryRepository};
use oneshare_core::{Document, DocumentStatus, TransitionError};

pub use self::redb::RedbRepository;

/// Persistence for document metadata records
///
/// Must be Clone (shared by request handlers and the sweeper), Send + Sync
/// (thread-safe), and synchronous (no async methods). Implementations share
/// internal state via Arc, so clones access the same underlying records.
///
/// # Panics
///
/// In-memory implementations may panic if internal synchronization primitives
/// are poisoned. Acceptable for test/simulation code.
pub trait DocumentRepository: Clone + Send + Sync + 'static {
    /// Persist a new record
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateId`] if a record with the same id exists.
    fn insert(&self, document: &Document) -> Result<(), StorageError>;

    /// Load a record. `None` if the id is unknown.
    fn find_by_id(&self, id: &str) -> Result<Option<Document>, StorageError>;

    /// Compare-and-set on status.
    ///
    /// Loads the record, checks that its status equals `expected`, applies
    /// `mutate`, and stores the result. The check and the store are atomic
    /// with respect to every other call on the same repository, so of two
    /// concurrent callers expecting the same status at most one succeeds.
    ///
    /// # Invariants
    ///
    /// - Pre: `mutate` does not change the record id
    /// - Post: on `Ok`, the returned record is what is now stored
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the id is unknown
    /// - [`StorageError::Conflict`] if the stored status differs from
    ///   `expected`; nothing is written
    /// - [`StorageError::Transition`] if `mutate` fails; nothing is written
    fn update_if_status<F>(
        &self,
        id: &str,
        expected: DocumentStatus,
        mutate: F,
    ) -> Result<Document, StorageError>
    where
        F: FnOnce(&mut Document) -> Result<(), TransitionError>;

    /// `Ready` records uploaded strictly before `uploaded_before` (Unix
    /// seconds), oldest first.
    fn find_stale_ready(&self, uploaded_before: u64) -> Result<Vec<Document>, StorageError>;

    /// Number of records from `fingerprint` uploaded at or after `since`,
    /// regardless of status.
    fn count_recent_by_fingerprint(&self, fingerprint: &str, since: u64)
    -> Result<u64, StorageError>;
}

/// Persistence for encrypted envelopes
///
/// Same threading contract as [`DocumentRepository`]. Keys are document ids.
pub trait BlobStore: Clone + Send + Sync + 'static {
    /// Store `bytes` under `key`, replacing any previous value
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Load the bytes under `key`. `None` if absent.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove `key`. Returns whether anything was removed; deleting an absent
    /// key is not an error.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

/// Shared compare-and-set body for the repositories.
///
/// Checks `expected` and applies `mutate` to a copy, so a failed mutation
/// leaves `current` untouched.
pub(crate) fn apply_if_status<F>(
    current: &Document,
    expected: DocumentStatus,
    mutate: F,
) -> Result<Document, StorageError>
where
    F: FnOnce(&mut Document) -> Result<(), TransitionError>,
{
    if current.status != expected {
        return Err(StorageError::Conflict {
            id: current.id.clone(),
            expected,
            actual: current.status,
        });
    }

    let mut updated = current.clone();
    mutate(&mut updated)?;
    debug_assert_eq!(updated.id, current.id, "mutation must not change the id");
    Ok(updated)
}
