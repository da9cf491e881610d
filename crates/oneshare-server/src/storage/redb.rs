//! Redb-backed durable document repository.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Every
//! mutation, including the status compare-and-set, runs inside a single write
//! transaction, and redb serializes write transactions, so a lost race is
//! always observed as a status mismatch rather than a torn write.

use std::{path::Path, sync::Arc};

use oneshare_core::{Document, DocumentStatus, TransitionError};
use redb::{Database, ReadableTable, TableDefinition};

use super::{DocumentRepository, StorageError, apply_if_status};

/// Table: documents
/// Key: document id (UTF-8 bytes)
/// Value: CBOR-encoded Document
const DOCUMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("documents");

/// Table: ready_by_upload
/// Key: [uploaded_at: 8 bytes BE][id bytes]
/// Value: id bytes
///
/// Holds exactly the `Ready` documents, so the expiry sweep is a prefix scan.
const READY_BY_UPLOAD: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ready_by_upload");

/// Table: by_fingerprint
/// Key: [fingerprint len: 4 bytes BE][fingerprint][uploaded_at: 8 bytes BE][id bytes]
/// Value: id bytes
///
/// Every document regardless of status, for the upload rate limit.
const BY_FINGERPRINT: TableDefinition<&[u8], &[u8]> = TableDefinition::new("by_fingerprint");

/// Durable document repository backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbRepository {
    db: Arc<Database>,
}

impl RedbRepository {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (DOCUMENTS, READY_BY_UPLOAD,
    /// BY_FINGERPRINT).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(DOCUMENTS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(READY_BY_UPLOAD).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(BY_FINGERPRINT).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl DocumentRepository for RedbRepository {
    fn insert(&self, document: &Document) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut documents =
                txn.open_table(DOCUMENTS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = document.id.as_bytes();
            if documents.get(key).map_err(|e| StorageError::Io(e.to_string()))?.is_some() {
                return Err(StorageError::DuplicateId(document.id.clone()));
            }

            let bytes = encode_document(document)?;
            documents.insert(key, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;

            if document.status == DocumentStatus::Ready {
                let mut ready =
                    txn.open_table(READY_BY_UPLOAD).map_err(|e| StorageError::Io(e.to_string()))?;
                let ready_key = encode_ready_key(document.uploaded_at, &document.id);
                ready.insert(ready_key.as_slice(), key).map_err(|e| StorageError::Io(e.to_string()))?;
            }

            let mut by_fingerprint =
                txn.open_table(BY_FINGERPRINT).map_err(|e| StorageError::Io(e.to_string()))?;
            let fingerprint_key = encode_fingerprint_key(
                &document.requester_fingerprint,
                document.uploaded_at,
                &document.id,
            );
            by_fingerprint
                .insert(fingerprint_key.as_slice(), key)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Document>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(DOCUMENTS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(id.as_bytes()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => Ok(Some(decode_document(value.value())?)),
            None => Ok(None),
        }
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
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let updated = {
            let mut documents =
                txn.open_table(DOCUMENTS).map_err(|e| StorageError::Io(e.to_string()))?;

            let current = match documents
                .get(id.as_bytes())
                .map_err(|e| StorageError::Io(e.to_string()))?
            {
                Some(value) => decode_document(value.value())?,
                None => return Err(StorageError::NotFound(id.to_string())),
            };

            let updated = apply_if_status(&current, expected, mutate)?;

            let bytes = encode_document(&updated)?;
            documents
                .insert(id.as_bytes(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            if current.status == DocumentStatus::Ready && updated.status != DocumentStatus::Ready {
                let mut ready =
                    txn.open_table(READY_BY_UPLOAD).map_err(|e| StorageError::Io(e.to_string()))?;
                let ready_key = encode_ready_key(current.uploaded_at, id);
                ready.remove(ready_key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
            }

            updated
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(updated)
    }

    fn find_stale_ready(&self, uploaded_before: u64) -> Result<Vec<Document>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let ready = txn.open_table(READY_BY_UPLOAD).map_err(|e| StorageError::Io(e.to_string()))?;
        let documents = txn.open_table(DOCUMENTS).map_err(|e| StorageError::Io(e.to_string()))?;

        // Keys sharing the 8-byte prefix of `uploaded_before` sort after it
        let end_key = uploaded_before.to_be_bytes();
        let results =
            ready.range(..end_key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut stale = Vec::new();
        for result in results {
            let (_, id) = result.map_err(|e| StorageError::Io(e.to_string()))?;

            match documents.get(id.value()).map_err(|e| StorageError::Io(e.to_string()))? {
                Some(value) => {
                    let document = decode_document(value.value())?;
                    debug_assert_eq!(document.status, DocumentStatus::Ready);
                    stale.push(document);
                },
                None => {
                    return Err(StorageError::Serialization(
                        "ready index points at a missing document".to_string(),
                    ));
                },
            }
        }

        Ok(stale)
    }

    fn count_recent_by_fingerprint(
        &self,
        fingerprint: &str,
        since: u64,
    ) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(BY_FINGERPRINT).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut start_key = encode_fingerprint_prefix(fingerprint);
        let mut end_key = start_key.clone();
        start_key.extend_from_slice(&since.to_be_bytes());
        // Ids never contain 0xFF, so this bounds every key with the prefix
        end_key.extend_from_slice(&[0xFF; 9]);

        let results = table
            .range(start_key.as_slice()..end_key.as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut count = 0u64;
        for result in results {
            result.map_err(|e| StorageError::Io(e.to_string()))?;
            count += 1;
        }

        Ok(count)
    }
}

fn encode_document(document: &Document) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(document, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_document(bytes: &[u8]) -> Result<Document, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode (uploaded_at, id) for the ready index.
///
/// Layout: [uploaded_at: 8 bytes BE][id bytes]
/// Lexicographic ordering matches upload order.
fn encode_ready_key(uploaded_at: u64, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&uploaded_at.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Length-prefixed fingerprint, so no fingerprint is a prefix of another.
fn encode_fingerprint_prefix(fingerprint: &str) -> Vec<u8> {
    let len = u32::try_from(fingerprint.len()).unwrap_or(u32::MAX);
    let mut key = Vec::with_capacity(4 + fingerprint.len() + 8 + 32);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(fingerprint.as_bytes());
    key
}

fn encode_fingerprint_key(fingerprint: &str, uploaded_at: u64, id: &str) -> Vec<u8> {
    let mut key = encode_fingerprint_prefix(fingerprint);
    key.extend_from_slice(&uploaded_at.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn document(id: &str, fingerprint: &str, uploaded_at: u64) -> Document {
        Document::new(
            id.to_string(),
            "a.txt".to_string(),
            "text/plain".to_string(),
            3,
            fingerprint.to_string(),
            uploaded_at,
        )
    }

    #[test]
    fn ready_key_orders_by_upload_time() {
        let early = encode_ready_key(9, "doc_z");
        let late = encode_ready_key(10, "doc_a");
        assert!(early < late);
        assert!(late.as_slice() > 10u64.to_be_bytes().as_slice());
    }

    #[test]
    fn fingerprint_prefix_disambiguates() {
        let short = encode_fingerprint_key("ab", 1, "doc_1");
        let long = encode_fingerprint_prefix("abc");
        assert!(!short.starts_with(&long));
    }

    #[test]
    fn insert_and_find() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        let doc = document("doc_1", "fp", 100);
        repo.insert(&doc).unwrap();

        assert_eq!(repo.find_by_id("doc_1").unwrap(), Some(doc));
        assert_eq!(repo.find_by_id("doc_2").unwrap(), None);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        repo.insert(&document("doc_1", "fp", 100)).unwrap();
        let result = repo.insert(&document("doc_1", "other", 200));
        assert_eq!(result, Err(StorageError::DuplicateId("doc_1".to_string())));
        assert_eq!(repo.count_recent_by_fingerprint("other", 0).unwrap(), 0);
    }

    #[test]
    fn terminal_documents_leave_ready_index() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        repo.insert(&document("doc_1", "fp", 100)).unwrap();
        repo.insert(&document("doc_2", "fp", 101)).unwrap();
        repo.update_if_status("doc_1", DocumentStatus::Ready, |doc| doc.mark_downloaded(150))
            .unwrap();

        let stale = repo.find_stale_ready(1_000).unwrap();
        let ids: Vec<_> = stale.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_2"]);

        // Status no longer matters for the rate limit
        assert_eq!(repo.count_recent_by_fingerprint("fp", 100).unwrap(), 2);
    }

    #[test]
    fn stale_cutoff_is_strict() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        repo.insert(&document("doc_1", "fp", 100)).unwrap();

        assert!(repo.find_stale_ready(100).unwrap().is_empty());
        assert_eq!(repo.find_stale_ready(101).unwrap().len(), 1);
    }

    #[test]
    fn conflict_writes_nothing() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        repo.insert(&document("doc_1", "fp", 100)).unwrap();
        repo.update_if_status("doc_1", DocumentStatus::Ready, |doc| doc.mark_expired(200)).unwrap();

        let result =
            repo.update_if_status("doc_1", DocumentStatus::Ready, |doc| doc.mark_downloaded(300));
        assert!(matches!(result, Err(StorageError::Conflict { actual: DocumentStatus::Expired, .. })));

        let stored = repo.find_by_id("doc_1").unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Expired);
        assert_eq!(stored.downloaded_at, None);
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let dir = tempdir().unwrap();
        let repo = RedbRepository::open(dir.path().join("test.redb")).unwrap();

        let mut doc = document("doc_1", "fp", 100);
        doc.mark_downloaded(110).unwrap();
        repo.insert(&doc).unwrap();

        // Expected status matches, but the state machine refuses the move
        let result = repo
            .update_if_status("doc_1", DocumentStatus::Downloaded, |doc| doc.mark_expired(120));
        assert!(matches!(result, Err(StorageError::Transition(_))));
        assert_eq!(repo.find_by_id("doc_1").unwrap(), Some(doc));
    }
}
