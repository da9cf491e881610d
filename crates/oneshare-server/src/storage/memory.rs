#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use oneshare_core::{Document, DocumentStatus, TransitionError};

use super::{BlobStore, DocumentRepository, StorageError, apply_if_status};

/// In-memory document repository for testing and simulation
///
/// A single mutex guards the whole map, which makes `update_if_status`
/// trivially atomic. Queries scan every record.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<HashMap<String, Document>>>,
}

impl MemoryRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn document_count(&self) -> usize {
        self.lock().len()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Document>> {
        self.inner.lock().expect("MemoryRepository mutex poisoned")
    }
}

impl DocumentRepository for MemoryRepository {
    fn insert(&self, document: &Document) -> Result<(), StorageError> {
        let mut documents = self.lock();
        if documents.contains_key(&document.id) {
            return Err(StorageError::DuplicateId(document.id.clone()));
        }
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Document>, StorageError> {
        Ok(self.lock().get(id).cloned())
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
        let mut documents = self.lock();
        let current = documents.get(id).ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let updated = apply_if_status(current, expected, mutate)?;
        documents.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    fn find_stale_ready(&self, uploaded_before: u64) -> Result<Vec<Document>, StorageError> {
        let mut stale: Vec<Document> = self
            .lock()
            .values()
            .filter(|doc| doc.status == DocumentStatus::Ready && doc.uploaded_at < uploaded_before)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(stale)
    }

    fn count_recent_by_fingerprint(
        &self,
        fingerprint: &str,
        since: u64,
    ) -> Result<u64, StorageError> {
        let count = self
            .lock()
            .values()
            .filter(|doc| doc.requester_fingerprint == fingerprint && doc.uploaded_at >= since)
            .count();
        Ok(count as u64)
    }
}

/// In-memory blob store for testing and simulation
///
/// Counts delete calls so tests can check that a blob is removed by exactly
/// one winning path.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<MemoryBlobInner>>,
}

#[derive(Default)]
struct MemoryBlobInner {
    blobs: HashMap<String, Vec<u8>>,
    delete_calls: usize,
}

impl MemoryBlobStore {
    /// Create a new empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a blob.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().blobs.contains_key(key)
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Number of `delete` calls so far, including ones that found nothing.
    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MemoryBlobInner> {
        self.inner.lock().expect("MemoryBlobStore mutex poisoned")
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.lock().blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().blobs.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        inner.delete_calls += 1;
        Ok(inner.blobs.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, fingerprint: &str, uploaded_at: u64) -> Document {
        Document::new(
            id.to_string(),
            "a.txt".to_string(),
            "text/plain".to_string(),
            1,
            fingerprint.to_string(),
            uploaded_at,
        )
    }

    #[test]
    fn duplicate_insert_rejected() {
        let repo = MemoryRepository::new();
        repo.insert(&document("doc_1", "fp", 10)).unwrap();

        let result = repo.insert(&document("doc_1", "fp", 11));
        assert_eq!(result, Err(StorageError::DuplicateId("doc_1".to_string())));
        assert_eq!(repo.document_count(), 1);
    }

    #[test]
    fn update_if_status_conflict_leaves_record() {
        let repo = MemoryRepository::new();
        repo.insert(&document("doc_1", "fp", 10)).unwrap();
        repo.update_if_status("doc_1", DocumentStatus::Ready, |doc| doc.mark_downloaded(20))
            .unwrap();

        let result =
            repo.update_if_status("doc_1", DocumentStatus::Ready, |doc| doc.mark_expired(30));
        assert!(matches!(
            result,
            Err(StorageError::Conflict { actual: DocumentStatus::Downloaded, .. })
        ));

        let stored = repo.find_by_id("doc_1").unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Downloaded);
        assert_eq!(stored.updated_at, Some(20));
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let repo = MemoryRepository::new();
        let result = repo.update_if_status("nope", DocumentStatus::Ready, |_| Ok(()));
        assert_eq!(result, Err(StorageError::NotFound("nope".to_string())));
    }

    #[test]
    fn stale_query_is_strict_and_ready_only() {
        let repo = MemoryRepository::new();
        repo.insert(&document("doc_old", "fp", 5)).unwrap();
        repo.insert(&document("doc_edge", "fp", 10)).unwrap();
        repo.insert(&document("doc_gone", "fp", 1)).unwrap();
        repo.update_if_status("doc_gone", DocumentStatus::Ready, |doc| doc.mark_downloaded(2))
            .unwrap();

        let stale = repo.find_stale_ready(10).unwrap();
        let ids: Vec<_> = stale.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_old"]);
    }

    #[test]
    fn fingerprint_count_is_inclusive_of_since() {
        let repo = MemoryRepository::new();
        repo.insert(&document("doc_1", "fp", 100)).unwrap();
        repo.insert(&document("doc_2", "fp", 99)).unwrap();
        repo.insert(&document("doc_3", "other", 150)).unwrap();

        assert_eq!(repo.count_recent_by_fingerprint("fp", 100).unwrap(), 1);
        assert_eq!(repo.count_recent_by_fingerprint("fp", 0).unwrap(), 2);
    }

    #[test]
    fn blob_delete_is_idempotent() {
        let blobs = MemoryBlobStore::new();
        blobs.write("doc_1", b"sealed").unwrap();

        assert!(blobs.delete("doc_1").unwrap());
        assert!(!blobs.delete("doc_1").unwrap());
        assert_eq!(blobs.delete_calls(), 2);
        assert_eq!(blobs.read("doc_1").unwrap(), None);
    }
}
