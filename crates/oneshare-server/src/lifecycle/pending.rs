//! Compensation guard for the upload two-phase write.

use tracing::{debug, error};

use crate::storage::BlobStore;

/// A blob written ahead of its metadata record.
///
/// Dropping the guard without calling [`PendingBlob::commit`] deletes the
/// blob. Deletion failures are logged; the orphan is harmless because no
/// record points at it.
pub(crate) struct PendingBlob<'a, B: BlobStore> {
    blobs: &'a B,
    key: &'a str,
    committed: bool,
}

impl<'a, B: BlobStore> PendingBlob<'a, B> {
    /// Guard a blob that was just written under `key`.
    pub(crate) fn new(blobs: &'a B, key: &'a str) -> Self {
        Self { blobs, key, committed: false }
    }

    /// The metadata record is durable; keep the blob.
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl<B: BlobStore> Drop for PendingBlob<'_, B> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        match self.blobs.delete(self.key) {
            Ok(_) => debug!(document_id = %self.key, "rolled back uncommitted blob"),
            Err(e) => {
                error!(document_id = %self.key, error = %e, "failed to roll back uncommitted blob");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[test]
    fn drop_without_commit_deletes() {
        let blobs = MemoryBlobStore::new();
        blobs.write("doc_1", b"sealed").unwrap();

        drop(PendingBlob::new(&blobs, "doc_1"));

        assert!(!blobs.contains("doc_1"));
    }

    #[test]
    fn commit_keeps_blob() {
        let blobs = MemoryBlobStore::new();
        blobs.write("doc_1", b"sealed").unwrap();

        PendingBlob::new(&blobs, "doc_1").commit();

        assert!(blobs.contains("doc_1"));
        assert_eq!(blobs.delete_calls(), 0);
    }
}
