//! File-system blob store.
//!
//! One file per blob, named by its key. Writes go to a temporary sibling and
//! are renamed into place after `fsync`, so a reader never sees a partial
//! envelope.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{BlobStore, StorageError};

const TEMP_SUFFIX: &str = ".partial";

/// Blob store rooted at a directory.
///
/// Clone is cheap (Arc).
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: Arc<PathBuf>,
}

impl FsBlobStore {
    /// Open a blob store at `root`, creating the directory if needed.
    ///
    /// Leftover temporary files from an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created or read.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                fs::remove_file(&path)?;
            }
        }

        Ok(Self { root: Arc::new(root) })
    }

    /// Directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.len() <= 128
            && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let temp = self.root.join(format!("{key}{TEMP_SUFFIX}"));

        if let Err(e) = write_synced(&temp, bytes).and_then(|()| fs::rename(&temp, &path)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn write_read_delete() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        store.write("doc_abc", b"sealed bytes").unwrap();
        assert_eq!(store.read("doc_abc").unwrap(), Some(b"sealed bytes".to_vec()));

        assert!(store.delete("doc_abc").unwrap());
        assert!(!store.delete("doc_abc").unwrap());
        assert_eq!(store.read("doc_abc").unwrap(), None);
    }

    #[test]
    fn overwrite_replaces() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();

        store.write("doc_abc", b"first").unwrap();
        store.write("doc_abc", b"second").unwrap();
        assert_eq!(store.read("doc_abc").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs")).unwrap();

        for key in ["", "../escape", "a/b", "doc.txt", "doc_1.partial"] {
            assert!(matches!(store.write(key, b"x"), Err(StorageError::InvalidKey(_))), "{key}");
            assert!(matches!(store.read(key), Err(StorageError::InvalidKey(_))), "{key}");
        }
    }

    #[test]
    fn open_sweeps_partial_writes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(format!("doc_abc{TEMP_SUFFIX}")), b"torn").unwrap();
        fs::write(dir.path().join("doc_keep"), b"whole").unwrap();

        let store = FsBlobStore::open(dir.path()).unwrap();

        assert!(!dir.path().join(format!("doc_abc{TEMP_SUFFIX}")).exists());
        assert_eq!(store.read("doc_keep").unwrap(), Some(b"whole".to_vec()));
    }
}
