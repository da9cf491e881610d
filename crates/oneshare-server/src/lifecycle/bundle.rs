//! Multi-file uploads.
//!
//! A single part is stored as-is. Several parts are packed into one
//! `archive.zip` so that every document still has exactly one blob.

use std::{
    collections::HashSet,
    io::{Cursor, Write},
};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use super::LifecycleError;

/// File name given to a bundle of several parts.
pub const ARCHIVE_FILENAME: &str = "archive.zip";

/// MIME type of a bundle of several parts.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

const DEFAULT_ENTRY_NAME: &str = "file";

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Original file name
    pub filename: String,
    /// MIME type reported by the uploader
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// A file part.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self { filename: filename.into(), content_type: content_type.into(), bytes: bytes.into() }
    }
}

/// Combined size of all parts in bytes.
pub(crate) fn total_size(files: &[UploadFile]) -> u64 {
    files.iter().fold(0u64, |total, file| total.saturating_add(file.bytes.len() as u64))
}

/// Collapse the parts into the single file that gets encrypted.
///
/// # Errors
///
/// - `NoPayload` if there are no parts
/// - `Bundle` if the archive cannot be written
pub(crate) fn bundle(mut files: Vec<UploadFile>) -> Result<UploadFile, LifecycleError> {
    match files.len() {
        0 => Err(LifecycleError::NoPayload),
        1 => Ok(files.swap_remove(0)),
        _ => {
            let bytes = zip_files(&files).map_err(|e| LifecycleError::Bundle(e.to_string()))?;
            Ok(UploadFile::new(ARCHIVE_FILENAME, ARCHIVE_CONTENT_TYPE, bytes))
        },
    }
}

fn zip_files(files: &[UploadFile]) -> zip::result::ZipResult<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut taken = HashSet::with_capacity(files.len());

    for file in files {
        writer.start_file(entry_name(&file.filename, &mut taken), options)?;
        writer.write_all(&file.bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Archive entry name: the base name only, made unique within the archive.
///
/// Directory parts are dropped so the archive cannot extract outside its
/// target directory.
fn entry_name(raw: &str, taken: &mut HashSet<String>) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let base =
        if base.is_empty() || base == "." || base == ".." { DEFAULT_ENTRY_NAME } else { base };

    if taken.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, extension) = match base.rfind('.') {
        Some(dot) if dot > 0 => base.split_at(dot),
        _ => (base, ""),
    };
    (2u32..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_default()
}
