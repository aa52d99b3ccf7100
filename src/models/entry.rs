//! Directory entries and raw listing results.
//!
//! `ObjectEntry` is what a backend returns from a prefix listing; the folder
//! emulation engine turns it into the `DirectoryEntry` records callers see.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Pixel dimensions (and optional DPI) recorded for image uploads.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub dpi: Option<u32>,
}

/// Backend-side object metadata persisted alongside the payload.
///
/// The flat stores keep no relational state; whatever a backend knows about
/// an object beyond its bytes lives in this record.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ObjectMeta {
    /// Content type (MIME type) declared at upload time.
    pub content_type: Option<String>,

    /// MD5 checksum of the payload, when it was written in one piece.
    pub etag: Option<String>,

    /// Image dimensions, when the caller supplied them.
    pub image: Option<ImageInfo>,
}

/// Metadata for a single blob as reported by a backend.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlobInfo {
    /// Full storage key of the blob.
    pub key: String,

    /// Payload size in bytes.
    pub size: i64,

    /// When the blob was created.
    pub created: DateTime<Utc>,

    /// When the blob was last written.
    pub modified: DateTime<Utc>,

    /// Content type, etag, and image info as stored by the backend.
    pub meta: ObjectMeta,
}

/// One result of a delimiter-based prefix listing: either a blob that sits
/// directly under the prefix or a common prefix one level down (a folder).
#[derive(Clone, Debug)]
pub enum ObjectEntry {
    Blob(BlobInfo),
    CommonPrefix(String),
}

/// The metadata record returned to callers for a file or emulated folder.
///
/// Invariant: `is_directory == true` implies `size == 0` and an empty
/// `extension`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DirectoryEntry {
    /// Entry name without any directory components.
    pub name: String,

    /// Full path of the entry, forward-slash delimited.
    pub path: String,

    pub is_directory: bool,

    /// For directories: whether at least one sub-directory exists below it.
    pub has_sub_directories: bool,

    /// Payload size in bytes; always 0 for directories.
    pub size: i64,

    /// File extension without the dot; empty for directories.
    pub extension: String,

    pub created_utc: DateTime<Utc>,
    pub modified_utc: DateTime<Utc>,
    pub created_local: DateTime<Local>,
    pub modified_local: DateTime<Local>,

    /// Content type, when known.
    pub content_type: Option<String>,

    /// Image dimensions, when known.
    pub image: Option<ImageInfo>,
}

impl DirectoryEntry {
    /// Build a file entry from a backend blob record.
    pub fn file(blob: &BlobInfo) -> Self {
        let name = leaf_name(&blob.key);
        let extension = extension_of(&name);
        Self {
            name,
            path: blob.key.clone(),
            is_directory: false,
            has_sub_directories: false,
            size: blob.size,
            extension,
            created_utc: blob.created,
            modified_utc: blob.modified,
            created_local: blob.created.into(),
            modified_local: blob.modified.into(),
            content_type: blob.meta.content_type.clone(),
            image: blob.meta.image,
        }
    }

    /// Build a directory entry for an emulated folder.
    pub fn directory(path: &str, has_sub_directories: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: leaf_name(path),
            path: path.to_string(),
            is_directory: true,
            has_sub_directories,
            size: 0,
            extension: String::new(),
            created_utc: timestamp,
            modified_utc: timestamp,
            created_local: timestamp.into(),
            modified_local: timestamp.into(),
            content_type: None,
            image: None,
        }
    }
}

/// Last path segment of a key or prefix.
fn leaf_name(key: &str) -> String {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(key)
        .to_string()
}

/// Extension without the leading dot; empty when the name has none.
fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entry_has_no_size_or_extension() {
        let entry = DirectoryEntry::directory("docs/reports.2025", true, Utc::now());
        assert!(entry.is_directory);
        assert_eq!(entry.name, "reports.2025");
        assert_eq!(entry.size, 0);
        assert_eq!(entry.extension, "");
    }

    #[test]
    fn file_entry_takes_name_and_extension_from_key() {
        let blob = BlobInfo {
            key: "docs/report.final.pdf".into(),
            size: 42,
            created: Utc::now(),
            modified: Utc::now(),
            meta: ObjectMeta::default(),
        };
        let entry = DirectoryEntry::file(&blob);
        assert_eq!(entry.name, "report.final.pdf");
        assert_eq!(entry.extension, "pdf");
        assert_eq!(entry.size, 42);
        assert!(!entry.is_directory);
    }

    #[test]
    fn dotfiles_have_no_extension() {
        assert_eq!(extension_of(".gitignore"), "");
        assert_eq!(extension_of("archive."), "");
        assert_eq!(extension_of("plain"), "");
    }
}
