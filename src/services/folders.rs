//! Folder emulation over flat prefix listings.
//!
//! Flat object stores have no folder concept; an otherwise-empty folder is
//! made discoverable by a zero-length sentinel object. The sentinel name and
//! every piece of exclusion logic live here and only here: drivers return
//! raw listings and never special-case the marker.

use chrono::Utc;

use crate::{
    models::entry::{DirectoryEntry, ObjectEntry},
    services::{
        driver::{StorageDriver, StorageError, StorageResult},
        paths,
    },
};

/// Reserved name of the zero-length object that keeps an empty folder
/// discoverable by prefix listing.
pub const FOLDER_SENTINEL: &str = "folder.stubxx";

/// Whether a key addresses a folder marker.
pub fn is_sentinel(key: &str) -> bool {
    paths::file_name(key) == FOLDER_SENTINEL
}

/// Key of the marker object for a folder.
pub fn marker_key(folder: &str) -> String {
    format!("{folder}/{FOLDER_SENTINEL}")
}

/// Listing prefix scoped to the inside of a folder.
///
/// The trailing slash keeps `photos` from matching a sibling `photos-old`.
pub fn listing_prefix(folder: &str) -> String {
    if folder.is_empty() {
        String::new()
    } else {
        format!("{folder}/")
    }
}

/// The visible contents of a folder: files by their own metadata, sub-folders
/// with a one-level probe for the `has_sub_directories` flag. No ordering is
/// guaranteed; sorting is a presentation concern.
pub async fn folder_contents(
    driver: &dyn StorageDriver,
    folder: &str,
) -> StorageResult<Vec<DirectoryEntry>> {
    let prefix = listing_prefix(folder);
    let mut entries = Vec::new();
    for entry in driver.list(&prefix).await? {
        match entry {
            ObjectEntry::Blob(blob) => {
                if is_sentinel(&blob.key) {
                    continue;
                }
                entries.push(DirectoryEntry::file(&blob));
            }
            ObjectEntry::CommonPrefix(sub_prefix) => {
                let sub_folder = sub_prefix.trim_end_matches('/');
                let deeper = driver.list(&sub_prefix).await?;
                let has_sub = deeper
                    .iter()
                    .any(|e| matches!(e, ObjectEntry::CommonPrefix(_)));
                entries.push(DirectoryEntry::directory(
                    sub_folder,
                    has_sub,
                    folder_timestamp(driver, sub_folder).await,
                ));
            }
        }
    }
    Ok(entries)
}

/// Whether a folder exists: a marker object, or any descendant at all.
pub async fn folder_exists(driver: &dyn StorageDriver, folder: &str) -> StorageResult<bool> {
    if folder.is_empty() {
        return Ok(true);
    }
    if driver.exists(&marker_key(folder)).await? {
        return Ok(true);
    }
    Ok(!driver.list(&listing_prefix(folder)).await?.is_empty())
}

/// GetObject semantics: the entry at `key`, detecting directory-ness for
/// keys that hold no blob by probing for a marker or descendants.
pub async fn entry_for(driver: &dyn StorageDriver, key: &str) -> StorageResult<DirectoryEntry> {
    match driver.head(key).await {
        Ok(blob) => Ok(DirectoryEntry::file(&blob)),
        Err(StorageError::NotFound(_)) => {
            if !folder_exists(driver, key).await? {
                return Err(StorageError::NotFound(key.to_string()));
            }
            let deeper = driver.list(&listing_prefix(key)).await?;
            let has_sub = deeper
                .iter()
                .any(|e| matches!(e, ObjectEntry::CommonPrefix(_)));
            Ok(DirectoryEntry::directory(
                key,
                has_sub,
                folder_timestamp(driver, key).await,
            ))
        }
        Err(err) => Err(err),
    }
}

/// Every object key below a folder, markers included, in no guaranteed
/// order. Keeping the markers lets a batch copy carry empty sub-folders.
pub async fn collect_keys(driver: &dyn StorageDriver, folder: &str) -> StorageResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut stack = vec![listing_prefix(folder)];
    while let Some(prefix) = stack.pop() {
        for entry in driver.list(&prefix).await? {
            match entry {
                ObjectEntry::Blob(blob) => keys.push(blob.key),
                ObjectEntry::CommonPrefix(sub) => stack.push(sub),
            }
        }
    }
    Ok(keys)
}

/// Best available timestamp for a folder: its marker's creation time when a
/// marker exists, otherwise now.
async fn folder_timestamp(
    driver: &dyn StorageDriver,
    folder: &str,
) -> chrono::DateTime<Utc> {
    match driver.head(&marker_key(folder)).await {
        Ok(blob) => blob.created,
        Err(_) => Utc::now(),
    }
}
