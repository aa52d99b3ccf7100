//! In-memory flat object store.
//!
//! Backs tests and doubles as a second redundancy target for exercising the
//! multiplexer. Keys map to full payloads plus metadata in a `BTreeMap`, so
//! prefix scans come out in key order for free.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::{
    models::entry::{BlobInfo, ObjectEntry, ObjectMeta},
    services::{
        driver::{AppendCapable, StorageDriver, StorageError, StorageResult},
        folders::FOLDER_SENTINEL,
    },
};

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    meta: ObjectMeta,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

/// An in-memory flat object store.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    name: String,
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of stored objects, markers included.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidArgument(format!(
                "invalid object key `{key}`"
            )));
        }
        Ok(())
    }

    fn blob_info(key: &str, stored: &StoredObject) -> BlobInfo {
        BlobInfo {
            key: key.to_string(),
            size: stored.data.len() as i64,
            created: stored.created,
            modified: stored.modified,
            meta: stored.meta.clone(),
        }
    }

    fn has_descendants(&self, folder: &str) -> bool {
        let prefix = format!("{folder}/");
        self.objects
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .next()
            .is_some()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.ensure_key_safe(key)?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<BlobInfo> {
        self.ensure_key_safe(key)?;
        self.objects
            .read()
            .get(key)
            .map(|stored| Self::blob_info(key, stored))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let objects = self.objects.read();
        let mut blobs = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, stored) in objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            let remainder = &key[prefix.len()..];
            match remainder.find('/') {
                Some(pos) => {
                    prefixes.insert(format!("{prefix}{}", &remainder[..pos + 1]));
                }
                None => blobs.push(ObjectEntry::Blob(Self::blob_info(key, stored))),
            }
        }
        let mut entries = blobs;
        entries.extend(prefixes.into_iter().map(ObjectEntry::CommonPrefix));
        Ok(entries)
    }

    async fn create_folder(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let marker = format!("{key}/{FOLDER_SENTINEL}");
        if self.objects.read().contains_key(&marker) || self.has_descendants(key) {
            return Ok(());
        }
        let now = Utc::now();
        self.objects.write().insert(
            marker,
            StoredObject {
                data: Vec::new(),
                meta: ObjectMeta::default(),
                created: now,
                modified: now,
            },
        );
        Ok(())
    }

    async fn delete_if_exists(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        self.objects.write().remove(key);
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StorageResult<()> {
        self.ensure_key_safe(src)?;
        self.ensure_key_safe(dst)?;
        let mut objects = self.objects.write();
        let stored = objects
            .get(src)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
        let now = Utc::now();
        objects.insert(
            dst.to_string(),
            StoredObject {
                created: now,
                modified: now,
                ..stored
            },
        );
        Ok(())
    }

    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let now = Utc::now();
        let mut stored_meta = meta.clone();
        stored_meta.etag = Some(format!("{:x}", md5::compute(&data)));
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                meta: stored_meta,
                created: now,
                modified: now,
            },
        );
        Ok(())
    }

    async fn open_read(&self, key: &str) -> StorageResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.ensure_key_safe(key)?;
        let data = self
            .objects
            .read()
            .get(key)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn bytes_consumed(&self) -> StorageResult<i64> {
        Ok(self
            .objects
            .read()
            .values()
            .map(|stored| stored.data.len() as i64)
            .sum())
    }

    fn as_append(&self) -> Option<&dyn AppendCapable> {
        Some(self)
    }
}

#[async_trait]
impl AppendCapable for MemoryDriver {
    async fn append_chunk(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let now = Utc::now();
        let mut objects = self.objects.write();
        let stored = objects.entry(key.to_string()).or_insert_with(|| {
            let mut stored_meta = meta.clone();
            stored_meta.etag = None;
            StoredObject {
                data: Vec::new(),
                meta: stored_meta,
                created: now,
                modified: now,
            }
        });
        stored.data.extend_from_slice(&data);
        stored.modified = now;
        Ok(())
    }
}
