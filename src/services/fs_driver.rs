//! Filesystem-backed flat object store.
//!
//! Object payloads live under `root/{key}` with the key's slashes as real
//! directories; object metadata (content type, etag, image info) lives as
//! JSON sidecars in a reserved `root/.meta/` shadow directory keyed by the
//! percent-encoded full key. The driver itself has no folder concept beyond
//! what the keys imply — folder emulation is layered on top.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::entry::{BlobInfo, ObjectEntry, ObjectMeta},
    services::driver::{
        AppendCapable, StaticWebsiteCapable, StorageDriver, StorageError, StorageResult, io_error,
    },
};

/// Shadow directory holding JSON metadata sidecars; never listed.
const META_DIR: &str = ".meta";

/// Static-website configuration record; never listed.
const SITE_CONFIG: &str = ".static-website";

const MAX_KEY_LEN: usize = 1024;

/// A flat object store persisted on local disk.
pub struct FsDriver {
    name: String,
    root: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SiteConfig {
    enabled: bool,
    index_document: String,
    error_document: String,
}

impl FsDriver {
    /// Create a driver rooted at `root`, creating the directory tree on
    /// first use.
    pub async fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> StorageResult<Self> {
        let driver = Self {
            name: name.into(),
            root: root.into(),
        };
        fs::create_dir_all(driver.root.join(META_DIR))
            .await
            .map_err(|e| driver.io(":init", e))?;
        Ok(driver)
    }

    fn io(&self, key: &str, err: std::io::Error) -> StorageError {
        io_error(&self.name, key, err)
    }

    /// Basic key validation to avoid trivial path traversal vectors and
    /// collisions with the reserved sidecar directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidArgument(format!(
                "invalid object key `{key}`"
            )));
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidArgument(format!(
                "invalid object key `{key}`"
            )));
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidArgument(format!(
                "invalid object key `{key}`"
            )));
        }
        let first = key.split('/').next().unwrap_or(key);
        if first == META_DIR || first == SITE_CONFIG {
            return Err(StorageError::InvalidArgument(format!(
                "key `{key}` collides with a reserved name"
            )));
        }
        Ok(())
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root
            .join(META_DIR)
            .join(urlencoding::encode(key).into_owned())
    }

    async fn read_meta(&self, key: &str) -> ObjectMeta {
        match fs::read(self.meta_path(key)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => ObjectMeta::default(),
        }
    }

    async fn write_meta(&self, key: &str, meta: &ObjectMeta) -> StorageResult<()> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| StorageError::InvalidArgument(format!("metadata for `{key}`: {e}")))?;
        fs::write(self.meta_path(key), bytes)
            .await
            .map_err(|e| self.io(key, e))
    }

    async fn remove_meta(&self, key: &str) {
        if let Err(err) = fs::remove_file(self.meta_path(key)).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("could not remove metadata sidecar for {}: {}", key, err);
            }
        }
    }

    async fn blob_info(&self, key: &str, md: &std::fs::Metadata) -> BlobInfo {
        let modified = md
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let created = md.created().map(DateTime::<Utc>::from).unwrap_or(modified);
        BlobInfo {
            key: key.to_string(),
            size: md.len() as i64,
            created,
            modified,
            meta: self.read_meta(key).await,
        }
    }

    async fn ensure_parent(&self, path: &Path, key: &str) -> StorageResult<PathBuf> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::InvalidArgument(format!("key `{key}` has no parent")))?;
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| self.io(key, e))?;
        Ok(parent)
    }

    /// Recursively remove empty directories up to (not including) the root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.root) && current != self.root {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl StorageDriver for FsDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.ensure_key_safe(key)?;
        match fs::metadata(self.blob_path(key)).await {
            Ok(md) => Ok(md.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(self.io(key, err)),
        }
    }

    async fn head(&self, key: &str) -> StorageResult<BlobInfo> {
        self.ensure_key_safe(key)?;
        let md = fs::metadata(self.blob_path(key))
            .await
            .map_err(|e| self.io(key, e))?;
        if !md.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.blob_info(key, &md).await)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(prefix.trim_end_matches('/'))
        };

        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            // A prefix with no objects beneath it is an empty listing, not
            // an error: flat stores have no directory to be "missing".
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io(prefix, err)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| self.io(prefix, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if prefix.is_empty() && (name == META_DIR || name == SITE_CONFIG) {
                continue;
            }
            let md = match entry.metadata().await {
                Ok(md) => md,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(self.io(prefix, err)),
            };
            if md.is_dir() {
                entries.push(ObjectEntry::CommonPrefix(format!("{prefix}{name}/")));
            } else {
                let key = format!("{prefix}{name}");
                entries.push(ObjectEntry::Blob(self.blob_info(&key, &md).await));
            }
        }
        Ok(entries)
    }

    async fn create_folder(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let dir = self.blob_path(key);
        match fs::metadata(&dir).await {
            // Folder (or content beneath it) already present.
            Ok(md) if md.is_dir() => return Ok(()),
            Ok(_) => return Err(StorageError::AlreadyExists(key.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(self.io(key, err)),
        }
        fs::create_dir_all(&dir).await.map_err(|e| self.io(key, e))?;
        let marker = dir.join(crate::services::folders::FOLDER_SENTINEL);
        fs::write(&marker, b"").await.map_err(|e| self.io(key, e))
    }

    async fn delete_if_exists(&self, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let path = self.blob_path(key);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(self.io(key, err)),
        }
        self.remove_meta(key).await;
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StorageResult<()> {
        self.ensure_key_safe(src)?;
        self.ensure_key_safe(dst)?;
        let src_path = self.blob_path(src);
        match fs::metadata(&src_path).await {
            Ok(md) if md.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(src.to_string())),
            Err(err) => return Err(self.io(src, err)),
        }
        let dst_path = self.blob_path(dst);
        self.ensure_parent(&dst_path, dst).await?;
        fs::copy(&src_path, &dst_path)
            .await
            .map_err(|e| self.io(src, e))?;
        let meta = self.read_meta(src).await;
        self.write_meta(dst, &meta).await
    }

    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let path = self.blob_path(key);
        let parent = self.ensure_parent(&path, key).await?;

        // Write to a temp file and rename into place so readers never see a
        // half-written object.
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result: StorageResult<()> = async {
            let mut file = File::create(&tmp_path).await.map_err(|e| self.io(key, e))?;
            file.write_all(&data).await.map_err(|e| self.io(key, e))?;
            file.flush().await.map_err(|e| self.io(key, e))?;
            file.sync_all().await.map_err(|e| self.io(key, e))?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&path).await.map_err(|e| self.io(key, e))?;
                fs::rename(&tmp_path, &path)
                    .await
                    .map_err(|e| self.io(key, e))?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(self.io(key, err));
            }
        }

        let mut stored = meta.clone();
        stored.etag = Some(format!("{:x}", md5::compute(&data)));
        self.write_meta(key, &stored).await
    }

    async fn open_read(&self, key: &str) -> StorageResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.ensure_key_safe(key)?;
        let file = File::open(self.blob_path(key))
            .await
            .map_err(|e| self.io(key, e))?;
        Ok(Box::new(file))
    }

    async fn bytes_consumed(&self) -> StorageResult<i64> {
        let mut total: i64 = 0;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(self.io(":usage", err)),
            };
            while let Some(entry) = reader.next_entry().await.map_err(|e| self.io(":usage", e))? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if dir == self.root && (name == META_DIR || name == SITE_CONFIG) {
                    continue;
                }
                let md = match entry.metadata().await {
                    Ok(md) => md,
                    Err(_) => continue,
                };
                if md.is_dir() {
                    stack.push(entry.path());
                } else {
                    total += md.len() as i64;
                }
            }
        }
        Ok(total)
    }

    fn as_append(&self) -> Option<&dyn AppendCapable> {
        Some(self)
    }

    fn as_static_website(&self) -> Option<&dyn StaticWebsiteCapable> {
        Some(self)
    }
}

#[async_trait]
impl AppendCapable for FsDriver {
    async fn append_chunk(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let path = self.blob_path(key);
        self.ensure_parent(&path, key).await?;

        let fresh = !self.exists(key).await?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| self.io(key, e))?;
        file.write_all(&data).await.map_err(|e| self.io(key, e))?;
        file.flush().await.map_err(|e| self.io(key, e))?;
        file.sync_all().await.map_err(|e| self.io(key, e))?;

        if fresh {
            // Appended objects carry no etag; there is no one-shot payload
            // to checksum.
            let mut stored = meta.clone();
            stored.etag = None;
            self.write_meta(key, &stored).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StaticWebsiteCapable for FsDriver {
    async fn set_static_website(
        &self,
        enabled: bool,
        index_document: &str,
        error_document: &str,
    ) -> StorageResult<()> {
        let config = SiteConfig {
            enabled,
            index_document: index_document.to_string(),
            error_document: error_document.to_string(),
        };
        let bytes = serde_json::to_vec(&config).map_err(|e| StorageError::BackendUnavailable {
            backend: self.name.clone(),
            reason: e.to_string(),
        })?;
        fs::write(self.root.join(SITE_CONFIG), bytes)
            .await
            .map_err(|e| self.io(SITE_CONFIG, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::folders::FOLDER_SENTINEL;

    async fn driver() -> (tempfile::TempDir, FsDriver) {
        let dir = tempfile::tempdir().unwrap();
        let driver = FsDriver::new("disk", dir.path()).await.unwrap();
        (dir, driver)
    }

    #[tokio::test]
    async fn put_head_and_read_roundtrip() {
        let (_dir, driver) = driver().await;
        let meta = ObjectMeta {
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        driver
            .put_object("docs/a.txt", Bytes::from_static(b"hello"), &meta)
            .await
            .unwrap();

        let info = driver.head("docs/a.txt").await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.meta.content_type.as_deref(), Some("text/plain"));
        assert!(info.meta.etag.is_some());
        assert!(driver.exists("docs/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn head_of_missing_key_is_not_found() {
        let (_dir, driver) = driver().await;
        match driver.head("nope.txt").await {
            Err(StorageError::NotFound(key)) => assert_eq!(key, "nope.txt"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_returns_blobs_and_common_prefixes() {
        let (_dir, driver) = driver().await;
        let meta = ObjectMeta::default();
        driver
            .put_object("top.txt", Bytes::from_static(b"x"), &meta)
            .await
            .unwrap();
        driver
            .put_object("sub/inner.txt", Bytes::from_static(b"y"), &meta)
            .await
            .unwrap();

        let entries = driver.list("").await.unwrap();
        let blobs: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                ObjectEntry::Blob(b) => Some(b.key.clone()),
                _ => None,
            })
            .collect();
        let prefixes: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                ObjectEntry::CommonPrefix(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(blobs, vec!["top.txt"]);
        assert_eq!(prefixes, vec!["sub/"]);
    }

    #[tokio::test]
    async fn listing_never_exposes_the_meta_dir() {
        let (_dir, driver) = driver().await;
        driver
            .put_object("a.txt", Bytes::from_static(b"x"), &ObjectMeta::default())
            .await
            .unwrap();
        let entries = driver.list("").await.unwrap();
        assert!(entries.iter().all(|e| match e {
            ObjectEntry::CommonPrefix(p) => !p.starts_with(META_DIR),
            ObjectEntry::Blob(b) => !b.key.starts_with(META_DIR),
        }));
    }

    #[tokio::test]
    async fn create_folder_writes_marker_and_is_idempotent() {
        let (_dir, driver) = driver().await;
        driver.create_folder("empty").await.unwrap();
        driver.create_folder("empty").await.unwrap();

        let marker = format!("empty/{FOLDER_SENTINEL}");
        assert!(driver.exists(&marker).await.unwrap());
        let entries = driver.list("empty/").await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn delete_prunes_empty_directories() {
        let (dir, driver) = driver().await;
        driver
            .put_object("a/b/c.txt", Bytes::from_static(b"x"), &ObjectMeta::default())
            .await
            .unwrap();
        driver.delete_if_exists("a/b/c.txt").await.unwrap();
        driver.delete_if_exists("a/b/c.txt").await.unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn copy_preserves_payload_and_metadata() {
        let (_dir, driver) = driver().await;
        let meta = ObjectMeta {
            content_type: Some("image/png".into()),
            ..Default::default()
        };
        driver
            .put_object("src.png", Bytes::from_static(b"pixels"), &meta)
            .await
            .unwrap();
        driver.copy_object("src.png", "dst.png").await.unwrap();

        let copied = driver.head("dst.png").await.unwrap();
        assert_eq!(copied.size, 6);
        assert_eq!(copied.meta.content_type.as_deref(), Some("image/png"));
        assert!(driver.exists("src.png").await.unwrap());
    }

    #[tokio::test]
    async fn copy_of_missing_source_fails() {
        let (_dir, driver) = driver().await;
        assert!(matches!(
            driver.copy_object("ghost.txt", "dst.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn append_chunks_concatenate() {
        let (_dir, driver) = driver().await;
        let append = driver.as_append().unwrap();
        let meta = ObjectMeta::default();
        append
            .append_chunk("big.bin", Bytes::from_static(b"aaa"), &meta)
            .await
            .unwrap();
        append
            .append_chunk("big.bin", Bytes::from_static(b"bb"), &meta)
            .await
            .unwrap();
        assert_eq!(driver.head("big.bin").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn reserved_and_traversal_keys_are_rejected() {
        let (_dir, driver) = driver().await;
        for key in ["", "../escape", "/abs", ".meta/x", ".static-website"] {
            assert!(matches!(
                driver.exists(key).await,
                Err(StorageError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn bytes_consumed_excludes_sidecars() {
        let (_dir, driver) = driver().await;
        driver
            .put_object("a.txt", Bytes::from_static(b"12345"), &ObjectMeta::default())
            .await
            .unwrap();
        assert_eq!(driver.bytes_consumed().await.unwrap(), 5);
    }
}
