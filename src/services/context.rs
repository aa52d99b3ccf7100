//! The storage context: the façade callers talk to.
//!
//! Owns the configured driver set, reads through the primary backend, and
//! fans every mutating call out to all backends concurrently. Copy and
//! rename run the verified-copy protocol: full pre-flight before any copy,
//! per-key copy then verify across every backend, rollback of the failed
//! key's destination copies, source deletion only after verification.

use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::{
    config::{AppConfig, BackendKind},
    models::{chunk::UploadChunkMetadata, entry::DirectoryEntry},
    services::{
        chunks,
        driver::{FanoutFailure, StorageDriver, StorageError, StorageResult},
        folders,
        fs_driver::FsDriver,
        memory_driver::MemoryDriver,
        paths,
    },
};

pub struct StorageContext {
    drivers: Vec<Arc<dyn StorageDriver>>,
    primary: usize,
}

impl StorageContext {
    /// Build a context over an ordered driver set; `primary_name` selects
    /// the read backend.
    pub fn new(
        drivers: Vec<Arc<dyn StorageDriver>>,
        primary_name: &str,
    ) -> StorageResult<Self> {
        if drivers.is_empty() {
            return Err(StorageError::InvalidArgument(
                "at least one backend must be configured".into(),
            ));
        }
        let primary = drivers
            .iter()
            .position(|d| d.name() == primary_name)
            .ok_or_else(|| {
                StorageError::InvalidArgument(format!(
                    "primary backend `{primary_name}` is not configured"
                ))
            })?;
        Ok(Self { drivers, primary })
    }

    /// Construct the driver set described by the configuration.
    pub async fn from_config(cfg: &AppConfig) -> StorageResult<Self> {
        let mut drivers: Vec<Arc<dyn StorageDriver>> = Vec::with_capacity(cfg.backends.len());
        for backend in &cfg.backends {
            match backend.kind {
                BackendKind::Fs => {
                    let root = backend.root.clone().ok_or_else(|| {
                        StorageError::InvalidArgument(format!(
                            "backend `{}` needs a root directory",
                            backend.name
                        ))
                    })?;
                    drivers.push(Arc::new(FsDriver::new(backend.name.clone(), root).await?));
                }
                BackendKind::Memory => {
                    drivers.push(Arc::new(MemoryDriver::new(backend.name.clone())));
                }
            }
        }
        Self::new(drivers, &cfg.primary)
    }

    pub fn drivers(&self) -> &[Arc<dyn StorageDriver>] {
        &self.drivers
    }

    fn primary(&self) -> &dyn StorageDriver {
        self.drivers[self.primary].as_ref()
    }

    pub fn primary_name(&self) -> &str {
        self.primary().name()
    }

    // --- reads (primary backend) ---

    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        let key = paths::encode(path);
        if paths::is_root(&key) {
            return Ok(true);
        }
        if self.primary().exists(&key).await? {
            return Ok(true);
        }
        folders::folder_exists(self.primary(), &key).await
    }

    pub async fn get_file(&self, path: &str) -> StorageResult<DirectoryEntry> {
        let key = paths::encode(path);
        if paths::is_root(&key) {
            return Err(StorageError::InvalidArgument(
                "the storage root has no entry".into(),
            ));
        }
        folders::entry_for(self.primary(), &key).await
    }

    pub async fn get_folder_contents(&self, path: &str) -> StorageResult<Vec<DirectoryEntry>> {
        let key = paths::encode(path);
        folders::folder_contents(self.primary(), &key).await
    }

    /// Open a file for streaming; returns its entry for header shaping.
    pub async fn open_read_stream(
        &self,
        path: &str,
    ) -> StorageResult<(DirectoryEntry, Box<dyn AsyncRead + Send + Unpin>)> {
        let key = paths::encode(path);
        let entry = folders::entry_for(self.primary(), &key).await?;
        if entry.is_directory {
            return Err(StorageError::InvalidArgument(format!(
                "`{key}` is a folder, not a file"
            )));
        }
        let reader = self.primary().open_read(&key).await?;
        Ok((entry, reader))
    }

    pub async fn bytes_consumed(&self) -> StorageResult<i64> {
        self.primary().bytes_consumed().await
    }

    // --- fan-out writes (all backends, no rollback) ---

    pub async fn create_folder(&self, path: &str) -> StorageResult<DirectoryEntry> {
        let key = self.mutable_key(path)?;
        self.fan_out(|driver| {
            let key = key.clone();
            async move { driver.create_folder(&key).await }
        })
        .await?;
        folders::entry_for(self.primary(), &key).await
    }

    pub async fn delete_file(&self, path: &str) -> StorageResult<()> {
        let key = self.mutable_key(path)?;
        self.fan_out(|driver| {
            let key = key.clone();
            async move { driver.delete_if_exists(&key).await }
        })
        .await
    }

    /// Delete a folder and everything below it, markers included.
    pub async fn delete_folder(&self, path: &str) -> StorageResult<()> {
        let key = self.mutable_key(path)?;
        let keys = folders::collect_keys(self.primary(), &key).await?;
        for object_key in keys {
            self.fan_out(|driver| {
                let object_key = object_key.clone();
                async move { driver.delete_if_exists(&object_key).await }
            })
            .await?;
        }
        Ok(())
    }

    /// Write one upload chunk to every backend.
    pub async fn append_chunk(
        &self,
        meta: &UploadChunkMetadata,
        data: Bytes,
    ) -> StorageResult<()> {
        chunks::validate(meta)?;
        self.fan_out(|driver| {
            let meta = meta.clone();
            let data = data.clone();
            async move { chunks::write_chunk(driver.as_ref(), &meta, data).await }
        })
        .await
    }

    /// Toggle static-website hosting on every backend that supports it.
    pub async fn set_static_website(
        &self,
        enabled: bool,
        index_document: &str,
        error_document: &str,
    ) -> StorageResult<()> {
        let mut attempted = 0;
        let mut failures = Vec::new();
        for driver in &self.drivers {
            let Some(site) = driver.as_static_website() else {
                continue;
            };
            attempted += 1;
            if let Err(err) = site
                .set_static_website(enabled, index_document, error_document)
                .await
            {
                failures.push((driver.name().to_string(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanoutFailure {
                attempted,
                failures,
            }
            .into())
        }
    }

    // --- copy / rename (verified-copy protocol) ---

    pub async fn copy(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.transfer(source, destination, false).await
    }

    pub async fn rename(&self, source: &str, destination: &str) -> StorageResult<()> {
        self.transfer(source, destination, true).await
    }

    async fn transfer(
        &self,
        source: &str,
        destination: &str,
        delete_source: bool,
    ) -> StorageResult<()> {
        let src = self.mutable_key(source)?;
        let dst = self.mutable_key(destination)?;
        if dst == src || dst.starts_with(&format!("{src}/")) {
            return Err(StorageError::InvalidArgument(format!(
                "destination `{dst}` lies inside source `{src}`"
            )));
        }

        let pairs = self.batch_pairs(&src, &dst).await?;

        // Pre-flight: every destination key on every backend must be free
        // before the first copy starts, so a conflict can abort the whole
        // batch with nothing to clean up.
        for (_, dst_key) in &pairs {
            let checks = join_all(
                self.drivers
                    .iter()
                    .map(|driver| driver.exists(dst_key)),
            )
            .await;
            for check in checks {
                if check? {
                    return Err(StorageError::AlreadyExists(dst_key.clone()));
                }
            }
        }

        let mut completed = 0usize;
        for (src_key, dst_key) in &pairs {
            // Copy to every backend in parallel.
            let copies = join_all(
                self.drivers
                    .iter()
                    .map(|driver| driver.copy_object(src_key, dst_key)),
            )
            .await;
            if let Some(err) = copies.into_iter().find_map(Result::err) {
                self.rollback(dst_key).await;
                return Err(self.batch_error(dst_key, completed, err));
            }

            // Verify before touching the source.
            let verified = join_all(
                self.drivers
                    .iter()
                    .map(|driver| driver.exists(dst_key)),
            )
            .await;
            let all_present = verified.iter().all(|v| matches!(v, Ok(true)));
            if !all_present {
                self.rollback(dst_key).await;
                return Err(self.batch_error(
                    dst_key,
                    completed,
                    StorageError::VerificationFailed(dst_key.clone()),
                ));
            }

            if delete_source {
                let deletes = join_all(
                    self.drivers
                        .iter()
                        .map(|driver| driver.delete_if_exists(src_key)),
                )
                .await;
                if let Some(err) = deletes.into_iter().find_map(Result::err) {
                    return Err(self.batch_error(src_key, completed, err));
                }
            }
            completed += 1;
            debug!(src = %src_key, dst = %dst_key, "batch item verified");
        }
        Ok(())
    }

    /// The (source-key, destination-key) pairs of one batch: a single pair
    /// for a file source, or every key below a folder source with the prefix
    /// substituted. Markers ride along so empty sub-folders survive.
    async fn batch_pairs(&self, src: &str, dst: &str) -> StorageResult<Vec<(String, String)>> {
        if self.primary().exists(src).await? {
            return Ok(vec![(src.to_string(), dst.to_string())]);
        }
        let keys = folders::collect_keys(self.primary(), src).await?;
        if keys.is_empty() {
            return Err(StorageError::NotFound(src.to_string()));
        }
        Ok(keys
            .into_iter()
            .map(|key| {
                let mapped = format!("{dst}{}", &key[src.len()..]);
                (key, mapped)
            })
            .collect())
    }

    /// Best-effort removal of a failed key's destination copies.
    async fn rollback(&self, dst_key: &str) {
        let results = join_all(
            self.drivers
                .iter()
                .map(|driver| driver.delete_if_exists(dst_key)),
        )
        .await;
        for (driver, result) in self.drivers.iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    backend = driver.name(),
                    key = dst_key,
                    %err,
                    "rollback of copied object failed"
                );
            }
        }
    }

    fn batch_error(&self, key: &str, completed: usize, err: StorageError) -> StorageError {
        if completed == 0 {
            err
        } else {
            StorageError::PartialBatchFailure {
                key: key.to_string(),
                completed,
                source: Box::new(err),
            }
        }
    }

    fn mutable_key(&self, path: &str) -> StorageResult<String> {
        let key = paths::encode(path);
        if paths::is_root(&key) {
            return Err(StorageError::InvalidArgument(
                "the storage root cannot be the target of this operation".into(),
            ));
        }
        Ok(key)
    }

    async fn fan_out<F, Fut>(&self, make: F) -> StorageResult<()>
    where
        F: Fn(Arc<dyn StorageDriver>) -> Fut,
        Fut: Future<Output = StorageResult<()>>,
    {
        let results = join_all(self.drivers.iter().map(|driver| {
            let name = driver.name().to_string();
            let fut = make(Arc::clone(driver));
            async move { (name, fut.await) }
        }))
        .await;
        let attempted = results.len();
        let failures: Vec<(String, StorageError)> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|err| (name, err)))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanoutFailure {
                attempted,
                failures,
            }
            .into())
        }
    }
}
