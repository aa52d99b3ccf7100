//! The backend capability interface and the shared error taxonomy.
//!
//! Every flat object store integration implements [`StorageDriver`]. Drivers
//! surface typed errors instead of backend-specific failures so the storage
//! context can apply uniform fan-out and rollback logic on top of any mix of
//! backends.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::models::entry::{BlobInfo, ObjectEntry, ObjectMeta};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("destination `{0}` already exists")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend `{backend}` unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("copy verification failed for `{0}`")]
    VerificationFailed(String),

    #[error("batch failed at `{key}` after {completed} completed item(s): {source}")]
    PartialBatchFailure {
        key: String,
        completed: usize,
        #[source]
        source: Box<StorageError>,
    },

    #[error(transparent)]
    Fanout(#[from] FanoutFailure),
}

/// Structured multi-error for a write fanned out to several backends.
///
/// Fan-out writes have no rollback; when some backends succeeded and others
/// did not, callers need the full per-backend picture to reconcile divergent
/// state out of band.
#[derive(Debug)]
pub struct FanoutFailure {
    /// Number of backends the operation was issued to.
    pub attempted: usize,

    /// Backend name paired with the error it produced.
    pub failures: Vec<(String, StorageError)>,
}

impl std::error::Error for FanoutFailure {}

impl std::fmt::Display for FanoutFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} backend(s) failed: ",
            self.failures.len(),
            self.attempted
        )?;
        let mut first = true;
        for (backend, err) in &self.failures {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{backend}: {err}")?;
            first = false;
        }
        Ok(())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Map an I/O failure onto the shared taxonomy for the named backend.
pub fn io_error(backend: &str, key: &str, err: io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        _ => StorageError::BackendUnavailable {
            backend: backend.to_string(),
            reason: err.to_string(),
        },
    }
}

/// A single flat key/value object store.
///
/// Keys are canonical storage keys (see `services::paths`); the driver never
/// normalizes. Listings are raw: folder markers are returned like any other
/// blob, and the folder emulation engine alone decides what callers see.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Backend name used in configuration, logs, and fan-out errors.
    fn name(&self) -> &str;

    /// Whether a blob exists at exactly this key.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Metadata for the blob at `key`; `NotFound` if absent.
    async fn head(&self, key: &str) -> StorageResult<BlobInfo>;

    /// Delimiter-based listing: blobs directly under `prefix` plus common
    /// prefixes one level down. An empty prefix means the root; a non-empty
    /// prefix must end with `/`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// Write a zero-length folder marker under `key` unless the folder (or
    /// real content beneath it) already exists. Idempotent.
    async fn create_folder(&self, key: &str) -> StorageResult<()>;

    /// Remove the blob at `key`; no-op if absent.
    async fn delete_if_exists(&self, key: &str) -> StorageResult<()>;

    /// Server-side copy. Fails with `NotFound` if the source is absent;
    /// overwrite behavior is backend-native — existence checks are layered
    /// on by the storage context.
    async fn copy_object(&self, src: &str, dst: &str) -> StorageResult<()>;

    /// Single-shot write replacing the whole object.
    async fn put_object(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()>;

    /// Open the blob payload for streaming reads.
    async fn open_read(&self, key: &str) -> StorageResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Best-effort total usage of the configured store, in bytes.
    async fn bytes_consumed(&self) -> StorageResult<i64>;

    /// Capability query: incremental append support.
    fn as_append(&self) -> Option<&dyn AppendCapable> {
        None
    }

    /// Capability query: static-website hosting support.
    fn as_static_website(&self) -> Option<&dyn StaticWebsiteCapable> {
        None
    }
}

/// Optional capability: append bytes to an append-capable object, creating
/// it (and persisting `meta`) on the first append.
#[async_trait]
pub trait AppendCapable: Send + Sync {
    async fn append_chunk(&self, key: &str, data: Bytes, meta: &ObjectMeta) -> StorageResult<()>;
}

/// Optional capability: static-website hosting toggle.
#[async_trait]
pub trait StaticWebsiteCapable: Send + Sync {
    async fn set_static_website(
        &self,
        enabled: bool,
        index_document: &str,
        error_document: &str,
    ) -> StorageResult<()>;
}
