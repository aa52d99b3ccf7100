//! Chunk upload assembly.
//!
//! Turns a sequence of client-submitted byte chunks into one finished
//! object. Mode selection lives here, not in the drivers: files whose
//! declared total size stays under [`SINGLE_WRITE_LIMIT`] are written in one
//! block per chunk (the caller is expected to send the whole payload as a
//! single chunk below the limit); larger files go through the append
//! capability, strictly in chunk order.

use bytes::Bytes;
use tracing::warn;

use crate::{
    models::{chunk::UploadChunkMetadata, entry::ObjectMeta},
    services::{
        driver::{StorageDriver, StorageError, StorageResult},
        paths,
    },
};

/// Declared-size threshold below which every chunk is a whole-object write.
pub const SINGLE_WRITE_LIMIT: i64 = 30_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Single-shot write replacing the whole object.
    Block,
    /// Incremental append; the backing object is created on the first chunk.
    Append,
}

pub fn select_mode(total_file_size: i64) -> WriteMode {
    if total_file_size < SINGLE_WRITE_LIMIT {
        WriteMode::Block
    } else {
        WriteMode::Append
    }
}

/// Canonical storage key the finished upload will live at.
pub fn target_key(meta: &UploadChunkMetadata) -> String {
    paths::join(&[&paths::encode(&meta.relative_path), &paths::encode(&meta.file_name)])
}

pub fn validate(meta: &UploadChunkMetadata) -> StorageResult<()> {
    if meta.total_chunks == 0 {
        return Err(StorageError::InvalidArgument(
            "total_chunks must be at least 1".into(),
        ));
    }
    if meta.chunk_index >= meta.total_chunks {
        return Err(StorageError::InvalidArgument(format!(
            "chunk_index {} out of range for {} chunk(s)",
            meta.chunk_index, meta.total_chunks
        )));
    }
    if meta.total_file_size < 0 {
        return Err(StorageError::InvalidArgument(
            "total_file_size must not be negative".into(),
        ));
    }
    if paths::encode(&meta.file_name).is_empty() {
        return Err(StorageError::InvalidArgument(
            "file_name must not be empty".into(),
        ));
    }
    Ok(())
}

/// Write one chunk of an upload to a single backend.
///
/// On the first chunk every ancestor folder of the target key is created on
/// demand. Completion is inferred purely from the chunk index; the declared
/// size is not enforced, only checked for a diagnostic on the final chunk.
pub async fn write_chunk(
    driver: &dyn StorageDriver,
    meta: &UploadChunkMetadata,
    data: Bytes,
) -> StorageResult<()> {
    validate(meta)?;
    let key = target_key(meta);

    if meta.is_first() {
        for ancestor in paths::ancestors(&key) {
            driver.create_folder(&ancestor).await?;
        }
    }

    let object_meta = ObjectMeta {
        content_type: meta.content_type.clone(),
        etag: None,
        image: meta.image,
    };

    match select_mode(meta.total_file_size) {
        WriteMode::Block => driver.put_object(&key, data, &object_meta).await?,
        WriteMode::Append => {
            let append = driver.as_append().ok_or_else(|| {
                StorageError::InvalidArgument(format!(
                    "backend `{}` does not support append uploads",
                    driver.name()
                ))
            })?;
            append.append_chunk(&key, data, &object_meta).await?;
        }
    }

    if meta.is_final() {
        let stored = driver.head(&key).await?;
        if stored.size != meta.total_file_size {
            warn!(
                upload_id = %meta.upload_id,
                key,
                declared = meta.total_file_size,
                stored = stored.size,
                "finished upload size differs from declared total"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        driver::StorageDriver as _, folders, memory_driver::MemoryDriver,
    };
    use uuid::Uuid;

    fn meta(index: u32, total: u32, size: i64) -> UploadChunkMetadata {
        UploadChunkMetadata {
            upload_id: Uuid::new_v4(),
            file_name: "movie clip.mp4".into(),
            relative_path: "media/2026".into(),
            content_type: Some("video/mp4".into()),
            chunk_index: index,
            total_chunks: total,
            total_file_size: size,
            image: None,
        }
    }

    #[test]
    fn mode_flips_at_the_declared_size_limit() {
        assert_eq!(select_mode(0), WriteMode::Block);
        assert_eq!(select_mode(SINGLE_WRITE_LIMIT - 1), WriteMode::Block);
        assert_eq!(select_mode(SINGLE_WRITE_LIMIT), WriteMode::Append);
    }

    #[test]
    fn out_of_range_chunks_are_rejected() {
        assert!(validate(&meta(0, 1, 10)).is_ok());
        assert!(validate(&meta(1, 1, 10)).is_err());
        assert!(validate(&meta(0, 0, 10)).is_err());
        assert!(validate(&meta(0, 1, -1)).is_err());
    }

    #[tokio::test]
    async fn single_chunk_upload_creates_ancestors() {
        let driver = MemoryDriver::new("mem");
        let m = meta(0, 1, 5);
        write_chunk(&driver, &m, Bytes::from_static(b"12345"))
            .await
            .unwrap();

        assert_eq!(target_key(&m), "media/2026/movie-clip.mp4");
        assert!(driver.exists("media/2026/movie-clip.mp4").await.unwrap());
        assert!(folders::folder_exists(&driver, "media").await.unwrap());
        assert!(folders::folder_exists(&driver, "media/2026").await.unwrap());
    }

    #[tokio::test]
    async fn large_uploads_append_in_order() {
        let driver = MemoryDriver::new("mem");
        let size = SINGLE_WRITE_LIMIT + 3;
        for (index, part) in [&b"ab"[..], &b"cd"[..], &b"e"[..]].iter().enumerate() {
            let m = UploadChunkMetadata {
                chunk_index: index as u32,
                total_chunks: 3,
                total_file_size: size,
                ..meta(0, 3, size)
            };
            write_chunk(&driver, &m, Bytes::copy_from_slice(part))
                .await
                .unwrap();
        }
        let stored = driver.head("media/2026/movie-clip.mp4").await.unwrap();
        assert_eq!(stored.size, 5);
        assert_eq!(stored.meta.content_type.as_deref(), Some("video/mp4"));
    }
}
