//! Chunked upload session metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::entry::ImageInfo;

/// Describes one chunk of a client upload.
///
/// The `upload_id` is stable across all chunks of one logical file; the
/// upload is complete exactly when `chunk_index == total_chunks - 1`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadChunkMetadata {
    /// Upload session id, stable across chunks.
    pub upload_id: Uuid,

    /// Original file name of the upload.
    pub file_name: String,

    /// Target folder path, relative to the storage root.
    pub relative_path: String,

    /// Content type (MIME type) of the final object.
    pub content_type: Option<String>,

    /// Zero-based index of this chunk.
    pub chunk_index: u32,

    /// Total number of chunks the client will send.
    pub total_chunks: u32,

    /// Declared size of the finished file in bytes.
    pub total_file_size: i64,

    /// Image dimensions, when the client supplied them.
    pub image: Option<ImageInfo>,
}

impl UploadChunkMetadata {
    pub fn is_first(&self) -> bool {
        self.chunk_index == 0
    }

    /// Completion is inferred purely from the index, not from bytes received.
    pub fn is_final(&self) -> bool {
        self.chunk_index + 1 == self.total_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(index: u32, total: u32) -> UploadChunkMetadata {
        UploadChunkMetadata {
            upload_id: Uuid::new_v4(),
            file_name: "clip.mp4".into(),
            relative_path: "media".into(),
            content_type: Some("video/mp4".into()),
            chunk_index: index,
            total_chunks: total,
            total_file_size: 1024,
            image: None,
        }
    }

    #[test]
    fn final_chunk_is_detected_by_index() {
        assert!(!meta(0, 3).is_final());
        assert!(!meta(1, 3).is_final());
        assert!(meta(2, 3).is_final());
        assert!(meta(0, 1).is_final());
    }
}
