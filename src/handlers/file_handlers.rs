//! HTTP handlers for the file-manager contract.
//! Streams file bodies to avoid buffering in memory and delegates all
//! storage concerns to the `StorageContext`.

use crate::{
    errors::AppError,
    models::{chunk::UploadChunkMetadata, entry::DirectoryEntry},
    services::context::StorageContext,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Request body for copy/rename.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub bytes_consumed: i64,
}

/// GET `/files/{*path}` — download a file as a streaming response.
pub async fn get_file(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let (entry, reader) = ctx.open_read_stream(&path).await?;
    let stream = ReaderStream::new(reader);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_entry_headers(response.headers_mut(), &entry);
    Ok(response)
}

/// GET `/meta/{*path}` — the directory entry for a file or folder.
pub async fn get_meta(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<Json<DirectoryEntry>, AppError> {
    Ok(Json(ctx.get_file(&path).await?))
}

/// GET `/folders` — list the storage root.
pub async fn list_root(
    State(ctx): State<Arc<StorageContext>>,
) -> Result<Json<Vec<DirectoryEntry>>, AppError> {
    list_path(ctx, String::new()).await
}

/// GET `/folders/{*path}` — list a folder.
pub async fn list_folder(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<Json<Vec<DirectoryEntry>>, AppError> {
    list_path(ctx, path).await
}

async fn list_path(
    ctx: Arc<StorageContext>,
    path: String,
) -> Result<Json<Vec<DirectoryEntry>>, AppError> {
    let mut entries = ctx.get_folder_contents(&path).await?;
    // Presentation ordering: folders first, then case-insensitive by name.
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(Json(entries))
}

/// POST `/folders/{*path}` — create a folder (idempotent).
pub async fn create_folder(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entry = ctx.create_folder(&path).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE `/files/{*path}` — remove a file from every backend.
pub async fn delete_file(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<StatusCode, AppError> {
    ctx.delete_file(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE `/folders/{*path}` — remove a folder tree from every backend.
pub async fn delete_folder(
    State(ctx): State<Arc<StorageContext>>,
    Path(path): Path<String>,
) -> Result<StatusCode, AppError> {
    ctx.delete_folder(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/transfers/copy` — verified copy, source kept.
pub async fn copy(
    State(ctx): State<Arc<StorageContext>>,
    Json(req): Json<TransferRequest>,
) -> Result<StatusCode, AppError> {
    ctx.copy(&req.source, &req.destination).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/transfers/rename` — verified copy, then source deleted.
pub async fn rename(
    State(ctx): State<Arc<StorageContext>>,
    Json(req): Json<TransferRequest>,
) -> Result<StatusCode, AppError> {
    ctx.rename(&req.source, &req.destination).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/uploads` — one chunk of a chunked upload.
///
/// Multipart form with a `metadata` field (JSON `UploadChunkMetadata`) and a
/// `chunk` field carrying the bytes.
pub async fn upload_chunk(
    State(ctx): State<Arc<StorageContext>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut meta: Option<UploadChunkMetadata> = None;
    let mut chunk: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("metadata") => {
                let raw = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("reading metadata: {e}")))?;
                meta = Some(
                    serde_json::from_slice(&raw)
                        .map_err(|e| AppError::bad_request(format!("invalid metadata: {e}")))?,
                );
            }
            Some("chunk") => {
                chunk = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::bad_request(format!("reading chunk: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let meta = meta.ok_or_else(|| AppError::bad_request("missing `metadata` field"))?;
    let chunk = chunk.ok_or_else(|| AppError::bad_request("missing `chunk` field"))?;

    ctx.append_chunk(&meta, chunk).await?;
    Ok(Json(UploadResponse {
        key: crate::services::chunks::target_key(&meta),
        completed: meta.is_final(),
    }))
}

/// GET `/usage` — best-effort bytes consumed on the primary backend.
pub async fn usage(
    State(ctx): State<Arc<StorageContext>>,
) -> Result<Json<UsageResponse>, AppError> {
    Ok(Json(UsageResponse {
        bytes_consumed: ctx.bytes_consumed().await?,
    }))
}

fn set_entry_headers(headers: &mut HeaderMap, entry: &DirectoryEntry) {
    let content_type = entry
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&entry.size.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Ok(value) = HeaderValue::from_str(&entry.modified_utc.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
