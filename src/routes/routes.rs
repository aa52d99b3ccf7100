//! Route table for the file-manager contract.
//!
//! ## Structure
//! - **Files**
//!   - `GET    /files/{*path}`   — streaming download (HEAD for existence)
//!   - `DELETE /files/{*path}`   — remove from every backend
//!   - `GET    /meta/{*path}`    — directory entry as JSON
//! - **Folders**
//!   - `GET    /folders`         — list the root
//!   - `GET    /folders/{*path}` — list a folder
//!   - `POST   /folders/{*path}` — create (idempotent)
//!   - `DELETE /folders/{*path}` — recursive delete
//! - **Transfers & uploads**
//!   - `POST /transfers/copy`    — verified multi-backend copy
//!   - `POST /transfers/rename`  — verified copy + source delete
//!   - `POST /uploads`           — one multipart chunk
//!   - `GET  /usage`             — bytes consumed on the primary backend
//!
//! The wildcard `{*path}` allows nested paths like `photos/2026/img.jpg`.

use crate::{
    handlers::{
        file_handlers::{
            copy, create_folder, delete_file, delete_folder, get_file, get_meta, list_folder,
            list_root, rename, upload_chunk, usage,
        },
        health_handlers::{healthz, readyz},
    },
    services::context::StorageContext,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Build and return the router for the whole service.
///
/// The router carries shared state (`Arc<StorageContext>`) to all handlers.
pub fn routes() -> Router<Arc<StorageContext>> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // files
        .route("/files/{*path}", get(get_file).delete(delete_file))
        .route("/meta/{*path}", get(get_meta))
        // folders
        .route("/folders", get(list_root))
        .route(
            "/folders/{*path}",
            get(list_folder).post(create_folder).delete(delete_folder),
        )
        // transfers and uploads
        .route("/transfers/copy", post(copy))
        .route("/transfers/rename", post(rename))
        .route("/uploads", post(upload_chunk))
        .route("/usage", get(usage))
}
