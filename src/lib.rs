//! mirrorfs — a hierarchical folder/file view over one or more flat
//! key/value object backends, kept consistent under create, copy, rename,
//! and delete.
//!
//! The [`services::context::StorageContext`] is the façade external callers
//! use; everything else supports it: path canonicalization, the backend
//! driver trait and its two concrete stores, folder emulation over prefix
//! listings, and chunked upload assembly.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
