//! Core data models for the mirrored storage service.
//!
//! These entities describe the externally visible folder/file view and the
//! raw listing results the backends produce. They serialize naturally as
//! JSON via `serde`.

pub mod chunk;
pub mod entry;
