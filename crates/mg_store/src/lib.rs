//! mg_store — persistence for the Mensago server
//!
//! Two collaborators live here: the relational store (SQLite via sqlx —
//! workspaces, keycard entries, preregistration codes, sync records, the
//! organization's keys) and the blob filesystem (a sandboxed
//! content-addressable file tree keyed by server-side paths).

pub mod blobs;
pub mod db;
pub mod error;
pub mod models;

pub use blobs::{BlobStore, ServerPath};
pub use db::Store;
pub use error::StoreError;
