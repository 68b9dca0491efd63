//! Stockroom Restore Engine
//!
//! This crate restores Stockroom inventories from XML backup documents into
//! the registries of a single tenant/user scope.
//!
//! # Features
//!
//! - **Single pass**: the document is streamed once, never loaded whole
//! - **Three strategies**: full replace, merge add, merge update
//! - **ID remapping**: document IDs are mapped to storage IDs as parents are resolved
//! - **Streamed attachments**: inline base64 payloads are decoded straight into the blob store
//! - **Partial failure**: invalid entities are counted and reported, the run carries on
//! - **Background worker**: queued runs execute with bounded concurrency
//!
//! # Examples
//!
//! ```no_run
//! use camino::Utf8Path;
//! use stockroom_backup::{open_blob_store, LogRecorder, RestoreEngine};
//! use stockroom_core::types::{RestoreOptions, RestoreStrategy, Scope};
//! use stockroom_core::MemoryBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = MemoryBackend::new();
//!     let blobs = open_blob_store("file:///var/lib/stockroom/blobs", Utf8Path::new("/"))?;
//!     let engine = RestoreEngine::new(backend.registries(), blobs);
//!
//!     let file = tokio::fs::File::open("backup.xml").await?;
//!     let stats = engine
//!         .restore_from_xml(
//!             &Scope::new("acme", "alice"),
//!             tokio::io::BufReader::new(file),
//!             RestoreOptions::new(RestoreStrategy::MergeAdd),
//!             &LogRecorder,
//!         )
//!         .await?;
//!
//!     println!("{} created, {} errors", stats.created_count, stats.error_count);
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod progress;
pub mod restore;
pub mod worker;

pub use blob::{open_blob_store, BlobError, BlobStore, FsBlobStore};
pub use progress::{LogRecorder, NoopRecorder, OperationRecorder, SpinnerProgress, StepRecorder};
pub use restore::{parse_strategy, RestoreEngine, RestoreError, RestoreFailure};
pub use worker::RestoreWorker;
