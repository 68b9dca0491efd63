//! # stockroom-core
//!
//! Core library for Stockroom providing:
//! - Domain types for locations, areas, commodities and their attachments
//! - Registry capability traits, scoped to a tenant/user [`types::Scope`]
//! - An in-memory registry backend with JSON snapshots
//! - Configuration file parsing (stockroom.yaml)

pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use config::StockroomConfig;
pub use error::{Error, Result};
pub use memory::MemoryBackend;
pub use registry::{LocationRegistry, OperationRegistry, Registry, RegistrySet, SettingsRegistry};
