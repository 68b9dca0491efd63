//! Configuration file types (stockroom.yaml)

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Root of stockroom.yaml; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockroomConfigFile {
    pub scope: ScopeConfig,
    pub settings: SettingsConfig,
    pub storage: StorageConfig,
    pub blobs: BlobConfig,
    pub restore: RestoreConfig,
}

/// Tenant/user the CLI acts as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub tenant: String,
    pub user: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            user: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Tenant main currency (ISO 4217 code)
    pub main_currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot backing the in-memory registries
    pub snapshot: Utf8PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot: Utf8PathBuf::from("stockroom-data.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Blob store location, e.g. file:///var/lib/stockroom/blobs
    pub url: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            url: "file://./stockroom-blobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Maximum restore runs the worker executes at once
    pub max_concurrent: usize,
    /// Seconds between polls for pending runs
    pub poll_interval_secs: u64,
    pub include_file_data: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            poll_interval_secs: 10,
            include_file_data: true,
        }
    }
}
