//! CLI command implementations

pub mod restore;
pub mod status;
pub mod worker;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use stockroom_backup::{open_blob_store, BlobStore};
use stockroom_core::types::Settings;
use stockroom_core::{MemoryBackend, StockroomConfig};

/// Configuration, registries and blob store the commands operate on
pub struct Workspace {
    pub config: StockroomConfig,
    pub backend: Arc<MemoryBackend>,
    pub blobs: Arc<dyn BlobStore>,
    snapshot: Utf8PathBuf,
}

impl Workspace {
    pub async fn open(config_path: Option<&Utf8Path>) -> Result<Self> {
        let config = StockroomConfig::load_or_default(config_path)
            .context("Failed to load configuration")?;
        let snapshot = config.snapshot_path();
        let backend = MemoryBackend::load(&snapshot)
            .await
            .with_context(|| format!("Failed to load data snapshot {}", snapshot))?;
        let blobs = open_blob_store(config.blob_url(), &config.working_dir)
            .with_context(|| format!("Failed to open blob store {}", config.blob_url()))?;

        Ok(Self {
            config,
            backend,
            blobs,
            snapshot,
        })
    }

    /// Store the configured main currency for the scope, if one is set
    pub async fn apply_settings(&self) -> Result<()> {
        let Some(currency) = self.config.main_currency() else {
            return Ok(());
        };
        self.backend
            .registries()
            .settings
            .save(
                &self.config.scope(),
                Settings {
                    main_currency: Some(currency.to_string()),
                },
            )
            .await
            .context("Failed to store settings")?;
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        self.backend
            .save(&self.snapshot)
            .await
            .with_context(|| format!("Failed to write data snapshot {}", self.snapshot))
    }

    pub fn snapshot(&self) -> &Utf8Path {
        &self.snapshot
    }
}
