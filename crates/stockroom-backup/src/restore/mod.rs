//! Restore engine
//!
//! Streams a backup document once, in document order, reconciling every
//! entity against the caller's scope under the chosen strategy.

use std::sync::Arc;
use stockroom_core::types::{RestoreOptions, RestoreStats, RestoreStrategy, Scope, ValidationContext};
use stockroom_core::RegistrySet;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use crate::blob::{BlobError, BlobStore};
use crate::progress::StepRecorder;

mod attachment;
mod decode;
mod mapping;
pub mod modes;
mod parser;
mod reader;
mod reconcile;

pub use modes::{handler_for, parse_strategy, RestoreAction, StrategyHandler};

use reader::XmlCursor;
use reconcile::Restorer;

/// Step names recorded for every run
pub const STEP_SETTINGS: &str = "Read settings";
pub const STEP_CLEAR: &str = "Clear existing data";
pub const STEP_LOAD: &str = "Load existing data";

/// Errors that abort a whole restore run
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("malformed backup document: {0}")]
    Xml(#[source] quick_xml::Error),

    #[error("unexpected element <{0}> in backup document")]
    UnexpectedElement(String),

    #[error("backup document ended unexpectedly")]
    UnexpectedEof,

    #[error("failed to read backup document: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("failed to clear existing data: {0}")]
    ClearData(#[source] stockroom_core::Error),

    #[error("failed to load existing data: {0}")]
    LoadExisting(#[source] stockroom_core::Error),

    #[error("failed to read settings: {0}")]
    Settings(#[source] stockroom_core::Error),

    #[error("invalid restore strategy: {0}. Valid strategies: full_replace, merge_add, merge_update")]
    InvalidStrategy(String),

    #[error("failed to process {section}: {source}")]
    Section {
        section: String,
        #[source]
        source: Box<RestoreError>,
    },
}

impl RestoreError {
    pub fn section(section: impl Into<String>, source: RestoreError) -> Self {
        Self::Section {
            section: section.into(),
            source: Box::new(source),
        }
    }
}

impl From<quick_xml::Error> for RestoreError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => Self::Io(
                Arc::try_unwrap(io).unwrap_or_else(|io| std::io::Error::new(io.kind(), io.to_string())),
            ),
            other => Self::Xml(other),
        }
    }
}

/// A fatal error together with the statistics gathered before it
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RestoreFailure {
    pub stats: RestoreStats,
    pub source: RestoreError,
}

/// Restores backup documents into the registries of one deployment
#[derive(Clone)]
pub struct RestoreEngine {
    registries: RegistrySet,
    blobs: Arc<dyn BlobStore>,
}

impl RestoreEngine {
    pub fn new(registries: RegistrySet, blobs: Arc<dyn BlobStore>) -> Self {
        Self { registries, blobs }
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Restore one document into `scope`.
    ///
    /// A successful return does not imply a clean run: per-entity failures
    /// are only counted in [`RestoreStats::error_count`] and listed in
    /// [`RestoreStats::errors`].
    pub async fn restore_from_xml<R>(
        &self,
        scope: &Scope,
        reader: R,
        options: RestoreOptions,
        recorder: &dyn StepRecorder,
    ) -> Result<RestoreStats, RestoreFailure>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        info!(
            "Starting restore: scope={}, strategy={}, include_file_data={}, dry_run={}",
            scope, options.strategy, options.include_file_data, options.dry_run
        );

        let mut restorer = Restorer::new(&self.registries, self.blobs.as_ref(), recorder, scope, options);
        let outcome = restorer.run(reader).await;
        let stats = restorer.into_stats();

        match outcome {
            Ok(()) => {
                info!(
                    "Restore finished: {} created, {} updated, {} skipped, {} deleted, {} errors, {} bytes of file data",
                    stats.created_count,
                    stats.updated_count,
                    stats.skipped_count,
                    stats.deleted_count,
                    stats.error_count,
                    stats.binary_data_size
                );
                Ok(stats)
            }
            Err(source) => Err(RestoreFailure { stats, source }),
        }
    }
}

impl<'a> Restorer<'a> {
    async fn run<R: AsyncBufRead + Unpin + Send>(&mut self, reader: R) -> Result<(), RestoreError> {
        info!("Stage 1/3: Reading settings");
        self.recorder.started(STEP_SETTINGS).await;
        let settings = match self.registries.settings.get(self.scope).await {
            Ok(settings) => settings,
            Err(err) => {
                self.recorder.failed(STEP_SETTINGS, &err.to_string()).await;
                return Err(RestoreError::Settings(err));
            }
        };
        let main_currency = settings.main_currency.filter(|c| !c.is_empty());
        let detail = format!(
            "main currency: {}",
            main_currency.as_deref().unwrap_or("none")
        );
        self.validation = ValidationContext::new(main_currency);
        self.recorder.succeeded(STEP_SETTINGS, &detail).await;

        if self.options.strategy == RestoreStrategy::FullReplace {
            info!("Stage 2/3: Clearing existing data");
            self.recorder.started(STEP_CLEAR).await;
            match self.clear_existing().await {
                Ok(deleted) => {
                    self.recorder
                        .succeeded(STEP_CLEAR, &format!("{} locations deleted", deleted))
                        .await
                }
                Err(err) => {
                    self.recorder.failed(STEP_CLEAR, &err.to_string()).await;
                    return Err(err);
                }
            }
        } else {
            info!("Stage 2/3: Loading existing data");
            self.recorder.started(STEP_LOAD).await;
            let registries = self.registries;
            let scope = self.scope;
            if let Err(err) = self.state.preload(registries, scope).await {
                self.recorder.failed(STEP_LOAD, &err.to_string()).await;
                return Err(RestoreError::LoadExisting(err));
            }
            self.recorder.succeeded(STEP_LOAD, "").await;
        }

        info!("Stage 3/3: Streaming backup document");
        let mut cursor = XmlCursor::new(reader);
        self.process_document(&mut cursor).await
    }

    /// Delete every location in scope with everything beneath it.
    /// A dry run only counts what would go.
    async fn clear_existing(&mut self) -> Result<u64, RestoreError> {
        let locations = self
            .registries
            .locations
            .list(self.scope)
            .await
            .map_err(RestoreError::ClearData)?;

        let mut deleted = 0;
        for location in locations {
            if self.options.dry_run {
                debug!("Dry run: would delete location {} and its contents", location.id);
            } else {
                self.registries
                    .locations
                    .delete_recursive(self.scope, &location.id)
                    .await
                    .map_err(RestoreError::ClearData)?;
                debug!("Deleted location {} and its contents", location.id);
            }
            self.state.stats.record_deleted();
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_error_wraps_cause() {
        let err = RestoreError::section("locations", RestoreError::UnexpectedEof);
        assert_eq!(
            err.to_string(),
            "failed to process locations: backup document ended unexpectedly"
        );
    }

    #[test]
    fn test_failure_displays_source() {
        let failure = RestoreFailure {
            stats: RestoreStats::default(),
            source: RestoreError::UnexpectedElement("junk".to_string()),
        };
        assert_eq!(failure.to_string(), "unexpected element <junk> in backup document");
    }
}
