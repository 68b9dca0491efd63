//! Reconciliation of decoded entities against the caller's stored data

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use stockroom_core::types::{
    Area, Commodity, EntityKind, Location, RestoreOptions, Scope, ValidationContext,
};
use stockroom_core::{Registry, RegistrySet};
use tracing::{debug, warn};

use super::decode::{decode_area, decode_commodity, decode_location, RawRecord};
use super::mapping::{RunState, Tracked};
use super::modes::{handler_for, RestoreAction, StrategyHandler};
use crate::blob::BlobStore;
use crate::progress::StepRecorder;

/// What happened to one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// One restore run in progress
pub(crate) struct Restorer<'a> {
    pub registries: &'a RegistrySet,
    pub blobs: &'a dyn BlobStore,
    pub recorder: &'a dyn StepRecorder,
    pub scope: &'a Scope,
    pub options: RestoreOptions,
    pub validation: ValidationContext,
    pub state: RunState,
    handler: Box<dyn StrategyHandler>,
}

impl<'a> Restorer<'a> {
    pub fn new(
        registries: &'a RegistrySet,
        blobs: &'a dyn BlobStore,
        recorder: &'a dyn StepRecorder,
        scope: &'a Scope,
        options: RestoreOptions,
    ) -> Self {
        Self {
            registries,
            blobs,
            recorder,
            scope,
            options,
            validation: ValidationContext::default(),
            state: RunState::default(),
            handler: handler_for(options.strategy),
        }
    }

    /// Apply the strategy to `entity`, whose ID is still the document ID
    pub async fn reconcile<T, R>(&mut self, registry: &R, doc_id: &str, mut entity: T) -> Result<Outcome>
    where
        T: Tracked,
        R: Registry<T> + ?Sized,
    {
        let kind = entity.kind();
        let action = if self.state.existing.contains(kind, doc_id) {
            self.handler.on_existing(kind, doc_id)
        } else {
            self.handler.on_new(kind, doc_id)
        };

        match action {
            RestoreAction::Skip { reason } => {
                debug!("Skipped {} {}: {}", kind, doc_id, reason);
                self.state.stats.record_skipped();
                Ok(Outcome::Skipped)
            }
            RestoreAction::Create => {
                entity.validate(&self.validation)?;
                if self.options.dry_run {
                    debug!("Dry run: would create {} {}", kind, doc_id);
                } else {
                    let created = registry
                        .create(self.scope, entity)
                        .await
                        .with_context(|| format!("failed to create {}", kind))?;
                    debug!("Created {} {} as {}", kind, doc_id, created.id());
                    self.state.remember(doc_id, created);
                }
                self.state.stats.record_created(kind);
                Ok(Outcome::Created)
            }
            RestoreAction::Update => {
                let storage_id = self
                    .state
                    .ids
                    .get(kind, doc_id)
                    .ok_or_else(|| anyhow!("{} {} has no storage ID", kind, doc_id))?
                    .to_string();
                entity.set_id(storage_id);
                entity.validate(&self.validation)?;
                if self.options.dry_run {
                    debug!("Dry run: would update {} {}", kind, doc_id);
                } else {
                    let updated = registry
                        .update(self.scope, entity)
                        .await
                        .with_context(|| format!("failed to update {}", kind))?;
                    debug!("Updated {} {} in place", kind, doc_id);
                    self.state.remember(doc_id, updated);
                }
                self.state.stats.record_updated(kind);
                Ok(Outcome::Updated)
            }
        }
    }

    /// Storage ID of the parent `parent_doc_id`, which must already be known
    /// in this run. A parent owned by another scope is never visible here.
    pub fn resolve_parent(&self, parent: EntityKind, parent_doc_id: &str) -> Result<String> {
        match self.state.ids.get(parent, parent_doc_id) {
            Some(id) if self.state.existing.contains(parent, parent_doc_id) => Ok(id.to_string()),
            _ => {
                debug!(
                    "No {} {} visible in scope {}",
                    parent, parent_doc_id, self.scope
                );
                Err(anyhow!(
                    "references non-existent {} {:?}",
                    parent,
                    parent_doc_id
                ))
            }
        }
    }

    /// Record a recoverable failure for one entity and carry on
    pub fn entity_failed(&mut self, kind: EntityKind, doc_id: &str, err: anyhow::Error) {
        let message = format!("{} {}: {:#}", kind, doc_id, err);
        warn!("{}", message);
        self.state.stats.record_error(message);
    }

    pub async fn restore_location(&mut self, record: &RawRecord) -> Result<Outcome> {
        let location: Location = decode_location(record)?;
        let doc_id = location.id.clone();
        self.state.mark_seen(EntityKind::Location, &doc_id)?;

        let registries = self.registries;
        self.reconcile(registries.locations.as_ref(), &doc_id, location)
            .await
    }

    pub async fn restore_area(&mut self, record: &RawRecord) -> Result<Outcome> {
        let mut area: Area = decode_area(record)?;
        let doc_id = area.id.clone();
        self.state.mark_seen(EntityKind::Area, &doc_id)?;
        area.location_id = self.resolve_parent(EntityKind::Location, &area.location_id)?;

        let registries = self.registries;
        self.reconcile(registries.areas.as_ref(), &doc_id, area).await
    }

    pub async fn restore_commodity(&mut self, record: &RawRecord) -> Result<Outcome> {
        let mut commodity: Commodity = decode_commodity(record)?;
        let doc_id = commodity.id.clone();
        self.state.mark_seen(EntityKind::Commodity, &doc_id)?;
        commodity.area_id = self.resolve_parent(EntityKind::Area, &commodity.area_id)?;

        // No conversion applies to prices already in the main currency
        if self
            .validation
            .is_main_currency(&commodity.original_price_currency)
        {
            commodity.converted_original_price = Decimal::ZERO;
        }

        let registries = self.registries;
        self.reconcile(registries.commodities.as_ref(), &doc_id, commodity)
            .await
    }

    pub fn into_stats(self) -> stockroom_core::types::RestoreStats {
        self.state.stats
    }
}
