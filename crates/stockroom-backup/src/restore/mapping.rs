//! Per-run bookkeeping: known entities, document-to-storage ID mapping and stats

use std::collections::{HashMap, HashSet};
use stockroom_core::types::{
    Area, Attachment, AttachmentKind, Commodity, Entity, EntityKind, Location, RestoreStats,
    Scope, Validate,
};
use stockroom_core::{RegistrySet, Result};
use tracing::debug;

/// Entities known to exist in the caller's scope, keyed by document ID
#[derive(Debug, Default)]
pub(crate) struct ExistingEntities {
    pub locations: HashMap<String, Location>,
    pub areas: HashMap<String, Area>,
    pub commodities: HashMap<String, Commodity>,
    pub images: HashMap<String, Attachment>,
    pub invoices: HashMap<String, Attachment>,
    pub manuals: HashMap<String, Attachment>,
}

impl ExistingEntities {
    pub fn contains(&self, kind: EntityKind, doc_id: &str) -> bool {
        match kind {
            EntityKind::Location => self.locations.contains_key(doc_id),
            EntityKind::Area => self.areas.contains_key(doc_id),
            EntityKind::Commodity => self.commodities.contains_key(doc_id),
            EntityKind::Image => self.images.contains_key(doc_id),
            EntityKind::Invoice => self.invoices.contains_key(doc_id),
            EntityKind::Manual => self.manuals.contains_key(doc_id),
        }
    }

    fn attachments_mut(&mut self, kind: AttachmentKind) -> &mut HashMap<String, Attachment> {
        match kind {
            AttachmentKind::Image => &mut self.images,
            AttachmentKind::Invoice => &mut self.invoices,
            AttachmentKind::Manual => &mut self.manuals,
        }
    }

    pub fn attachment(&self, kind: AttachmentKind, doc_id: &str) -> Option<&Attachment> {
        match kind {
            AttachmentKind::Image => self.images.get(doc_id),
            AttachmentKind::Invoice => self.invoices.get(doc_id),
            AttachmentKind::Manual => self.manuals.get(doc_id),
        }
    }
}

/// Document ID to storage ID, one namespace per entity kind
#[derive(Debug, Default)]
pub(crate) struct IdMapping {
    maps: HashMap<EntityKind, HashMap<String, String>>,
}

impl IdMapping {
    pub fn insert(&mut self, kind: EntityKind, doc_id: &str, storage_id: &str) {
        self.maps
            .entry(kind)
            .or_default()
            .insert(doc_id.to_string(), storage_id.to_string());
    }

    pub fn get(&self, kind: EntityKind, doc_id: &str) -> Option<&str> {
        self.maps
            .get(&kind)
            .and_then(|m| m.get(doc_id))
            .map(String::as_str)
    }
}

/// Entities the engine can reconcile and remember
pub(crate) trait Tracked: Entity + Validate {
    fn store(self, doc_id: &str, existing: &mut ExistingEntities);
}

impl Tracked for Location {
    fn store(self, doc_id: &str, existing: &mut ExistingEntities) {
        existing.locations.insert(doc_id.to_string(), self);
    }
}

impl Tracked for Area {
    fn store(self, doc_id: &str, existing: &mut ExistingEntities) {
        existing.areas.insert(doc_id.to_string(), self);
    }
}

impl Tracked for Commodity {
    fn store(self, doc_id: &str, existing: &mut ExistingEntities) {
        existing.commodities.insert(doc_id.to_string(), self);
    }
}

impl Tracked for Attachment {
    fn store(self, doc_id: &str, existing: &mut ExistingEntities) {
        existing
            .attachments_mut(self.kind)
            .insert(doc_id.to_string(), self);
    }
}

/// Mutable state threaded through one restore run
#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub existing: ExistingEntities,
    pub ids: IdMapping,
    pub stats: RestoreStats,
    seen: HashSet<(EntityKind, String)>,
}

impl RunState {
    /// Record `entity` as existing under `doc_id`, mapped to its storage ID
    pub fn remember<T: Tracked>(&mut self, doc_id: &str, entity: T) {
        self.ids.insert(entity.kind(), doc_id, entity.id());
        entity.store(doc_id, &mut self.existing);
    }

    /// Claim `doc_id` for this run. Each document ID may be processed once.
    pub fn mark_seen(&mut self, kind: EntityKind, doc_id: &str) -> anyhow::Result<()> {
        if !self.seen.insert((kind, doc_id.to_string())) {
            anyhow::bail!("duplicate {} id {} in document", kind, doc_id);
        }
        Ok(())
    }

    /// Load everything already stored in `scope`. Stored entities are keyed
    /// by their storage ID, so a document carrying real IDs matches them.
    pub async fn preload(&mut self, registries: &RegistrySet, scope: &Scope) -> Result<()> {
        for location in registries.locations.list(scope).await? {
            let id = location.id.clone();
            self.remember(&id, location);
        }
        for area in registries.areas.list(scope).await? {
            let id = area.id.clone();
            self.remember(&id, area);
        }
        for commodity in registries.commodities.list(scope).await? {
            let id = commodity.id.clone();
            self.remember(&id, commodity);
        }
        for kind in AttachmentKind::ALL {
            for attachment in registries.attachments(kind).list(scope).await? {
                let id = attachment.id.clone();
                self.remember(&id, attachment);
            }
        }

        debug!(
            "Loaded existing data: {} locations, {} areas, {} commodities, {} images, {} invoices, {} manuals",
            self.existing.locations.len(),
            self.existing.areas.len(),
            self.existing.commodities.len(),
            self.existing.images.len(),
            self.existing.invoices.len(),
            self.existing.manuals.len(),
        );
        Ok(())
    }
}
