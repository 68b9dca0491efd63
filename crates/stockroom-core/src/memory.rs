//! In-memory registry backend with optional JSON snapshots
//!
//! Rows are tagged with the [`Scope`] that created them and every lookup is
//! filtered by the caller's scope, so an ID owned by another tenant or user
//! behaves exactly like an ID that does not exist.

use async_trait::async_trait;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::registry::{
    LocationRegistry, OperationRegistry, Registry, RegistrySet, SettingsRegistry,
};
use crate::types::{
    Area, Attachment, Commodity, Entity, EntityKind, Location, RestoreOperation,
    RestoreStatus, Scope, Settings,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row<T> {
    scope: Scope,
    value: T,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    locations: BTreeMap<String, Row<Location>>,
    areas: BTreeMap<String, Row<Area>>,
    commodities: BTreeMap<String, Row<Commodity>>,
    attachments: BTreeMap<String, Row<Attachment>>,
    settings: Vec<Row<Settings>>,
    operations: BTreeMap<String, RestoreOperation>,
}

impl Tables {
    fn contains(&self, kind: EntityKind, scope: &Scope, id: &str) -> bool {
        fn owned<T>(rows: &BTreeMap<String, Row<T>>, scope: &Scope, id: &str) -> bool {
            rows.get(id).is_some_and(|row| &row.scope == scope)
        }
        match kind {
            EntityKind::Location => owned(&self.locations, scope, id),
            EntityKind::Area => owned(&self.areas, scope, id),
            EntityKind::Commodity => owned(&self.commodities, scope, id),
            EntityKind::Image | EntityKind::Invoice | EntityKind::Manual => self
                .attachments
                .get(id)
                .is_some_and(|row| &row.scope == scope && row.value.kind() == kind),
        }
    }

    /// Number of direct children of `(kind, id)`
    fn children_of(&self, kind: EntityKind, id: &str) -> usize {
        match kind {
            EntityKind::Location => self
                .areas
                .values()
                .filter(|r| r.value.location_id == id)
                .count(),
            EntityKind::Area => self
                .commodities
                .values()
                .filter(|r| r.value.area_id == id)
                .count(),
            EntityKind::Commodity => self
                .attachments
                .values()
                .filter(|r| r.value.commodity_id == id)
                .count(),
            _ => 0,
        }
    }

    fn check_parent<T: Entity>(&self, scope: &Scope, item: &T) -> Result<()> {
        let kind = item.kind();
        match (kind.parent(), item.parent_id()) {
            (Some(parent), Some(parent_id)) if !self.contains(parent, scope, parent_id) => {
                Err(Error::foreign_key(kind, parent, parent_id))
            }
            _ => Ok(()),
        }
    }
}

/// Gives the generic registry access to the table holding `Self`
trait Stored: Entity {
    fn rows(tables: &Tables) -> &BTreeMap<String, Row<Self>>;
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Row<Self>>;
}

impl Stored for Location {
    fn rows(tables: &Tables) -> &BTreeMap<String, Row<Self>> {
        &tables.locations
    }
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Row<Self>> {
        &mut tables.locations
    }
}

impl Stored for Area {
    fn rows(tables: &Tables) -> &BTreeMap<String, Row<Self>> {
        &tables.areas
    }
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Row<Self>> {
        &mut tables.areas
    }
}

impl Stored for Commodity {
    fn rows(tables: &Tables) -> &BTreeMap<String, Row<Self>> {
        &tables.commodities
    }
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Row<Self>> {
        &mut tables.commodities
    }
}

impl Stored for Attachment {
    fn rows(tables: &Tables) -> &BTreeMap<String, Row<Self>> {
        &tables.attachments
    }
    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Row<Self>> {
        &mut tables.attachments
    }
}

/// Shared state behind every in-memory registry
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Load a snapshot written by [`MemoryBackend::save`]; a missing file yields an empty backend
    pub async fn load(path: &Utf8Path) -> Result<Arc<Self>> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let tables: Tables = serde_json::from_slice(&content)?;
        Ok(Arc::new(Self {
            tables: RwLock::new(tables),
        }))
    }

    pub async fn save(&self, path: &Utf8Path) -> Result<()> {
        let json = {
            let tables = self.tables.read().await;
            serde_json::to_vec_pretty(&*tables)?
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Registry handles for every entity kind, all backed by this store
    pub fn registries(self: &Arc<Self>) -> RegistrySet {
        RegistrySet {
            locations: Arc::new(MemoryRegistry::<Location>::new(self, EntityKind::Location)),
            areas: Arc::new(MemoryRegistry::<Area>::new(self, EntityKind::Area)),
            commodities: Arc::new(MemoryRegistry::<Commodity>::new(self, EntityKind::Commodity)),
            images: Arc::new(MemoryRegistry::<Attachment>::new(self, EntityKind::Image)),
            invoices: Arc::new(MemoryRegistry::<Attachment>::new(self, EntityKind::Invoice)),
            manuals: Arc::new(MemoryRegistry::<Attachment>::new(self, EntityKind::Manual)),
            settings: Arc::new(MemorySettings {
                backend: Arc::clone(self),
            }),
        }
    }

    pub fn operations(self: &Arc<Self>) -> Arc<dyn OperationRegistry> {
        Arc::new(MemoryOperations {
            backend: Arc::clone(self),
        })
    }

    /// Number of rows of `kind` owned by `scope`
    pub async fn count(&self, scope: &Scope, kind: EntityKind) -> usize {
        fn in_scope<T>(rows: &BTreeMap<String, Row<T>>, scope: &Scope) -> usize {
            rows.values().filter(|r| &r.scope == scope).count()
        }
        let tables = self.tables.read().await;
        match kind {
            EntityKind::Location => in_scope(&tables.locations, scope),
            EntityKind::Area => in_scope(&tables.areas, scope),
            EntityKind::Commodity => in_scope(&tables.commodities, scope),
            EntityKind::Image | EntityKind::Invoice | EntityKind::Manual => tables
                .attachments
                .values()
                .filter(|r| &r.scope == scope && r.value.kind() == kind)
                .count(),
        }
    }
}

/// Registry view over one table of a [`MemoryBackend`]
struct MemoryRegistry<T> {
    backend: Arc<MemoryBackend>,
    kind: EntityKind,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MemoryRegistry<T> {
    fn new(backend: &Arc<MemoryBackend>, kind: EntityKind) -> Self {
        Self {
            backend: Arc::clone(backend),
            kind,
            _marker: PhantomData,
        }
    }

    fn visible(&self, row: &Row<T>, scope: &Scope) -> bool
    where
        T: Entity,
    {
        &row.scope == scope && row.value.kind() == self.kind
    }
}

#[async_trait]
impl<T: Stored> Registry<T> for MemoryRegistry<T> {
    async fn create(&self, scope: &Scope, mut item: T) -> Result<T> {
        if item.kind() != self.kind {
            return Err(Error::validation(
                "kind",
                format!("expected {}, got {}", self.kind, item.kind()),
            ));
        }
        let mut tables = self.backend.tables.write().await;
        tables.check_parent(scope, &item)?;

        item.set_id(Uuid::new_v4().to_string());
        T::rows_mut(&mut tables).insert(
            item.id().to_string(),
            Row {
                scope: scope.clone(),
                value: item.clone(),
            },
        );
        Ok(item)
    }

    async fn get(&self, scope: &Scope, id: &str) -> Result<T> {
        let tables = self.backend.tables.read().await;
        T::rows(&tables)
            .get(id)
            .filter(|row| self.visible(row, scope))
            .map(|row| row.value.clone())
            .ok_or_else(|| Error::not_found(self.kind, id))
    }

    async fn update(&self, scope: &Scope, item: T) -> Result<T> {
        let mut tables = self.backend.tables.write().await;
        let exists = T::rows(&tables)
            .get(item.id())
            .is_some_and(|row| self.visible(row, scope));
        if !exists {
            return Err(Error::not_found(self.kind, item.id()));
        }
        tables.check_parent(scope, &item)?;

        T::rows_mut(&mut tables).insert(
            item.id().to_string(),
            Row {
                scope: scope.clone(),
                value: item.clone(),
            },
        );
        Ok(item)
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<T>> {
        let tables = self.backend.tables.read().await;
        Ok(T::rows(&tables)
            .values()
            .filter(|row| self.visible(row, scope))
            .map(|row| row.value.clone())
            .collect())
    }

    async fn delete(&self, scope: &Scope, id: &str) -> Result<()> {
        let mut tables = self.backend.tables.write().await;
        if !tables.contains(self.kind, scope, id) {
            return Err(Error::not_found(self.kind, id));
        }
        if tables.children_of(self.kind, id) > 0 {
            return Err(Error::validation(
                "id",
                format!("{} {} still has dependent entities", self.kind, id),
            ));
        }
        T::rows_mut(&mut tables).remove(id);
        Ok(())
    }
}

#[async_trait]
impl LocationRegistry for MemoryRegistry<Location> {
    async fn delete_recursive(&self, scope: &Scope, id: &str) -> Result<()> {
        let mut tables = self.backend.tables.write().await;
        if !tables.contains(EntityKind::Location, scope, id) {
            return Err(Error::not_found(EntityKind::Location, id));
        }

        let areas: Vec<String> = tables
            .areas
            .values()
            .filter(|r| &r.scope == scope && r.value.location_id == id)
            .map(|r| r.value.id.clone())
            .collect();
        let commodities: Vec<String> = tables
            .commodities
            .values()
            .filter(|r| &r.scope == scope && areas.contains(&r.value.area_id))
            .map(|r| r.value.id.clone())
            .collect();

        tables
            .attachments
            .retain(|_, r| !(&r.scope == scope && commodities.contains(&r.value.commodity_id)));
        for commodity_id in &commodities {
            tables.commodities.remove(commodity_id);
        }
        for area_id in &areas {
            tables.areas.remove(area_id);
        }
        tables.locations.remove(id);

        debug!(
            "Deleted location {} with {} areas and {} commodities",
            id,
            areas.len(),
            commodities.len()
        );
        Ok(())
    }
}

struct MemorySettings {
    backend: Arc<MemoryBackend>,
}

#[async_trait]
impl SettingsRegistry for MemorySettings {
    async fn get(&self, scope: &Scope) -> Result<Settings> {
        let tables = self.backend.tables.read().await;
        Ok(tables
            .settings
            .iter()
            .find(|row| &row.scope == scope)
            .map(|row| row.value.clone())
            .unwrap_or_default())
    }

    async fn save(&self, scope: &Scope, settings: Settings) -> Result<Settings> {
        let mut tables = self.backend.tables.write().await;
        tables.settings.retain(|row| &row.scope != scope);
        tables.settings.push(Row {
            scope: scope.clone(),
            value: settings.clone(),
        });
        Ok(settings)
    }
}

struct MemoryOperations {
    backend: Arc<MemoryBackend>,
}

#[async_trait]
impl OperationRegistry for MemoryOperations {
    async fn create(&self, mut operation: RestoreOperation) -> Result<RestoreOperation> {
        operation.id = Uuid::new_v4().to_string();
        let mut tables = self.backend.tables.write().await;
        tables
            .operations
            .insert(operation.id.clone(), operation.clone());
        Ok(operation)
    }

    async fn get(&self, id: &str) -> Result<RestoreOperation> {
        let tables = self.backend.tables.read().await;
        tables
            .operations
            .get(id)
            .cloned()
            .ok_or_else(|| Error::validation("id", format!("restore operation not found: {}", id)))
    }

    async fn update(&self, operation: RestoreOperation) -> Result<RestoreOperation> {
        let mut tables = self.backend.tables.write().await;
        if !tables.operations.contains_key(&operation.id) {
            return Err(Error::validation(
                "id",
                format!("restore operation not found: {}", operation.id),
            ));
        }
        tables
            .operations
            .insert(operation.id.clone(), operation.clone());
        Ok(operation)
    }

    async fn list(&self) -> Result<Vec<RestoreOperation>> {
        let tables = self.backend.tables.read().await;
        let mut all: Vec<_> = tables.operations.values().cloned().collect();
        all.sort_by_key(|op| op.created_at);
        Ok(all)
    }

    async fn list_pending(&self) -> Result<Vec<RestoreOperation>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|op| op.status == RestoreStatus::Pending)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachmentKind;
    use tempfile::TempDir;

    fn scope() -> Scope {
        Scope::new("tenant-a", "user-a")
    }

    async fn seed(registries: &RegistrySet, scope: &Scope) -> (Location, Area, Commodity) {
        let location = registries
            .locations
            .create(
                scope,
                Location {
                    name: "Home".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let area = registries
            .areas
            .create(
                scope,
                Area {
                    name: "Office".to_string(),
                    location_id: location.id.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let commodity = registries
            .commodities
            .create(
                scope,
                Commodity {
                    name: "Desk".to_string(),
                    area_id: area.id.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (location, area, commodity)
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_ids() {
        let backend = MemoryBackend::new();
        let registries = backend.registries();
        let created = registries
            .locations
            .create(
                &scope(),
                Location {
                    id: "from-document".to_string(),
                    name: "Home".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_ne!(created.id, "from-document");
        assert_eq!(
            registries.locations.get(&scope(), &created.id).await.unwrap(),
            created
        );
    }

    #[tokio::test]
    async fn test_foreign_key_checked_within_scope() {
        let backend = MemoryBackend::new();
        let registries = backend.registries();
        let (location, _, _) = seed(&registries, &scope()).await;

        let other = Scope::new("tenant-b", "user-b");
        let err = registries
            .areas
            .create(
                &other,
                Area {
                    name: "Sneaky".to_string(),
                    location_id: location.id.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ForeignKey { .. }));
        assert!(registries.locations.get(&other, &location.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_recursive_removes_subtree() {
        let backend = MemoryBackend::new();
        let registries = backend.registries();
        let (location, _, commodity) = seed(&registries, &scope()).await;

        let mut image = Attachment::new(AttachmentKind::Image);
        image.commodity_id = commodity.id.clone();
        image.file.path = "photo.jpg".to_string();
        registries.images.create(&scope(), image).await.unwrap();

        assert!(registries.locations.delete(&scope(), &location.id).await.is_err());
        registries
            .locations
            .delete_recursive(&scope(), &location.id)
            .await
            .unwrap();

        for kind in EntityKind::ALL {
            assert_eq!(backend.count(&scope(), kind).await, 0, "{} left behind", kind);
        }
    }

    #[tokio::test]
    async fn test_attachment_registries_are_separated_by_kind() {
        let backend = MemoryBackend::new();
        let registries = backend.registries();
        let (_, _, commodity) = seed(&registries, &scope()).await;

        let mut manual = Attachment::new(AttachmentKind::Manual);
        manual.commodity_id = commodity.id.clone();
        manual.file.path = "manual.pdf".to_string();
        registries.manuals.create(&scope(), manual).await.unwrap();

        assert_eq!(registries.manuals.list(&scope()).await.unwrap().len(), 1);
        assert!(registries.images.list(&scope()).await.unwrap().is_empty());
        assert!(registries
            .images
            .create(&scope(), Attachment::new(AttachmentKind::Manual))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp_dir.path().join("data.json")).unwrap();

        let backend = MemoryBackend::new();
        seed(&backend.registries(), &scope()).await;
        backend
            .registries()
            .settings
            .save(
                &scope(),
                Settings {
                    main_currency: Some("USD".to_string()),
                },
            )
            .await
            .unwrap();
        backend.save(&path).await.unwrap();

        let restored = MemoryBackend::load(&path).await.unwrap();
        assert_eq!(restored.count(&scope(), EntityKind::Commodity).await, 1);
        let settings = restored.registries().settings.get(&scope()).await.unwrap();
        assert_eq!(settings.main_currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn test_missing_snapshot_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp_dir.path().join("none.json")).unwrap();
        let backend = MemoryBackend::load(&path).await.unwrap();
        assert_eq!(backend.count(&scope(), EntityKind::Location).await, 0);
    }

    #[tokio::test]
    async fn test_pending_operations_oldest_first() {
        let backend = MemoryBackend::new();
        let operations = backend.operations();
        let first = operations
            .create(RestoreOperation::pending(scope(), "a.xml", Default::default()))
            .await
            .unwrap();
        let mut second = operations
            .create(RestoreOperation::pending(scope(), "b.xml", Default::default()))
            .await
            .unwrap();
        second.status = RestoreStatus::Completed;
        operations.update(second).await.unwrap();

        let pending = operations.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }
}
