//! Registry capability traits
//!
//! A registry is the storage adapter for one entity kind. Every call takes the
//! caller's [`Scope`]; implementations must never read or write rows outside it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{
    Area, Attachment, AttachmentKind, Commodity, Location, RestoreOperation, Scope, Settings,
};

/// CRUD operations for one entity kind
#[async_trait]
pub trait Registry<T>: Send + Sync {
    /// Store a new entity; the registry assigns and returns its ID
    async fn create(&self, scope: &Scope, item: T) -> Result<T>;

    async fn get(&self, scope: &Scope, id: &str) -> Result<T>;

    /// Replace the entity whose ID matches `item`
    async fn update(&self, scope: &Scope, item: T) -> Result<T>;

    async fn list(&self, scope: &Scope) -> Result<Vec<T>>;

    async fn delete(&self, scope: &Scope, id: &str) -> Result<()>;
}

/// Locations additionally support deleting their whole subtree
#[async_trait]
pub trait LocationRegistry: Registry<Location> {
    /// Delete a location with its areas, commodities and attachments
    async fn delete_recursive(&self, scope: &Scope, id: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsRegistry: Send + Sync {
    async fn get(&self, scope: &Scope) -> Result<Settings>;

    async fn save(&self, scope: &Scope, settings: Settings) -> Result<Settings>;
}

/// Persistence for restore run metadata
#[async_trait]
pub trait OperationRegistry: Send + Sync {
    async fn create(&self, operation: RestoreOperation) -> Result<RestoreOperation>;

    async fn get(&self, id: &str) -> Result<RestoreOperation>;

    async fn update(&self, operation: RestoreOperation) -> Result<RestoreOperation>;

    async fn list(&self) -> Result<Vec<RestoreOperation>>;

    /// Pending runs, oldest first
    async fn list_pending(&self) -> Result<Vec<RestoreOperation>>;
}

/// One handle per capability, cheap to clone
#[derive(Clone)]
pub struct RegistrySet {
    pub locations: Arc<dyn LocationRegistry>,
    pub areas: Arc<dyn Registry<Area>>,
    pub commodities: Arc<dyn Registry<Commodity>>,
    pub images: Arc<dyn Registry<Attachment>>,
    pub invoices: Arc<dyn Registry<Attachment>>,
    pub manuals: Arc<dyn Registry<Attachment>>,
    pub settings: Arc<dyn SettingsRegistry>,
}

impl RegistrySet {
    pub fn attachments(&self, kind: AttachmentKind) -> &Arc<dyn Registry<Attachment>> {
        match kind {
            AttachmentKind::Image => &self.images,
            AttachmentKind::Invoice => &self.invoices,
            AttachmentKind::Manual => &self.manuals,
        }
    }
}
