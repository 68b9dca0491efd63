//! Common test utilities for stockroom-backup
//!
//! - A [`Harness`] wiring a memory backend, a temporary blob store and the engine
//! - Builders for backup documents in the wire format

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use camino::Utf8PathBuf;
use std::sync::Arc;
use stockroom_backup::{BlobStore, FsBlobStore, NoopRecorder, RestoreEngine, RestoreFailure};
use stockroom_core::types::{
    Area, Attachment, AttachmentKind, Commodity, EntityKind, Location, RestoreOptions,
    RestoreStats, RestoreStrategy, Scope, Settings,
};
use stockroom_core::{MemoryBackend, RegistrySet};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

pub fn scope_a() -> Scope {
    Scope::new("acme", "alice")
}

pub fn scope_b() -> Scope {
    Scope::new("globex", "bob")
}

pub fn options(strategy: RestoreStrategy) -> RestoreOptions {
    RestoreOptions::new(strategy)
}

/// Memory backend, temporary blob store and engine
pub struct Harness {
    _dir: TempDir,
    pub backend: Arc<MemoryBackend>,
    pub blobs: Arc<FsBlobStore>,
    pub engine: RestoreEngine,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("blobs")).unwrap();
        let backend = MemoryBackend::new();
        let blobs = Arc::new(FsBlobStore::new(root));
        let engine = RestoreEngine::new(backend.registries(), blobs.clone());
        Self {
            _dir: dir,
            backend,
            blobs,
            engine,
        }
    }

    pub fn registries(&self) -> RegistrySet {
        self.backend.registries()
    }

    pub async fn restore(
        &self,
        scope: &Scope,
        xml: &str,
        options: RestoreOptions,
    ) -> Result<RestoreStats, RestoreFailure> {
        self.engine
            .restore_from_xml(scope, xml.as_bytes(), options, &NoopRecorder)
            .await
    }

    /// Restore and fail the test on a fatal error
    pub async fn restore_ok(&self, scope: &Scope, xml: &str, strategy: RestoreStrategy) -> RestoreStats {
        match self.restore(scope, xml, options(strategy)).await {
            Ok(stats) => stats,
            Err(failure) => panic!("restore failed: {} (stats: {:?})", failure, failure.stats),
        }
    }

    pub async fn set_main_currency(&self, scope: &Scope, currency: &str) {
        self.registries()
            .settings
            .save(
                scope,
                Settings {
                    main_currency: Some(currency.to_string()),
                },
            )
            .await
            .unwrap();
    }

    pub async fn count(&self, scope: &Scope, kind: EntityKind) -> usize {
        self.backend.count(scope, kind).await
    }

    pub async fn locations(&self, scope: &Scope) -> Vec<Location> {
        self.registries().locations.list(scope).await.unwrap()
    }

    pub async fn areas(&self, scope: &Scope) -> Vec<Area> {
        self.registries().areas.list(scope).await.unwrap()
    }

    pub async fn commodities(&self, scope: &Scope) -> Vec<Commodity> {
        self.registries().commodities.list(scope).await.unwrap()
    }

    pub async fn attachments(&self, scope: &Scope, kind: AttachmentKind) -> Vec<Attachment> {
        self.registries()
            .attachments(kind)
            .list(scope)
            .await
            .unwrap()
    }

    pub async fn blob(&self, key: &str) -> Vec<u8> {
        let mut content = Vec::new();
        self.blobs
            .reader(key)
            .await
            .unwrap()
            .read_to_end(&mut content)
            .await
            .unwrap();
        content
    }

    pub async fn blob_exists(&self, key: &str) -> bool {
        self.blobs.exists(key).await.unwrap()
    }

    /// Number of files in the blob store
    pub fn blob_count(&self) -> usize {
        match std::fs::read_dir(self.blobs.root()) {
            Ok(entries) => entries.count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => panic!("cannot list blob store: {}", e),
        }
    }
}

pub fn location_xml(id: &str, name: &str) -> String {
    format!(
        r#"<location id="{}"><locationName>{}</locationName><address>1 Main St</address></location>"#,
        id, name
    )
}

pub fn area_xml(id: &str, name: &str, location_id: &str) -> String {
    format!(
        r#"<area id="{}"><areaName>{}</areaName><locationId>{}</locationId></area>"#,
        id, name, location_id
    )
}

/// Commodity element; `inner` is appended after the fields, e.g. attachment sections
pub fn commodity_xml(id: &str, name: &str, area_id: &str, inner: &str) -> String {
    format!(
        r#"<commodity id="{}">
      <commodityName>{}</commodityName>
      <shortName>{}</shortName>
      <areaId>{}</areaId>
      <type>electronics</type>
      <count>1</count>
      <status>in_use</status>
      <originalPrice>100.00</originalPrice>
      <originalPriceCurrency>USD</originalPriceCurrency>
      <convertedOriginalPrice>0</convertedOriginalPrice>
      <currentPrice>80.00</currentPrice>
      <currentCurrency>USD</currentCurrency>
      <tags><tag>test</tag></tags>
      {}
    </commodity>"#,
        id, name, "item", area_id, inner
    )
}

pub fn file_xml(id: &str, original_path: &str, bytes: &[u8]) -> String {
    let ext = original_path.rsplit('.').next().unwrap_or("");
    format!(
        r#"<file id="{}"><path>{}</path><originalPath>{}</originalPath><extension>.{}</extension><mimeType>application/octet-stream</mimeType><data>{}</data></file>"#,
        id,
        original_path,
        original_path,
        ext,
        STANDARD.encode(bytes)
    )
}

pub fn section(name: &str, items: &[String]) -> String {
    format!("<{}>{}</{}>", name, items.concat(), name)
}

pub fn document(sections: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- stockroom export -->\n<inventory xmlns=\"http://stockroom.local/backup\">{}</inventory>",
        sections.concat()
    )
}

/// One location, one area, one commodity with one image
pub fn single_item_document() -> String {
    single_item_document_with_image(b"\xff\xd8jpeg")
}

/// [`single_item_document`] with other image bytes under the same IDs and path
pub fn single_item_document_with_image(bytes: &[u8]) -> String {
    document(&[
        section("locations", &[location_xml("l1", "Home")]),
        section("areas", &[area_xml("a1", "Office", "l1")]),
        section(
            "commodities",
            &[commodity_xml(
                "c1",
                "Laptop",
                "a1",
                &section("images", &[file_xml("img1", "photos/laptop.jpg", bytes)]),
            )],
        ),
    ])
}
