//! Inventory entity types: locations, areas, commodities and attachments

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Tenant/user binding every registry call is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub user_id: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}

/// Every kind of entity the restore engine tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Location,
    Area,
    Commodity,
    Image,
    Invoice,
    Manual,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        Self::Location,
        Self::Area,
        Self::Commodity,
        Self::Image,
        Self::Invoice,
        Self::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Area => "area",
            Self::Commodity => "commodity",
            Self::Image => "image",
            Self::Invoice => "invoice",
            Self::Manual => "manual",
        }
    }

    /// Kind of the entity this one hangs off, if any
    pub fn parent(&self) -> Option<EntityKind> {
        match self {
            Self::Location => None,
            Self::Area => Some(Self::Location),
            Self::Commodity => Some(Self::Area),
            Self::Image | Self::Invoice | Self::Manual => Some(Self::Commodity),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common accessors shared by every stored entity
pub trait Entity: Clone + Send + Sync + 'static {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// ID of the parent entity, for kinds that have one
    fn parent_id(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl Entity for Location {
    fn kind(&self) -> EntityKind {
        EntityKind::Location
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub location_id: String,
}

impl Entity for Area {
    fn kind(&self) -> EntityKind {
        EntityKind::Area
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn parent_id(&self) -> Option<&str> {
        Some(&self.location_id)
    }
}

/// Category of a commodity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityType {
    WhiteGoods,
    Electronics,
    Equipment,
    Furniture,
    Clothes,
    #[default]
    Other,
}

impl CommodityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhiteGoods => "white_goods",
            Self::Electronics => "electronics",
            Self::Equipment => "equipment",
            Self::Furniture => "furniture",
            Self::Clothes => "clothes",
            Self::Other => "other",
        }
    }
}

impl FromStr for CommodityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "white_goods" => Ok(Self::WhiteGoods),
            "electronics" => Ok(Self::Electronics),
            "equipment" => Ok(Self::Equipment),
            "furniture" => Ok(Self::Furniture),
            "clothes" => Ok(Self::Clothes),
            "other" => Ok(Self::Other),
            _ => Err(Error::validation(
                "type",
                format!("unknown commodity type: {}", s),
            )),
        }
    }
}

/// Lifecycle status of a commodity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityStatus {
    #[default]
    InUse,
    Sold,
    Lost,
    Disposed,
    WrittenOff,
}

impl CommodityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InUse => "in_use",
            Self::Sold => "sold",
            Self::Lost => "lost",
            Self::Disposed => "disposed",
            Self::WrittenOff => "written_off",
        }
    }
}

impl FromStr for CommodityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_use" => Ok(Self::InUse),
            "sold" => Ok(Self::Sold),
            "lost" => Ok(Self::Lost),
            "disposed" => Ok(Self::Disposed),
            "written_off" => Ok(Self::WrittenOff),
            _ => Err(Error::validation(
                "status",
                format!("unknown commodity status: {}", s),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub area_id: String,
    pub commodity_type: CommodityType,
    pub count: i64,
    pub status: CommodityStatus,
    pub original_price: Decimal,
    pub original_price_currency: String,
    pub converted_original_price: Decimal,
    pub current_price: Decimal,
    pub current_currency: String,
    pub serial_number: String,
    pub extra_serial_numbers: Vec<String>,
    pub part_numbers: Vec<String>,
    pub tags: Vec<String>,
    pub urls: Vec<String>,
    pub comments: String,
    pub draft: bool,
    pub purchase_date: Option<NaiveDate>,
    pub registered_date: Option<NaiveDate>,
    pub last_modified_date: Option<NaiveDate>,
}

impl Default for Commodity {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            short_name: String::new(),
            area_id: String::new(),
            commodity_type: CommodityType::default(),
            count: 1,
            status: CommodityStatus::default(),
            original_price: Decimal::ZERO,
            original_price_currency: String::new(),
            converted_original_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            current_currency: String::new(),
            serial_number: String::new(),
            extra_serial_numbers: Vec::new(),
            part_numbers: Vec::new(),
            tags: Vec::new(),
            urls: Vec::new(),
            comments: String::new(),
            draft: false,
            purchase_date: None,
            registered_date: None,
            last_modified_date: None,
        }
    }
}

impl Entity for Commodity {
    fn kind(&self) -> EntityKind {
        EntityKind::Commodity
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn parent_id(&self) -> Option<&str> {
        Some(&self.area_id)
    }
}

/// Which attachment collection a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Invoice,
    Manual,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 3] = [Self::Image, Self::Invoice, Self::Manual];

    /// Name of the wire section holding attachments of this kind
    pub fn section(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Invoice => "invoices",
            Self::Manual => "manuals",
        }
    }

    pub fn from_section(name: &str) -> Option<Self> {
        match name {
            "images" => Some(Self::Image),
            "invoices" => Some(Self::Invoice),
            "manuals" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Image => EntityKind::Image,
            Self::Invoice => EntityKind::Invoice,
            Self::Manual => EntityKind::Manual,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_kind().as_str())
    }
}

/// Blob-backed file metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Display path (the stored blob name)
    pub path: String,
    pub original_path: String,
    pub ext: String,
    pub mime_type: String,
}

/// An image, invoice or manual attached to a commodity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub commodity_id: String,
    pub kind: AttachmentKind,
    pub file: FileMeta,
}

impl Attachment {
    pub fn new(kind: AttachmentKind) -> Self {
        Self {
            id: String::new(),
            commodity_id: String::new(),
            kind,
            file: FileMeta::default(),
        }
    }
}

impl Entity for Attachment {
    fn kind(&self) -> EntityKind {
        self.kind.entity_kind()
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn parent_id(&self) -> Option<&str> {
        Some(&self.commodity_id)
    }
}

/// Per-tenant settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub main_currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parents() {
        assert_eq!(EntityKind::Location.parent(), None);
        assert_eq!(EntityKind::Area.parent(), Some(EntityKind::Location));
        assert_eq!(EntityKind::Commodity.parent(), Some(EntityKind::Area));
        assert_eq!(EntityKind::Manual.parent(), Some(EntityKind::Commodity));
    }

    #[test]
    fn test_attachment_sections() {
        for kind in AttachmentKind::ALL {
            assert_eq!(AttachmentKind::from_section(kind.section()), Some(kind));
        }
        assert_eq!(AttachmentKind::from_section("file"), None);
    }

    #[test]
    fn test_commodity_enum_parsing() {
        assert_eq!(
            "white_goods".parse::<CommodityType>().unwrap(),
            CommodityType::WhiteGoods
        );
        assert_eq!(
            "written_off".parse::<CommodityStatus>().unwrap(),
            CommodityStatus::WrittenOff
        );
        assert!("toaster".parse::<CommodityType>().is_err());
        assert!("broken".parse::<CommodityStatus>().is_err());
    }

    #[test]
    fn test_attachment_kind_maps_to_entity_kind() {
        let image = Attachment::new(AttachmentKind::Image);
        assert_eq!(image.kind(), EntityKind::Image);
        assert_eq!(AttachmentKind::Invoice.to_string(), "invoice");
    }
}
