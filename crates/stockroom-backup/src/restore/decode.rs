//! Wire record to domain value conversion

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use stockroom_core::types::{Area, Commodity, CommodityStatus, CommodityType, Location};
use tokio::io::AsyncBufRead;

use super::reader::{StartTag, Token, XmlCursor};
use super::RestoreError;

/// Child elements holding a list of values rather than text
const LIST_FIELDS: &[&str] = &["extraSerialNumbers", "partNumbers", "tags", "urls"];

/// Child elements of one entity element, before any interpretation
#[derive(Debug, Default)]
pub(crate) struct RawRecord {
    pub id: Option<String>,
    fields: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl RawRecord {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Read every child of the element opened by `tag`
    pub async fn read<R: AsyncBufRead + Unpin + Send>(
        cursor: &mut XmlCursor<R>,
        tag: &StartTag,
    ) -> Result<Self, RestoreError> {
        let mut record = Self::new(tag.id());
        loop {
            match cursor.next().await? {
                Token::Start(child) => record.read_child(cursor, &child.name).await?,
                Token::End(end) if end == tag.name => return Ok(record),
                Token::End(_) | Token::Text(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }
    }

    /// Read the child element `name` whose start tag was just consumed
    pub async fn read_child<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        name: &str,
    ) -> Result<(), RestoreError> {
        if LIST_FIELDS.contains(&name) {
            let items = cursor.read_list(name).await?;
            self.lists.insert(name.to_string(), items);
        } else {
            let text = cursor.read_text(name).await?;
            self.fields.insert(name.to_string(), text.trim().to_string());
        }
        Ok(())
    }

    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.lists.get(name).cloned().unwrap_or_default()
    }

    fn require_id(&self, element: &str) -> Result<String> {
        match &self.id {
            Some(id) => Ok(id.clone()),
            None => bail!("{} element is missing its id attribute", element),
        }
    }

    /// Document ID for error messages
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<no id>".to_string())
    }
}

fn currency(record: &RawRecord, name: &str) -> String {
    record.text(name).to_ascii_uppercase()
}

fn decimal(record: &RawRecord, name: &str) -> Result<Decimal> {
    let raw = record.text(name);
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .with_context(|| format!("invalid {} {:?}", name, raw))
}

fn date(record: &RawRecord, name: &str) -> Result<Option<NaiveDate>> {
    let raw = record.text(name);
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| Some(dt.date_naive()))
        .with_context(|| format!("invalid {} {:?}", name, raw))
}

fn flag(record: &RawRecord, name: &str) -> Result<bool> {
    match record.text(name).to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => bail!("invalid {} {:?}", name, other),
    }
}

/// Enum names are accepted in any case, with `-` or `_`
fn variant<T: FromStr<Err = stockroom_core::Error> + Default>(
    record: &RawRecord,
    name: &str,
) -> Result<T> {
    let raw = record.text(name);
    if raw.is_empty() {
        return Ok(T::default());
    }
    Ok(raw.to_ascii_lowercase().replace('-', "_").parse()?)
}

pub(crate) fn decode_location(record: &RawRecord) -> Result<Location> {
    Ok(Location {
        id: record.require_id("location")?,
        name: record.text("locationName"),
        address: record.text("address"),
    })
}

/// The area's `location_id` is still the document ID of its location
pub(crate) fn decode_area(record: &RawRecord) -> Result<Area> {
    Ok(Area {
        id: record.require_id("area")?,
        name: record.text("areaName"),
        location_id: record.text("locationId"),
    })
}

/// The commodity's `area_id` is still the document ID of its area
pub(crate) fn decode_commodity(record: &RawRecord) -> Result<Commodity> {
    let count = match record.text("count") {
        raw if raw.is_empty() => 1,
        raw => raw
            .parse::<i64>()
            .with_context(|| format!("invalid count {:?}", raw))?,
    };

    Ok(Commodity {
        id: record.require_id("commodity")?,
        name: record.text("commodityName"),
        short_name: record.text("shortName"),
        area_id: record.text("areaId"),
        commodity_type: variant::<CommodityType>(record, "type")?,
        count,
        status: variant::<CommodityStatus>(record, "status")?,
        original_price: decimal(record, "originalPrice")?,
        original_price_currency: currency(record, "originalPriceCurrency"),
        converted_original_price: decimal(record, "convertedOriginalPrice")?,
        current_price: decimal(record, "currentPrice")?,
        current_currency: currency(record, "currentCurrency"),
        serial_number: record.text("serialNumber"),
        extra_serial_numbers: record.list("extraSerialNumbers"),
        part_numbers: record.list("partNumbers"),
        tags: record.list("tags"),
        urls: record.list("urls"),
        comments: record.text("comments"),
        draft: flag(record, "draft")?,
        purchase_date: date(record, "purchaseDate")?,
        registered_date: date(record, "registeredDate")?,
        last_modified_date: date(record, "lastModifiedDate")?,
    })
}
