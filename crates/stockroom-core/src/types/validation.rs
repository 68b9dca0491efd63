//! Entity validation rules

use rust_decimal::Decimal;

use super::entity_types::{Area, Attachment, Commodity, Location};
use crate::error::{Error, Result};

/// Maximum length of a commodity short name
pub const MAX_SHORT_NAME_LEN: usize = 20;

/// Tenant state some rules depend on
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub main_currency: Option<String>,
}

impl ValidationContext {
    pub fn new(main_currency: Option<String>) -> Self {
        Self { main_currency }
    }

    /// Whether `currency` is the tenant's main currency
    pub fn is_main_currency(&self, currency: &str) -> bool {
        self.main_currency
            .as_deref()
            .is_some_and(|main| !currency.is_empty() && main.eq_ignore_ascii_case(currency))
    }
}

pub trait Validate {
    fn validate(&self, ctx: &ValidationContext) -> Result<()>;
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

fn non_negative(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::validation(field, "must not be negative"));
    }
    Ok(())
}

/// Three ASCII uppercase letters, or empty
pub fn validate_currency(field: &str, code: &str) -> Result<()> {
    if code.is_empty() {
        return Ok(());
    }
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(Error::validation(
            field,
            format!("invalid currency code: {}", code),
        ));
    }
    Ok(())
}

impl Validate for Location {
    fn validate(&self, _ctx: &ValidationContext) -> Result<()> {
        required("name", &self.name)
    }
}

impl Validate for Area {
    fn validate(&self, _ctx: &ValidationContext) -> Result<()> {
        required("name", &self.name)?;
        required("location_id", &self.location_id)
    }
}

impl Validate for Commodity {
    fn validate(&self, ctx: &ValidationContext) -> Result<()> {
        required("name", &self.name)?;
        required("area_id", &self.area_id)?;

        if self.short_name.chars().count() > MAX_SHORT_NAME_LEN {
            return Err(Error::validation(
                "short_name",
                format!("must be at most {} characters", MAX_SHORT_NAME_LEN),
            ));
        }
        if self.count < 1 {
            return Err(Error::validation("count", "must be at least 1"));
        }

        non_negative("original_price", self.original_price)?;
        non_negative("converted_original_price", self.converted_original_price)?;
        non_negative("current_price", self.current_price)?;

        validate_currency("original_price_currency", &self.original_price_currency)?;
        validate_currency("current_currency", &self.current_currency)?;

        if ctx.is_main_currency(&self.original_price_currency)
            && !self.converted_original_price.is_zero()
        {
            return Err(Error::validation(
                "converted_original_price",
                "must be zero when the original price is in the main currency",
            ));
        }

        Ok(())
    }
}

impl Validate for Attachment {
    fn validate(&self, _ctx: &ValidationContext) -> Result<()> {
        required("commodity_id", &self.commodity_id)?;
        required("path", &self.file.path)
    }
}
