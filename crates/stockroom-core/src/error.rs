//! Error types for stockroom-core

use thiserror::Error;

use crate::types::EntityKind;

/// Result type alias using stockroom-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Stockroom
#[derive(Error, Debug)]
pub enum Error {
    /// Entity does not exist in the caller's scope
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Entity failed validation
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// Entity references a parent that does not exist in the caller's scope
    #[error("{kind} references non-existent {parent} {parent_id}")]
    ForeignKey {
        kind: EntityKind,
        parent: EntityKind,
        parent_id: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a foreign key error
    pub fn foreign_key(kind: EntityKind, parent: EntityKind, parent_id: impl Into<String>) -> Self {
        Self::ForeignKey {
            kind,
            parent,
            parent_id: parent_id.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error means the entity is missing from the caller's scope.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
