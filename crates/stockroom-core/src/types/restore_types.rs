//! Restore options, statistics and persisted run metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity_types::{EntityKind, Scope};
use crate::error::{Error, Result};

/// Merge semantics for a restore run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStrategy {
    /// Delete everything in scope, then create everything from the document
    FullReplace,
    /// Create missing entities, leave existing ones untouched
    #[default]
    MergeAdd,
    /// Create missing entities, update existing ones in place
    MergeUpdate,
}

impl RestoreStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullReplace => "full_replace",
            Self::MergeAdd => "merge_add",
            Self::MergeUpdate => "merge_update",
        }
    }
}

impl FromStr for RestoreStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full_replace" => Ok(Self::FullReplace),
            "merge_add" => Ok(Self::MergeAdd),
            "merge_update" => Ok(Self::MergeUpdate),
            _ => Err(Error::validation(
                "strategy",
                format!(
                    "invalid restore strategy: {}. Valid strategies: full_replace, merge_add, merge_update",
                    s
                ),
            )),
        }
    }
}

impl fmt::Display for RestoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options fixed for the duration of one restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub strategy: RestoreStrategy,
    pub include_file_data: bool,
    pub dry_run: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            strategy: RestoreStrategy::default(),
            include_file_data: true,
            dry_run: false,
        }
    }
}

impl RestoreOptions {
    pub fn new(strategy: RestoreStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn with_file_data(mut self, include_file_data: bool) -> Self {
        self.include_file_data = include_file_data;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Running counters for one restore run. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreStats {
    pub location_count: u64,
    pub area_count: u64,
    pub commodity_count: u64,
    pub image_count: u64,
    pub invoice_count: u64,
    pub manual_count: u64,
    pub binary_data_size: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub updated_count: u64,
    pub created_count: u64,
    pub deleted_count: u64,
    pub errors: Vec<String>,
}

impl RestoreStats {
    fn bump_kind(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Location => self.location_count += 1,
            EntityKind::Area => self.area_count += 1,
            EntityKind::Commodity => self.commodity_count += 1,
            EntityKind::Image => self.image_count += 1,
            EntityKind::Invoice => self.invoice_count += 1,
            EntityKind::Manual => self.manual_count += 1,
        }
    }

    /// Created/updated totals cover locations, areas and commodities only;
    /// attachments are reported through their per-kind counters.
    fn is_core(kind: EntityKind) -> bool {
        matches!(
            kind,
            EntityKind::Location | EntityKind::Area | EntityKind::Commodity
        )
    }

    pub fn record_created(&mut self, kind: EntityKind) {
        if Self::is_core(kind) {
            self.created_count += 1;
        }
        self.bump_kind(kind);
    }

    pub fn record_updated(&mut self, kind: EntityKind) {
        if Self::is_core(kind) {
            self.updated_count += 1;
        }
        self.bump_kind(kind);
    }

    pub fn record_skipped(&mut self) {
        self.skipped_count += 1;
    }

    pub fn record_deleted(&mut self) {
        self.deleted_count += 1;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.errors.push(message.into());
    }

    pub fn add_binary_data(&mut self, bytes: u64) {
        self.binary_data_size += bytes;
    }

    pub fn count_for(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Location => self.location_count,
            EntityKind::Area => self.area_count,
            EntityKind::Commodity => self.commodity_count,
            EntityKind::Image => self.image_count,
            EntityKind::Invoice => self.invoice_count,
            EntityKind::Manual => self.manual_count,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Status of a persisted restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RestoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    InProgress,
    Success,
    Error,
}

/// One named step of a restore run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreStep {
    pub name: String,
    pub result: StepResult,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

/// Persisted record of a queued or executed restore run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOperation {
    pub id: String,
    pub scope: Scope,
    pub description: String,
    /// Blob key of the uploaded backup document
    pub source_key: String,
    pub options: RestoreOptions,
    pub status: RestoreStatus,
    pub steps: Vec<RestoreStep>,
    pub stats: RestoreStats,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RestoreOperation {
    /// New pending run for a document already uploaded under `source_key`
    pub fn pending(scope: Scope, source_key: impl Into<String>, options: RestoreOptions) -> Self {
        Self {
            id: String::new(),
            scope,
            description: String::new(),
            source_key: source_key.into(),
            options,
            status: RestoreStatus::Pending,
            steps: Vec::new(),
            stats: RestoreStats::default(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Insert or replace the step called `name`
    pub fn upsert_step(&mut self, name: &str, result: StepResult, reason: impl Into<String>) {
        let reason = reason.into();
        let now = Utc::now();
        match self.steps.iter_mut().find(|s| s.name == name) {
            Some(step) => {
                step.result = result;
                step.reason = reason;
                step.updated_at = now;
            }
            None => self.steps.push(RestoreStep {
                name: name.to_string(),
                result,
                reason,
                updated_at: now,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "full_replace".parse::<RestoreStrategy>().unwrap(),
            RestoreStrategy::FullReplace
        );
        assert_eq!(
            "Merge-Add".parse::<RestoreStrategy>().unwrap(),
            RestoreStrategy::MergeAdd
        );
        assert_eq!(
            "MERGE_UPDATE".parse::<RestoreStrategy>().unwrap(),
            RestoreStrategy::MergeUpdate
        );
        assert!("overwrite".parse::<RestoreStrategy>().is_err());
    }

    #[test]
    fn test_created_count_excludes_attachments() {
        let mut stats = RestoreStats::default();
        stats.record_created(EntityKind::Location);
        stats.record_created(EntityKind::Area);
        stats.record_created(EntityKind::Commodity);
        stats.record_created(EntityKind::Image);

        assert_eq!(stats.created_count, 3);
        assert_eq!(stats.image_count, 1);
        assert_eq!(stats.count_for(EntityKind::Location), 1);
    }

    #[test]
    fn test_errors_are_counted_and_kept_in_order() {
        let mut stats = RestoreStats::default();
        stats.record_error("first");
        stats.record_error("second");
        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.errors, vec!["first", "second"]);
        assert!(stats.has_errors());
    }

    #[test]
    fn test_upsert_step_replaces_existing() {
        let mut op = RestoreOperation::pending(
            Scope::new("t", "u"),
            "backup.xml",
            RestoreOptions::default(),
        );
        op.upsert_step("Process locations", StepResult::InProgress, "");
        op.upsert_step("Process locations", StepResult::Success, "");
        op.upsert_step("Process areas", StepResult::Error, "boom");

        assert_eq!(op.steps.len(), 2);
        assert_eq!(op.steps[0].result, StepResult::Success);
        assert_eq!(op.steps[1].reason, "boom");
    }
}
