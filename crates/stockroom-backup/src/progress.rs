//! Step recording for restore runs.
//!
//! Steps are a side channel for operators: recorders never influence the
//! outcome of a run, and a recorder that fails only logs.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::types::StepResult;
use stockroom_core::OperationRegistry;
use tracing::{info, warn};

/// Receives the named steps of a restore run as they start and end
#[async_trait]
pub trait StepRecorder: Send + Sync {
    async fn started(&self, step: &str);

    async fn succeeded(&self, step: &str, detail: &str);

    async fn failed(&self, step: &str, reason: &str);
}

/// Discards every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait]
impl StepRecorder for NoopRecorder {
    async fn started(&self, _step: &str) {}

    async fn succeeded(&self, _step: &str, _detail: &str) {}

    async fn failed(&self, _step: &str, _reason: &str) {}
}

/// Emits steps as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

#[async_trait]
impl StepRecorder for LogRecorder {
    async fn started(&self, step: &str) {
        info!("{}...", step);
    }

    async fn succeeded(&self, step: &str, detail: &str) {
        if detail.is_empty() {
            info!("{}: done", step);
        } else {
            info!("{}: {}", step, detail);
        }
    }

    async fn failed(&self, step: &str, reason: &str) {
        warn!("{} failed: {}", step, reason);
    }
}

/// Persists steps into a stored restore operation.
pub struct OperationRecorder {
    operations: Arc<dyn OperationRegistry>,
    operation_id: String,
}

impl OperationRecorder {
    pub fn new(operations: Arc<dyn OperationRegistry>, operation_id: impl Into<String>) -> Self {
        Self {
            operations,
            operation_id: operation_id.into(),
        }
    }

    async fn record(&self, step: &str, result: StepResult, reason: &str) {
        let outcome = async {
            let mut operation = self.operations.get(&self.operation_id).await?;
            operation.upsert_step(step, result, reason);
            self.operations.update(operation).await
        }
        .await;

        if let Err(e) = outcome {
            warn!(
                "Failed to record step {:?} for restore operation {}: {}",
                step, self.operation_id, e
            );
        }
    }
}

#[async_trait]
impl StepRecorder for OperationRecorder {
    async fn started(&self, step: &str) {
        self.record(step, StepResult::InProgress, "").await;
    }

    async fn succeeded(&self, step: &str, detail: &str) {
        self.record(step, StepResult::Success, detail).await;
    }

    async fn failed(&self, step: &str, reason: &str) {
        self.record(step, StepResult::Error, reason).await;
    }
}

/// Simple spinner progress for operations without known size.
#[derive(Debug)]
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    /// Creates a new spinner progress indicator.
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Spinner that draws nowhere, for non-interactive output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finishes the progress with a final message.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl StepRecorder for SpinnerProgress {
    async fn started(&self, step: &str) {
        self.update(&format!("{}...", step));
    }

    async fn succeeded(&self, step: &str, detail: &str) {
        let line = if detail.is_empty() {
            format!("✓ {}", step)
        } else {
            format!("✓ {} ({})", step, detail)
        };
        self.bar.println(line);
    }

    async fn failed(&self, step: &str, reason: &str) {
        self.bar.println(format!("✗ {}: {}", step, reason));
    }
}
