//! Background worker for queued restore runs.
//!
//! Polls for pending operations and runs at most `max_concurrent` of them at
//! once. When every slot is busy the remaining operations wait for the next
//! tick. A run that has started is never interrupted.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::types::{RestoreOperation, RestoreStatus};
use stockroom_core::OperationRegistry;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::progress::OperationRecorder;
use crate::restore::{RestoreEngine, RestoreFailure};

pub struct RestoreWorker {
    engine: Arc<RestoreEngine>,
    operations: Arc<dyn OperationRegistry>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    poll_interval: Duration,
    stop: CancellationToken,
}

impl RestoreWorker {
    pub fn new(
        engine: Arc<RestoreEngine>,
        operations: Arc<dyn OperationRegistry>,
        max_concurrent: usize,
        poll_interval: Duration,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            engine,
            operations,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            poll_interval,
            stop: CancellationToken::new(),
        }
    }

    /// Poll until `cancel` fires or [`RestoreWorker::shutdown`] is called
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Restore worker started (max_concurrent={}, poll_interval={:?})",
            self.max_concurrent, self.poll_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Restore worker cancelled");
                    break;
                }
                _ = self.stop.cancelled() => {
                    info!("Restore worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Restore poll failed: {}", e);
                    }
                }
            }
        }
    }

    /// Poll until no operation is pending or running, or `cancel` fires
    pub async fn run_until_idle(&self, cancel: &CancellationToken) -> stockroom_core::Result<()> {
        let pause = self.poll_interval.min(Duration::from_millis(250));
        loop {
            self.tick().await?;
            if self.is_idle() && self.operations.list_pending().await?.is_empty() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = self.stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Start as many pending operations as there are free slots. Returns the
    /// number started.
    pub async fn tick(&self) -> stockroom_core::Result<usize> {
        let pending = self.operations.list_pending().await?;
        let mut started = 0;

        for mut operation in pending {
            let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(
                        "All {} restore slots busy, retrying next tick",
                        self.max_concurrent
                    );
                    break;
                }
            };

            operation.status = RestoreStatus::Running;
            operation.started_at = Some(Utc::now());
            let operation = match self.operations.update(operation).await {
                Ok(operation) => operation,
                Err(e) => {
                    warn!("Failed to mark restore operation as running: {}", e);
                    continue;
                }
            };

            info!(
                "Starting restore operation {} ({}, {})",
                operation.id, operation.scope, operation.options.strategy
            );
            let engine = Arc::clone(&self.engine);
            let operations = Arc::clone(&self.operations);
            tokio::spawn(async move {
                let _permit = permit;
                execute(engine, operations, operation).await;
            });
            started += 1;
        }

        Ok(started)
    }

    /// Whether no run is in flight
    pub fn is_idle(&self) -> bool {
        self.semaphore.available_permits() == self.max_concurrent
    }

    /// Stop polling, then wait for in-flight runs to finish
    pub async fn shutdown(&self) {
        self.stop.cancel();
        match self.semaphore.acquire_many(self.max_concurrent as u32).await {
            Ok(_permits) => info!("Restore worker stopped"),
            Err(e) => warn!("Restore worker semaphore closed: {}", e),
        }
    }
}

async fn execute(
    engine: Arc<RestoreEngine>,
    operations: Arc<dyn OperationRegistry>,
    operation: RestoreOperation,
) {
    let recorder = OperationRecorder::new(Arc::clone(&operations), operation.id.clone());

    let result = match engine.blobs().reader(&operation.source_key).await {
        Ok(reader) => {
            engine
                .restore_from_xml(&operation.scope, reader, operation.options, &recorder)
                .await
        }
        Err(e) => Err(RestoreFailure {
            stats: Default::default(),
            source: e.into(),
        }),
    };

    // Reload so steps written by the recorder are kept
    let mut finished = match operations.get(&operation.id).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Failed to reload restore operation {}: {}", operation.id, e);
            operation
        }
    };
    finished.completed_at = Some(Utc::now());

    match result {
        Ok(stats) => {
            info!(
                "Restore operation {} completed with {} errors",
                finished.id, stats.error_count
            );
            finished.status = RestoreStatus::Completed;
            finished.stats = stats;
        }
        Err(failure) => {
            error!("Restore operation {} failed: {}", finished.id, failure);
            finished.status = RestoreStatus::Failed;
            finished.error_message = Some(failure.to_string());
            finished.stats = failure.stats;
        }
    }

    if let Err(e) = operations.update(finished).await {
        error!("Failed to store restore operation result: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobStore, FsBlobStore};
    use camino::Utf8PathBuf;
    use stockroom_core::types::{EntityKind, RestoreOptions, RestoreStrategy, Scope};
    use stockroom_core::MemoryBackend;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    const DOC: &str = r#"<inventory>
  <locations><location id="l1"><locationName>Home</locationName></location></locations>
  <areas><area id="a1"><areaName>Office</areaName><locationId>l1</locationId></area></areas>
</inventory>"#;

    struct Fixture {
        _dir: TempDir,
        backend: Arc<MemoryBackend>,
        blobs: Arc<FsBlobStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("blobs")).unwrap();
        Fixture {
            _dir: dir,
            backend: MemoryBackend::new(),
            blobs: Arc::new(FsBlobStore::new(root)),
        }
    }

    impl Fixture {
        fn worker(&self, max_concurrent: usize) -> RestoreWorker {
            let engine = RestoreEngine::new(self.backend.registries(), self.blobs.clone());
            RestoreWorker::new(
                Arc::new(engine),
                self.backend.operations(),
                max_concurrent,
                Duration::from_millis(10),
            )
        }

        async fn enqueue(&self, scope: &Scope, key: &str, body: Option<&str>) -> String {
            if let Some(body) = body {
                let mut writer = self.blobs.writer(key).await.unwrap();
                writer.write_all(body.as_bytes()).await.unwrap();
                writer.shutdown().await.unwrap();
            }
            let operation = RestoreOperation::pending(
                scope.clone(),
                key,
                RestoreOptions::new(RestoreStrategy::MergeAdd),
            );
            self.backend.operations().create(operation).await.unwrap().id
        }
    }

    #[tokio::test]
    async fn test_runs_pending_operation_to_completion() {
        let fx = fixture();
        let scope = Scope::new("acme", "alice");
        let id = fx.enqueue(&scope, "upload-1.xml", Some(DOC)).await;

        let worker = fx.worker(1);
        worker
            .run_until_idle(&CancellationToken::new())
            .await
            .unwrap();

        let op = fx.backend.operations().get(&id).await.unwrap();
        assert_eq!(op.status, RestoreStatus::Completed);
        assert_eq!(op.stats.created_count, 2);
        assert!(op.started_at.is_some() && op.completed_at.is_some());
        assert!(op.steps.iter().any(|s| s.name == "Process areas"));
        assert_eq!(fx.backend.count(&scope, EntityKind::Area).await, 1);
    }

    #[tokio::test]
    async fn test_missing_upload_fails_operation() {
        let fx = fixture();
        let id = fx.enqueue(&Scope::new("acme", "alice"), "gone.xml", None).await;

        let worker = fx.worker(1);
        worker
            .run_until_idle(&CancellationToken::new())
            .await
            .unwrap();

        let op = fx.backend.operations().get(&id).await.unwrap();
        assert_eq!(op.status, RestoreStatus::Failed);
        assert!(op.error_message.unwrap().contains("blob not found"));
    }

    #[tokio::test]
    async fn test_busy_slots_leave_operations_pending() {
        let fx = fixture();
        let scope = Scope::new("acme", "alice");
        fx.enqueue(&scope, "first.xml", Some(DOC)).await;
        fx.enqueue(&scope, "second.xml", Some(DOC)).await;

        let worker = fx.worker(1);
        assert_eq!(worker.tick().await.unwrap(), 1);
        assert_eq!(fx.backend.operations().list_pending().await.unwrap().len(), 1);

        worker.shutdown().await;
        assert!(worker.is_idle());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let fx = fixture();
        let worker = fx.worker(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker.run(cancel))
            .await
            .expect("worker should stop once cancelled");
    }
}
