//! Worker command
//!
//! Uploads backup documents, queues a restore operation for each and drains
//! the queue with the background worker.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use std::sync::Arc;
use stockroom_backup::{BlobStore, RestoreEngine, RestoreWorker};
use stockroom_core::types::{RestoreOperation, RestoreOptions, RestoreStatus};
use tabled::{settings::Style, Table, Tabled};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::restore::StrategyArg;
use super::Workspace;
use crate::output;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Backup documents to queue
    #[arg(long, num_args = 1.., required = true)]
    pub queue: Vec<Utf8PathBuf>,

    /// Strategy for every queued document
    #[arg(short, long, default_value = "merge-add", value_enum)]
    pub strategy: StrategyArg,

    /// Skip images, invoices and manuals
    #[arg(long)]
    pub no_file_data: bool,
}

#[derive(Tabled)]
struct OperationRow {
    operation: String,
    document: String,
    status: String,
    created: u64,
    updated: u64,
    errors: u64,
}

pub async fn run(args: WorkerArgs, config: Option<&Utf8Path>) -> Result<()> {
    output::header("Restore Worker");

    let workspace = Workspace::open(config).await?;
    workspace.apply_settings().await?;
    let scope = workspace.config.scope();
    let operations = workspace.backend.operations();
    let options = RestoreOptions::new(args.strategy.to_strategy())
        .with_file_data(!args.no_file_data && workspace.config.config.restore.include_file_data);

    let mut queued = Vec::with_capacity(args.queue.len());
    for path in &args.queue {
        let key = upload(workspace.blobs.as_ref(), path).await?;
        let operation = RestoreOperation {
            description: format!("Restore of {}", path),
            ..RestoreOperation::pending(scope.clone(), key, options)
        };
        let operation = operations.create(operation).await?;
        output::kv("Queued", &format!("{} ({})", path, operation.id));
        queued.push((operation.id, path.clone()));
    }
    println!();

    let engine = RestoreEngine::new(workspace.backend.registries(), workspace.blobs.clone());
    let worker = RestoreWorker::new(
        Arc::new(engine),
        Arc::clone(&operations),
        workspace.config.max_concurrent(),
        workspace.config.poll_interval(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running restores to finish");
            on_signal.cancel();
        }
    });

    info!("Running {} queued restore operations", queued.len());
    worker.run_until_idle(&cancel).await?;
    worker.shutdown().await;
    workspace.save().await?;

    let mut rows = Vec::with_capacity(queued.len());
    let mut failed = 0;
    for (id, path) in queued {
        let operation = operations.get(&id).await?;
        if operation.status == RestoreStatus::Failed {
            failed += 1;
            if let Some(message) = &operation.error_message {
                output::error(&format!("{}: {}", path, message));
            }
        }
        rows.push(OperationRow {
            operation: operation.id,
            document: path.to_string(),
            status: operation.status.to_string(),
            created: operation.stats.created_count,
            updated: operation.stats.updated_count,
            errors: operation.stats.error_count,
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    if cancel.is_cancelled() {
        output::warning("Worker interrupted; pending operations stay queued");
    } else if failed > 0 {
        output::warning(&format!("{} restore operations failed", failed));
    } else {
        output::success("All queued restores completed");
    }
    Ok(())
}

/// Copy a local document into the blob store under a fresh key
async fn upload(blobs: &dyn BlobStore, path: &Utf8Path) -> Result<String> {
    let key = format!("upload-{}.xml", uuid::Uuid::new_v4());
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open backup document {}", path))?;
    let mut writer = blobs.writer(&key).await?;
    tokio::io::copy(&mut file, &mut writer)
        .await
        .with_context(|| format!("Failed to upload {}", path))?;
    writer.shutdown().await?;
    Ok(key)
}
