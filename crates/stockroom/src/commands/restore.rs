//! Restore command
//!
//! Connects the CLI restore UI to the stockroom-backup restore engine.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use dialoguer::Confirm;
use stockroom_backup::{RestoreEngine, SpinnerProgress};
use stockroom_core::types::{RestoreOptions, RestoreStrategy};
use tokio::io::BufReader;

use super::Workspace;
use crate::output;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup document (XML)
    pub file: Utf8PathBuf,

    /// How the document is merged with existing data
    #[arg(short, long, default_value = "merge-add", value_enum)]
    pub strategy: StrategyArg,

    /// Skip images, invoices and manuals
    #[arg(long)]
    pub no_file_data: bool,

    /// Count what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Delete everything in scope, then restore the document
    FullReplace,

    /// Add what is missing, leave existing entities alone
    MergeAdd,

    /// Add what is missing, overwrite existing entities
    MergeUpdate,
}

impl StrategyArg {
    fn description(&self) -> &'static str {
        match self {
            StrategyArg::FullReplace => "Full replace: delete all data in scope first (DESTRUCTIVE)",
            StrategyArg::MergeAdd => "Merge add: only create entities that do not exist yet",
            StrategyArg::MergeUpdate => "Merge update: create new entities, update existing ones",
        }
    }

    pub(crate) fn to_strategy(self) -> RestoreStrategy {
        match self {
            StrategyArg::FullReplace => RestoreStrategy::FullReplace,
            StrategyArg::MergeAdd => RestoreStrategy::MergeAdd,
            StrategyArg::MergeUpdate => RestoreStrategy::MergeUpdate,
        }
    }
}

pub async fn run(args: RestoreArgs, config: Option<&Utf8Path>) -> Result<()> {
    output::header("Restore Inventory");

    let workspace = Workspace::open(config).await?;
    let scope = workspace.config.scope();
    let options = RestoreOptions::new(args.strategy.to_strategy())
        .with_file_data(!args.no_file_data && workspace.config.config.restore.include_file_data)
        .with_dry_run(args.dry_run);

    output::kv("Source", args.file.as_str());
    output::kv("Scope", &scope.to_string());
    output::kv("Strategy", options.strategy.as_str());
    output::kv("Description", args.strategy.description());
    output::kv("File data", if options.include_file_data { "included" } else { "skipped" });
    if args.dry_run {
        output::warning("DRY RUN MODE - No data will be changed");
    }
    println!();

    if matches!(args.strategy, StrategyArg::FullReplace) && !args.dry_run && !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "DANGEROUS: Delete all locations, areas and commodities of {} before restoring?",
                scope
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            output::info("Restore cancelled");
            return Ok(());
        }
    }

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("Failed to open backup document {}", args.file))?;

    workspace.apply_settings().await?;
    let engine = RestoreEngine::new(workspace.backend.registries(), workspace.blobs.clone());
    let progress = SpinnerProgress::new("Restoring...");
    let result = engine
        .restore_from_xml(&scope, BufReader::new(file), options, &progress)
        .await;
    progress.finish_and_clear();

    let stats = match result {
        Ok(stats) => stats,
        Err(failure) => {
            println!();
            output::stats_table(&failure.stats);
            if !args.dry_run {
                // Entities restored before the failure are kept
                workspace.save().await?;
            }
            return Err(failure).context("Restore aborted");
        }
    };

    println!();
    output::stats_table(&stats);
    println!();

    if args.dry_run {
        output::info("Dry run complete. Remove --dry-run to perform the restore");
        return Ok(());
    }

    workspace.save().await?;
    if stats.has_errors() {
        output::warning(&format!(
            "Restore finished with {} errors; saved to {}",
            stats.error_count,
            workspace.snapshot()
        ));
    } else {
        output::success(&format!("Restore complete; saved to {}", workspace.snapshot()));
    }
    Ok(())
}
