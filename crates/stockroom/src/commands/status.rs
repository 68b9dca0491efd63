//! Status command

use anyhow::Result;
use camino::Utf8Path;
use clap::Args;
use serde::Serialize;
use stockroom_core::types::EntityKind;
use tabled::{settings::Style, Table, Tabled};

use super::Workspace;
use crate::output;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled, Serialize)]
struct KindCount {
    kind: String,
    count: usize,
}

pub async fn run(args: StatusArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let scope = workspace.config.scope();

    let mut rows = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        rows.push(KindCount {
            kind: kind.to_string(),
            count: workspace.backend.count(&scope, kind).await,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    output::header("Inventory Status");
    output::kv("Scope", &scope.to_string());
    output::kv("Snapshot", workspace.snapshot().as_str());
    output::kv(
        "Main currency",
        workspace.config.main_currency().unwrap_or("not set"),
    );
    println!();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}
