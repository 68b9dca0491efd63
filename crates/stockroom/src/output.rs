//! Terminal output utilities

use console::style;
use stockroom_core::types::RestoreStats;
use tabled::{settings::Style, Table, Tabled};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

#[derive(Tabled)]
struct StatRow {
    metric: &'static str,
    value: String,
}

fn stat_rows(stats: &RestoreStats) -> Vec<StatRow> {
    let row = |metric, value: u64| StatRow {
        metric,
        value: value.to_string(),
    };
    vec![
        row("locations", stats.location_count),
        row("areas", stats.area_count),
        row("commodities", stats.commodity_count),
        row("images", stats.image_count),
        row("invoices", stats.invoice_count),
        row("manuals", stats.manual_count),
        row("created", stats.created_count),
        row("updated", stats.updated_count),
        row("skipped", stats.skipped_count),
        row("deleted", stats.deleted_count),
        row("errors", stats.error_count),
        StatRow {
            metric: "file data",
            value: format_bytes(stats.binary_data_size),
        },
    ]
}

/// Print restore statistics as a table, followed by any per-entity errors
pub fn stats_table(stats: &RestoreStats) {
    let mut table = Table::new(stat_rows(stats));
    table.with(Style::sharp());
    println!("{}", table);

    for message in &stats.errors {
        error(message);
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_stat_rows_cover_every_counter() {
        let stats = RestoreStats {
            created_count: 3,
            binary_data_size: 2048,
            ..Default::default()
        };
        let rows = stat_rows(&stats);
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().any(|r| r.metric == "created" && r.value == "3"));
        assert_eq!(rows.last().map(|r| r.value.as_str()), Some("2.00 KB"));
    }
}
