//! Audit surface: table counts and per-run counters, printed for the
//! external validation collaborator.

use anyhow::Result;
use prettytable::{row, Table};

use crate::db::Database;

pub async fn print_stats(db: &Database) -> Result<()> {
    let patents = db.count_patents().await?;
    let abstracts = db.count_abstracts().await?;
    let firms = db.count_firms().await?;
    let (classified, ai, insufficient) = db.count_classifications().await?;
    let methods = db.resolution_method_counts().await?;
    let panel_rows = db.count_panel_rows().await?;

    let mut tables = Table::new();
    tables.add_row(row!["TABLE", "ROWS"]);
    tables.add_row(row!["patents", patents]);
    tables.add_row(row!["patent_abstracts", abstracts]);
    tables.add_row(row!["firms", firms]);
    tables.add_row(row!["classifications", classified]);
    tables.add_row(row!["panel", panel_rows]);
    tables.printstd();

    let mut classification = Table::new();
    classification.add_row(row!["CLASSIFICATION", "COUNT"]);
    classification.add_row(row!["ai", ai]);
    // Insufficient-data records are not true negatives; the three rows
    // partition the table so coverage denominators read directly off it
    classification.add_row(row!["not ai", classified - ai - insufficient]);
    classification.add_row(row!["insufficient-data", insufficient]);
    classification.printstd();

    if !methods.is_empty() {
        let mut resolution = Table::new();
        resolution.add_row(row!["RESOLUTION METHOD", "COUNT"]);
        for (method, count) in methods {
            resolution.add_row(row![method, count]);
        }
        resolution.printstd();
    }

    let counters = db.load_stats().await?;
    if !counters.is_empty() {
        let mut runs = Table::new();
        runs.add_row(row!["STAGE", "COUNTER", "VALUE"]);
        for (stage, name, value) in counters {
            runs.add_row(row![stage, name, value]);
        }
        runs.printstd();
    }

    Ok(())
}
