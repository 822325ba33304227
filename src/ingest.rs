//! JSON-lines ingestion of the external input tables.
//!
//! Malformed rows are a SchemaViolation: excluded from the run and
//! counted, never fatal. A file that cannot be opened at all is fatal
//! before any stage runs.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::db::Database;
use crate::types::{FirmFinancials, FirmReference, PatentKind};
use crate::TARGET_INGEST;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestCounts {
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Deserialize)]
struct PatentLine {
    patent_id: String,
    grant_date: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    codes: Vec<String>,
}

#[derive(Deserialize)]
struct AbstractLine {
    patent_id: String,
    #[serde(rename = "abstract")]
    text: String,
}

#[derive(Deserialize)]
struct AssigneeLine {
    patent_id: String,
    assignees: Vec<String>,
}

#[derive(Deserialize)]
struct FirmLine {
    firm_id: String,
    canonical_name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    valid_from: Option<String>,
    #[serde(default)]
    valid_to: Option<String>,
}

#[derive(Deserialize)]
struct FinancialLine {
    firm_id: String,
    year: i32,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    valuation: Option<f64>,
}

pub async fn ingest_patents(db: &Database, path: &Path) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    let mut lines = open_lines(path).await?;
    while let Some(line) = lines.next_line().await? {
        let Some(row) = parse_line::<PatentLine>(&line, &mut counts) else {
            continue;
        };
        let Ok(grant_date) = NaiveDate::parse_from_str(&row.grant_date, DATE_FORMAT) else {
            debug!(target: TARGET_INGEST, "patent {} has malformed grant date", row.patent_id);
            counts.rejected += 1;
            continue;
        };
        if row.patent_id.trim().is_empty() {
            counts.rejected += 1;
            continue;
        }
        // Kind defaults to utility; sources without kind information
        // would otherwise vanish from the panel under the default
        // utility-only filter
        let kind = row
            .kind
            .as_deref()
            .map(PatentKind::from)
            .unwrap_or(PatentKind::Utility);
        let codes = dedupe_preserving_order(row.codes);
        db.upsert_patent(&row.patent_id, grant_date, kind, &codes)
            .await?;
        counts.accepted += 1;
    }
    log_counts("patents", path, counts);
    db.record_stat("ingest", "patents_rejected", counts.rejected as i64)
        .await?;
    Ok(counts)
}

pub async fn ingest_abstracts(db: &Database, path: &Path) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    let mut lines = open_lines(path).await?;
    while let Some(line) = lines.next_line().await? {
        let Some(row) = parse_line::<AbstractLine>(&line, &mut counts) else {
            continue;
        };
        if row.patent_id.trim().is_empty() {
            counts.rejected += 1;
            continue;
        }
        // Blank text is absent data, not a malformed row; skip it
        // without counting a violation and let the classifier treat
        // the patent as having no abstract
        if row.text.trim().is_empty() {
            continue;
        }
        db.upsert_abstract(&row.patent_id, &row.text).await?;
        counts.accepted += 1;
    }
    log_counts("abstracts", path, counts);
    db.record_stat("ingest", "abstracts_rejected", counts.rejected as i64)
        .await?;
    Ok(counts)
}

pub async fn ingest_assignees(db: &Database, path: &Path) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    let mut lines = open_lines(path).await?;
    while let Some(line) = lines.next_line().await? {
        let Some(row) = parse_line::<AssigneeLine>(&line, &mut counts) else {
            continue;
        };
        let names: Vec<String> = row
            .assignees
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if row.patent_id.trim().is_empty() || names.is_empty() {
            counts.rejected += 1;
            continue;
        }
        db.replace_assignees(&row.patent_id, &names).await?;
        counts.accepted += 1;
    }
    log_counts("assignees", path, counts);
    db.record_stat("ingest", "assignees_rejected", counts.rejected as i64)
        .await?;
    Ok(counts)
}

pub async fn ingest_firms(db: &Database, path: &Path) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    let mut lines = open_lines(path).await?;
    while let Some(line) = lines.next_line().await? {
        let Some(row) = parse_line::<FirmLine>(&line, &mut counts) else {
            continue;
        };
        if row.firm_id.trim().is_empty() || row.canonical_name.trim().is_empty() {
            counts.rejected += 1;
            continue;
        }
        let (Ok(valid_from), Ok(valid_to)) = (
            parse_optional_date(row.valid_from.as_deref()),
            parse_optional_date(row.valid_to.as_deref()),
        ) else {
            debug!(target: TARGET_INGEST, "firm {} has malformed validity interval", row.firm_id);
            counts.rejected += 1;
            continue;
        };
        db.upsert_firm(&FirmReference {
            firm_id: row.firm_id,
            canonical_name: row.canonical_name,
            aliases: row.aliases,
            valid_from,
            valid_to,
        })
        .await?;
        counts.accepted += 1;
    }
    log_counts("firms", path, counts);
    db.record_stat("ingest", "firms_rejected", counts.rejected as i64)
        .await?;
    Ok(counts)
}

pub async fn ingest_financials(db: &Database, path: &Path) -> Result<IngestCounts> {
    let mut counts = IngestCounts::default();
    let mut lines = open_lines(path).await?;
    while let Some(line) = lines.next_line().await? {
        let Some(row) = parse_line::<FinancialLine>(&line, &mut counts) else {
            continue;
        };
        if row.firm_id.trim().is_empty() {
            counts.rejected += 1;
            continue;
        }
        db.upsert_financials(&FirmFinancials {
            firm_id: row.firm_id,
            year: row.year,
            market_cap: row.market_cap,
            valuation: row.valuation,
        })
        .await?;
        counts.accepted += 1;
    }
    log_counts("financials", path, counts);
    db.record_stat("ingest", "financials_rejected", counts.rejected as i64)
        .await?;
    Ok(counts)
}

async fn open_lines(path: &Path) -> Result<tokio::io::Lines<BufReader<File>>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("cannot open input file {}", path.display()))?;
    Ok(BufReader::new(file).lines())
}

fn parse_line<'a, T: Deserialize<'a>>(line: &'a str, counts: &mut IngestCounts) -> Option<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<T>(trimmed) {
        Ok(row) => Some(row),
        Err(err) => {
            debug!(target: TARGET_INGEST, "skipping malformed row: {}", err);
            counts.rejected += 1;
            None
        }
    }
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, chrono::ParseError> {
    raw.map(|s| NaiveDate::parse_from_str(s, DATE_FORMAT))
        .transpose()
}

fn dedupe_preserving_order(codes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

fn log_counts(table: &str, path: &Path, counts: IngestCounts) {
    info!(
        target: TARGET_INGEST,
        "{}: {} row(s) accepted, {} rejected from {}",
        table,
        counts.accepted,
        counts.rejected,
        path.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_abstract_is_missing_data_not_a_violation() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(dir.path().join("ingest.db").to_str().unwrap())
            .await
            .unwrap();

        let path = dir.path().join("abstracts.jsonl");
        std::fs::write(
            &path,
            [
                r#"{"patent_id": "P1", "abstract": "a neural network"}"#,
                r#"{"patent_id": "P2", "abstract": "   "}"#,
                r#"{"patent_id": "", "abstract": "orphaned text"}"#,
            ]
            .join("\n"),
        )
        .unwrap();

        let counts = ingest_abstracts(&db, &path).await.unwrap();
        assert_eq!(counts.accepted, 1);
        // Only the missing patent_id is a violation; the blank text is
        // absent data and stays out of the rejection counter
        assert_eq!(counts.rejected, 1);
        assert_eq!(db.count_abstracts().await.unwrap(), 1);
    }

    #[test]
    fn test_dedupe_preserves_order() {
        let codes = vec![
            "G06N".to_string(),
            "H04L".to_string(),
            "G06N".to_string(),
            "G06F".to_string(),
        ];
        assert_eq!(dedupe_preserving_order(codes), vec!["G06N", "H04L", "G06F"]);
    }

    #[test]
    fn test_parse_line_counts_violations() {
        let mut counts = IngestCounts::default();
        assert!(parse_line::<PatentLine>("not json", &mut counts).is_none());
        assert!(parse_line::<PatentLine>(r#"{"grant_date": "2021-01-01"}"#, &mut counts).is_none());
        assert_eq!(counts.rejected, 2);

        // Blank lines are skipped without counting
        assert!(parse_line::<PatentLine>("   ", &mut counts).is_none());
        assert_eq!(counts.rejected, 2);

        let row =
            parse_line::<PatentLine>(r#"{"patent_id": "US1", "grant_date": "2021-01-01"}"#, &mut counts)
                .expect("valid row");
        assert_eq!(row.patent_id, "US1");
        assert!(row.codes.is_empty());
    }
}
