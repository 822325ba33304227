use chrono::NaiveDate;
use tokio::time::sleep;
use tracing::{debug, info};

use super::core::{Database, DbLockErrorExt};
use super::patent::{decode_date, decode_json, encode_json, DATE_FORMAT};
use crate::config::RetryPolicy;
use crate::types::{
    ClassificationResult, Evidence, FirmYearPanelRow, PatentKind, ResolvedAssignment,
    StrategicCategory,
};
use crate::TARGET_DB;

/// One classified + resolved patent feeding the panel builder
#[derive(Debug, Clone)]
pub struct PanelInput {
    pub patent_id: String,
    pub grant_date: NaiveDate,
    pub kind: PatentKind,
    pub category: StrategicCategory,
    pub firm_id: String,
}

impl Database {
    pub async fn clear_classifications(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM classifications")
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn insert_classifications(
        &self,
        batch: &[ClassificationResult],
        retry: &RetryPolicy,
    ) -> Result<(), sqlx::Error> {
        let mut attempt = 1;
        loop {
            match self.try_insert_classifications(batch).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_database_lock_error() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    info!(
                        target: TARGET_DB,
                        "Database locked, retrying classification batch in {:?} (attempt {}/{})",
                        delay, attempt, retry.max_attempts
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_insert_classifications(
        &self,
        batch: &[ClassificationResult],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for result in batch {
            let evidence: Vec<String> = result.evidence.iter().map(|e| e.to_string()).collect();
            sqlx::query(
                r#"
                INSERT INTO classifications (patent_id, is_ai, category, evidence)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(patent_id) DO UPDATE SET
                    is_ai = excluded.is_ai,
                    category = excluded.category,
                    evidence = excluded.evidence
                "#,
            )
            .bind(&result.patent_id)
            .bind(result.is_ai)
            .bind(result.category.to_string())
            .bind(encode_json(&evidence)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(target: TARGET_DB, "Wrote {} classification row(s)", batch.len());
        Ok(())
    }

    pub async fn load_classification(
        &self,
        patent_id: &str,
    ) -> Result<Option<ClassificationResult>, sqlx::Error> {
        let row = sqlx::query_as::<_, (String, bool, String, String)>(
            "SELECT patent_id, is_ai, category, evidence FROM classifications WHERE patent_id = ?1",
        )
        .bind(patent_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|(patent_id, is_ai, category, evidence)| {
            let raw: Vec<String> = decode_json(&evidence)?;
            let evidence: Result<Vec<Evidence>, sqlx::Error> = raw
                .iter()
                .map(|s| {
                    s.parse::<Evidence>()
                        .map_err(|e| sqlx::Error::Protocol(e))
                })
                .collect();
            Ok(ClassificationResult {
                patent_id,
                is_ai,
                category: StrategicCategory::from(category.as_str()),
                evidence: evidence?,
            })
        })
        .transpose()
    }

    pub async fn clear_resolutions(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM resolutions")
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn insert_resolutions(
        &self,
        batch: &[ResolvedAssignment],
        retry: &RetryPolicy,
    ) -> Result<(), sqlx::Error> {
        let mut attempt = 1;
        loop {
            match self.try_insert_resolutions(batch).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_database_lock_error() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    info!(
                        target: TARGET_DB,
                        "Database locked, retrying resolution batch in {:?} (attempt {}/{})",
                        delay, attempt, retry.max_attempts
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_insert_resolutions(
        &self,
        batch: &[ResolvedAssignment],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for row in batch {
            sqlx::query(
                r#"
                INSERT INTO resolutions
                    (patent_id, assignee_name, firm_id, method, confidence,
                     similarity, runner_up, runner_up_score)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(patent_id) DO UPDATE SET
                    assignee_name = excluded.assignee_name,
                    firm_id = excluded.firm_id,
                    method = excluded.method,
                    confidence = excluded.confidence,
                    similarity = excluded.similarity,
                    runner_up = excluded.runner_up,
                    runner_up_score = excluded.runner_up_score
                "#,
            )
            .bind(&row.patent_id)
            .bind(&row.assignee_name)
            .bind(&row.firm_id)
            .bind(row.method.to_string())
            .bind(row.confidence)
            .bind(row.similarity)
            .bind(&row.runner_up)
            .bind(row.runner_up_score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(target: TARGET_DB, "Wrote {} resolution row(s)", batch.len());
        Ok(())
    }

    /// Matched, AI-related triples for the panel builder
    pub async fn fetch_panel_inputs(&self) -> Result<Vec<PanelInput>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT p.patent_id, p.grant_date, p.kind, c.category, r.firm_id
            FROM patents p
            JOIN classifications c ON c.patent_id = p.patent_id
            JOIN resolutions r ON r.patent_id = p.patent_id
            WHERE c.is_ai = 1 AND r.firm_id IS NOT NULL
            ORDER BY p.patent_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(patent_id, grant_date, kind, category, firm_id)| {
                Ok(PanelInput {
                    patent_id,
                    grant_date: decode_date(&grant_date)?,
                    kind: PatentKind::from(kind.as_str()),
                    category: StrategicCategory::from(category.as_str()),
                    firm_id,
                })
            })
            .collect()
    }

    /// Replace the whole panel in one transaction; the panel is a pure
    /// function of its inputs and never accumulates across runs
    pub async fn replace_panel(&self, rows: &[FirmYearPanelRow]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM panel").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO panel
                    (firm_id, year, n_infrastructure, n_algorithm, n_application,
                     n_unknown, n_total, first_grant, last_grant, market_cap, valuation)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&row.firm_id)
            .bind(row.year)
            .bind(row.n_infrastructure)
            .bind(row.n_algorithm)
            .bind(row.n_application)
            .bind(row.n_unknown)
            .bind(row.n_total)
            .bind(row.first_grant.format(DATE_FORMAT).to_string())
            .bind(row.last_grant.format(DATE_FORMAT).to_string())
            .bind(row.market_cap)
            .bind(row.valuation)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(target: TARGET_DB, "Panel rewritten with {} row(s)", rows.len());
        Ok(())
    }

    pub async fn load_panel(&self) -> Result<Vec<FirmYearPanelRow>, sqlx::Error> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                i32,
                i64,
                i64,
                i64,
                i64,
                i64,
                String,
                String,
                Option<f64>,
                Option<f64>,
            ),
        >(
            r#"
            SELECT firm_id, year, n_infrastructure, n_algorithm, n_application,
                   n_unknown, n_total, first_grant, last_grant, market_cap, valuation
            FROM panel ORDER BY firm_id, year
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(
                |(
                    firm_id,
                    year,
                    n_infrastructure,
                    n_algorithm,
                    n_application,
                    n_unknown,
                    n_total,
                    first_grant,
                    last_grant,
                    market_cap,
                    valuation,
                )| {
                    Ok(FirmYearPanelRow {
                        firm_id,
                        year,
                        n_infrastructure,
                        n_algorithm,
                        n_application,
                        n_unknown,
                        n_total,
                        first_grant: decode_date(&first_grant)?,
                        last_grant: decode_date(&last_grant)?,
                        market_cap,
                        valuation,
                    })
                },
            )
            .collect()
    }

    pub async fn count_classifications(&self) -> Result<(i64, i64, i64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classifications")
            .fetch_one(self.pool())
            .await?;
        let ai: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classifications WHERE is_ai = 1")
            .fetch_one(self.pool())
            .await?;
        let insufficient: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM classifications WHERE evidence LIKE '%"insufficient-data"%'"#,
        )
        .fetch_one(self.pool())
        .await?;
        Ok((total, ai, insufficient))
    }

    pub async fn resolution_method_counts(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT method, COUNT(*) FROM resolutions GROUP BY method ORDER BY method",
        )
        .fetch_all(self.pool())
        .await
    }

    pub async fn count_panel_rows(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM panel")
            .fetch_one(self.pool())
            .await
    }

    pub async fn record_stat(
        &self,
        stage: &str,
        name: &str,
        value: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO run_stats (stage, name, value, recorded_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(stage, name) DO UPDATE SET
                value = excluded.value,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(stage)
        .bind(name)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn load_stats(&self) -> Result<Vec<(String, String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, String, i64)>(
            "SELECT stage, name, value FROM run_stats ORDER BY stage, name",
        )
        .fetch_all(self.pool())
        .await
    }
}
