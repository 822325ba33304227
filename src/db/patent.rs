use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use super::core::Database;
use crate::types::{PatentKind, PatentRecord};
use crate::workers::shard::shard_of;
use crate::TARGET_DB;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn decode_date(raw: &str) -> Result<NaiveDate, sqlx::Error> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| sqlx::Error::Protocol(format!("bad stored date '{}': {}", raw, e)))
}

pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Protocol(e.to_string()))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Protocol(format!("bad stored JSON: {}", e)))
}

impl Database {
    pub async fn upsert_patent(
        &self,
        patent_id: &str,
        grant_date: NaiveDate,
        kind: PatentKind,
        codes: &[String],
    ) -> Result<(), sqlx::Error> {
        debug!(target: TARGET_DB, "Adding/updating patent: {}", patent_id);
        sqlx::query(
            r#"
            INSERT INTO patents (patent_id, grant_date, kind, codes, shard)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(patent_id) DO UPDATE SET
                grant_date = excluded.grant_date,
                kind = excluded.kind,
                codes = excluded.codes,
                shard = excluded.shard
            "#,
        )
        .bind(patent_id)
        .bind(grant_date.format(DATE_FORMAT).to_string())
        .bind(kind.to_string())
        .bind(encode_json(&codes)?)
        .bind(shard_of(patent_id) as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_abstract(&self, patent_id: &str, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO patent_abstracts (patent_id, abstract)
            VALUES (?1, ?2)
            ON CONFLICT(patent_id) DO UPDATE SET abstract = excluded.abstract
            "#,
        )
        .bind(patent_id)
        .bind(text)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn replace_assignees(
        &self,
        patent_id: &str,
        names: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM patent_assignees WHERE patent_id = ?1")
            .bind(patent_id)
            .execute(&mut *tx)
            .await?;
        for (position, name) in names.iter().enumerate() {
            sqlx::query(
                "INSERT INTO patent_assignees (patent_id, position, name) VALUES (?1, ?2, ?3)",
            )
            .bind(patent_id)
            .bind(position as i64)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// One page of a worker shard's patents, with abstracts and
    /// assignees attached. Keyset pagination over patent_id: pass the
    /// last id of the previous page (empty string to start), so a
    /// worker's memory is bounded by the page size, never the shard
    /// size.
    pub async fn fetch_patent_shard_page(
        &self,
        worker: usize,
        of: usize,
        after: &str,
        limit: usize,
    ) -> Result<Vec<PatentRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, String, String, Option<String>)>(
            r#"
            SELECT p.patent_id, p.grant_date, p.kind, p.codes, a.abstract
            FROM patents p
            LEFT JOIN patent_abstracts a ON a.patent_id = p.patent_id
            WHERE p.shard % ?1 = ?2 AND p.patent_id > ?3
            ORDER BY p.patent_id
            LIMIT ?4
            "#,
        )
        .bind(of as i64)
        .bind(worker as i64)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        let Some((up_to, ..)) = rows.last() else {
            return Ok(Vec::new());
        };
        let mut assignees = self
            .fetch_assignees_in_range(worker, of, after, up_to)
            .await?;

        rows.into_iter()
            .map(|(patent_id, grant_date, kind, codes, abstract_text)| {
                Ok(PatentRecord {
                    grant_date: decode_date(&grant_date)?,
                    kind: PatentKind::from(kind.as_str()),
                    codes: decode_json(&codes)?,
                    abstract_text,
                    assignees: assignees.remove(&patent_id).unwrap_or_default(),
                    patent_id,
                })
            })
            .collect()
    }

    async fn fetch_assignees_in_range(
        &self,
        worker: usize,
        of: usize,
        after: &str,
        up_to: &str,
    ) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT s.patent_id, s.name
            FROM patent_assignees s
            JOIN patents p ON p.patent_id = s.patent_id
            WHERE p.shard % ?1 = ?2 AND s.patent_id > ?3 AND s.patent_id <= ?4
            ORDER BY s.patent_id, s.position
            "#,
        )
        .bind(of as i64)
        .bind(worker as i64)
        .bind(after)
        .bind(up_to)
        .fetch_all(self.pool())
        .await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (patent_id, name) in rows {
            map.entry(patent_id).or_default().push(name);
        }
        Ok(map)
    }

    /// One page of a worker shard's AI-flagged patents, for the
    /// resolution stage: (patent_id, grant_date, assignees in ingest
    /// order). Same keyset cursor as `fetch_patent_shard_page`.
    pub async fn fetch_ai_patent_shard_page(
        &self,
        worker: usize,
        of: usize,
        after: &str,
        limit: usize,
    ) -> Result<Vec<(String, NaiveDate, Vec<String>)>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT p.patent_id, p.grant_date
            FROM patents p
            JOIN classifications c ON c.patent_id = p.patent_id
            WHERE c.is_ai = 1 AND p.shard % ?1 = ?2 AND p.patent_id > ?3
            ORDER BY p.patent_id
            LIMIT ?4
            "#,
        )
        .bind(of as i64)
        .bind(worker as i64)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        let Some((up_to, _)) = rows.last() else {
            return Ok(Vec::new());
        };
        let mut assignees = self
            .fetch_assignees_in_range(worker, of, after, up_to)
            .await?;

        rows.into_iter()
            .map(|(patent_id, grant_date)| {
                let grant_date = decode_date(&grant_date)?;
                let names = assignees.remove(&patent_id).unwrap_or_default();
                Ok((patent_id, grant_date, names))
            })
            .collect()
    }

    pub async fn count_patents(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM patents")
            .fetch_one(self.pool())
            .await
    }

    pub async fn count_abstracts(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM patent_abstracts")
            .fetch_one(self.pool())
            .await
    }
}
