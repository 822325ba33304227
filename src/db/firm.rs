use std::collections::HashMap;
use tracing::info;

use super::core::Database;
use super::patent::{decode_date, decode_json, encode_json, DATE_FORMAT};
use crate::types::{FirmFinancials, FirmReference};
use crate::TARGET_DB;

impl Database {
    pub async fn upsert_firm(&self, firm: &FirmReference) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO firms (firm_id, canonical_name, aliases, valid_from, valid_to)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(firm_id) DO UPDATE SET
                canonical_name = excluded.canonical_name,
                aliases = excluded.aliases,
                valid_from = excluded.valid_from,
                valid_to = excluded.valid_to
            "#,
        )
        .bind(&firm.firm_id)
        .bind(&firm.canonical_name)
        .bind(encode_json(&firm.aliases)?)
        .bind(firm.valid_from.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(firm.valid_to.map(|d| d.format(DATE_FORMAT).to_string()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn upsert_financials(&self, row: &FirmFinancials) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO firm_financials (firm_id, year, market_cap, valuation)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(firm_id, year) DO UPDATE SET
                market_cap = excluded.market_cap,
                valuation = excluded.valuation
            "#,
        )
        .bind(&row.firm_id)
        .bind(row.year)
        .bind(row.market_cap)
        .bind(row.valuation)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Load the whole firm registry. Failure here is fatal to the run;
    /// the resolver cannot operate without it.
    pub async fn load_firms(&self) -> Result<Vec<FirmReference>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            "SELECT firm_id, canonical_name, aliases, valid_from, valid_to FROM firms ORDER BY firm_id",
        )
        .fetch_all(self.pool())
        .await?;

        let firms: Result<Vec<FirmReference>, sqlx::Error> = rows
            .into_iter()
            .map(|(firm_id, canonical_name, aliases, valid_from, valid_to)| {
                Ok(FirmReference {
                    firm_id,
                    canonical_name,
                    aliases: decode_json(&aliases)?,
                    valid_from: valid_from.as_deref().map(decode_date).transpose()?,
                    valid_to: valid_to.as_deref().map(decode_date).transpose()?,
                })
            })
            .collect();
        let firms = firms?;

        info!(target: TARGET_DB, "Loaded {} firm registry entries", firms.len());
        Ok(firms)
    }

    /// All financial rows keyed by (firm, year), loaded once for the
    /// panel join
    pub async fn load_financials(
        &self,
    ) -> Result<HashMap<(String, i32), (Option<f64>, Option<f64>)>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, i32, Option<f64>, Option<f64>)>(
            "SELECT firm_id, year, market_cap, valuation FROM firm_financials",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(firm_id, year, market_cap, valuation)| {
                ((firm_id, year), (market_cap, valuation))
            })
            .collect())
    }

    pub async fn count_firms(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM firms")
            .fetch_one(self.pool())
            .await
    }
}
