use anyhow::{anyhow, Result};
use chrono::Datelike;
use tracing::{debug, info};

use super::aggregate::{accumulate, merge_partials, PartialPanel};
use crate::config::PipelineConfig;
use crate::db::stage::PanelInput;
use crate::db::Database;
use crate::types::{FirmYearPanelRow, PatentKind};
use crate::workers::shard::shard_of;
use crate::TARGET_PANEL;

#[derive(Debug, Default, Clone, Copy)]
pub struct PanelSummary {
    pub patents: u64,
    pub rows: u64,
}

/// Builds the sparse firm-year panel from classified, resolved
/// patents. Partial per-shard aggregates are merged at the shuffle
/// boundary, then joined against the per-year financial reference.
/// Rerunning over the same inputs rewrites byte-identical output.
pub struct PanelBuilder<'a> {
    db: &'a Database,
    config: &'a PipelineConfig,
}

impl<'a> PanelBuilder<'a> {
    pub fn new(db: &'a Database, config: &'a PipelineConfig) -> Self {
        PanelBuilder { db, config }
    }

    pub async fn build(&self) -> Result<PanelSummary> {
        let inputs = self.db.fetch_panel_inputs().await?;
        let kept: Vec<PanelInput> = inputs
            .into_iter()
            .filter(|input| self.keep(input))
            .collect();
        let patents = kept.len() as u64;
        debug!(
            target: TARGET_PANEL,
            "aggregating {} matched AI patent(s) into firm-years", patents
        );

        // Partition by patent shard and aggregate each partition
        // independently; the monoid merge makes the split harmless
        let mut partitions: Vec<Vec<PanelInput>> = (0..self.config.workers)
            .map(|_| Vec::new())
            .collect();
        for input in kept {
            let slot = shard_of(&input.patent_id) as usize % self.config.workers;
            partitions[slot].push(input);
        }

        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            handles.push(tokio::spawn(async move {
                let mut partial = PartialPanel::new();
                for input in &partition {
                    accumulate(
                        &mut partial,
                        &input.firm_id,
                        input.grant_date.year(),
                        input.category,
                        input.grant_date,
                    );
                }
                partial
            }));
        }

        let mut panel = PartialPanel::new();
        for joined in futures::future::join_all(handles).await {
            let partial = joined.map_err(|e| anyhow!("panel worker panicked: {}", e))?;
            panel = merge_partials(panel, partial);
        }

        // As-of-year financial join; firm-years without financials are
        // retained with null attributes, never dropped
        let financials = self.db.load_financials().await?;
        let mut rows: Vec<FirmYearPanelRow> = panel
            .into_iter()
            .map(|((firm_id, year), agg)| {
                let (market_cap, valuation) = financials
                    .get(&(firm_id.clone(), year))
                    .copied()
                    .unwrap_or((None, None));
                FirmYearPanelRow {
                    firm_id,
                    year,
                    n_infrastructure: agg.n_infrastructure,
                    n_algorithm: agg.n_algorithm,
                    n_application: agg.n_application,
                    n_unknown: agg.n_unknown,
                    n_total: agg.n_total,
                    first_grant: agg.first_grant,
                    last_grant: agg.last_grant,
                    market_cap,
                    valuation,
                }
            })
            .collect();
        rows.sort_by(|a, b| (a.firm_id.as_str(), a.year).cmp(&(b.firm_id.as_str(), b.year)));

        self.db.replace_panel(&rows).await?;
        self.db
            .record_stat("panel", "patents", patents as i64)
            .await?;
        self.db
            .record_stat("panel", "rows", rows.len() as i64)
            .await?;

        info!(
            target: TARGET_PANEL,
            "Panel built: {} firm-year row(s) from {} patent(s)",
            rows.len(),
            patents
        );
        Ok(PanelSummary {
            patents,
            rows: rows.len() as u64,
        })
    }

    fn keep(&self, input: &PanelInput) -> bool {
        if self.config.utility_only && input.kind != PatentKind::Utility {
            return false;
        }
        self.config.year_in_range(input.grant_date.year())
    }
}
