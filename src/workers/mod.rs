pub mod shard;

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::db::Database;
use crate::resolver::{FirmIndex, FirmNormalizer, FirmResolver};
use crate::types::{MatchMethod, ResolvedAssignment};
use crate::{TARGET_CLASSIFIER, TARGET_RESOLVER};

// Rows per page read and per write transaction; per-worker memory is
// bounded by this, not by shard size
const BATCH_SIZE: usize = 500;

#[derive(Debug, Default, Clone, Copy)]
pub struct ClassifySummary {
    pub total: u64,
    pub ai: u64,
    pub insufficient_data: u64,
}

impl ClassifySummary {
    fn merge(&mut self, other: ClassifySummary) {
        self.total += other.total;
        self.ai += other.ai;
        self.insufficient_data += other.insufficient_data;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveSummary {
    pub total: u64,
    pub exact: u64,
    pub normalized_exact: u64,
    pub fuzzy: u64,
    pub unmatched: u64,
    pub ambiguous: u64,
    pub registry_conflicts: u64,
}

impl ResolveSummary {
    fn merge(&mut self, other: ResolveSummary) {
        self.total += other.total;
        self.exact += other.exact;
        self.normalized_exact += other.normalized_exact;
        self.fuzzy += other.fuzzy;
        self.unmatched += other.unmatched;
    }

    fn count(&mut self, method: MatchMethod) {
        self.total += 1;
        match method {
            MatchMethod::Exact => self.exact += 1,
            MatchMethod::NormalizedExact => self.normalized_exact += 1,
            MatchMethod::Fuzzy => self.fuzzy += 1,
            MatchMethod::Unmatched => self.unmatched += 1,
        }
    }
}

/// Classification stage: clears the classification table, then runs
/// the classifier over every patent, partitioned into independent
/// worker shards. Rerunning recomputes from source.
pub async fn run_classify(db: &Database, config: &PipelineConfig) -> Result<ClassifySummary> {
    let classifier = Arc::new(Classifier::new(config)?);
    db.clear_classifications().await?;

    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let db = db.clone();
        let classifier = Arc::clone(&classifier);
        let retry = config.retry;
        let of = config.workers;
        handles.push(tokio::spawn(async move {
            classify_shard(db, classifier, retry, worker, of).await
        }));
    }

    let mut summary = ClassifySummary::default();
    for joined in futures::future::join_all(handles).await {
        summary.merge(joined.map_err(|e| anyhow!("classify worker panicked: {}", e))??);
    }

    db.record_stat("classify", "patents", summary.total as i64)
        .await?;
    db.record_stat("classify", "ai", summary.ai as i64).await?;
    db.record_stat("classify", "insufficient_data", summary.insufficient_data as i64)
        .await?;

    info!(
        target: TARGET_CLASSIFIER,
        "Classified {} patent(s): {} AI-related, {} insufficient-data",
        summary.total, summary.ai, summary.insufficient_data
    );
    Ok(summary)
}

async fn classify_shard(
    db: Database,
    classifier: Arc<Classifier>,
    retry: RetryPolicy,
    worker: usize,
    of: usize,
) -> Result<ClassifySummary> {
    let mut summary = ClassifySummary::default();
    let mut cursor = String::new();
    loop {
        let records = db
            .fetch_patent_shard_page(worker, of, &cursor, BATCH_SIZE)
            .await?;
        let Some(last) = records.last() else {
            break;
        };
        cursor = last.patent_id.clone();

        let mut results = Vec::with_capacity(records.len());
        for record in &records {
            let result = classifier.classify(record);
            summary.total += 1;
            if result.is_ai {
                summary.ai += 1;
            }
            if result.is_insufficient_data() {
                summary.insufficient_data += 1;
            }
            results.push(result);
        }
        db.insert_classifications(&results, &retry).await?;

        if records.len() < BATCH_SIZE {
            break;
        }
    }

    debug!(
        target: TARGET_CLASSIFIER,
        "worker {}/{} classified {} patent(s)", worker, of, summary.total
    );
    Ok(summary)
}

/// Resolution stage: loads and indexes the firm registry once, clears
/// the resolution table, then resolves every AI-flagged patent's
/// assignees across worker shards. A registry that cannot be loaded
/// aborts before any work starts.
pub async fn run_resolve(db: &Database, config: &PipelineConfig) -> Result<ResolveSummary> {
    let firms = db
        .load_firms()
        .await
        .context("firm registry could not be loaded")?;
    if firms.is_empty() {
        warn!(target: TARGET_RESOLVER, "firm registry is empty; every assignee will be unmatched");
    }

    let index = Arc::new(FirmIndex::build(
        firms,
        &FirmNormalizer::new(),
        config.blocking,
    ));
    let duplicate_names = index.duplicate_name_count();
    let resolver = Arc::new(FirmResolver::new(Arc::clone(&index), config));
    db.clear_resolutions().await?;

    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let db = db.clone();
        let resolver = Arc::clone(&resolver);
        let retry = config.retry;
        let of = config.workers;
        handles.push(tokio::spawn(async move {
            resolve_shard(db, resolver, retry, worker, of).await
        }));
    }

    let mut summary = ResolveSummary::default();
    for joined in futures::future::join_all(handles).await {
        summary.merge(joined.map_err(|e| anyhow!("resolve worker panicked: {}", e))??);
    }
    summary.ambiguous = resolver.counters.ambiguous.load(Ordering::Relaxed);
    summary.registry_conflicts = resolver.counters.registry_conflicts.load(Ordering::Relaxed);

    db.record_stat("resolve", "patents", summary.total as i64)
        .await?;
    db.record_stat("resolve", "exact", summary.exact as i64)
        .await?;
    db.record_stat("resolve", "normalized_exact", summary.normalized_exact as i64)
        .await?;
    db.record_stat("resolve", "fuzzy", summary.fuzzy as i64)
        .await?;
    db.record_stat("resolve", "unmatched", summary.unmatched as i64)
        .await?;
    db.record_stat("resolve", "ambiguous", summary.ambiguous as i64)
        .await?;
    db.record_stat("resolve", "registry_conflicts", summary.registry_conflicts as i64)
        .await?;
    db.record_stat("resolve", "registry_duplicate_names", duplicate_names as i64)
        .await?;

    info!(
        target: TARGET_RESOLVER,
        "Resolved {} patent(s): {} exact, {} normalized-exact, {} fuzzy, {} unmatched ({} ambiguous)",
        summary.total,
        summary.exact,
        summary.normalized_exact,
        summary.fuzzy,
        summary.unmatched,
        summary.ambiguous
    );
    Ok(summary)
}

async fn resolve_shard(
    db: Database,
    resolver: Arc<FirmResolver>,
    retry: RetryPolicy,
    worker: usize,
    of: usize,
) -> Result<ResolveSummary> {
    let mut summary = ResolveSummary::default();
    let mut cursor = String::new();
    loop {
        let patents = db
            .fetch_ai_patent_shard_page(worker, of, &cursor, BATCH_SIZE)
            .await?;
        let Some((last, ..)) = patents.last() else {
            break;
        };
        cursor = last.clone();

        let mut assignments = Vec::with_capacity(patents.len());
        for (patent_id, grant_date, assignees) in &patents {
            let assignment = resolve_patent(&resolver, patent_id, *grant_date, assignees);
            summary.count(assignment.method);
            assignments.push(assignment);
        }
        db.insert_resolutions(&assignments, &retry).await?;

        if patents.len() < BATCH_SIZE {
            break;
        }
    }

    debug!(
        target: TARGET_RESOLVER,
        "worker {}/{} resolved {} patent(s)", worker, of, summary.total
    );
    Ok(summary)
}

/// A patent resolves to at most one firm: assignee names are tried in
/// ingest order and the first successful match wins. If none match,
/// the first attempt is kept so its diagnostics stay auditable.
fn resolve_patent(
    resolver: &FirmResolver,
    patent_id: &str,
    grant_date: chrono::NaiveDate,
    assignees: &[String],
) -> ResolvedAssignment {
    let mut first_attempt: Option<ResolvedAssignment> = None;
    for name in assignees {
        let attempt = resolver.resolve(patent_id, name, grant_date);
        if attempt.firm_id.is_some() {
            return attempt;
        }
        if first_attempt.is_none() {
            first_attempt = Some(attempt);
        }
    }
    first_attempt.unwrap_or_else(|| ResolvedAssignment::unmatched(patent_id, ""))
}
