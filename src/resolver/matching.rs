use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::normalizer::FirmNormalizer;
use super::registry::FirmIndex;
use crate::config::PipelineConfig;
use crate::types::ResolvedAssignment;
use crate::TARGET_RESOLVER;

/// Pluggable string similarity on a 0-100 scale, so the resolver's
/// threshold + margin + blocking logic is testable independent of the
/// distance metric.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
    fn name(&self) -> &'static str;
}

/// Default metric: Jaro-Winkler, which favors shared prefixes and
/// behaves well on firm names
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b) * 100.0
    }

    fn name(&self) -> &'static str {
        "jaro-winkler"
    }
}

/// Token-sort variant: tokens are sorted before comparison, so word
/// order differences ("Motors Acme" vs "Acme Motors") do not penalize
pub struct TokenSortJaroWinkler;

impl Similarity for TokenSortJaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(&token_sort(a), &token_sort(b)) * 100.0
    }

    fn name(&self) -> &'static str {
        "token-sort-jaro-winkler"
    }
}

fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Data-quality counters bumped during resolution, read by the stats
/// surface after a run
#[derive(Debug, Default)]
pub struct ResolverCounters {
    pub ambiguous: AtomicU64,
    pub registry_conflicts: AtomicU64,
}

enum Pick {
    One(usize),
    Ambiguous,
    None,
}

/// Resolves a raw assignee name to a canonical firm identifier.
/// Cascade, cheapest first: raw exact, normalized exact, then fuzzy
/// over a blocked candidate subset. Stateless per call; shared
/// read-only across worker shards.
pub struct FirmResolver {
    normalizer: FirmNormalizer,
    index: Arc<FirmIndex>,
    similarity: Box<dyn Similarity>,
    threshold: f64,
    margin: f64,
    pub counters: ResolverCounters,
}

impl FirmResolver {
    pub fn new(index: Arc<FirmIndex>, config: &PipelineConfig) -> Self {
        Self::with_similarity(index, config, Box::new(JaroWinkler))
    }

    pub fn with_similarity(
        index: Arc<FirmIndex>,
        config: &PipelineConfig,
        similarity: Box<dyn Similarity>,
    ) -> Self {
        FirmResolver {
            normalizer: FirmNormalizer::new(),
            index,
            similarity,
            threshold: config.fuzzy_threshold,
            margin: config.fuzzy_margin,
            counters: ResolverCounters::default(),
        }
    }

    pub fn resolve(
        &self,
        patent_id: &str,
        name: &str,
        grant_date: NaiveDate,
    ) -> ResolvedAssignment {
        // 1. Raw exact match against canonical names and aliases
        match self.pick(self.index.raw_candidates(name), grant_date) {
            Pick::One(idx) => {
                return ResolvedAssignment::exact(patent_id, name, &self.index.firm(idx).firm_id)
            }
            Pick::Ambiguous => return ResolvedAssignment::unmatched(patent_id, name),
            Pick::None => {}
        }

        // 2. Exact match after normalization
        let normalized = self.normalizer.normalize(name);
        if normalized.is_empty() {
            return ResolvedAssignment::unmatched(patent_id, name);
        }
        match self.pick(self.index.exact_candidates(&normalized), grant_date) {
            Pick::One(idx) => {
                return ResolvedAssignment::normalized_exact(
                    patent_id,
                    name,
                    &self.index.firm(idx).firm_id,
                )
            }
            Pick::Ambiguous => return ResolvedAssignment::unmatched(patent_id, name),
            Pick::None => {}
        }

        // 3. Fuzzy fallback over the blocked candidate subset
        self.resolve_fuzzy(patent_id, name, &normalized)
    }

    fn resolve_fuzzy(&self, patent_id: &str, name: &str, normalized: &str) -> ResolvedAssignment {
        // Best entry overall, plus the best entry belonging to a
        // different firm (the runner-up for the ambiguity margin)
        let mut best: Option<(f64, usize)> = None;
        let mut runner_up: Option<(f64, usize)> = None;

        for (candidate, firm_idx) in self.index.fuzzy_candidates(normalized) {
            let score = self.similarity.score(normalized, candidate);
            match best {
                None => best = Some((score, *firm_idx)),
                Some((best_score, best_idx)) => {
                    if score > best_score {
                        if best_idx != *firm_idx {
                            runner_up = Some((best_score, best_idx));
                        }
                        best = Some((score, *firm_idx));
                    } else if best_idx != *firm_idx
                        && runner_up.map_or(true, |(rs, _)| score > rs)
                    {
                        runner_up = Some((score, *firm_idx));
                    }
                }
            }
        }

        let Some((top_score, top_idx)) = best else {
            return ResolvedAssignment::unmatched(patent_id, name);
        };
        let runner_up = runner_up
            .map(|(score, idx)| (self.index.firm(idx).canonical_name.clone(), score));

        if top_score < self.threshold {
            debug!(
                target: TARGET_RESOLVER,
                "'{}' best {} score {:.1} below threshold {:.1}, unmatched",
                name,
                self.similarity.name(),
                top_score,
                self.threshold
            );
            return ResolvedAssignment::unmatched(patent_id, name)
                .with_fuzzy_diagnostics(top_score, runner_up);
        }

        if let Some((ref runner_name, runner_score)) = runner_up {
            // Within the margin of the runner-up the match is rejected
            // as ambiguous rather than guessed
            if top_score - runner_score < self.margin {
                self.counters.ambiguous.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: TARGET_RESOLVER,
                    "'{}' ambiguous: top {:.1} vs runner-up '{}' {:.1} within margin {:.1}",
                    name, top_score, runner_name, runner_score, self.margin
                );
                return ResolvedAssignment::unmatched(patent_id, name)
                    .with_fuzzy_diagnostics(top_score, runner_up);
            }
        }

        debug!(
            target: TARGET_RESOLVER,
            "'{}' fuzzy-matched to {} with score {:.1}",
            name,
            self.index.firm(top_idx).firm_id,
            top_score
        );
        ResolvedAssignment::fuzzy(
            patent_id,
            name,
            &self.index.firm(top_idx).firm_id,
            top_score,
            runner_up,
        )
    }

    /// Disambiguate an exact-lookup candidate list. Multiple distinct
    /// firms under one name is a registry inconsistency; prefer the
    /// entry whose validity interval covers the grant date, else fall
    /// through to ambiguous.
    fn pick(&self, candidates: &[usize], grant_date: NaiveDate) -> Pick {
        match candidates {
            [] => Pick::None,
            [only] => Pick::One(*only),
            _ => {
                self.counters
                    .registry_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                let covered: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&idx| self.index.firm(idx).covers(grant_date))
                    .collect();
                if let [only] = covered.as_slice() {
                    Pick::One(*only)
                } else {
                    self.counters.ambiguous.fetch_add(1, Ordering::Relaxed);
                    Pick::Ambiguous
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockingStrategy;
    use crate::types::{FirmReference, MatchMethod};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn firm(id: &str, name: &str, aliases: &[&str]) -> FirmReference {
        FirmReference {
            firm_id: id.to_string(),
            canonical_name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            valid_from: None,
            valid_to: None,
        }
    }

    fn resolver_for(firms: Vec<FirmReference>, config: PipelineConfig) -> FirmResolver {
        let index = FirmIndex::build(firms, &FirmNormalizer::new(), config.blocking);
        FirmResolver::new(Arc::new(index), &config)
    }

    #[test]
    fn test_exact_cascade() {
        let resolver = resolver_for(
            vec![firm("F1", "Acme AI", &["Acme Artificial Intelligence"])],
            PipelineConfig::default(),
        );
        let when = date("2021-03-01");

        let raw = resolver.resolve("P1", "Acme AI", when);
        assert_eq!(raw.method, MatchMethod::Exact);
        assert_eq!(raw.firm_id.as_deref(), Some("F1"));
        assert_eq!(raw.confidence, 1.0);

        let normalized = resolver.resolve("P2", "ACME AI, Inc.", when);
        assert_eq!(normalized.method, MatchMethod::NormalizedExact);
        assert_eq!(normalized.firm_id.as_deref(), Some("F1"));

        let alias = resolver.resolve("P3", "acme artificial intelligence ltd", when);
        assert_eq!(alias.method, MatchMethod::NormalizedExact);
        assert_eq!(alias.firm_id.as_deref(), Some("F1"));
    }

    #[test]
    fn test_exact_preferred_over_fuzzy() {
        // "Initech" is a registry alias of F2; even though F1's
        // canonical name scores higher under fuzzy similarity, the
        // exact alias hit must win.
        let resolver = resolver_for(
            vec![
                firm("F1", "Initech Global", &[]),
                firm("F2", "Initrode", &["Initech"]),
            ],
            PipelineConfig::default(),
        );
        let result = resolver.resolve("P1", "Initech", date("2021-03-01"));
        assert_eq!(result.method, MatchMethod::Exact);
        assert_eq!(result.firm_id.as_deref(), Some("F2"));
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let resolver = resolver_for(vec![firm("F1", "Acme AI", &[])], PipelineConfig::default());
        let result = resolver.resolve("P1", "Acme A.I.", date("2021-03-01"));
        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert_eq!(result.firm_id.as_deref(), Some("F1"));
        assert!(result.similarity.unwrap() >= 85.0);
        assert!(result.confidence > 0.85);
    }

    #[test]
    fn test_below_threshold_is_unmatched_with_diagnostics() {
        let resolver = resolver_for(
            vec![firm("F1", "Zenith Robotics", &[])],
            PipelineConfig {
                blocking: BlockingStrategy::None,
                ..PipelineConfig::default()
            },
        );
        let result = resolver.resolve("P1", "Completely Different Name", date("2021-03-01"));
        assert_eq!(result.method, MatchMethod::Unmatched);
        assert!(result.firm_id.is_none());
        // The rejected best score stays auditable
        assert!(result.similarity.is_some());
        assert!(result.similarity.unwrap() < 85.0);
    }

    #[test]
    fn test_margin_tie_is_rejected_not_guessed() {
        // Two firms nearly equidistant from the query: never guess
        let resolver = resolver_for(
            vec![
                firm("F1", "Vertex Dynamics", &[]),
                firm("F2", "Vertex Dynamica", &[]),
            ],
            PipelineConfig {
                blocking: BlockingStrategy::None,
                ..PipelineConfig::default()
            },
        );
        let result = resolver.resolve("P1", "Vertex Dynamic", date("2021-03-01"));
        assert_eq!(result.method, MatchMethod::Unmatched);
        assert!(result.firm_id.is_none());
        assert!(result.runner_up.is_some());
        assert!(result.runner_up_score.is_some());
        assert_eq!(resolver.counters.ambiguous.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_registry_conflict_resolved_by_validity_interval() {
        let mut before = firm("F1", "Meridian Systems", &[]);
        before.valid_to = Some(date("2015-12-31"));
        let mut after = firm("F2", "Meridian Systems", &[]);
        after.valid_from = Some(date("2016-01-01"));

        let resolver = resolver_for(vec![before, after], PipelineConfig::default());

        let early = resolver.resolve("P1", "Meridian Systems", date("2012-05-01"));
        assert_eq!(early.firm_id.as_deref(), Some("F1"));
        let late = resolver.resolve("P2", "Meridian Systems", date("2020-05-01"));
        assert_eq!(late.firm_id.as_deref(), Some("F2"));
        assert!(resolver.counters.registry_conflicts.load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn test_registry_conflict_with_overlapping_intervals_is_unmatched() {
        let resolver = resolver_for(
            vec![
                firm("F1", "Meridian Systems", &[]),
                firm("F2", "Meridian Systems", &[]),
            ],
            PipelineConfig::default(),
        );
        let result = resolver.resolve("P1", "Meridian Systems", date("2020-05-01"));
        assert_eq!(result.method, MatchMethod::Unmatched);
        assert_eq!(resolver.counters.ambiguous.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_pluggable_similarity_token_sort() {
        let config = PipelineConfig {
            blocking: BlockingStrategy::None,
            ..PipelineConfig::default()
        };
        let index = FirmIndex::build(
            vec![firm("F1", "Acme Motors", &[])],
            &FirmNormalizer::new(),
            config.blocking,
        );
        let resolver = FirmResolver::with_similarity(
            Arc::new(index),
            &config,
            Box::new(TokenSortJaroWinkler),
        );
        let result = resolver.resolve("P1", "Motors Acme", date("2021-03-01"));
        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert_eq!(result.firm_id.as_deref(), Some("F1"));
        assert_eq!(result.similarity, Some(100.0));
    }
}
