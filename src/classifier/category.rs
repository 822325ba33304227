use anyhow::Result;
use tracing::debug;

use super::keywords::KeywordMatcher;
use crate::config::PipelineConfig;
use crate::types::StrategicCategory;
use crate::TARGET_CLASSIFIER;

/// Strategic categorizer. Scores text against the per-category term
/// lists by counting distinct matching terms; the highest count wins
/// and ties resolve to the earliest entry of the configured priority
/// order, never map-iteration order. Zero matches yields Unknown.
/// Only invoked for records already classified AI-related; it never
/// reconsiders that decision.
pub struct Categorizer {
    // In priority order
    lists: Vec<(StrategicCategory, KeywordMatcher)>,
}

impl Categorizer {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let mut lists = Vec::new();
        for category in &config.category_priority {
            let terms = match category {
                StrategicCategory::Infrastructure => &config.infrastructure_keywords,
                StrategicCategory::Algorithm => &config.algorithm_keywords,
                StrategicCategory::Application => &config.application_keywords,
                StrategicCategory::Unknown => continue,
            };
            lists.push((*category, KeywordMatcher::new(terms)?));
        }
        Ok(Categorizer { lists })
    }

    pub fn categorize(&self, text: Option<&str>) -> StrategicCategory {
        let Some(text) = text else {
            return StrategicCategory::Unknown;
        };

        let mut best = StrategicCategory::Unknown;
        let mut best_count = 0usize;
        for (category, matcher) in &self.lists {
            let count = matcher.match_count(text);
            // Strictly greater, so equal counts keep the earlier
            // (higher-priority) category
            if count > best_count {
                best = *category;
                best_count = count;
            }
        }

        debug!(
            target: TARGET_CLASSIFIER,
            "categorized as {} ({} matching term(s))", best, best_count
        );
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorizer() -> Categorizer {
        Categorizer::new(&PipelineConfig::default()).expect("categorizer")
    }

    #[test]
    fn test_zero_matches_is_unknown() {
        let categorizer = categorizer();
        assert_eq!(
            categorizer.categorize(Some("a purely mechanical device")),
            StrategicCategory::Unknown
        );
        assert_eq!(categorizer.categorize(None), StrategicCategory::Unknown);
    }

    #[test]
    fn test_highest_count_wins() {
        let categorizer = categorizer();
        // Two algorithm terms against one infrastructure term
        assert_eq!(
            categorizer.categorize(Some(
                "backpropagation with gradient descent running on a gpu"
            )),
            StrategicCategory::Algorithm
        );
        assert_eq!(
            categorizer.categorize(Some("autonomous vehicle control")),
            StrategicCategory::Application
        );
    }

    #[test]
    fn test_tie_breaks_by_priority_order() {
        let categorizer = categorizer();
        // "api" (infrastructure) and "neural network" (algorithm) match
        // one term each; priority order resolves to Infrastructure.
        let text = "a neural network exposed through an api";
        assert_eq!(
            categorizer.categorize(Some(text)),
            StrategicCategory::Infrastructure
        );
        // Determinism: repeated runs agree
        for _ in 0..10 {
            assert_eq!(
                categorizer.categorize(Some(text)),
                StrategicCategory::Infrastructure
            );
        }
    }

    #[test]
    fn test_custom_priority_order_is_honored() {
        let config = PipelineConfig {
            category_priority: vec![
                StrategicCategory::Application,
                StrategicCategory::Algorithm,
                StrategicCategory::Infrastructure,
            ],
            ..PipelineConfig::default()
        };
        let categorizer = Categorizer::new(&config).expect("categorizer");
        // Same one-term tie, now resolved by the reordered priority
        assert_eq!(
            categorizer.categorize(Some("a neural network for image recognition")),
            StrategicCategory::Application
        );
    }
}
