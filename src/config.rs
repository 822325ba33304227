use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::classifier::keywords::{
    default_ai_codes, default_ai_keywords, DEFAULT_ALGORITHM_KEYWORDS,
    DEFAULT_APPLICATION_KEYWORDS, DEFAULT_INFRASTRUCTURE_KEYWORDS,
};
use crate::types::StrategicCategory;

/// Bounded retry with exponential backoff, carried in configuration
/// rather than hardcoded at call sites. Used for transient database
/// lock contention between worker shards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor as u64))
    }
}

/// How fuzzy-match candidates are restricted to a plausible subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingStrategy {
    /// First token of the normalized name
    FirstToken,
    /// First token plus a length bucket; adjacent buckets are probed
    /// at query time so near-misses on length are not lost
    FirstTokenLength,
    /// Compare against the whole registry
    None,
}

/// Immutable pipeline configuration, loaded once at startup and passed
/// explicitly to every stage. Never mutated after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Classifier reference lists
    pub ai_codes: Vec<String>,
    pub ai_keywords: Vec<String>,

    // Categorizer term lists and deterministic tie-break order
    pub infrastructure_keywords: Vec<String>,
    pub algorithm_keywords: Vec<String>,
    pub application_keywords: Vec<String>,
    pub category_priority: Vec<StrategicCategory>,

    // Resolver: similarity on a 0-100 scale
    pub fuzzy_threshold: f64,
    pub fuzzy_margin: f64,
    pub blocking: BlockingStrategy,

    // Panel filters, inclusive
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub utility_only: bool,

    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            ai_codes: default_ai_codes(),
            ai_keywords: default_ai_keywords(),
            infrastructure_keywords: DEFAULT_INFRASTRUCTURE_KEYWORDS.clone(),
            algorithm_keywords: DEFAULT_ALGORITHM_KEYWORDS.clone(),
            application_keywords: DEFAULT_APPLICATION_KEYWORDS.clone(),
            category_priority: vec![
                StrategicCategory::Infrastructure,
                StrategicCategory::Algorithm,
                StrategicCategory::Application,
            ],
            fuzzy_threshold: 85.0,
            fuzzy_margin: 3.0,
            blocking: BlockingStrategy::FirstTokenLength,
            start_year: None,
            end_year: None,
            utility_only: true,
            workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file, or built-in defaults when
    /// no file is given. Unknown values fail loudly; a bad config is a
    /// fatal condition before any stage runs.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                let config: PipelineConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("cannot parse config file {}", path.display()))?;
                info!("Loaded pipeline configuration from {}", path.display());
                config
            }
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.fuzzy_threshold) {
            bail!("fuzzy_threshold must be within 0-100");
        }
        if self.fuzzy_margin < 0.0 {
            bail!("fuzzy_margin must not be negative");
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                bail!("start_year {} is after end_year {}", start, end);
            }
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.category_priority.is_empty() {
            bail!("category_priority must not be empty");
        }
        Ok(())
    }

    /// Whether a grant year falls inside the configured window
    pub fn year_in_range(&self, year: i32) -> bool {
        self.start_year.map_or(true, |start| year >= start)
            && self.end_year.map_or(true, |end| year <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fuzzy_threshold, 85.0);
        assert_eq!(config.category_priority[0], StrategicCategory::Infrastructure);
        assert!(!config.ai_codes.is_empty());
        assert!(!config.ai_keywords.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"fuzzy_threshold": 90.0, "utility_only": false, "start_year": 2015, "end_year": 2022}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.fuzzy_threshold, 90.0);
        assert!(!config.utility_only);
        assert!(config.year_in_range(2015));
        assert!(config.year_in_range(2022));
        assert!(!config.year_in_range(2023));
        // Untouched fields keep their defaults
        assert_eq!(config.fuzzy_margin, 3.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"start_year": 2020, "end_year": 2010}}"#).unwrap();
        assert!(PipelineConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1).as_millis(), 100);
        assert_eq!(policy.delay_for(2).as_millis(), 200);
        assert_eq!(policy.delay_for(3).as_millis(), 400);
    }
}
