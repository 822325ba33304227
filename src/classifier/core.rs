use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use super::category::Categorizer;
use super::keywords::KeywordMatcher;
use crate::config::PipelineConfig;
use crate::types::{ClassificationResult, Evidence, PatentRecord, StrategicCategory};
use crate::TARGET_CLASSIFIER;

/// Keyword/code classifier. A record is AI-related if its code set
/// intersects the AI code reference set OR its text matches at least
/// one AI keyword: a union, so any one signal suffices. Pure function
/// of the record; safe to share read-only across worker shards.
pub struct Classifier {
    ai_codes: HashSet<String>,
    ai_keywords: KeywordMatcher,
    categorizer: Categorizer,
}

impl Classifier {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Classifier {
            ai_codes: config.ai_codes.iter().cloned().collect(),
            ai_keywords: KeywordMatcher::new(&config.ai_keywords)?,
            categorizer: Categorizer::new(config)?,
        })
    }

    pub fn classify(&self, record: &PatentRecord) -> ClassificationResult {
        let text = record.abstract_if_present();

        // Records with neither codes nor text are not a true negative;
        // mark them so coverage can be reported separately downstream.
        if record.codes.is_empty() && text.is_none() {
            debug!(
                target: TARGET_CLASSIFIER,
                "{}: no codes and no text, recording insufficient-data", record.patent_id
            );
            return ClassificationResult::insufficient(&record.patent_id);
        }

        let mut evidence: Vec<Evidence> = record
            .codes
            .iter()
            .filter(|code| self.ai_codes.contains(*code))
            .map(|code| Evidence::Code(code.clone()))
            .collect();

        // Absent text only disables the text branch
        if let Some(text) = text {
            evidence.extend(
                self.ai_keywords
                    .matches(text)
                    .into_iter()
                    .map(|term| Evidence::Keyword(term.to_string())),
            );
        }

        if evidence.is_empty() {
            return ClassificationResult {
                patent_id: record.patent_id.clone(),
                is_ai: false,
                category: StrategicCategory::Unknown,
                evidence,
            };
        }

        let category = self.categorizer.categorize(text);
        debug!(
            target: TARGET_CLASSIFIER,
            "{}: is_ai=true, category={}, {} evidence item(s)",
            record.patent_id,
            category,
            evidence.len()
        );

        ClassificationResult {
            patent_id: record.patent_id.clone(),
            is_ai: true,
            category,
            evidence,
        }
    }
}
