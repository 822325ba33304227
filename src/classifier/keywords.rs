//! Maintained reference lists for AI classification.
//!
//! These are the built-in defaults; every list can be overridden from
//! the pipeline configuration file. All matching is case-insensitive
//! with word boundaries, so "AI" never matches inside "said".

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::RegexSet;

// CPC codes considered indicative of AI subject matter
pub const DEFAULT_AI_CODES: &[&str] = &[
    "G06N",
    "G06N3/00",
    "G06N3/02",
    "G06N3/04",
    "G06N3/08",
    "G06N5/00",
    "G06N7/00",
    "G06N20/00",
    "G06F40/30",
    "G06V10/70",
    "G06V10/82",
    "G10L15/16",
    "G10L25/30",
    "G06T2207/20081",
    "G06T2207/20084",
];

pub const DEFAULT_AI_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "AI",
    "machine learning",
    "neural network",
    "deep learning",
    "natural language processing",
    "computer vision",
    "reinforcement learning",
    "supervised learning",
    "unsupervised learning",
    "speech recognition",
    "image recognition",
    "convolutional",
    "recurrent neural",
    "generative adversarial",
    "support vector machine",
    "random forest",
    "gradient boosting",
    "transformer model",
    "large language model",
];

lazy_static! {
    // Category term lists, keyed by what the invention is about rather
    // than which technique it names. Infrastructure covers compute and
    // serving substrate, Algorithm the learning machinery itself,
    // Application the end use.
    pub static ref DEFAULT_INFRASTRUCTURE_KEYWORDS: Vec<String> = to_owned(&[
        "processor",
        "accelerator",
        "gpu",
        "tensor processing",
        "inference engine",
        "data center",
        "datacenter",
        "distributed training",
        "compute cluster",
        "memory bandwidth",
        "hardware",
        "chip",
        "fpga",
        "api",
        "serving infrastructure",
    ]);
    pub static ref DEFAULT_ALGORITHM_KEYWORDS: Vec<String> = to_owned(&[
        "neural network",
        "deep learning",
        "reinforcement learning",
        "backpropagation",
        "gradient descent",
        "attention mechanism",
        "model training",
        "loss function",
        "classifier",
        "clustering",
        "regression",
        "embedding",
        "optimization method",
    ]);
    pub static ref DEFAULT_APPLICATION_KEYWORDS: Vec<String> = to_owned(&[
        "image recognition",
        "speech recognition",
        "machine translation",
        "autonomous vehicle",
        "medical diagnosis",
        "recommendation system",
        "fraud detection",
        "chatbot",
        "facial recognition",
        "predictive maintenance",
        "natural language understanding",
        "robotic",
    ]);
}

fn to_owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

pub fn default_ai_codes() -> Vec<String> {
    to_owned(DEFAULT_AI_CODES)
}

pub fn default_ai_keywords() -> Vec<String> {
    to_owned(DEFAULT_AI_KEYWORDS)
}

/// A compiled term list supporting case-insensitive, word-boundary
/// matching against free text. Built once per process and shared
/// read-only across workers.
pub struct KeywordMatcher {
    terms: Vec<String>,
    set: RegexSet,
}

impl KeywordMatcher {
    pub fn new(terms: &[String]) -> Result<Self> {
        let patterns: Vec<String> = terms
            .iter()
            .map(|term| format!(r"(?i)\b{}\b", regex::escape(term)))
            .collect();
        let set = RegexSet::new(&patterns).context("failed to compile keyword list")?;
        Ok(KeywordMatcher {
            terms: terms.to_vec(),
            set,
        })
    }

    /// Distinct terms from the list appearing in `text`
    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.set
            .matches(text)
            .into_iter()
            .map(|idx| self.terms[idx].as_str())
            .collect()
    }

    /// Number of distinct matching terms
    pub fn match_count(&self, text: &str) -> usize {
        self.set.matches(text).iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_matching() {
        let matcher = KeywordMatcher::new(&["AI".to_string(), "neural network".to_string()])
            .expect("compile");

        // "AI" must not match inside "said"
        assert!(matcher.matches("the inventor said so").is_empty());
        assert_eq!(matcher.matches("an AI system"), vec!["AI"]);
        assert_eq!(matcher.matches("an ai system"), vec!["AI"]);
        assert_eq!(
            matcher.matches("applies a neural network"),
            vec!["neural network"]
        );
    }

    #[test]
    fn test_distinct_term_counting() {
        let matcher = KeywordMatcher::new(&[
            "neural network".to_string(),
            "deep learning".to_string(),
            "classifier".to_string(),
        ])
        .expect("compile");

        // Repeats of one term count once
        assert_eq!(
            matcher.match_count("a neural network feeding a neural network"),
            1
        );
        assert_eq!(
            matcher.match_count("deep learning with a neural network classifier"),
            3
        );
    }

    #[test]
    fn test_terms_with_punctuation_are_escaped() {
        let matcher = KeywordMatcher::new(&["G06N3/02".to_string()]).expect("compile");
        assert_eq!(matcher.matches("code G06N3/02 applies"), vec!["G06N3/02"]);
    }
}
