use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Patent kind as recorded in the grant metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatentKind {
    Utility,
    Design,
    Plant,
    Reissue,
    Other,
}

impl fmt::Display for PatentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatentKind::Utility => write!(f, "UTILITY"),
            PatentKind::Design => write!(f, "DESIGN"),
            PatentKind::Plant => write!(f, "PLANT"),
            PatentKind::Reissue => write!(f, "REISSUE"),
            PatentKind::Other => write!(f, "OTHER"),
        }
    }
}

impl From<&str> for PatentKind {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "UTILITY" => PatentKind::Utility,
            "DESIGN" => PatentKind::Design,
            "PLANT" => PatentKind::Plant,
            "REISSUE" => PatentKind::Reissue,
            _ => PatentKind::Other,
        }
    }
}

/// A single patent as ingested from the source tables. Immutable after
/// ingestion; every downstream stage reads it as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatentRecord {
    pub patent_id: String,
    pub grant_date: NaiveDate,
    pub kind: PatentKind,
    // Ordered, deduplicated at ingest
    pub codes: Vec<String>,
    pub abstract_text: Option<String>,
    pub assignees: Vec<String>,
}

impl PatentRecord {
    pub fn grant_year(&self) -> i32 {
        use chrono::Datelike;
        self.grant_date.year()
    }

    /// Abstract text with empty/whitespace-only treated as absent
    pub fn abstract_if_present(&self) -> Option<&str> {
        self.abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Strategic category of an AI-related patent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategicCategory {
    Infrastructure,
    Algorithm,
    Application,
    Unknown,
}

impl fmt::Display for StrategicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategicCategory::Infrastructure => write!(f, "INFRASTRUCTURE"),
            StrategicCategory::Algorithm => write!(f, "ALGORITHM"),
            StrategicCategory::Application => write!(f, "APPLICATION"),
            StrategicCategory::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl From<&str> for StrategicCategory {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "INFRASTRUCTURE" => StrategicCategory::Infrastructure,
            "ALGORITHM" => StrategicCategory::Algorithm,
            "APPLICATION" => StrategicCategory::Application,
            _ => StrategicCategory::Unknown,
        }
    }
}

/// What triggered a classification decision. `InsufficientData` marks a
/// record lacking both codes and text, which must stay distinguishable
/// from a true negative downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Evidence {
    Code(String),
    Keyword(String),
    InsufficientData,
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::Code(code) => write!(f, "code:{}", code),
            Evidence::Keyword(term) => write!(f, "keyword:{}", term),
            Evidence::InsufficientData => write!(f, "insufficient-data"),
        }
    }
}

impl FromStr for Evidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "insufficient-data" {
            Ok(Evidence::InsufficientData)
        } else if let Some(code) = s.strip_prefix("code:") {
            Ok(Evidence::Code(code.to_string()))
        } else if let Some(term) = s.strip_prefix("keyword:") {
            Ok(Evidence::Keyword(term.to_string()))
        } else {
            Err(format!("unrecognized evidence: {}", s))
        }
    }
}

/// Output of the keyword/code classifier plus the strategic categorizer.
/// Derived and recomputable; never mutated after creation.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub patent_id: String,
    pub is_ai: bool,
    pub category: StrategicCategory,
    pub evidence: Vec<Evidence>,
}

impl ClassificationResult {
    pub fn insufficient(patent_id: &str) -> Self {
        ClassificationResult {
            patent_id: patent_id.to_string(),
            is_ai: false,
            category: StrategicCategory::Unknown,
            evidence: vec![Evidence::InsufficientData],
        }
    }

    pub fn is_insufficient_data(&self) -> bool {
        self.evidence.contains(&Evidence::InsufficientData)
    }
}

/// One entry of the external firm registry. Read-only for this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmReference {
    pub firm_id: String,
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl FirmReference {
    /// Whether this entry's validity interval covers the given date.
    /// Open ends are treated as unbounded.
    pub fn covers(&self, date: NaiveDate) -> bool {
        let after_start = self.valid_from.map_or(true, |from| date >= from);
        let before_end = self.valid_to.map_or(true, |to| date <= to);
        after_start && before_end
    }
}

/// Per-year financial attributes of a firm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmFinancials {
    pub firm_id: String,
    pub year: i32,
    pub market_cap: Option<f64>,
    pub valuation: Option<f64>,
}

/// How an assignee name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    Exact,
    NormalizedExact,
    Fuzzy,
    Unmatched,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Exact => write!(f, "exact"),
            MatchMethod::NormalizedExact => write!(f, "normalized-exact"),
            MatchMethod::Fuzzy => write!(f, "fuzzy"),
            MatchMethod::Unmatched => write!(f, "unmatched"),
        }
    }
}

impl From<&str> for MatchMethod {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "exact" => MatchMethod::Exact,
            "normalized-exact" => MatchMethod::NormalizedExact,
            "fuzzy" => MatchMethod::Fuzzy,
            _ => MatchMethod::Unmatched,
        }
    }
}

/// Outcome of resolving a patent's assignee name against the firm
/// registry. Unmatched is a valid terminal state, kept for audit.
#[derive(Debug, Clone)]
pub struct ResolvedAssignment {
    pub patent_id: String,
    pub assignee_name: String,
    pub firm_id: Option<String>,
    pub method: MatchMethod,
    pub confidence: f64,
    // Fuzzy diagnostics (also recorded for rejected fuzzy attempts)
    pub similarity: Option<f64>,
    pub runner_up: Option<String>,
    pub runner_up_score: Option<f64>,
}

impl ResolvedAssignment {
    pub fn exact(patent_id: &str, name: &str, firm_id: &str) -> Self {
        ResolvedAssignment {
            patent_id: patent_id.to_string(),
            assignee_name: name.to_string(),
            firm_id: Some(firm_id.to_string()),
            method: MatchMethod::Exact,
            confidence: 1.0,
            similarity: None,
            runner_up: None,
            runner_up_score: None,
        }
    }

    pub fn normalized_exact(patent_id: &str, name: &str, firm_id: &str) -> Self {
        ResolvedAssignment {
            method: MatchMethod::NormalizedExact,
            ..Self::exact(patent_id, name, firm_id)
        }
    }

    pub fn fuzzy(
        patent_id: &str,
        name: &str,
        firm_id: &str,
        similarity: f64,
        runner_up: Option<(String, f64)>,
    ) -> Self {
        let (runner_up, runner_up_score) = match runner_up {
            Some((name, score)) => (Some(name), Some(score)),
            None => (None, None),
        };
        ResolvedAssignment {
            patent_id: patent_id.to_string(),
            assignee_name: name.to_string(),
            firm_id: Some(firm_id.to_string()),
            method: MatchMethod::Fuzzy,
            confidence: similarity / 100.0,
            similarity: Some(similarity),
            runner_up,
            runner_up_score,
        }
    }

    pub fn unmatched(patent_id: &str, name: &str) -> Self {
        ResolvedAssignment {
            patent_id: patent_id.to_string(),
            assignee_name: name.to_string(),
            firm_id: None,
            method: MatchMethod::Unmatched,
            confidence: 0.0,
            similarity: None,
            runner_up: None,
            runner_up_score: None,
        }
    }

    pub fn with_fuzzy_diagnostics(
        mut self,
        similarity: f64,
        runner_up: Option<(String, f64)>,
    ) -> Self {
        self.similarity = Some(similarity);
        if let Some((name, score)) = runner_up {
            self.runner_up = Some(name);
            self.runner_up_score = Some(score);
        }
        self
    }
}

/// One row of the firm-year panel. Sparse: a row exists only for
/// firm-years with at least one matched AI patent.
#[derive(Debug, Clone, PartialEq)]
pub struct FirmYearPanelRow {
    pub firm_id: String,
    pub year: i32,
    pub n_infrastructure: i64,
    pub n_algorithm: i64,
    pub n_application: i64,
    pub n_unknown: i64,
    pub n_total: i64,
    pub first_grant: NaiveDate,
    pub last_grant: NaiveDate,
    pub market_cap: Option<f64>,
    pub valuation: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_round_trip() {
        for ev in [
            Evidence::Code("G06N20/00".to_string()),
            Evidence::Keyword("neural network".to_string()),
            Evidence::InsufficientData,
        ] {
            let parsed: Evidence = ev.to_string().parse().unwrap();
            assert_eq!(parsed, ev);
        }
        assert!("something else".parse::<Evidence>().is_err());
    }

    #[test]
    fn test_validity_interval() {
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let firm = FirmReference {
            firm_id: "F1".to_string(),
            canonical_name: "Acme AI".to_string(),
            aliases: vec![],
            valid_from: Some(date("2015-01-01")),
            valid_to: Some(date("2020-12-31")),
        };
        assert!(firm.covers(date("2018-06-01")));
        assert!(!firm.covers(date("2021-01-01")));

        let open_ended = FirmReference {
            valid_to: None,
            ..firm.clone()
        };
        assert!(open_ended.covers(date("2030-01-01")));
        assert!(!open_ended.covers(date("2014-12-31")));
    }

    #[test]
    fn test_match_method_round_trip() {
        for method in [
            MatchMethod::Exact,
            MatchMethod::NormalizedExact,
            MatchMethod::Fuzzy,
            MatchMethod::Unmatched,
        ] {
            assert_eq!(MatchMethod::from(method.to_string().as_str()), method);
        }
    }
}
