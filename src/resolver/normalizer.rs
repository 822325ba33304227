use lazy_static::lazy_static;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

// Legal-entity suffix tokens stripped from the end of firm names.
// Stored post-normalization, so no punctuation variants needed.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "ltd",
    "limited",
    "llc",
    "llp",
    "lp",
    "plc",
    "gmbh",
    "ag",
    "sa",
    "nv",
    "bv",
    "ab",
    "oy",
    "spa",
    "srl",
    "pty",
    "kk",
];

lazy_static! {
    static ref LEGAL_SUFFIX_SET: HashSet<&'static str> = LEGAL_SUFFIXES.iter().copied().collect();
}

/// Normalizes assignee and registry firm names. The same pure function
/// runs at index build and at query time, so the two can never diverge;
/// it carries no state and no configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmNormalizer;

impl FirmNormalizer {
    pub fn new() -> Self {
        FirmNormalizer
    }

    /// Full normalization: Unicode NFKD, lowercase, punctuation to
    /// spaces, whitespace collapse, then trailing legal-suffix strip.
    pub fn normalize(&self, name: &str) -> String {
        let base = self.basic_normalize(name);

        let mut tokens: Vec<&str> = base.split_whitespace().collect();
        // Strip repeatedly: "Acme Holdings Co Ltd" loses both tails.
        // Never strip the last remaining token ("Limited" the airline
        // would otherwise normalize to nothing).
        while tokens.len() > 1 && LEGAL_SUFFIX_SET.contains(tokens[tokens.len() - 1]) {
            tokens.pop();
        }
        tokens.join(" ")
    }

    /// Unicode and whitespace normalization without suffix stripping
    fn basic_normalize(&self, name: &str) -> String {
        let name_without_apostrophes = name
            .replace("'s ", " ")
            .replace("'s", "")
            .replace("s' ", "s ")
            .replace("' ", " ")
            .replace('\'', "");

        name_without_apostrophes
            .nfkd()
            .collect::<String>()
            .to_lowercase()
            .trim()
            .replace(|c: char| !c.is_alphanumeric() && c != ' ', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_normalization() {
        let normalizer = FirmNormalizer::new();
        assert_eq!(normalizer.basic_normalize("Blue Origin"), "blue origin");
        assert_eq!(normalizer.basic_normalize("Blue-Origin"), "blue origin");
        assert_eq!(normalizer.basic_normalize(" BLUE  ORIGIN "), "blue origin");
        assert_eq!(normalizer.basic_normalize("A.I. Devices"), "a i devices");
    }

    #[test]
    fn test_legal_suffix_stripping() {
        let normalizer = FirmNormalizer::new();
        assert_eq!(normalizer.normalize("Acme AI Inc."), "acme ai");
        assert_eq!(normalizer.normalize("Acme AI, Inc."), "acme ai");
        assert_eq!(normalizer.normalize("Siemens AG"), "siemens");
        assert_eq!(normalizer.normalize("Acme Holdings Co., Ltd."), "acme holdings");
        assert_eq!(
            normalizer.normalize("International Business Machines Corporation"),
            "international business machines"
        );
        // Suffix tokens appearing mid-name stay put
        assert_eq!(normalizer.normalize("Corp Tools LLC"), "corp tools");
    }

    #[test]
    fn test_never_strips_to_empty() {
        let normalizer = FirmNormalizer::new();
        assert_eq!(normalizer.normalize("Limited"), "limited");
        assert_eq!(normalizer.normalize("Co. Ltd."), "co");
    }

    #[test]
    fn test_normalization_is_pure_and_idempotent() {
        let normalizer = FirmNormalizer::new();
        let once = normalizer.normalize("Müller & Söhne GmbH");
        let twice = normalizer.normalize(&once);
        assert_eq!(once, twice);
        // Same input always yields the same output
        assert_eq!(once, normalizer.normalize("Müller & Söhne GmbH"));
    }

    #[test]
    fn test_registry_and_query_normalization_agree() {
        let normalizer = FirmNormalizer::new();
        // Registry-side and query-side forms of the same firm collapse
        // to one key
        assert_eq!(
            normalizer.normalize("ACME AI"),
            normalizer.normalize("Acme AI Inc.")
        );
    }
}
