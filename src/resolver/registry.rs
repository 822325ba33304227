use std::collections::HashMap;
use tracing::{info, warn};

use super::normalizer::FirmNormalizer;
use crate::config::BlockingStrategy;
use crate::types::FirmReference;
use crate::TARGET_RESOLVER;

// Width of one length bucket when blocking on first token + length
const LENGTH_BUCKET: usize = 4;

/// Precomputed index over the firm registry: exact lookup maps for the
/// raw and normalized forms, plus blocked candidate lists for fuzzy
/// comparison. Built once, then shared read-only across worker shards.
pub struct FirmIndex {
    firms: Vec<FirmReference>,
    // Raw canonical/alias string -> distinct firm indices
    raw: HashMap<String, Vec<usize>>,
    // Normalized canonical/alias -> distinct firm indices
    exact: HashMap<String, Vec<usize>>,
    // All (normalized name variant, firm index) pairs, the fuzzy corpus
    entries: Vec<(String, usize)>,
    // Blocking key -> indices into `entries`
    blocks: HashMap<String, Vec<usize>>,
    blocking: BlockingStrategy,
    duplicate_names: usize,
}

impl FirmIndex {
    pub fn build(
        firms: Vec<FirmReference>,
        normalizer: &FirmNormalizer,
        blocking: BlockingStrategy,
    ) -> Self {
        let mut raw: HashMap<String, Vec<usize>> = HashMap::new();
        let mut exact: HashMap<String, Vec<usize>> = HashMap::new();
        let mut entries: Vec<(String, usize)> = Vec::new();

        for (idx, firm) in firms.iter().enumerate() {
            let mut seen_normalized: Vec<String> = Vec::new();
            for name in std::iter::once(&firm.canonical_name).chain(firm.aliases.iter()) {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    continue;
                }
                push_unique(raw.entry(trimmed.to_string()).or_default(), idx);

                let normalized = normalizer.normalize(trimmed);
                if normalized.is_empty() {
                    continue;
                }
                push_unique(exact.entry(normalized.clone()).or_default(), idx);
                if !seen_normalized.contains(&normalized) {
                    seen_normalized.push(normalized.clone());
                    entries.push((normalized, idx));
                }
            }
        }

        // Duplicate canonical names across distinct firms are a
        // data-quality condition, surfaced here and again per lookup
        let duplicate_names = exact.values().filter(|firms| firms.len() > 1).count();
        if duplicate_names > 0 {
            warn!(
                target: TARGET_RESOLVER,
                "firm registry has {} normalized name(s) shared by distinct firms", duplicate_names
            );
        }

        let mut blocks: HashMap<String, Vec<usize>> = HashMap::new();
        for (entry_idx, (normalized, _)) in entries.iter().enumerate() {
            if let Some(key) = block_key(blocking, normalized) {
                blocks.entry(key).or_default().push(entry_idx);
            }
        }

        info!(
            target: TARGET_RESOLVER,
            "indexed {} firms ({} name variants, {} blocks)",
            firms.len(),
            entries.len(),
            blocks.len()
        );

        FirmIndex {
            firms,
            raw,
            exact,
            entries,
            blocks,
            blocking,
            duplicate_names,
        }
    }

    pub fn firm(&self, idx: usize) -> &FirmReference {
        &self.firms[idx]
    }

    pub fn len(&self) -> usize {
        self.firms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firms.is_empty()
    }

    pub fn duplicate_name_count(&self) -> usize {
        self.duplicate_names
    }

    /// Firms whose raw canonical name or alias equals the input
    pub fn raw_candidates(&self, raw: &str) -> &[usize] {
        self.raw.get(raw.trim()).map_or(&[], Vec::as_slice)
    }

    /// Firms whose normalized canonical name or alias equals the input
    pub fn exact_candidates(&self, normalized: &str) -> &[usize] {
        self.exact.get(normalized).map_or(&[], Vec::as_slice)
    }

    /// Fuzzy comparison candidates for a normalized query, restricted
    /// by the blocking strategy. With length bucketing, adjacent
    /// buckets are probed too so a near-miss on length still competes.
    pub fn fuzzy_candidates(&self, normalized: &str) -> Vec<&(String, usize)> {
        match self.blocking {
            BlockingStrategy::None => self.entries.iter().collect(),
            BlockingStrategy::FirstToken => self
                .block(&first_token_key(normalized))
                .collect(),
            BlockingStrategy::FirstTokenLength => {
                let Some(token) = normalized.split_whitespace().next() else {
                    return Vec::new();
                };
                let bucket = normalized.len() / LENGTH_BUCKET;
                let mut candidates = Vec::new();
                for probe in bucket.saturating_sub(1)..=bucket + 1 {
                    candidates.extend(self.block(&format!("{}:{}", token, probe)));
                }
                candidates
            }
        }
    }

    fn block<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a (String, usize)> + 'a {
        self.blocks
            .get(key)
            .map_or(&[] as &[usize], Vec::as_slice)
            .iter()
            .map(|&entry_idx| &self.entries[entry_idx])
    }
}

fn push_unique(firms: &mut Vec<usize>, idx: usize) {
    if !firms.contains(&idx) {
        firms.push(idx);
    }
}

fn first_token_key(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn block_key(blocking: BlockingStrategy, normalized: &str) -> Option<String> {
    let token = normalized.split_whitespace().next()?;
    match blocking {
        BlockingStrategy::None => None,
        BlockingStrategy::FirstToken => Some(token.to_string()),
        BlockingStrategy::FirstTokenLength => {
            Some(format!("{}:{}", token, normalized.len() / LENGTH_BUCKET))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firm(id: &str, name: &str, aliases: &[&str]) -> FirmReference {
        FirmReference {
            firm_id: id.to_string(),
            canonical_name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            valid_from: None,
            valid_to: None,
        }
    }

    #[test]
    fn test_exact_index_covers_aliases() {
        let normalizer = FirmNormalizer::new();
        let index = FirmIndex::build(
            vec![
                firm("F1", "Acme AI", &["Acme Artificial Intelligence Inc."]),
                firm("F2", "Globex Corporation", &[]),
            ],
            &normalizer,
            BlockingStrategy::FirstTokenLength,
        );

        assert_eq!(index.exact_candidates("acme ai"), &[0]);
        assert_eq!(index.exact_candidates("acme artificial intelligence"), &[0]);
        assert_eq!(index.exact_candidates("globex"), &[1]);
        assert!(index.exact_candidates("initech").is_empty());
        assert_eq!(index.raw_candidates("Acme AI"), &[0]);
        assert!(index.raw_candidates("acme ai").is_empty());
    }

    #[test]
    fn test_duplicate_names_are_counted() {
        let normalizer = FirmNormalizer::new();
        let index = FirmIndex::build(
            vec![
                firm("F1", "Apex Industries", &[]),
                firm("F2", "Apex Industries Inc.", &[]),
            ],
            &normalizer,
            BlockingStrategy::FirstToken,
        );
        assert_eq!(index.duplicate_name_count(), 1);
        assert_eq!(index.exact_candidates("apex industries"), &[0, 1]);
    }

    #[test]
    fn test_length_bucket_blocking_probes_neighbors() {
        let normalizer = FirmNormalizer::new();
        let index = FirmIndex::build(
            vec![firm("F1", "Acme AI", &[]), firm("F2", "Zenith Robotics", &[])],
            &normalizer,
            BlockingStrategy::FirstTokenLength,
        );

        // "acme a i" (len 8) lands one bucket above "acme ai" (len 7)
        // but must still see it as a candidate
        let candidates = index.fuzzy_candidates("acme a i");
        assert!(candidates.iter().any(|(name, _)| name == "acme ai"));
        // Different first token blocks out
        assert!(candidates.iter().all(|(name, _)| name != "zenith robotics"));
    }

    #[test]
    fn test_no_blocking_scans_everything() {
        let normalizer = FirmNormalizer::new();
        let index = FirmIndex::build(
            vec![firm("F1", "Acme AI", &[]), firm("F2", "Zenith Robotics", &[])],
            &normalizer,
            BlockingStrategy::None,
        );
        assert_eq!(index.fuzzy_candidates("anything").len(), 2);
    }
}
