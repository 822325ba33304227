use chrono::NaiveDate;
use std::collections::HashMap;

use crate::types::StrategicCategory;

/// Per-(firm, year) aggregate. Forms a monoid under `merge` (counts
/// sum, first-grant min, last-grant max), so worker shards can build
/// partial aggregates independently and merging them in any grouping
/// yields the same result as a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmYearAggregate {
    pub n_infrastructure: i64,
    pub n_algorithm: i64,
    pub n_application: i64,
    pub n_unknown: i64,
    pub n_total: i64,
    pub first_grant: NaiveDate,
    pub last_grant: NaiveDate,
}

impl FirmYearAggregate {
    /// Aggregate of a single patent
    pub fn unit(category: StrategicCategory, grant_date: NaiveDate) -> Self {
        let mut agg = FirmYearAggregate {
            n_infrastructure: 0,
            n_algorithm: 0,
            n_application: 0,
            n_unknown: 0,
            n_total: 1,
            first_grant: grant_date,
            last_grant: grant_date,
        };
        match category {
            StrategicCategory::Infrastructure => agg.n_infrastructure = 1,
            StrategicCategory::Algorithm => agg.n_algorithm = 1,
            StrategicCategory::Application => agg.n_application = 1,
            StrategicCategory::Unknown => agg.n_unknown = 1,
        }
        agg
    }

    pub fn merge(&mut self, other: &FirmYearAggregate) {
        self.n_infrastructure += other.n_infrastructure;
        self.n_algorithm += other.n_algorithm;
        self.n_application += other.n_application;
        self.n_unknown += other.n_unknown;
        self.n_total += other.n_total;
        self.first_grant = self.first_grant.min(other.first_grant);
        self.last_grant = self.last_grant.max(other.last_grant);
    }
}

pub type PartialPanel = HashMap<(String, i32), FirmYearAggregate>;

/// Fold one patent into a partial aggregate
pub fn accumulate(
    partial: &mut PartialPanel,
    firm_id: &str,
    year: i32,
    category: StrategicCategory,
    grant_date: NaiveDate,
) {
    let unit = FirmYearAggregate::unit(category, grant_date);
    partial
        .entry((firm_id.to_string(), year))
        .and_modify(|agg| agg.merge(&unit))
        .or_insert(unit);
}

/// Merge two partial aggregates; the shuffle/merge boundary between
/// worker shards
pub fn merge_partials(mut left: PartialPanel, right: PartialPanel) -> PartialPanel {
    for (key, agg) in right {
        left.entry(key)
            .and_modify(|existing| existing.merge(&agg))
            .or_insert(agg);
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_rows() -> Vec<(&'static str, i32, StrategicCategory, NaiveDate)> {
        vec![
            ("F1", 2021, StrategicCategory::Algorithm, date("2021-02-10")),
            ("F1", 2021, StrategicCategory::Infrastructure, date("2021-08-01")),
            ("F1", 2021, StrategicCategory::Algorithm, date("2021-05-05")),
            ("F1", 2022, StrategicCategory::Application, date("2022-01-15")),
            ("F2", 2021, StrategicCategory::Unknown, date("2021-11-30")),
            ("F2", 2021, StrategicCategory::Algorithm, date("2021-03-20")),
            ("F3", 2019, StrategicCategory::Application, date("2019-07-04")),
        ]
    }

    fn aggregate_all(
        rows: &[(&'static str, i32, StrategicCategory, NaiveDate)],
    ) -> PartialPanel {
        let mut panel = PartialPanel::new();
        for (firm, year, category, grant) in rows {
            accumulate(&mut panel, firm, *year, *category, *grant);
        }
        panel
    }

    #[test]
    fn test_unit_counts_single_patent() {
        let agg = FirmYearAggregate::unit(StrategicCategory::Algorithm, date("2021-05-05"));
        assert_eq!(agg.n_algorithm, 1);
        assert_eq!(agg.n_total, 1);
        assert_eq!(agg.first_grant, agg.last_grant);
    }

    #[test]
    fn test_merge_tracks_counts_and_date_range() {
        let rows = sample_rows();
        let panel = aggregate_all(&rows);

        let f1_2021 = &panel[&("F1".to_string(), 2021)];
        assert_eq!(f1_2021.n_algorithm, 2);
        assert_eq!(f1_2021.n_infrastructure, 1);
        assert_eq!(f1_2021.n_total, 3);
        assert_eq!(f1_2021.first_grant, date("2021-02-10"));
        assert_eq!(f1_2021.last_grant, date("2021-08-01"));

        assert_eq!(panel[&("F2".to_string(), 2021)].n_total, 2);
        assert_eq!(panel.len(), 4);
    }

    #[test]
    fn test_partition_then_merge_equals_single_pass() {
        let rows = sample_rows();
        let whole = aggregate_all(&rows);

        // Every contiguous 2-way split of the input
        for split in 0..=rows.len() {
            let left = aggregate_all(&rows[..split]);
            let right = aggregate_all(&rows[split..]);
            assert_eq!(merge_partials(left, right), whole);
        }

        // An arbitrary interleaved 3-way partition
        let mut parts = vec![PartialPanel::new(), PartialPanel::new(), PartialPanel::new()];
        for (i, (firm, year, category, grant)) in rows.iter().enumerate() {
            accumulate(&mut parts[i % 3], firm, *year, *category, *grant);
        }
        let merged = parts.into_iter().fold(PartialPanel::new(), merge_partials);
        assert_eq!(merged, whole);
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let rows = sample_rows();
        let left = aggregate_all(&rows[..3]);
        let right = aggregate_all(&rows[3..]);
        assert_eq!(
            merge_partials(left.clone(), right.clone()),
            merge_partials(right, left)
        );
    }
}
