//! Coverage statistics and the suitability heuristics used to decide whether an
//! indicator is complete enough for the final dataset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Percentage bands. `inclusion` is the minimum bar for the final dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageThresholds {
    #[serde(default = "default_excellent")]
    pub excellent: f64,
    #[serde(default = "default_good")]
    pub good: f64,
    #[serde(default = "default_adequate")]
    pub adequate: f64,
    #[serde(default = "default_inclusion")]
    pub inclusion: f64,
}

fn default_excellent() -> f64 {
    90.0
}
fn default_good() -> f64 {
    75.0
}
fn default_adequate() -> f64 {
    50.0
}
fn default_inclusion() -> f64 {
    75.0
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        CoverageThresholds {
            excellent: default_excellent(),
            good: default_good(),
            adequate: default_adequate(),
            inclusion: default_inclusion(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suitability {
    Limited,
    Adequate,
    Good,
    Excellent,
}

impl Suitability {
    /// `excellent` and `good` bounds are inclusive; the `adequate` bound is exclusive, so a
    /// registry covered exactly half-way is still `Limited`.
    pub fn classify(coverage_percent: f64, thresholds: &CoverageThresholds) -> Self {
        if coverage_percent >= thresholds.excellent {
            Self::Excellent
        } else if coverage_percent >= thresholds.good {
            Self::Good
        } else if coverage_percent > thresholds.adequate {
            Self::Adequate
        } else {
            Self::Limited
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Adequate => "adequate",
            Self::Limited => "limited",
        }
    }
}

impl fmt::Display for Suitability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistics stored on the indicator metadata in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorStatistics {
    pub countries_analyzed: usize,
    pub countries_with_data: usize,
    pub coverage_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default)]
    pub countries_with_zero: usize,
    #[serde(default)]
    pub missing_countries: Vec<String>,
}

impl IndicatorStatistics {
    /// Compute over `(country, value)` pairs. `total` is the registry size; zero is data,
    /// only `None` is a hole.
    pub fn compute(values: &[(&str, Option<f64>)], total: usize) -> Self {
        let present: Vec<f64> = values.iter().filter_map(|(_, v)| *v).collect();
        let countries_with_data = present.len();
        let coverage_percent = coverage_percent(countries_with_data, total);
        let range_min = present.iter().copied().reduce(f64::min);
        let range_max = present.iter().copied().reduce(f64::max);
        let average = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };
        IndicatorStatistics {
            countries_analyzed: total,
            countries_with_data,
            coverage_percent,
            range_min,
            range_max,
            average,
            countries_with_zero: present.iter().filter(|v| **v == 0.0).count(),
            missing_countries: values
                .iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

/// `100 * with_data / total`; an empty registry has 0% coverage.
pub fn coverage_percent(with_data: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        with_data as f64 / total as f64 * 100.0
    }
}

/// Statistics plus the verdict for one indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub field: String,
    pub statistics: IndicatorStatistics,
    pub suitability: Suitability,
    pub meets_inclusion_bar: bool,
    pub complete: bool,
}

impl CoverageReport {
    pub fn new(
        field: impl Into<String>,
        values: &[(&str, Option<f64>)],
        total: usize,
        thresholds: &CoverageThresholds,
    ) -> Self {
        let statistics = IndicatorStatistics::compute(values, total);
        Self::from_statistics(field, statistics, thresholds)
    }

    pub fn from_statistics(
        field: impl Into<String>,
        statistics: IndicatorStatistics,
        thresholds: &CoverageThresholds,
    ) -> Self {
        let pct = statistics.coverage_percent;
        CoverageReport {
            field: field.into(),
            suitability: Suitability::classify(pct, thresholds),
            meets_inclusion_bar: pct >= thresholds.inclusion,
            complete: statistics.countries_analyzed > 0
                && statistics.countries_with_data == statistics.countries_analyzed,
            statistics,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        if self.complete {
            "suitable: complete coverage"
        } else if self.meets_inclusion_bar {
            "suitable for inclusion"
        } else {
            "not suitable for inclusion"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessGrade {
    HighQuality,
    Good,
    Incomplete,
}

impl CompletenessGrade {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 95.0 {
            Self::HighQuality
        } else if percent >= 90.0 {
            Self::Good
        } else {
            Self::Incomplete
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighQuality => "high quality dataset",
            Self::Good => "good dataset, minor gaps present",
            Self::Incomplete => "incomplete dataset, significant gaps present",
        }
    }
}

/// Filled cells over the whole country x indicator grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetCompleteness {
    pub total_cells: usize,
    pub filled_cells: usize,
    pub percent: f64,
    pub grade: CompletenessGrade,
}

impl DatasetCompleteness {
    pub fn from_counts(filled_cells: usize, total_cells: usize) -> Self {
        let percent = coverage_percent(filled_cells, total_cells);
        DatasetCompleteness {
            total_cells,
            filled_cells,
            percent,
            grade: CompletenessGrade::from_percent(percent),
        }
    }
}

/// Number of empty indicator fields for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryGaps {
    pub name: String,
    pub iso3: String,
    pub missing: usize,
    pub missing_fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_covered_registry_is_limited() {
        let report = CoverageReport::new(
            "f",
            &[("France", Some(3.42)), ("Egypt", None)],
            2,
            &CoverageThresholds::default(),
        );
        assert_eq!(report.statistics.coverage_percent, 50.0);
        assert_eq!(report.suitability, Suitability::Limited);
        assert!(!report.meets_inclusion_bar);
        assert_eq!(report.statistics.missing_countries, vec!["Egypt".to_string()]);
    }

    #[test]
    fn zero_counts_as_data_for_range_and_average() {
        let stats = IndicatorStatistics::compute(&[("A", Some(0.0)), ("B", Some(10.0)), ("C", None)], 3);
        assert_eq!(stats.countries_with_data, 2);
        assert_eq!(stats.countries_with_zero, 1);
        assert_eq!(stats.range_min, Some(0.0));
        assert_eq!(stats.range_max, Some(10.0));
        assert_eq!(stats.average, Some(5.0));
    }

    #[test]
    fn empty_inputs_never_divide_by_zero() {
        let stats = IndicatorStatistics::compute(&[], 0);
        assert_eq!(stats.coverage_percent, 0.0);
        assert_eq!(stats.average, None);
        let report = CoverageReport::from_statistics("f", stats, &CoverageThresholds::default());
        assert!(!report.complete);
    }

    #[test]
    fn classification_bands() {
        let t = CoverageThresholds::default();
        assert_eq!(Suitability::classify(100.0, &t), Suitability::Excellent);
        assert_eq!(Suitability::classify(90.0, &t), Suitability::Excellent);
        assert_eq!(Suitability::classify(89.5, &t), Suitability::Good);
        assert_eq!(Suitability::classify(75.0, &t), Suitability::Good);
        assert_eq!(Suitability::classify(71.1, &t), Suitability::Adequate);
        assert_eq!(Suitability::classify(50.0, &t), Suitability::Limited);
        assert_eq!(Suitability::classify(49.9, &t), Suitability::Limited);
    }

    #[test]
    fn completeness_grades() {
        assert_eq!(DatasetCompleteness::from_counts(760, 760).grade, CompletenessGrade::HighQuality);
        assert_eq!(DatasetCompleteness::from_counts(700, 760).grade, CompletenessGrade::Good);
        assert_eq!(DatasetCompleteness::from_counts(600, 760).grade, CompletenessGrade::Incomplete);
    }
}
