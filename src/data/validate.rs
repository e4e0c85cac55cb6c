use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::data::coverage::{CoverageThresholds, IndicatorStatistics};
use crate::data::snapshot::{parse_snapshot, Snapshot};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }
}

fn iso3_is_well_formed(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|ch| ch.is_ascii_uppercase())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn close_opt(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => close(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn statistics_match(stored: &IndicatorStatistics, fresh: &IndicatorStatistics) -> bool {
    stored.countries_analyzed == fresh.countries_analyzed
        && stored.countries_with_data == fresh.countries_with_data
        && stored.countries_with_zero == fresh.countries_with_zero
        && stored.missing_countries == fresh.missing_countries
        && close(stored.coverage_percent, fresh.coverage_percent)
        && close_opt(stored.range_min, fresh.range_min)
        && close_opt(stored.range_max, fresh.range_max)
        && close_opt(stored.average, fresh.average)
}

/// Structural checks over a parsed snapshot.
pub fn validate_snapshot(snapshot: &Snapshot, thresholds: &CoverageThresholds) -> ValidationReport {
    let mut report = ValidationReport::default();
    let info = &snapshot.dataset_info;

    if info.country_count != snapshot.countries.len() {
        report.push(
            ValidationSeverity::Error,
            "dataset_info.country_count",
            format!(
                "says {} but the snapshot lists {} countries",
                info.country_count,
                snapshot.countries.len()
            ),
        );
    }
    if info.indicator_count != snapshot.indicators.len() {
        report.push(
            ValidationSeverity::Error,
            "dataset_info.indicator_count",
            format!(
                "says {} but the snapshot defines {} indicators",
                info.indicator_count,
                snapshot.indicators.len()
            ),
        );
    }

    let mut names = HashSet::new();
    let mut codes = HashSet::new();
    for (index, country) in snapshot.countries.iter().enumerate() {
        let context = format!("countries[{index}]");
        if !names.insert(country.name.as_str()) {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.name"),
                format!("duplicate name '{}'", country.name),
            );
        }
        if !codes.insert(country.iso3.as_str()) {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.iso3"),
                format!("duplicate iso3 '{}'", country.iso3),
            );
        }
        if !iso3_is_well_formed(&country.iso3) {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.iso3"),
                format!("'{}' is not three uppercase letters", country.iso3),
            );
        }
        for indicator in &snapshot.indicators {
            if !country.fields.contains_key(&indicator.data_field) {
                report.push(
                    ValidationSeverity::Error,
                    format!("{context}.{}", indicator.data_field),
                    format!("{} has no '{}' field (use null for missing data)", country.name, indicator.data_field),
                );
            }
        }
        for field in country.fields.keys() {
            if snapshot.indicator(field).is_none() {
                report.push(
                    ValidationSeverity::Warning,
                    format!("{context}.{field}"),
                    "field has no indicator definition",
                );
            }
        }
    }

    let mut fields = HashSet::new();
    let total = snapshot.countries.len();
    for (index, indicator) in snapshot.indicators.iter().enumerate() {
        let context = format!("indicators[{index}]");
        if !fields.insert(indicator.data_field.as_str()) {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.data_field"),
                format!("duplicate data_field '{}'", indicator.data_field),
            );
        }
        if indicator.description.trim().is_empty() {
            report.push(
                ValidationSeverity::Info,
                format!("{context}.description"),
                "empty description",
            );
        }
        if !snapshot.data_sources.contains_key(&indicator.data_field) {
            report.push(
                ValidationSeverity::Info,
                format!("{context}.source"),
                format!("no provenance entry for '{}'", indicator.data_field),
            );
        }

        let fresh = IndicatorStatistics::compute(&snapshot.values_for(&indicator.data_field), total);
        match &indicator.statistics {
            Some(stored) if !statistics_match(stored, &fresh) => report.push(
                ValidationSeverity::Error,
                format!("{context}.statistics"),
                "stored statistics do not match the values",
            ),
            Some(_) => {}
            None => report.push(
                ValidationSeverity::Warning,
                format!("{context}.statistics"),
                "missing statistics",
            ),
        }
        if fresh.coverage_percent < thresholds.inclusion {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.coverage"),
                format!(
                    "'{}' covers {:.1}% of countries, below the {:.0}% inclusion bar",
                    indicator.data_field, fresh.coverage_percent, thresholds.inclusion
                ),
            );
        }
    }

    report
}

/// Validate a snapshot file. Unreadable files are an `Err`; unparseable JSON is reported
/// as an error diagnostic.
pub fn validate_snapshot_file(
    path: impl AsRef<Path>,
    thresholds: &CoverageThresholds,
) -> Result<ValidationReport> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
    match parse_snapshot(&raw, &path.display().to_string()) {
        Ok(snapshot) => Ok(validate_snapshot(&snapshot, thresholds)),
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push(ValidationSeverity::Error, path.display().to_string(), err.to_string());
            Ok(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::country::{Country, CountryRegistry};
    use crate::data::merge::merge_indicator;
    use crate::data::normalize::NameNormalizer;
    use crate::data::snapshot::{Direction, Indicator, Provenance};
    use crate::data::source::{LiteralSource, SourceLoader, ZeroPolicy};
    use chrono::{TimeZone, Utc};

    fn snapshot() -> Snapshot {
        let at = Utc.with_ymd_and_hms(2025, 7, 19, 0, 0, 0).unwrap();
        let registry = CountryRegistry::new(vec![
            Country::new("France", "FRA"),
            Country::new("Egypt", "EGY"),
        ])
        .unwrap();
        let source = LiteralSource::new("s", [("France", Some(1.0)), ("Egypt", Some(0.0))])
            .load()
            .unwrap();
        let outcome = merge_indicator(&registry, &source, "score", &NameNormalizer::default());
        let indicator = Indicator {
            name: "Score".to_string(),
            description: "Which country scores highest?".to_string(),
            data_field: "score".to_string(),
            direction: Direction::HigherBetter,
            unit: "points".to_string(),
            source: "test".to_string(),
            zero_policy: ZeroPolicy::Data,
            statistics: None,
        };
        let provenance = Provenance {
            source: "test".to_string(),
            ..Default::default()
        };
        Snapshot::from_registry("t", &registry, at)
            .with_indicator(indicator, &outcome, Some(provenance), at)
            .unwrap()
    }

    #[test]
    fn fresh_snapshot_is_clean() {
        let report = validate_snapshot(&snapshot(), &CoverageThresholds::default());
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn tampered_values_make_statistics_stale() {
        let mut snapshot = snapshot();
        snapshot.countries[1].fields.insert("score".to_string(), None);
        let report = validate_snapshot(&snapshot, &CoverageThresholds::default());
        assert!(report.has_errors());
        assert_eq!(report.count(ValidationSeverity::Warning), 1);
    }

    #[test]
    fn missing_field_and_bad_iso3_are_reported() {
        let mut snapshot = snapshot();
        snapshot.countries[0].fields.clear();
        snapshot.countries[0].iso3 = "fr".to_string();
        let report = validate_snapshot(&snapshot, &CoverageThresholds::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.context == "countries[0].score" && d.severity == ValidationSeverity::Error));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.context == "countries[0].iso3" && d.severity == ValidationSeverity::Warning));
    }
}
