//! Dataset snapshots: the versioned bundle of registry countries, indicator metadata,
//! per-country values, statistics and provenance.
//!
//! A loaded snapshot is never edited in place. Every transition (add an indicator, correct
//! a value, add or remove a country) returns a new [`Snapshot`] with the next version.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::country::{Country, CountryRegistry};
use crate::data::coverage::{
    coverage_percent, CountryGaps, CoverageReport, CoverageThresholds, DatasetCompleteness,
    IndicatorStatistics,
};
use crate::data::merge::MergeOutcome;
use crate::data::source::ZeroPolicy;
use crate::error::{Error, Result};

pub const INITIAL_VERSION: &str = "1.0";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys a country record already uses; indicator values share its JSON object.
pub const RESERVED_FIELDS: &[&str] = &["name", "iso3", "rank", "data_years"];

/// Reject empty data fields and ones that would collide with country record keys.
pub fn check_data_field(field: &str) -> Result<()> {
    if field.trim().is_empty() {
        return Err(Error::InvalidPlan("indicator data_field is empty".to_string()));
    }
    if RESERVED_FIELDS.contains(&field) {
        return Err(Error::InvalidPlan(format!(
            "data_field '{field}' is reserved for country records"
        )));
    }
    Ok(())
}

/// Sort direction of an indicator. Fixed for the lifetime of a `data_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherBetter,
    LowerBetter,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HigherBetter => "higher_better",
            Self::LowerBetter => "lower_better",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    /// Question shown to players, e.g. "Which country has the lowest pollution?".
    pub description: String,
    pub data_field: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub unit: String,
    pub source: String,
    #[serde(default)]
    pub zero_policy: ZeroPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<IndicatorStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Date or period the data refers to, e.g. "2025 Mid-Year".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub name: String,
    pub iso3: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Observation year per field, for time-series sources.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_years: BTreeMap<String, String>,
    /// Indicator values keyed by `data_field`; `null` is "no verified data".
    #[serde(flatten)]
    pub fields: BTreeMap<String, Option<f64>>,
}

impl CountryRecord {
    fn from_country(country: &Country) -> Self {
        CountryRecord {
            name: country.name.clone(),
            iso3: country.iso3.clone(),
            rank: country.rank,
            data_years: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied().flatten()
    }

    pub fn as_country(&self) -> Country {
        Country {
            name: self.name.clone(),
            iso3: self.iso3.clone(),
            rank: self.rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedCountry {
    pub name: String,
    pub iso3: String,
    pub reason: String,
    /// Version that first excluded the country.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub version: String,
    pub created: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    pub country_count: usize,
    pub indicator_count: usize,
    /// What changed in this version relative to `previous_version`.
    #[serde(default)]
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub dataset_info: DatasetInfo,
    pub countries: Vec<CountryRecord>,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    /// Provenance keyed by `data_field`.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Provenance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_countries: Vec<RemovedCountry>,
}

/// `major.minor` -> `major.(minor + 1)`. Anything else gains a `.1` suffix.
pub fn next_version(version: &str) -> String {
    match version.split_once('.') {
        Some((major, minor)) => match minor.parse::<u32>() {
            Ok(minor) => format!("{major}.{}", minor + 1),
            Err(_) => format!("{version}.1"),
        },
        None => format!("{version}.1"),
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

impl Snapshot {
    /// Empty snapshot (no indicators) over a registry.
    pub fn from_registry(name: impl Into<String>, registry: &CountryRegistry, at: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(at);
        let mut snapshot = Snapshot {
            dataset_info: DatasetInfo {
                name: name.into(),
                version: INITIAL_VERSION.to_string(),
                created: stamp.clone(),
                last_updated: stamp,
                previous_version: None,
                country_count: 0,
                indicator_count: 0,
                changes: vec![format!("Created with {} countries", registry.len())],
            },
            countries: registry
                .countries()
                .iter()
                .map(CountryRecord::from_country)
                .collect(),
            indicators: Vec::new(),
            data_sources: BTreeMap::new(),
            removed_countries: Vec::new(),
        };
        snapshot.refresh_counts();
        snapshot
    }

    pub fn version(&self) -> &str {
        &self.dataset_info.version
    }

    /// The registry the snapshot was built over, re-checked for uniqueness.
    pub fn registry(&self) -> Result<CountryRegistry> {
        CountryRegistry::new(self.countries.iter().map(CountryRecord::as_country).collect())
    }

    pub fn indicator(&self, field: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.data_field == field)
    }

    pub fn country(&self, iso3: &str) -> Option<&CountryRecord> {
        self.countries
            .iter()
            .find(|c| c.iso3.eq_ignore_ascii_case(iso3))
    }

    /// `(country name, value)` pairs for one field in registry order.
    pub fn values_for(&self, field: &str) -> Vec<(&str, Option<f64>)> {
        self.countries
            .iter()
            .map(|c| (c.name.as_str(), c.value(field)))
            .collect()
    }

    /// Add an indicator from a merge, or replace the values of an existing one.
    ///
    /// Redefining an existing `data_field` with a different direction is refused.
    pub fn with_indicator(
        &self,
        indicator: Indicator,
        outcome: &MergeOutcome,
        provenance: Option<Provenance>,
        at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let mut next = self.clone();
        let changes = next.apply_indicator(indicator, outcome, provenance)?;
        Ok(next.bump(changes, at))
    }

    /// Several indicators in one version step.
    pub fn with_indicators(
        &self,
        additions: Vec<(Indicator, MergeOutcome, Option<Provenance>)>,
        at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let mut next = self.clone();
        let mut changes = Vec::new();
        for (indicator, outcome, provenance) in additions {
            changes.extend(next.apply_indicator(indicator, &outcome, provenance)?);
        }
        let before = self.indicators.len();
        changes.push(format!("{before} -> {} total indicators", next.indicators.len()));
        Ok(next.bump(changes, at))
    }

    fn apply_indicator(
        &mut self,
        mut indicator: Indicator,
        outcome: &MergeOutcome,
        provenance: Option<Provenance>,
    ) -> Result<Vec<String>> {
        let field = indicator.data_field.clone();
        check_data_field(&field)?;
        if outcome.field != field {
            return Err(Error::InvalidPlan(format!(
                "merge produced field '{}' but the indicator is '{field}'",
                outcome.field
            )));
        }
        let existing = self.indicator(&field).map(|i| i.direction);
        if let Some(existing) = existing {
            if existing != indicator.direction {
                return Err(Error::IndicatorConflict {
                    field,
                    existing: existing.to_string(),
                    requested: indicator.direction.to_string(),
                });
            }
        }

        let by_iso3: HashMap<&str, _> = outcome
            .values
            .iter()
            .map(|v| (v.iso3.as_str(), v))
            .collect();
        for record in &mut self.countries {
            let merged = by_iso3.get(record.iso3.as_str());
            record
                .fields
                .insert(field.clone(), merged.and_then(|m| m.value));
            match merged.and_then(|m| m.year.clone()) {
                Some(year) => {
                    record.data_years.insert(field.clone(), year);
                }
                None => {
                    record.data_years.remove(&field);
                }
            }
        }

        indicator.statistics = None;
        let covered = self
            .countries
            .iter()
            .filter(|c| c.value(&field).is_some())
            .count();
        let total = self.countries.len();
        let change = if existing.is_some() {
            format!("Updated {} values ({})", indicator.name, indicator.source)
        } else {
            format!("Added {} indicator ({})", indicator.name, indicator.source)
        };
        match self.indicators.iter_mut().find(|i| i.data_field == field) {
            Some(slot) => *slot = indicator,
            None => self.indicators.push(indicator),
        }
        if let Some(mut provenance) = provenance {
            provenance.coverage = Some(format!("{:.0}%", coverage_percent(covered, total)));
            self.data_sources.insert(field, provenance);
        }

        Ok(vec![change, format!("{covered}/{total} countries with data")])
    }

    /// Replace one country's value for one field, noting why in the change log.
    pub fn with_correction(
        &self,
        iso3: &str,
        field: &str,
        value: Option<f64>,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        if self.indicator(field).is_none() {
            return Err(Error::UnknownIndicator(field.to_string()));
        }
        let mut next = self.clone();
        let record = next
            .countries
            .iter_mut()
            .find(|c| c.iso3.eq_ignore_ascii_case(iso3))
            .ok_or_else(|| Error::UnknownCountry(iso3.to_string()))?;
        let before = record.value(field);
        record.fields.insert(field.to_string(), value);
        let change = format!(
            "Corrected {field} for {}: {} -> {} ({note})",
            record.name,
            display_value(before),
            display_value(value)
        );
        Ok(next.bump(vec![change], at))
    }

    /// Append a country with every indicator null.
    pub fn with_country(&self, country: Country, at: DateTime<Utc>) -> Result<Snapshot> {
        self.registry()?.with_country(country.clone())?;
        let mut next = self.clone();
        let mut record = CountryRecord::from_country(&country);
        for indicator in &self.indicators {
            record.fields.insert(indicator.data_field.clone(), None);
        }
        next.countries.push(record);
        next.removed_countries.retain(|r| r.iso3 != country.iso3);
        let change = format!("Added country {} ({})", country.name, country.iso3);
        Ok(next.bump(vec![change], at))
    }

    /// Drop countries by iso3, recording `reason`. Statistics are recomputed over the
    /// smaller registry.
    pub fn without_countries(&self, iso3s: &[&str], reason: &str, at: DateTime<Utc>) -> Result<Snapshot> {
        let (kept, removed) = self.registry()?.without_iso3(iso3s)?;
        let mut next = self.clone();
        next.countries
            .retain(|c| kept.by_iso3(&c.iso3).is_some());
        let version = next_version(self.version());
        let mut changes = Vec::new();
        for country in removed {
            changes.push(format!("Removed {} ({}): {reason}", country.name, country.iso3));
            next.removed_countries.push(RemovedCountry {
                name: country.name,
                iso3: country.iso3,
                reason: reason.to_string(),
                version: version.clone(),
            });
        }
        changes.push(format!(
            "{} -> {} countries",
            self.countries.len(),
            next.countries.len()
        ));
        Ok(next.bump(changes, at))
    }

    /// Recompute statistics for every indicator from the current values.
    pub fn refresh_statistics(&mut self) {
        let total = self.countries.len();
        let computed: Vec<IndicatorStatistics> = self
            .indicators
            .iter()
            .map(|i| IndicatorStatistics::compute(&self.values_for(&i.data_field), total))
            .collect();
        for (indicator, statistics) in self.indicators.iter_mut().zip(computed) {
            indicator.statistics = Some(statistics);
        }
    }

    fn refresh_counts(&mut self) {
        self.dataset_info.country_count = self.countries.len();
        self.dataset_info.indicator_count = self.indicators.len();
    }

    fn bump(mut self, changes: Vec<String>, at: DateTime<Utc>) -> Snapshot {
        let previous = std::mem::take(&mut self.dataset_info.version);
        self.dataset_info.version = next_version(&previous);
        self.dataset_info.previous_version = Some(previous);
        self.dataset_info.last_updated = format_timestamp(at);
        self.dataset_info.changes = changes;
        self.refresh_counts();
        self.refresh_statistics();
        self
    }

    /// Coverage verdict per indicator, computed from current values.
    pub fn coverage_reports(&self, thresholds: &CoverageThresholds) -> Vec<CoverageReport> {
        let total = self.countries.len();
        self.indicators
            .iter()
            .map(|i| CoverageReport::new(&i.data_field, &self.values_for(&i.data_field), total, thresholds))
            .collect()
    }

    /// Filled cells across the country x indicator grid.
    pub fn completeness(&self) -> DatasetCompleteness {
        let total = self.countries.len() * self.indicators.len();
        let filled = self
            .countries
            .iter()
            .map(|c| {
                self.indicators
                    .iter()
                    .filter(|i| c.value(&i.data_field).is_some())
                    .count()
            })
            .sum();
        DatasetCompleteness::from_counts(filled, total)
    }

    /// Missing indicator count per country, fewest gaps first.
    pub fn country_gaps(&self) -> Vec<CountryGaps> {
        let mut gaps: Vec<CountryGaps> = self
            .countries
            .iter()
            .map(|c| {
                let missing_fields: Vec<String> = self
                    .indicators
                    .iter()
                    .filter(|i| c.value(&i.data_field).is_none())
                    .map(|i| i.data_field.clone())
                    .collect();
                CountryGaps {
                    name: c.name.clone(),
                    iso3: c.iso3.clone(),
                    missing: missing_fields.len(),
                    missing_fields,
                }
            })
            .collect();
        gaps.sort_by(|a, b| a.missing.cmp(&b.missing).then_with(|| a.name.cmp(&b.name)));
        gaps
    }
}

fn display_value(value: Option<f64>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

pub fn parse_snapshot(raw: &str, context: &str) -> Result<Snapshot> {
    serde_json::from_str(raw).map_err(|err| Error::json(context, err))
}

/// Read a snapshot file. A missing input snapshot is fatal.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
    parse_snapshot(&raw, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::merge::merge_indicator;
    use crate::data::normalize::NameNormalizer;
    use crate::data::source::{LiteralSource, SourceLoader};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 19, 18, minute, 0).unwrap()
    }

    fn registry() -> CountryRegistry {
        CountryRegistry::new(vec![
            Country::new("France", "FRA"),
            Country::new("Egypt", "EGY"),
            Country::new("Luxembourg", "LUX"),
        ])
        .unwrap()
    }

    fn pollution(direction: Direction) -> Indicator {
        Indicator {
            name: "Pollution Index".to_string(),
            description: "Which country has the lowest pollution?".to_string(),
            data_field: "pollution_index".to_string(),
            direction,
            unit: "Index score (0-100)".to_string(),
            source: "Numbeo".to_string(),
            zero_policy: ZeroPolicy::Data,
            statistics: None,
        }
    }

    fn with_pollution() -> Snapshot {
        let base = Snapshot::from_registry("test", &registry(), at(0));
        let source = LiteralSource::new("numbeo", [("France", Some(43.67)), ("Luxembourg", Some(0.0))])
            .load()
            .unwrap();
        let outcome = merge_indicator(&registry(), &source, "pollution_index", &NameNormalizer::default());
        base.with_indicator(pollution(Direction::LowerBetter), &outcome, None, at(1))
            .unwrap()
    }

    #[test]
    fn reserved_field_names_are_rejected() {
        let base = Snapshot::from_registry("test", &registry(), at(0));
        let source = LiteralSource::new("numbeo", [("France", Some(3.0))]).load().unwrap();
        let outcome = merge_indicator(&registry(), &source, "rank", &NameNormalizer::default());
        let indicator = Indicator {
            data_field: "rank".to_string(),
            ..pollution(Direction::HigherBetter)
        };
        assert!(matches!(
            base.with_indicator(indicator, &outcome, None, at(1)),
            Err(Error::InvalidPlan(_))
        ));
        assert!(check_data_field("pollution_index").is_ok());
        assert!(check_data_field(" ").is_err());
    }

    #[test]
    fn version_bumps_minor() {
        assert_eq!(next_version("2.2"), "2.3");
        assert_eq!(next_version("2.9"), "2.10");
        assert_eq!(next_version("3"), "3.1");
    }

    #[test]
    fn adding_indicator_leaves_source_snapshot_untouched() {
        let base = Snapshot::from_registry("test", &registry(), at(0));
        let next = with_pollution();
        assert!(base.indicators.is_empty());
        assert_eq!(next.version(), "1.1");
        assert_eq!(next.dataset_info.previous_version.as_deref(), Some("1.0"));
        assert_eq!(next.dataset_info.indicator_count, 1);
        let stats = next.indicators[0].statistics.as_ref().unwrap();
        assert_eq!(stats.countries_with_data, 2);
        assert_eq!(stats.countries_with_zero, 1);
        assert_eq!(stats.missing_countries, vec!["Egypt".to_string()]);
    }

    #[test]
    fn redefining_direction_is_a_conflict() {
        let snapshot = with_pollution();
        let source = LiteralSource::new("n", [("France", Some(1.0))]).load().unwrap();
        let outcome = merge_indicator(&registry(), &source, "pollution_index", &NameNormalizer::default());
        let err = snapshot
            .with_indicator(pollution(Direction::HigherBetter), &outcome, None, at(2))
            .unwrap_err();
        assert!(matches!(err, Error::IndicatorConflict { .. }));
    }

    #[test]
    fn correction_replaces_one_value() {
        let snapshot = with_pollution();
        let corrected = snapshot
            .with_correction("EGY", "pollution_index", Some(82.73), "late source", at(3))
            .unwrap();
        assert_eq!(corrected.country("EGY").unwrap().value("pollution_index"), Some(82.73));
        assert_eq!(snapshot.country("EGY").unwrap().value("pollution_index"), None);
        assert!(corrected.dataset_info.changes[0].contains("late source"));
        assert!(matches!(
            snapshot.with_correction("EGY", "nope", None, "", at(3)),
            Err(Error::UnknownIndicator(_))
        ));
    }

    #[test]
    fn removal_recomputes_statistics_and_records_reason() {
        let snapshot = with_pollution();
        let smaller = snapshot
            .without_countries(&["LUX", "EGY"], "insufficient data", at(4))
            .unwrap();
        assert_eq!(smaller.dataset_info.country_count, 1);
        let stats = smaller.indicators[0].statistics.as_ref().unwrap();
        assert_eq!(stats.countries_analyzed, 1);
        assert_eq!(stats.coverage_percent, 100.0);
        assert_eq!(smaller.removed_countries.len(), 2);
        assert_eq!(smaller.removed_countries[0].reason, "insufficient data");
        assert_eq!(smaller.removed_countries[0].version, smaller.dataset_info.version);
    }

    #[test]
    fn added_country_has_null_indicators() {
        let snapshot = with_pollution();
        let bigger = snapshot.with_country(Country::new("Japan", "JPN"), at(5)).unwrap();
        let japan = bigger.country("JPN").unwrap();
        assert_eq!(japan.fields.get("pollution_index"), Some(&None));
        assert!(snapshot.with_country(Country::new("France", "FRX"), at(5)).is_err());
    }

    #[test]
    fn json_round_trip_preserves_values() {
        let snapshot = with_pollution();
        let raw = serde_json::to_string_pretty(&snapshot).unwrap();
        assert!(raw.contains("\"type\": \"lower_better\""));
        let back = parse_snapshot(&raw, "inline").unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn gaps_are_sorted_fewest_first() {
        let gaps = with_pollution().country_gaps();
        assert_eq!(gaps[0].missing, 0);
        assert_eq!(gaps.last().unwrap().name, "Egypt");
        assert_eq!(with_pollution().completeness().filled_cells, 2);
    }
}
