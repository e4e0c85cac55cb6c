//! Left join of one indicator source onto the registry.
//!
//! Every registry country gets exactly one [`MergedValue`]; a `None` value only comes from
//! a source that does not cover the country or covers it with an explicit null.

use std::collections::BTreeSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::data::country::CountryRegistry;
use crate::data::normalize::{NameNormalizer, Resolution};
use crate::data::source::{RawValue, SourceTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedValue {
    pub name: String,
    pub iso3: String,
    pub value: Option<f64>,
    pub raw: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Source key the value came from, when it differs from the canonical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// No key for the country (or any variant) in the source.
    NotCovered,
    /// The source lists the country with no data.
    ExplicitNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCountry {
    pub name: String,
    pub iso3: String,
    pub reason: MissingReason,
}

/// Two keys for the same country disagree; `used_key` won.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConflict {
    pub country: String,
    pub used_key: String,
    pub used_value: RawValue,
    pub ignored_key: String,
    pub ignored_value: RawValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub field: String,
    pub source_label: String,
    pub values: Vec<MergedValue>,
    pub missing: Vec<MissingCountry>,
    /// Source keys that matched no registry country.
    pub unmatched_source_keys: Vec<String>,
    pub conflicts: Vec<VariantConflict>,
}

impl MergeOutcome {
    pub fn matched_count(&self) -> usize {
        self.values.iter().filter(|v| v.value.is_some()).count()
    }

    pub fn missing_names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.name.as_str()).collect()
    }

    /// Values in registry order, for coverage computation.
    pub fn value_slice(&self) -> Vec<(&str, Option<f64>)> {
        self.values
            .iter()
            .map(|v| (v.name.as_str(), v.value))
            .collect()
    }
}

/// Join `source` onto every registry country under `field`.
///
/// For each country the canonical name is tried first, then its variants in declared order;
/// the first key present in the source wins. When the normalizer has fuzzy matching enabled,
/// source keys left over after that pass may still claim a country nothing else matched.
/// Deterministic: no I/O, ordered output.
pub fn merge_indicator(
    registry: &CountryRegistry,
    source: &SourceTable,
    field: &str,
    normalizer: &NameNormalizer,
) -> MergeOutcome {
    let mut values = Vec::with_capacity(registry.len());
    let mut missing = Vec::new();
    let mut conflicts = Vec::new();
    let mut consumed: BTreeSet<&str> = BTreeSet::new();

    let mut hits: Vec<Vec<&str>> = registry
        .countries()
        .iter()
        .map(|country| {
            normalizer
                .candidates(&country.name)
                .filter(|key| source.get(key).is_some())
                .collect()
        })
        .collect();
    for present in &hits {
        consumed.extend(present.iter().copied());
    }

    if normalizer.fuzzy_enabled() {
        let scoped = normalizer.clone().with_canonical_names(registry.names());
        let leftover: Vec<&str> = source
            .entries
            .keys()
            .map(String::as_str)
            .filter(|key| !consumed.contains(key))
            .collect();
        let covered: Vec<bool> = hits.iter().map(|present| !present.is_empty()).collect();
        for key in leftover {
            let Resolution::Fuzzy { canonical, distance } = scoped.resolve(key) else {
                continue;
            };
            let Some(index) = registry.countries().iter().position(|c| c.name == canonical) else {
                continue;
            };
            // Fuzzy keys only fill gaps; a country with a direct or variant hit keeps it.
            if covered[index] {
                continue;
            }
            info!("{field}: '{key}' fuzzily matched to '{canonical}' (edit distance {distance})");
            hits[index].push(key);
            consumed.insert(key);
        }
    }

    for (country, present) in registry.countries().iter().zip(&hits) {
        let Some(&key) = present.first() else {
            debug!("{field}: {} not covered by {}", country.name, source.label);
            missing.push(MissingCountry {
                name: country.name.clone(),
                iso3: country.iso3.clone(),
                reason: MissingReason::NotCovered,
            });
            values.push(MergedValue {
                name: country.name.clone(),
                iso3: country.iso3.clone(),
                value: None,
                raw: RawValue::NotCovered,
                year: None,
                matched_key: None,
            });
            continue;
        };

        let raw = source.lookup(key);
        for other in &present[1..] {
            let other_raw = source.lookup(other);
            if other_raw != raw {
                warn!(
                    "{field}: '{}' has conflicting source keys '{key}' and '{other}', using '{key}'",
                    country.name
                );
                conflicts.push(VariantConflict {
                    country: country.name.clone(),
                    used_key: key.to_string(),
                    used_value: raw,
                    ignored_key: other.to_string(),
                    ignored_value: other_raw,
                });
            }
        }

        let value = raw.as_value();
        if value.is_none() {
            missing.push(MissingCountry {
                name: country.name.clone(),
                iso3: country.iso3.clone(),
                reason: MissingReason::ExplicitNull,
            });
        }
        values.push(MergedValue {
            name: country.name.clone(),
            iso3: country.iso3.clone(),
            value,
            raw,
            year: source.get(key).and_then(|entry| entry.year.clone()),
            matched_key: (key != country.name).then(|| key.to_string()),
        });
    }

    let unmatched_source_keys = source
        .entries
        .keys()
        .filter(|key| !consumed.contains(key.as_str()))
        .cloned()
        .collect();

    MergeOutcome {
        field: field.to_string(),
        source_label: source.label.clone(),
        values,
        missing,
        unmatched_source_keys,
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::country::Country;
    use crate::data::normalize::FuzzyFallback;
    use crate::data::source::{LiteralSource, SourceLoader};

    fn registry() -> CountryRegistry {
        CountryRegistry::new(vec![
            Country::new("France", "FRA"),
            Country::new("Egypt", "EGY"),
            Country::new("Czech Republic", "CZE"),
        ])
        .unwrap()
    }

    #[test]
    fn variant_keys_are_matched_and_recorded() {
        let source = LiteralSource::new("t", [("Czechia", Some(34.56)), ("France", Some(43.67))])
            .load()
            .unwrap();
        let outcome = merge_indicator(
            &registry(),
            &source,
            "pollution_index",
            &NameNormalizer::with_default_variants(),
        );
        let czech = &outcome.values[2];
        assert_eq!(czech.value, Some(34.56));
        assert_eq!(czech.matched_key.as_deref(), Some("Czechia"));
        assert_eq!(outcome.values[0].matched_key, None);
        assert_eq!(outcome.missing_names(), vec!["Egypt"]);
        assert!(outcome.unmatched_source_keys.is_empty());
    }

    #[test]
    fn explicit_null_and_absence_have_distinct_reasons() {
        let source = LiteralSource::new("t", [("Egypt", None), ("Atlantis", Some(1.0))])
            .load()
            .unwrap();
        let outcome = merge_indicator(&registry(), &source, "f", &NameNormalizer::default());
        let reasons: Vec<_> = outcome.missing.iter().map(|m| (m.name.as_str(), m.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("France", MissingReason::NotCovered),
                ("Egypt", MissingReason::ExplicitNull),
                ("Czech Republic", MissingReason::NotCovered),
            ]
        );
        assert_eq!(outcome.unmatched_source_keys, vec!["Atlantis".to_string()]);
    }

    #[test]
    fn canonical_key_wins_over_disagreeing_variant() {
        let source = LiteralSource::new(
            "t",
            [("Czech Republic", Some(1.0)), ("Czechia", Some(2.0))],
        )
        .load()
        .unwrap();
        let outcome = merge_indicator(
            &registry(),
            &source,
            "f",
            &NameNormalizer::with_default_variants(),
        );
        assert_eq!(outcome.values[2].value, Some(1.0));
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].ignored_key, "Czechia");
    }

    #[test]
    fn agreeing_variant_is_not_a_conflict() {
        let source = LiteralSource::new(
            "t",
            [("Czech Republic", Some(1.0)), ("Czechia", Some(1.0))],
        )
        .load()
        .unwrap();
        let outcome = merge_indicator(
            &registry(),
            &source,
            "f",
            &NameNormalizer::with_default_variants(),
        );
        assert!(outcome.conflicts.is_empty());
        assert!(outcome.unmatched_source_keys.is_empty());
    }

    fn fuzzy() -> NameNormalizer {
        NameNormalizer::with_default_variants().with_fuzzy(FuzzyFallback {
            enabled: true,
            max_distance: 2,
        })
    }

    #[test]
    fn fuzzy_keys_fill_otherwise_missing_countries() {
        let registry = CountryRegistry::new(vec![
            Country::new("Luxembourg", "LUX"),
            Country::new("France", "FRA"),
        ])
        .unwrap();
        let source = LiteralSource::new("t", [("Luxemburg", Some(5.0)), ("France", Some(1.0))])
            .load()
            .unwrap();

        let outcome = merge_indicator(&registry, &source, "f", &fuzzy());
        assert_eq!(outcome.values[0].value, Some(5.0));
        assert_eq!(outcome.values[0].matched_key.as_deref(), Some("Luxemburg"));
        assert!(outcome.missing.is_empty());
        assert!(outcome.unmatched_source_keys.is_empty());

        let strict = merge_indicator(&registry, &source, "f", &NameNormalizer::with_default_variants());
        assert_eq!(strict.missing_names(), vec!["Luxembourg"]);
        assert_eq!(strict.unmatched_source_keys, vec!["Luxemburg".to_string()]);
    }

    #[test]
    fn fuzzy_keys_never_displace_exact_hits() {
        let source = LiteralSource::new("t", [("France", Some(1.0)), ("Frnace", Some(9.0))])
            .load()
            .unwrap();
        let outcome = merge_indicator(&registry(), &source, "f", &fuzzy());
        assert_eq!(outcome.values[0].value, Some(1.0));
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.unmatched_source_keys, vec!["Frnace".to_string()]);
    }
}
