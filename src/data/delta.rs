//! Differences between two snapshots.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::data::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub country: String,
    pub iso3: String,
    pub field: String,
    pub before: Option<f64>,
    pub after: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDelta {
    pub from_version: String,
    pub to_version: String,
    pub added_countries: Vec<String>,
    pub removed_countries: Vec<String>,
    pub added_indicators: Vec<String>,
    pub removed_indicators: Vec<String>,
    /// Changed values on countries and fields present in both snapshots.
    pub changed_values: Vec<ValueChange>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.added_countries.is_empty()
            && self.removed_countries.is_empty()
            && self.added_indicators.is_empty()
            && self.removed_indicators.is_empty()
            && self.changed_values.is_empty()
    }
}

fn same(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b).is_eq(),
        (None, None) => true,
        _ => false,
    }
}

pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> SnapshotDelta {
    let old_codes: BTreeSet<&str> = old.countries.iter().map(|c| c.iso3.as_str()).collect();
    let new_codes: BTreeSet<&str> = new.countries.iter().map(|c| c.iso3.as_str()).collect();
    let old_fields: BTreeSet<&str> = old.indicators.iter().map(|i| i.data_field.as_str()).collect();
    let new_fields: BTreeSet<&str> = new.indicators.iter().map(|i| i.data_field.as_str()).collect();

    let mut changed_values = Vec::new();
    for after in &new.countries {
        let Some(before) = old.country(&after.iso3) else {
            continue;
        };
        for field in new_fields.intersection(&old_fields) {
            let (b, a) = (before.value(field), after.value(field));
            if !same(b, a) {
                changed_values.push(ValueChange {
                    country: after.name.clone(),
                    iso3: after.iso3.clone(),
                    field: field.to_string(),
                    before: b,
                    after: a,
                });
            }
        }
    }

    SnapshotDelta {
        from_version: old.version().to_string(),
        to_version: new.version().to_string(),
        added_countries: new
            .countries
            .iter()
            .filter(|c| !old_codes.contains(c.iso3.as_str()))
            .map(|c| c.name.clone())
            .collect(),
        removed_countries: old
            .countries
            .iter()
            .filter(|c| !new_codes.contains(c.iso3.as_str()))
            .map(|c| c.name.clone())
            .collect(),
        added_indicators: new_fields.difference(&old_fields).map(|f| f.to_string()).collect(),
        removed_indicators: old_fields.difference(&new_fields).map(|f| f.to_string()).collect(),
        changed_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::country::{Country, CountryRegistry};
    use crate::data::snapshot::{Direction, Indicator};
    use chrono::{TimeZone, Utc};

    #[test]
    fn reports_corrections_and_removals() {
        let at = Utc.with_ymd_and_hms(2025, 7, 19, 0, 0, 0).unwrap();
        let registry = CountryRegistry::new(vec![
            Country::new("France", "FRA"),
            Country::new("Egypt", "EGY"),
        ])
        .unwrap();
        let mut old = Snapshot::from_registry("t", &registry, at);
        old.indicators.push(Indicator {
            name: "Score".to_string(),
            description: String::new(),
            data_field: "score".to_string(),
            direction: Direction::HigherBetter,
            unit: String::new(),
            source: String::new(),
            zero_policy: Default::default(),
            statistics: None,
        });
        for c in &mut old.countries {
            c.fields.insert("score".to_string(), Some(1.0));
        }
        let corrected = old.with_correction("FRA", "score", Some(2.0), "fix", at).unwrap();
        let new = corrected.without_countries(&["EGY"], "gone", at).unwrap();

        let delta = diff_snapshots(&old, &new);
        assert_eq!(delta.removed_countries, vec!["Egypt".to_string()]);
        assert_eq!(delta.changed_values.len(), 1);
        assert_eq!(delta.changed_values[0].after, Some(2.0));
        assert!(diff_snapshots(&new, &new).is_empty());
    }
}
