use serde::Serialize;

use crate::data::snapshot::{Direction, Snapshot};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCountry {
    pub position: usize,
    pub name: String,
    pub iso3: String,
    pub value: f64,
}

/// Countries with data for `field`, best first according to the indicator's direction.
/// Nulls are left out; equal values are ordered by name.
pub fn rank_countries(snapshot: &Snapshot, field: &str) -> Result<Vec<RankedCountry>> {
    let indicator = snapshot
        .indicator(field)
        .ok_or_else(|| Error::UnknownIndicator(field.to_string()))?;

    let mut ranked: Vec<RankedCountry> = snapshot
        .countries
        .iter()
        .filter_map(|country| {
            country.value(field).map(|value| RankedCountry {
                position: 0,
                name: country.name.clone(),
                iso3: country.iso3.clone(),
                value,
            })
        })
        .collect();

    ranked.sort_by(|left, right| {
        let by_value = match indicator.direction {
            Direction::HigherBetter => right.value.total_cmp(&left.value),
            Direction::LowerBetter => left.value.total_cmp(&right.value),
        };
        by_value.then_with(|| left.name.cmp(&right.name))
    });
    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.position = index + 1;
    }

    Ok(ranked)
}
