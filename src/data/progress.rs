//! Resume file for long API pulls. Unlike snapshots this file is overwritten in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::data::country::CountryRegistry;
use crate::data::source::{RawValue, SourceEntry, SourceFailure, SourceTable, ZeroPolicy};
use crate::data::worldbank::{Observation, WorldBankClient};
use crate::error::{Error, Result};

pub const DEFAULT_PROGRESS_PATH: &str = "data/wb_data_progress.json";

/// iso3 -> indicator code -> latest observation (`None` when the series had no data).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressCache {
    pub countries: BTreeMap<String, BTreeMap<String, Option<Observation>>>,
}

impl ProgressCache {
    /// Load the cache; a missing file starts empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| Error::json(path.display().to_string(), err)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(Error::read(path, err)),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::write(parent, err))?;
        }
        let body = serde_json::to_string_pretty(self)
            .map_err(|err| Error::json(path.display().to_string(), err))?;
        fs::write(path, body).map_err(|err| Error::write(path, err))
    }

    /// True when every code has been fetched for `iso3`.
    pub fn is_complete(&self, iso3: &str, codes: &[&str]) -> bool {
        self.countries
            .get(iso3)
            .map_or(false, |fetched| codes.iter().all(|code| fetched.contains_key(*code)))
    }

    pub fn has(&self, iso3: &str, code: &str) -> bool {
        self.countries
            .get(iso3)
            .map_or(false, |fetched| fetched.contains_key(code))
    }

    pub fn record(&mut self, iso3: &str, code: &str, observation: Option<Observation>) {
        self.countries
            .entry(iso3.to_string())
            .or_default()
            .insert(code.to_string(), observation);
    }

    pub fn filled_cells(&self) -> usize {
        self.countries
            .values()
            .flat_map(|fetched| fetched.values())
            .filter(|o| o.as_ref().and_then(|o| o.value).is_some())
            .count()
    }

    /// One indicator as a source table keyed by canonical country name.
    pub fn table_for(&self, code: &str, registry: &CountryRegistry, policy: ZeroPolicy) -> SourceTable {
        let mut table = SourceTable::new(format!("World Bank {code}"));
        for country in registry.countries() {
            let Some(fetched) = self.countries.get(&country.iso3) else {
                continue;
            };
            let Some(observation) = fetched.get(code) else {
                continue;
            };
            let entry = match observation {
                Some(o) => SourceEntry::with_year(RawValue::from_option(o.value, policy), o.year.clone()),
                None => SourceEntry::new(RawValue::Missing),
            };
            table.insert(country.name.clone(), entry);
        }
        table
    }
}

/// Fetch every code not already cached for every registry country, saving the cache every
/// `save_every` countries and once at the end. A failed request is left out of the cache so the
/// next run retries it, and is returned as a failure.
pub fn fetch_into_cache(
    client: &WorldBankClient,
    registry: &CountryRegistry,
    codes: &[&str],
    cache: &mut ProgressCache,
    cache_path: &Path,
    save_every: usize,
) -> Result<Vec<SourceFailure>> {
    let total = registry.len();
    let mut fetched_since_save = 0;
    let mut failures = Vec::new();
    for (index, country) in registry.countries().iter().enumerate() {
        if cache.is_complete(&country.iso3, codes) {
            info!("[{}/{total}] {} already cached", index + 1, country.name);
            continue;
        }
        info!("[{}/{total}] fetching {} ({})", index + 1, country.name, country.iso3);
        for code in codes {
            if cache.has(&country.iso3, code) {
                continue;
            }
            match client.fetch_latest(&country.iso3, code) {
                Ok(observation) => cache.record(&country.iso3, code, observation),
                Err(err) => {
                    warn!("{} {code}: {err}", country.iso3);
                    failures.push(SourceFailure {
                        key: format!("{} {code}", country.iso3),
                        message: err.to_string(),
                    });
                }
            }
        }
        fetched_since_save += 1;
        if save_every > 0 && fetched_since_save % save_every == 0 {
            cache.save(cache_path)?;
            info!("progress saved: {}/{total} countries", cache.countries.len());
        }
    }
    cache.save(cache_path)?;
    Ok(failures)
}
