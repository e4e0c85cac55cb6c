//! Country registry: the fixed list of target countries every indicator is joined against.
//! Loaded from `{ "selected_countries": [...] }` files or a bare JSON array.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_PATH: &str = "data/countries.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub iso3: String,
    /// Ordinal assigned when the country was selected; not stable across snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

impl Country {
    pub fn new(name: impl Into<String>, iso3: impl Into<String>) -> Self {
        Country {
            name: name.into(),
            iso3: iso3.into(),
            rank: None,
        }
    }
}

/// Ordered, immutable list of countries with unique names and iso3 codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRegistry {
    countries: Vec<Country>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    Selected { selected_countries: Vec<Country> },
    Countries { countries: Vec<Country> },
    List(Vec<Country>),
}

impl CountryRegistry {
    /// Build a registry, rejecting duplicate names or iso3 codes.
    pub fn new(countries: Vec<Country>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut codes = HashSet::new();
        for country in &countries {
            if !names.insert(country.name.as_str()) {
                return Err(Error::DuplicateCountry {
                    field: "name",
                    value: country.name.clone(),
                });
            }
            if !codes.insert(country.iso3.to_ascii_uppercase()) {
                return Err(Error::DuplicateCountry {
                    field: "iso3",
                    value: country.iso3.clone(),
                });
            }
        }
        Ok(CountryRegistry { countries })
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.countries.iter().map(|c| c.name.as_str())
    }

    pub fn by_name(&self, name: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.name == name)
    }

    pub fn by_iso3(&self, iso3: &str) -> Option<&Country> {
        self.countries
            .iter()
            .find(|c| c.iso3.eq_ignore_ascii_case(iso3))
    }

    /// New registry with `country` appended.
    pub fn with_country(&self, country: Country) -> Result<Self> {
        let mut countries = self.countries.clone();
        countries.push(country);
        Self::new(countries)
    }

    /// New registry without the given iso3 codes, plus the countries that were dropped.
    /// Unknown codes are an error so a typo never silently keeps a country.
    pub fn without_iso3(&self, iso3s: &[&str]) -> Result<(Self, Vec<Country>)> {
        for code in iso3s {
            if self.by_iso3(code).is_none() {
                return Err(Error::UnknownCountry((*code).to_string()));
            }
        }
        let (removed, kept): (Vec<Country>, Vec<Country>) = self
            .countries
            .iter()
            .cloned()
            .partition(|c| iso3s.iter().any(|code| c.iso3.eq_ignore_ascii_case(code)));
        Ok((CountryRegistry { countries: kept }, removed))
    }
}

pub fn parse_registry(raw: &str, context: &str) -> Result<CountryRegistry> {
    let file: RegistryFile = serde_json::from_str(raw).map_err(|err| Error::json(context, err))?;
    let countries = match file {
        RegistryFile::Selected { selected_countries } => selected_countries,
        RegistryFile::Countries { countries } => countries,
        RegistryFile::List(countries) => countries,
    };
    CountryRegistry::new(countries)
}

/// Load a registry file. A missing file is fatal: there is no fallback registry.
pub fn load_registry(path: impl AsRef<Path>) -> Result<CountryRegistry> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
    parse_registry(&raw, &path.display().to_string())
}
