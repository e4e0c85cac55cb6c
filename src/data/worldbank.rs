//! World Bank Open Data v2 client.
//!
//! One indicator series per (country, indicator) over a fixed year range; the most recent
//! non-null observation wins. Requests are sequential with a fixed delay between them and a
//! fixed timeout. A failed request is logged and becomes a missing value, never an abort.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::country::CountryRegistry;
use crate::data::source::{RawValue, SourceEntry, SourceFailure, SourceLoader, SourceTable, ZeroPolicy};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.worldbank.org/v2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldBankSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// `date=` query value, e.g. `2020:2024`.
    #[serde(default = "default_date_range")]
    pub date_range: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_delay_ms() -> u64 {
    500
}
fn default_date_range() -> String {
    "2020:2024".to_string()
}
fn default_per_page() -> u32 {
    10
}

impl Default for WorldBankSettings {
    fn default() -> Self {
        WorldBankSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            delay_ms: default_delay_ms(),
            date_range: default_date_range(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub year: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub page: u32,
    pub pages: u32,
    pub observations: Vec<Observation>,
}

fn number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn render_message(message: &Value) -> String {
    let parts: Vec<String> = message
        .as_array()
        .into_iter()
        .flatten()
        .map(|m| {
            let id = m.get("id").and_then(Value::as_str).unwrap_or("?");
            let text = m
                .get("value")
                .and_then(Value::as_str)
                .or_else(|| m.get("key").and_then(Value::as_str))
                .unwrap_or("unknown error");
            format!("{id}: {}", text.trim())
        })
        .collect();
    if parts.is_empty() {
        message.to_string()
    } else {
        parts.join("; ")
    }
}

/// Parse one response page: `[meta, rows]` or `[{"message": [...]}]` on API errors.
pub fn parse_page(raw: &str) -> Result<Page> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| Error::json("World Bank response", err))?;
    let items = value
        .as_array()
        .ok_or_else(|| Error::WorldBank("expected a JSON array".to_string()))?;
    let meta = items
        .first()
        .ok_or_else(|| Error::WorldBank("empty response".to_string()))?;
    if let Some(message) = meta.get("message") {
        return Err(Error::WorldBank(render_message(message)));
    }

    let observations = match items.get(1) {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| {
                let year = row.get("date").and_then(Value::as_str)?;
                Some(Observation {
                    year: year.to_string(),
                    value: row.get("value").and_then(Value::as_f64),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(Page {
        page: number(meta.get("page")).unwrap_or(1),
        pages: number(meta.get("pages")).unwrap_or(1),
        observations,
    })
}

fn year_key(year: &str) -> (i32, &str) {
    (year.trim().parse().unwrap_or(i32::MIN), year)
}

/// Most recent observation with a value.
pub fn latest_observation(observations: &[Observation]) -> Option<&Observation> {
    observations
        .iter()
        .filter(|o| o.value.is_some())
        .max_by(|a, b| year_key(&a.year).cmp(&year_key(&b.year)))
}

/// Blocking client; one request at a time.
pub struct WorldBankClient {
    http: reqwest::blocking::Client,
    settings: WorldBankSettings,
    last_request: Cell<Option<Instant>>,
}

impl WorldBankClient {
    pub fn new(settings: WorldBankSettings) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("outrank/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(WorldBankClient {
            http,
            settings,
            last_request: Cell::new(None),
        })
    }

    pub fn settings(&self) -> &WorldBankSettings {
        &self.settings
    }

    pub fn indicator_url(&self, iso3: &str, indicator: &str, page: u32) -> String {
        format!(
            "{}/country/{iso3}/indicator/{indicator}?format=json&date={}&per_page={}&page={page}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.date_range,
            self.settings.per_page,
        )
    }

    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let delay = Duration::from_millis(self.settings.delay_ms);
            let elapsed = last.elapsed();
            if elapsed < delay {
                thread::sleep(delay - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn get_page(&self, url: &str) -> Result<Page> {
        self.throttle();
        debug!("GET {url}");
        let body = self.http.get(url).send()?.error_for_status()?.text()?;
        parse_page(&body)
    }

    /// Walk every page of the series and return the latest non-null observation.
    pub fn fetch_latest(&self, iso3: &str, indicator: &str) -> Result<Option<Observation>> {
        let mut observations = Vec::new();
        let mut page = 1;
        loop {
            let parsed = self.get_page(&self.indicator_url(iso3, indicator, page))?;
            observations.extend(parsed.observations);
            if parsed.page >= parsed.pages {
                break;
            }
            page = parsed.page + 1;
        }
        Ok(latest_observation(&observations).cloned())
    }
}

/// One World Bank indicator fetched for every registry country, keyed by canonical name.
pub struct WorldBankSource {
    pub client: WorldBankClient,
    pub registry: CountryRegistry,
    pub indicator: String,
    pub zero_policy: ZeroPolicy,
}

impl SourceLoader for WorldBankSource {
    fn load(&self) -> Result<SourceTable> {
        let mut table = SourceTable::new(format!("World Bank {}", self.indicator));
        let total = self.registry.len();
        for (index, country) in self.registry.countries().iter().enumerate() {
            let entry = match self.client.fetch_latest(&country.iso3, &self.indicator) {
                Ok(Some(observation)) => {
                    info!(
                        "[{}/{total}] {} {}: {:?} ({})",
                        index + 1,
                        country.iso3,
                        self.indicator,
                        observation.value,
                        observation.year
                    );
                    SourceEntry::with_year(
                        RawValue::from_option(observation.value, self.zero_policy),
                        observation.year,
                    )
                }
                Ok(None) => {
                    info!("[{}/{total}] {} {}: no data", index + 1, country.iso3, self.indicator);
                    SourceEntry::new(RawValue::Missing)
                }
                Err(err) => {
                    warn!("{} {}: {err}", country.iso3, self.indicator);
                    table.failures.push(SourceFailure {
                        key: country.name.clone(),
                        message: err.to_string(),
                    });
                    SourceEntry::new(RawValue::Missing)
                }
            };
            table.insert(country.name.clone(), entry);
        }
        Ok(table)
    }
}
