//! Indicator sources: hand-transcribed tables, JSON dumps, CSV exports and spreadsheets,
//! all reduced to one mapping of raw country name -> [`SourceEntry`].
//!
//! Every loader emits [`RawValue`] explicitly instead of overloading `null`, `0` or
//! sentinel strings. Absence from the mapping means the source does not cover the country.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::Reader;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Cell contents treated as "explicitly no data" when they appear in a source.
pub const MISSING_MARKERS: &[&str] = &["", "M", "Missing", "N/A", "NA", "n/a", "..", "-", "--"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Present(f64),
    ExplicitZero,
    Missing,
    NotCovered,
}

impl RawValue {
    /// Interpret a number under the indicator's zero policy. NaN and infinities are missing.
    pub fn from_number(value: f64, policy: ZeroPolicy) -> Self {
        if !value.is_finite() {
            RawValue::Missing
        } else if value == 0.0 {
            match policy {
                ZeroPolicy::Data => RawValue::ExplicitZero,
                ZeroPolicy::NotApplicable => RawValue::Missing,
            }
        } else {
            RawValue::Present(value)
        }
    }

    pub fn from_option(value: Option<f64>, policy: ZeroPolicy) -> Self {
        value.map_or(RawValue::Missing, |v| Self::from_number(v, policy))
    }

    /// The value as data; `None` for both kinds of absence.
    pub fn as_value(&self) -> Option<f64> {
        match self {
            RawValue::Present(v) => Some(*v),
            RawValue::ExplicitZero => Some(0.0),
            RawValue::Missing | RawValue::NotCovered => None,
        }
    }
}

/// Whether a source's zero means "verified zero" or "not applicable".
/// Declared per indicator; never inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroPolicy {
    #[default]
    Data,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub value: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl SourceEntry {
    pub fn new(value: RawValue) -> Self {
        SourceEntry { value, year: None }
    }

    pub fn with_year(value: RawValue, year: impl Into<String>) -> Self {
        SourceEntry {
            value,
            year: Some(year.into()),
        }
    }
}

/// A key the loader could not fetch or parse; its entry is recorded as missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub label: String,
    pub entries: BTreeMap<String, SourceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailure>,
}

impl SourceTable {
    pub fn new(label: impl Into<String>) -> Self {
        SourceTable {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: SourceEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// `NotCovered` when the key is absent.
    pub fn lookup(&self, key: &str) -> RawValue {
        self.entries
            .get(key)
            .map_or(RawValue::NotCovered, |entry| entry.value)
    }

    pub fn get(&self, key: &str) -> Option<&SourceEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Anything that can produce a [`SourceTable`].
pub trait SourceLoader {
    fn load(&self) -> Result<SourceTable>;
}

// ----- literal tables -----

/// A table transcribed by hand into code or a plan file.
#[derive(Debug, Clone)]
pub struct LiteralSource {
    pub label: String,
    pub rows: Vec<(String, Option<f64>)>,
    pub year: Option<String>,
    pub zero_policy: ZeroPolicy,
}

impl LiteralSource {
    pub fn new<'a>(
        label: impl Into<String>,
        rows: impl IntoIterator<Item = (&'a str, Option<f64>)>,
    ) -> Self {
        LiteralSource {
            label: label.into(),
            rows: rows
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            year: None,
            zero_policy: ZeroPolicy::Data,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_zero_policy(mut self, policy: ZeroPolicy) -> Self {
        self.zero_policy = policy;
        self
    }
}

impl SourceLoader for LiteralSource {
    fn load(&self) -> Result<SourceTable> {
        let mut table = SourceTable::new(self.label.clone());
        for (name, value) in &self.rows {
            table.insert(
                name.trim(),
                SourceEntry {
                    value: RawValue::from_option(*value, self.zero_policy),
                    year: self.year.clone(),
                },
            );
        }
        Ok(table)
    }
}

// ----- shared cell parsing -----

fn is_missing_marker(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_MARKERS.contains(&trimmed)
        || trimmed.starts_with("M (")
        || trimmed.eq_ignore_ascii_case("missing")
}

/// Parse a text cell: thousands separators are stripped, missing markers become `Missing`.
/// Unparseable text is an error for the caller to record.
pub fn parse_cell(cell: &str, policy: ZeroPolicy) -> std::result::Result<RawValue, String> {
    if is_missing_marker(cell) {
        return Ok(RawValue::Missing);
    }
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<f64>()
        .map(|v| RawValue::from_number(v, policy))
        .map_err(|_| format!("not a number: '{}'", cell.trim()))
}

fn json_to_raw(value: &Value, policy: ZeroPolicy) -> std::result::Result<RawValue, String> {
    match value {
        Value::Null => Ok(RawValue::Missing),
        Value::Number(n) => n
            .as_f64()
            .map(|v| RawValue::from_number(v, policy))
            .ok_or_else(|| format!("number out of range: {n}")),
        Value::String(s) => parse_cell(s, policy),
        other => Err(format!("unsupported value: {other}")),
    }
}

fn json_year(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ----- JSON files -----

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonShape {
    Wrapped { countries: JsonBody },
    Body(JsonBody),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonBody {
    Map(BTreeMap<String, Value>),
    Records(Vec<Value>),
}

/// JSON dump in any of the shapes the collection scripts produced:
/// `{ "France": 3.42 }`, `{ "France": { "value": 3.42, "year": "2023" } }`,
/// `[{ "country": "France", "value": 3.42 }]`, optionally wrapped in `{ "countries": ... }`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    pub path: PathBuf,
    /// Field holding the number inside an object (default `value`).
    pub value_key: String,
    pub year_key: String,
    pub zero_policy: ZeroPolicy,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource {
            path: path.into(),
            value_key: "value".to_string(),
            year_key: "year".to_string(),
            zero_policy: ZeroPolicy::Data,
        }
    }

    pub fn with_value_key(mut self, key: impl Into<String>) -> Self {
        self.value_key = key.into();
        self
    }

    pub fn with_zero_policy(mut self, policy: ZeroPolicy) -> Self {
        self.zero_policy = policy;
        self
    }

    pub fn parse(&self, raw: &str) -> Result<SourceTable> {
        let context = self.path.display().to_string();
        let shape: JsonShape = serde_json::from_str(raw).map_err(|err| Error::json(&context, err))?;
        let body = match shape {
            JsonShape::Wrapped { countries } => countries,
            JsonShape::Body(body) => body,
        };
        let mut table = SourceTable::new(context);
        match body {
            JsonBody::Map(map) => {
                for (name, value) in map {
                    self.push(&mut table, name, &value);
                }
            }
            JsonBody::Records(records) => {
                for record in records {
                    let name = record
                        .get("country")
                        .or_else(|| record.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    match name {
                        Some(name) => self.push(&mut table, name, &record),
                        None => table.failures.push(SourceFailure {
                            key: record.to_string(),
                            message: "record has no 'country' or 'name'".to_string(),
                        }),
                    }
                }
            }
        }
        Ok(table)
    }

    fn push(&self, table: &mut SourceTable, name: String, value: &Value) {
        let (raw, year) = match value {
            Value::Object(object) => (
                object.get(&self.value_key).unwrap_or(&Value::Null),
                json_year(object.get(&self.year_key)),
            ),
            other => (other, None),
        };
        match json_to_raw(raw, self.zero_policy) {
            Ok(parsed) => table.insert(name.trim(), SourceEntry { value: parsed, year }),
            Err(message) => {
                table.failures.push(SourceFailure {
                    key: name.clone(),
                    message,
                });
                table.insert(name.trim(), SourceEntry { value: RawValue::Missing, year });
            }
        }
    }
}

impl SourceLoader for JsonFileSource {
    fn load(&self) -> Result<SourceTable> {
        let raw = fs::read_to_string(&self.path).map_err(|err| Error::read(&self.path, err))?;
        self.parse(&raw)
    }
}

// ----- CSV files -----

/// Delimited dump with a header row. Columns are addressed by header name.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    pub path: PathBuf,
    pub name_column: String,
    pub value_column: String,
    pub year_column: Option<String>,
    /// Only rows whose column equals the given value are used (e.g. `Element` = `Production`).
    pub filters: BTreeMap<String, String>,
    pub delimiter: u8,
    pub zero_policy: ZeroPolicy,
}

impl CsvFileSource {
    pub fn new(
        path: impl Into<PathBuf>,
        name_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        CsvFileSource {
            path: path.into(),
            name_column: name_column.into(),
            value_column: value_column.into(),
            year_column: None,
            filters: BTreeMap::new(),
            delimiter: b',',
            zero_policy: ZeroPolicy::Data,
        }
    }

    pub fn with_year_column(mut self, column: impl Into<String>) -> Self {
        self.year_column = Some(column.into());
        self
    }

    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn with_zero_policy(mut self, policy: ZeroPolicy) -> Self {
        self.zero_policy = policy;
        self
    }

    pub fn parse(&self, raw: &str) -> Result<SourceTable> {
        let context = self.path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| Error::csv(&context, err))?
            .clone();

        let find = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::InvalidPlan(format!("{context}: no column named '{name}'")))
        };
        let name_idx = find(&self.name_column)?;
        let value_idx = find(&self.value_column)?;
        let year_idx = match &self.year_column {
            Some(column) => Some(find(column)?),
            None => None,
        };
        let filters = self
            .filters
            .iter()
            .map(|(column, expected)| -> Result<(usize, &str)> {
                Ok((find(column)?, expected.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = SourceTable::new(context.clone());
        for record in reader.records() {
            let record = record.map_err(|err| Error::csv(&context, err))?;
            let keep = filters
                .iter()
                .all(|(idx, expected)| record.get(*idx).map_or(false, |cell| cell == *expected));
            if !keep {
                continue;
            }
            let Some(name) = record.get(name_idx).filter(|n| !n.is_empty()) else {
                continue;
            };
            let cell = record.get(value_idx).unwrap_or("");
            let year = year_idx
                .and_then(|idx| record.get(idx))
                .filter(|y| !y.is_empty())
                .map(str::to_string);
            let value = match parse_cell(cell, self.zero_policy) {
                Ok(value) => value,
                Err(message) => {
                    table.failures.push(SourceFailure {
                        key: name.to_string(),
                        message,
                    });
                    RawValue::Missing
                }
            };
            table.insert(name, SourceEntry { value, year });
        }
        Ok(table)
    }
}

impl SourceLoader for CsvFileSource {
    fn load(&self) -> Result<SourceTable> {
        let raw = fs::read_to_string(&self.path).map_err(|err| Error::read(&self.path, err))?;
        self.parse(&raw)
    }
}

// ----- spreadsheets -----

/// Hand-kept `.xlsx`/`.ods` table: header row first, name and value columns by header.
#[derive(Debug, Clone)]
pub struct XlsxSource {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub name_column: String,
    pub value_column: String,
    pub zero_policy: ZeroPolicy,
}

fn cell_text(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::Empty => String::new(),
        calamine::Data::String(s) => s.trim().to_string(),
        calamine::Data::Float(f) => format!("{f}"),
        calamine::Data::Int(i) => format!("{i}"),
        calamine::Data::Bool(b) => format!("{b}"),
        other => format!("{other:?}"),
    }
}

impl SourceLoader for XlsxSource {
    fn load(&self) -> Result<SourceTable> {
        let context = self.path.display().to_string();
        let xlsx_err = |message: String| Error::Xlsx {
            context: context.clone(),
            message,
        };
        if !self.path.exists() {
            return Err(Error::read(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "spreadsheet not found"),
            ));
        }
        let mut workbook =
            calamine::open_workbook_auto(&self.path).map_err(|err| xlsx_err(err.to_string()))?;
        let names = workbook.sheet_names();
        let sheet = match &self.sheet {
            Some(sheet) => sheet.clone(),
            None => names
                .first()
                .cloned()
                .ok_or_else(|| xlsx_err("workbook has no sheets".to_string()))?,
        };
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|err| xlsx_err(err.to_string()))?;

        let mut rows = range.rows();
        let header: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| xlsx_err(format!("sheet '{sheet}' has no column '{name}'")))
        };
        let name_idx = find(&self.name_column)?;
        let value_idx = find(&self.value_column)?;

        let mut table = SourceTable::new(context.clone());
        for row in rows {
            let name = row.get(name_idx).map(cell_text).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let value = match row.get(value_idx) {
                Some(calamine::Data::Float(f)) => RawValue::from_number(*f, self.zero_policy),
                Some(calamine::Data::Int(i)) => RawValue::from_number(*i as f64, self.zero_policy),
                Some(cell) => match parse_cell(&cell_text(cell), self.zero_policy) {
                    Ok(value) => value,
                    Err(message) => {
                        table.failures.push(SourceFailure {
                            key: name.clone(),
                            message,
                        });
                        RawValue::Missing
                    }
                },
                None => RawValue::Missing,
            };
            table.insert(name, SourceEntry::new(value));
        }
        Ok(table)
    }
}

/// Loader chosen by file extension with default column names (`country`, `value`).
pub fn loader_for_path(path: &Path, zero_policy: ZeroPolicy) -> Box<dyn SourceLoader> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => Box::new(CsvFileSource::new(path, "country", "value").with_zero_policy(zero_policy)),
        Some("xlsx") | Some("xls") | Some("ods") => Box::new(XlsxSource {
            path: path.to_path_buf(),
            sheet: None,
            name_column: "country".to_string(),
            value_column: "value".to_string(),
            zero_policy,
        }),
        _ => Box::new(JsonFileSource::new(path).with_zero_policy(zero_policy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_policy_decides_what_zero_means() {
        assert_eq!(RawValue::from_number(0.0, ZeroPolicy::Data), RawValue::ExplicitZero);
        assert_eq!(RawValue::from_number(0.0, ZeroPolicy::NotApplicable), RawValue::Missing);
        assert_eq!(RawValue::from_number(2.5, ZeroPolicy::NotApplicable), RawValue::Present(2.5));
        assert_eq!(RawValue::ExplicitZero.as_value(), Some(0.0));
        assert_eq!(RawValue::NotCovered.as_value(), None);
    }

    #[test]
    fn absent_keys_are_not_covered() {
        let table = LiteralSource::new("t", [("France", Some(3.42)), ("Chile", None)])
            .load()
            .unwrap();
        assert_eq!(table.lookup("France"), RawValue::Present(3.42));
        assert_eq!(table.lookup("Chile"), RawValue::Missing);
        assert_eq!(table.lookup("Egypt"), RawValue::NotCovered);
    }

    #[test]
    fn cells_strip_separators_and_honour_markers() {
        assert_eq!(parse_cell("152,144,238", ZeroPolicy::Data), Ok(RawValue::Present(152_144_238.0)));
        assert_eq!(parse_cell("M", ZeroPolicy::Data), Ok(RawValue::Missing));
        assert_eq!(parse_cell("M (Missing value)", ZeroPolicy::Data), Ok(RawValue::Missing));
        assert_eq!(parse_cell(" N/A ", ZeroPolicy::Data), Ok(RawValue::Missing));
        assert_eq!(parse_cell("0", ZeroPolicy::Data), Ok(RawValue::ExplicitZero));
        assert!(parse_cell("lots", ZeroPolicy::Data).is_err());
    }

    #[test]
    fn non_finite_numbers_are_missing() {
        for cell in ["NaN", "nan", "inf", "-inf", "Infinity"] {
            assert_eq!(parse_cell(cell, ZeroPolicy::Data), Ok(RawValue::Missing), "{cell}");
        }
        assert_eq!(RawValue::from_number(f64::NAN, ZeroPolicy::Data).as_value(), None);

        let table = CsvFileSource::new("scores.csv", "Country", "Value")
            .parse("Country,Value\nFrance,NaN\nEgypt,2\n")
            .unwrap();
        assert_eq!(table.lookup("France"), RawValue::Missing);
        assert_eq!(table.lookup("Egypt"), RawValue::Present(2.0));
        assert!(table.failures.is_empty());
    }

    #[test]
    fn json_accepts_heterogeneous_shapes() {
        let raw = r#"{
            "Germany": {"production": 129000, "yield": 2879.5},
            "Denmark": {"production": 0, "yield": 0},
            "Chile": {"production": null, "yield": null},
            "Belgium": "Missing"
        }"#;
        let table = JsonFileSource::new("soy.json")
            .with_value_key("production")
            .parse(raw)
            .unwrap();
        assert_eq!(table.lookup("Germany"), RawValue::Present(129000.0));
        assert_eq!(table.lookup("Denmark"), RawValue::ExplicitZero);
        assert_eq!(table.lookup("Chile"), RawValue::Missing);
        assert_eq!(table.lookup("Belgium"), RawValue::Missing);
        assert!(table.failures.is_empty());
    }

    #[test]
    fn json_records_and_wrapped_maps() {
        let records = r#"[{"country": "France", "value": 3.42, "year": 2023}, {"name": "Egypt", "value": null}]"#;
        let table = JsonFileSource::new("r.json").parse(records).unwrap();
        assert_eq!(table.lookup("France"), RawValue::Present(3.42));
        assert_eq!(table.get("France").unwrap().year.as_deref(), Some("2023"));
        assert_eq!(table.lookup("Egypt"), RawValue::Missing);

        let wrapped = r#"{"countries": {"Japan": 38.21}}"#;
        let table = JsonFileSource::new("w.json").parse(wrapped).unwrap();
        assert_eq!(table.lookup("Japan"), RawValue::Present(38.21));
    }

    #[test]
    fn json_unparseable_value_is_recorded_and_missing() {
        let table = JsonFileSource::new("bad.json")
            .parse(r#"{"France": [1, 2]}"#)
            .unwrap();
        assert_eq!(table.lookup("France"), RawValue::Missing);
        assert_eq!(table.failures.len(), 1);
    }

    #[test]
    fn csv_filters_rows_like_fao_dumps() {
        let raw = "Area,Element,Item,Year,Unit,Value\n\
                   Czechia,Area harvested,Soya beans,2023,ha,26510\n\
                   Czechia,Production,Soya beans,2023,t,63390\n\
                   Denmark,Production,Soya beans,2023,t,0\n\
                   Chile,Production,Soya beans,2023,t,M\n";
        let table = CsvFileSource::new("fao.csv", "Area", "Value")
            .with_year_column("Year")
            .with_filter("Element", "Production")
            .parse(raw)
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("Czechia"), RawValue::Present(63390.0));
        assert_eq!(table.get("Czechia").unwrap().year.as_deref(), Some("2023"));
        assert_eq!(table.lookup("Denmark"), RawValue::ExplicitZero);
        assert_eq!(table.lookup("Chile"), RawValue::Missing);
    }

    #[test]
    fn csv_unknown_column_is_a_plan_error() {
        let err = CsvFileSource::new("x.csv", "Country", "Score")
            .parse("Country,Value\nFrance,1\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
    }
}
