//! Snapshot output. Every write creates a new file; an existing path is refused with
//! [`Error::SnapshotExists`] and left untouched.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;

use crate::data::snapshot::{CountryRecord, Snapshot};
use crate::error::{Error, Result};

pub const CSV_MISSING: &str = "N/A";

/// `{stem}_v{version}_{YYYYmmdd_HHMMSS}.json`
pub fn snapshot_file_name(stem: &str, version: &str, at: DateTime<Utc>) -> String {
    format!("{stem}_v{version}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write `snapshot` as pretty JSON to `path`, which must not exist yet.
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<PathBuf> {
    let mut body = serde_json::to_string_pretty(snapshot)
        .map_err(|err| Error::json(path.display().to_string(), err))?;
    body.push('\n');
    create_new(path, body.as_bytes())?;
    info!(
        "wrote snapshot {} v{} to {}",
        snapshot.dataset_info.name,
        snapshot.dataset_info.version,
        path.display()
    );
    Ok(path.to_path_buf())
}

/// Write under `dir` using the versioned file-name convention.
pub fn write_snapshot_in(dir: &Path, stem: &str, snapshot: &Snapshot, at: DateTime<Utc>) -> Result<PathBuf> {
    let path = dir.join(snapshot_file_name(stem, snapshot.version(), at));
    write_snapshot(snapshot, &path)
}

fn create_new(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| Error::write(parent, err))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                Error::SnapshotExists(path.to_path_buf())
            } else {
                Error::write(path, err)
            }
        })?;
    file.write_all(bytes).map_err(|err| Error::write(path, err))
}

fn data_date(snapshot: &Snapshot, field: &str) -> String {
    if let Some(date) = snapshot
        .data_sources
        .get(field)
        .and_then(|p| p.date.clone())
    {
        return date;
    }
    snapshot
        .countries
        .iter()
        .filter_map(|c| c.data_years.get(field))
        .max()
        .cloned()
        .unwrap_or_else(|| CSV_MISSING.to_string())
}

/// Three header rows (display name, source, data date) then one row per country sorted by
/// name; nulls are written as `N/A`.
pub fn render_csv(snapshot: &Snapshot) -> Result<String> {
    let context = format!("{} v{}", snapshot.dataset_info.name, snapshot.version());
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut names = vec!["Country".to_string()];
    let mut sources = vec!["Manual".to_string()];
    let mut dates = vec!["Current".to_string()];
    for indicator in &snapshot.indicators {
        names.push(indicator.name.clone());
        sources.push(indicator.source.clone());
        dates.push(data_date(snapshot, &indicator.data_field));
    }
    for row in [&names, &sources, &dates] {
        writer
            .write_record(row)
            .map_err(|err| Error::csv(&context, err))?;
    }

    let mut countries: Vec<&CountryRecord> = snapshot.countries.iter().collect();
    countries.sort_by(|a, b| a.name.cmp(&b.name));
    for country in countries {
        let mut row = vec![country.name.clone()];
        row.extend(snapshot.indicators.iter().map(|i| {
            country
                .value(&i.data_field)
                .map_or_else(|| CSV_MISSING.to_string(), |v| v.to_string())
        }));
        writer
            .write_record(&row)
            .map_err(|err| Error::csv(&context, err))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| Error::csv(&context, err.into_error().into()))?;
    String::from_utf8(bytes).map_err(|err| {
        Error::write(
            PathBuf::from(&context),
            std::io::Error::new(ErrorKind::InvalidData, err),
        )
    })
}

/// Export as CSV to a new file.
pub fn export_csv(snapshot: &Snapshot, path: &Path) -> Result<PathBuf> {
    let body = render_csv(snapshot)?;
    create_new(path, body.as_bytes())?;
    info!("exported {} countries to {}", snapshot.countries.len(), path.display());
    Ok(path.to_path_buf())
}
