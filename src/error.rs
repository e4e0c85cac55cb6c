use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{context}': {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in '{context}': {source}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("CSV error in '{context}': {source}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("spreadsheet error in '{context}': {message}")]
    Xlsx { context: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("World Bank API error: {0}")]
    WorldBank(String),

    #[error("duplicate country {field} '{value}' in registry")]
    DuplicateCountry { field: &'static str, value: String },

    #[error("country '{0}' is not in the registry")]
    UnknownCountry(String),

    #[error("indicator '{field}' already exists as {existing}, refusing to redefine it as {requested}")]
    IndicatorConflict {
        field: String,
        existing: String,
        requested: String,
    },

    #[error("indicator '{0}' is not defined in the snapshot")]
    UnknownIndicator(String),

    #[error("snapshot '{}' already exists; snapshots are never overwritten", .0.display())]
    SnapshotExists(PathBuf),

    #[error("dataset '{0}' is not listed in the manifest")]
    UnknownDataset(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn yaml(context: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    /// True when an expected input file is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
