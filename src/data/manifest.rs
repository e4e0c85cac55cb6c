//! Snapshot manifest: logical dataset name -> latest snapshot path, with the version history.
//! Updated in place by the pipeline after each successful write; read by anything that needs
//! "the current dataset".
//!
//! Snapshot paths under the manifest's own directory are stored relative to it, so a data
//! directory can be moved or read from anywhere.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_MANIFEST_PATH: &str = "data/manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub version: String,
    pub path: String,
    pub written: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub path: String,
    /// Every version ever recorded, oldest first.
    #[serde(default)]
    pub history: Vec<ManifestVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub datasets: BTreeMap<String, ManifestEntry>,
    /// Directory the manifest was loaded from; relative entries resolve against it.
    #[serde(skip)]
    root: PathBuf,
}

impl Manifest {
    /// Load the manifest; a missing file is an empty manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut manifest: Self = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| Error::json(path.display().to_string(), err))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(Error::read(path, err)),
        };
        manifest.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    /// Overwrite the manifest file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::write(parent, err))?;
        }
        let mut body = serde_json::to_string_pretty(self)
            .map_err(|err| Error::json(path.display().to_string(), err))?;
        body.push('\n');
        fs::write(path, body).map_err(|err| Error::write(path, err))
    }

    pub fn get(&self, dataset: &str) -> Option<&ManifestEntry> {
        self.datasets.get(dataset)
    }

    /// Path of the latest snapshot for `dataset`.
    pub fn latest(&self, dataset: &str) -> Result<PathBuf> {
        self.datasets
            .get(dataset)
            .map(|entry| self.resolve(&entry.path))
            .ok_or_else(|| Error::UnknownDataset(dataset.to_string()))
    }

    /// Point `dataset` at a newly written snapshot.
    pub fn record(
        &mut self,
        dataset: &str,
        source: &str,
        version: &str,
        path: &Path,
        written: &str,
    ) {
        let path = self.stored(path);
        let entry = self
            .datasets
            .entry(dataset.to_string())
            .or_insert_with(|| ManifestEntry {
                source: source.to_string(),
                data_version: None,
                last_updated: None,
                path: path.clone(),
                history: Vec::new(),
            });
        entry.source = source.to_string();
        entry.data_version = Some(version.to_string());
        entry.last_updated = Some(written.to_string());
        entry.path = path.clone();
        entry.history.push(ManifestVersion {
            version: version.to_string(),
            path,
            written: written.to_string(),
        });
    }

    fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn stored(&self, path: &Path) -> String {
        let path = match path.strip_prefix(&self.root) {
            Ok(inside) => inside.to_path_buf(),
            Err(_) if path.is_relative() => env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf()),
            Err(_) => path.to_path_buf(),
        };
        path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_points_at_latest_and_keeps_history() {
        let mut manifest = Manifest::default();
        manifest.record("know_it_all", "numbeo", "2.1", Path::new("a.json"), "2025-07-19 18:00:00");
        manifest.record("know_it_all", "numbeo", "2.2", Path::new("b.json"), "2025-07-19 18:14:45");
        assert_eq!(manifest.latest("know_it_all").unwrap(), PathBuf::from("b.json"));
        let entry = manifest.get("know_it_all").unwrap();
        assert_eq!(entry.data_version.as_deref(), Some("2.2"));
        assert_eq!(entry.history.len(), 2);
        assert!(matches!(manifest.latest("other"), Err(Error::UnknownDataset(_))));
    }

    #[test]
    fn serializes_as_flat_map() {
        let mut manifest = Manifest::default();
        manifest.record("d", "s", "1.0", Path::new("x.json"), "t");
        let raw = serde_json::to_string(&manifest).unwrap();
        assert!(raw.starts_with("{\"d\":"));
        let back: Manifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn paths_resolve_against_the_manifest_directory() {
        let root = env::temp_dir().join("outrank-manifest-root");
        let mut manifest = Manifest::load(root.join("manifest.json")).unwrap();
        manifest.record("d", "s", "1.1", &root.join("snapshots/d_v1.1.json"), "t");
        manifest.record("d", "s", "1.2", Path::new("/elsewhere/d_v1.2.json"), "t");

        let entry = manifest.get("d").unwrap();
        assert_eq!(entry.history[0].path, "snapshots/d_v1.1.json");
        assert_eq!(entry.path, "/elsewhere/d_v1.2.json");
        assert_eq!(manifest.latest("d").unwrap(), PathBuf::from("/elsewhere/d_v1.2.json"));

        manifest.record("d", "s", "1.3", &root.join("snapshots/d_v1.3.json"), "t");
        assert_eq!(manifest.latest("d").unwrap(), root.join("snapshots/d_v1.3.json"));
    }
}
