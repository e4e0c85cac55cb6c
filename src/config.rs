//! Pipeline configuration (`outrank.yaml`). Every field has a default, so a missing file
//! means the default configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::coverage::CoverageThresholds;
use crate::data::manifest::DEFAULT_MANIFEST_PATH;
use crate::data::normalize::{default_variants, load_variants, FuzzyFallback, NameNormalizer};
use crate::data::progress::DEFAULT_PROGRESS_PATH;
use crate::data::worldbank::WorldBankSettings;
use crate::error::{Error, Result};

pub const CONFIG_ENV: &str = "OUTRANK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "outrank.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory new snapshots are written to.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,
    /// Countries fetched between progress-cache saves.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
    #[serde(default)]
    pub thresholds: CoverageThresholds,
    #[serde(default)]
    pub request: WorldBankSettings,
    /// Extra variant table merged over the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants_path: Option<PathBuf>,
    #[serde(default)]
    pub fuzzy: FuzzyFallback,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_manifest_path() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST_PATH)
}
fn default_progress_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRESS_PATH)
}
fn default_save_every() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: default_data_dir(),
            manifest_path: default_manifest_path(),
            progress_path: default_progress_path(),
            save_every: default_save_every(),
            thresholds: CoverageThresholds::default(),
            request: WorldBankSettings::default(),
            variants_path: None,
            fuzzy: FuzzyFallback::default(),
        }
    }
}

impl PipelineConfig {
    pub fn parse(raw: &str, context: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|err| Error::yaml(context, err))
    }

    /// Load an explicit config file; it must exist. Relative paths in it are taken
    /// relative to the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
        let config = Self::parse(&raw, &path.display().to_string())?;
        Ok(match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => config.rebased(dir),
            _ => config,
        })
    }

    fn rebased(mut self, dir: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        rebase(&mut self.data_dir);
        rebase(&mut self.manifest_path);
        rebase(&mut self.progress_path);
        if let Some(path) = self.variants_path.as_mut() {
            rebase(path);
        }
        self
    }

    /// Explicit path, then `OUTRANK_CONFIG`, then `outrank.yaml` if present, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = env::var(CONFIG_ENV) {
            debug!("using config from {CONFIG_ENV}={path}");
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load(fallback);
        }
        Ok(Self::default())
    }

    /// Normalizer from the built-in variants, the optional variants file and the fuzzy setting.
    pub fn normalizer(&self) -> Result<NameNormalizer> {
        let mut variants = default_variants();
        if let Some(path) = &self.variants_path {
            for (canonical, extra) in load_variants(path)? {
                let known = variants.entry(canonical).or_default();
                for variant in extra {
                    if !known.contains(&variant) {
                        known.push(variant);
                    }
                }
            }
        }
        Ok(NameNormalizer::new(variants).with_fuzzy(self.fuzzy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(PipelineConfig::parse("", "inline").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let raw = "thresholds:\n  inclusion: 100\nrequest:\n  delay_ms: 100\nfuzzy:\n  enabled: true\n";
        let config = PipelineConfig::parse(raw, "inline").unwrap();
        assert_eq!(config.thresholds.inclusion, 100.0);
        assert_eq!(config.thresholds.excellent, 90.0);
        assert_eq!(config.request.delay_ms, 100);
        assert_eq!(config.request.timeout_secs, 15);
        assert!(config.fuzzy.enabled);
        assert_eq!(config.fuzzy.max_distance, 2);
        assert_eq!(config.save_every, 5);
    }

    #[test]
    fn unknown_yaml_shape_is_an_error() {
        assert!(PipelineConfig::parse("thresholds: [1, 2]", "inline").is_err());
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = env::temp_dir().join(format!("outrank-config-{stamp}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("variants.yaml"), "Luxembourg:\n  - Luxemburg\n").unwrap();
        let path = dir.join("outrank.yaml");
        fs::write(
            &path,
            "manifest_path: meta/manifest.json\nvariants_path: variants.yaml\nprogress_path: /var/tmp/progress.json\n",
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.manifest_path, dir.join("meta/manifest.json"));
        assert_eq!(config.data_dir, dir.join("data"));
        assert_eq!(config.progress_path, PathBuf::from("/var/tmp/progress.json"));
        let normalizer = config.normalizer().unwrap();
        assert_eq!(normalizer.canonical("Luxemburg").as_deref(), Some("Luxembourg"));

        let _ = fs::remove_dir_all(dir);
    }
}
