//! One reconciliation run: base snapshot -> source -> merge -> coverage -> new snapshot ->
//! manifest update. Described by an [`IndicatorPlan`] YAML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::data::country::{load_registry, CountryRegistry};
use crate::data::coverage::{CoverageReport, CoverageThresholds};
use crate::data::manifest::Manifest;
use crate::data::merge::{merge_indicator, MergeOutcome};
use crate::data::normalize::NameNormalizer;
use crate::data::snapshot::{
    check_data_field, format_timestamp, load_snapshot, Direction, Indicator, Provenance, Snapshot,
};
use crate::data::source::{
    CsvFileSource, JsonFileSource, LiteralSource, SourceFailure, SourceLoader, XlsxSource, ZeroPolicy,
};
use crate::data::worldbank::{WorldBankClient, WorldBankSource};
use crate::data::writer::write_snapshot_in;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    pub description: String,
    pub data_field: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub unit: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Literal {
        values: BTreeMap<String, Option<f64>>,
        #[serde(default)]
        year: Option<String>,
    },
    Json {
        path: PathBuf,
        #[serde(default)]
        value_key: Option<String>,
    },
    Csv {
        path: PathBuf,
        name_column: String,
        value_column: String,
        #[serde(default)]
        year_column: Option<String>,
        #[serde(default)]
        filters: BTreeMap<String, String>,
        #[serde(default)]
        delimiter: Option<char>,
    },
    Xlsx {
        path: PathBuf,
        #[serde(default)]
        sheet: Option<String>,
        name_column: String,
        value_column: String,
    },
    WorldBank {
        indicator: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPlan {
    /// Logical dataset name in the manifest.
    pub dataset: String,
    /// Explicit base snapshot; otherwise the manifest's latest for `dataset`.
    #[serde(default)]
    pub base_snapshot: Option<PathBuf>,
    /// Registry used to start a dataset the manifest does not know yet.
    #[serde(default)]
    pub registry: Option<PathBuf>,
    /// File-name stem of the new snapshot; defaults to `dataset`.
    #[serde(default)]
    pub output_stem: Option<String>,
    pub indicator: IndicatorSpec,
    #[serde(default)]
    pub zero_policy: ZeroPolicy,
    #[serde(default)]
    pub provenance: Option<Provenance>,
    pub source: SourceSpec,
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

impl IndicatorPlan {
    pub fn parse(raw: &str, context: &str) -> Result<Self> {
        let plan: IndicatorPlan = serde_yaml::from_str(raw).map_err(|err| Error::yaml(context, err))?;
        if let Err(Error::InvalidPlan(message)) = check_data_field(&plan.indicator.data_field) {
            return Err(Error::InvalidPlan(format!("{context}: {message}")));
        }
        Ok(plan)
    }

    pub fn indicator(&self) -> Indicator {
        let spec = &self.indicator;
        Indicator {
            name: spec.name.clone(),
            description: spec.description.clone(),
            data_field: spec.data_field.clone(),
            direction: spec.direction,
            unit: spec.unit.clone(),
            source: spec.source.clone(),
            zero_policy: self.zero_policy,
            statistics: None,
        }
    }

    /// Loader for the plan's source. Relative paths resolve against `base_dir`.
    pub fn loader(
        &self,
        base_dir: &Path,
        registry: &CountryRegistry,
        config: &PipelineConfig,
    ) -> Result<Box<dyn SourceLoader>> {
        let policy = self.zero_policy;
        let loader: Box<dyn SourceLoader> = match &self.source {
            SourceSpec::Literal { values, year } => {
                let mut source = LiteralSource::new(
                    self.indicator.source.clone(),
                    values.iter().map(|(name, value)| (name.as_str(), *value)),
                )
                .with_zero_policy(policy);
                if let Some(year) = year {
                    source = source.with_year(year.clone());
                }
                Box::new(source)
            }
            SourceSpec::Json { path, value_key } => {
                let mut source = JsonFileSource::new(resolve(base_dir, path)).with_zero_policy(policy);
                if let Some(key) = value_key {
                    source = source.with_value_key(key.clone());
                }
                Box::new(source)
            }
            SourceSpec::Csv {
                path,
                name_column,
                value_column,
                year_column,
                filters,
                delimiter,
            } => {
                let mut source = CsvFileSource::new(resolve(base_dir, path), name_column.clone(), value_column.clone())
                    .with_zero_policy(policy);
                if let Some(column) = year_column {
                    source = source.with_year_column(column.clone());
                }
                for (column, value) in filters {
                    source = source.with_filter(column.clone(), value.clone());
                }
                if let Some(delimiter) = delimiter {
                    let byte = u8::try_from(*delimiter)
                        .map_err(|_| Error::InvalidPlan(format!("delimiter '{delimiter}' is not a single byte")))?;
                    source.delimiter = byte;
                }
                Box::new(source)
            }
            SourceSpec::Xlsx {
                path,
                sheet,
                name_column,
                value_column,
            } => Box::new(XlsxSource {
                path: resolve(base_dir, path),
                sheet: sheet.clone(),
                name_column: name_column.clone(),
                value_column: value_column.clone(),
                zero_policy: policy,
            }),
            SourceSpec::WorldBank { indicator } => Box::new(WorldBankSource {
                client: WorldBankClient::new(config.request.clone())?,
                registry: registry.clone(),
                indicator: indicator.clone(),
                zero_policy: policy,
            }),
        };
        Ok(loader)
    }
}

pub fn load_plan(path: impl AsRef<Path>) -> Result<IndicatorPlan> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
    IndicatorPlan::parse(&raw, &path.display().to_string())
}

/// Merge plus coverage without touching the filesystem beyond the loader itself.
pub fn reconcile(
    registry: &CountryRegistry,
    loader: &dyn SourceLoader,
    field: &str,
    normalizer: &NameNormalizer,
    thresholds: &CoverageThresholds,
) -> Result<(MergeOutcome, CoverageReport, Vec<SourceFailure>)> {
    let table = loader.load()?;
    info!("loaded {} rows from {}", table.len(), table.label);
    for failure in &table.failures {
        warn!("{}: {} ({})", table.label, failure.key, failure.message);
    }
    let outcome = merge_indicator(registry, &table, field, normalizer);
    let coverage = CoverageReport::new(field, &outcome.value_slice(), registry.len(), thresholds);
    Ok((outcome, coverage, table.failures))
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outcome: MergeOutcome,
    pub coverage: CoverageReport,
    pub source_failures: Vec<SourceFailure>,
    pub snapshot: Snapshot,
    pub path: PathBuf,
}

fn base_snapshot(plan: &IndicatorPlan, base_dir: &Path, manifest: &Manifest, at: DateTime<Utc>) -> Result<Snapshot> {
    if let Some(path) = &plan.base_snapshot {
        return load_snapshot(resolve(base_dir, path));
    }
    match manifest.latest(&plan.dataset) {
        Ok(path) => load_snapshot(path),
        Err(Error::UnknownDataset(dataset)) => match &plan.registry {
            Some(path) => {
                let registry = load_registry(resolve(base_dir, path))?;
                info!("starting dataset '{dataset}' from {} countries", registry.len());
                Ok(Snapshot::from_registry(dataset, &registry, at))
            }
            None => Err(Error::UnknownDataset(dataset)),
        },
        Err(err) => Err(err),
    }
}

/// Run a plan end to end and record the new snapshot in the manifest.
pub fn run_plan(
    plan: &IndicatorPlan,
    base_dir: &Path,
    config: &PipelineConfig,
    at: DateTime<Utc>,
) -> Result<PipelineRun> {
    let mut manifest = Manifest::load(&config.manifest_path)?;
    let base = base_snapshot(plan, base_dir, &manifest, at)?;
    let registry = base.registry()?;
    let normalizer = config.normalizer()?;
    let loader = plan.loader(base_dir, &registry, config)?;

    let (outcome, coverage, source_failures) = reconcile(
        &registry,
        loader.as_ref(),
        &plan.indicator.data_field,
        &normalizer,
        &config.thresholds,
    )?;

    let snapshot = base.with_indicator(plan.indicator(), &outcome, plan.provenance.clone(), at)?;
    let stem = plan.output_stem.as_deref().unwrap_or(&plan.dataset);
    let path = write_snapshot_in(&config.data_dir, stem, &snapshot, at)?;

    manifest.record(
        &plan.dataset,
        &plan.indicator.source,
        snapshot.version(),
        &path,
        &format_timestamp(at),
    );
    manifest.save(&config.manifest_path)?;

    Ok(PipelineRun {
        outcome,
        coverage,
        source_failures,
        snapshot,
        path,
    })
}
