//! Add the Numbeo Pollution Index (2025 mid-year, transcribed by hand) to the latest
//! `know_it_all` snapshot. Optional argument: config path.
//! Higher score = more pollution, so the indicator is lower_better.

use std::path::Path;

use chrono::Utc;

use outrank::config::PipelineConfig;
use outrank::data::manifest::Manifest;
use outrank::data::snapshot::{format_timestamp, load_snapshot, Direction, Indicator, Provenance};
use outrank::data::source::{LiteralSource, ZeroPolicy};
use outrank::data::writer::write_snapshot_in;
use outrank::pipeline::reconcile;
use outrank::report;

const DATASET: &str = "know_it_all";
const FIELD: &str = "pollution_index";
const SOURCE: &str = "Numbeo Pollution Index 2025 Mid-Year";

const POLLUTION: &[(&str, f64)] = &[
    ("Germany", 28.83),
    ("Denmark", 20.90),
    ("Austria", 20.64),
    ("Turkey", 64.07),
    ("United States", 36.87),
    ("China", 76.74),
    ("Japan", 38.21),
    ("United Kingdom", 40.69),
    ("France", 43.67),
    ("Italy", 53.40),
    ("Canada", 29.84),
    ("Australia", 26.89),
    ("Spain", 35.26),
    ("Netherlands", 20.91),
    ("Sweden", 17.58),
    ("Norway", 18.27),
    ("Finland", 11.72),
    ("Iceland", 16.67),
    ("Switzerland", 23.97),
    ("Belgium", 49.25),
    ("New Zealand", 26.00),
    ("Singapore", 32.33),
    ("Israel", 56.70),
    ("Ireland", 34.85),
    ("Brazil", 52.78),
    ("Mexico", 58.35),
    ("Argentina", 50.81),
    ("Chile", 77.37),
    ("Colombia", 62.22),
    ("Poland", 55.34),
    ("Czech Republic", 34.56),
    ("Thailand", 75.56),
    ("Malaysia", 60.87),
    ("Philippines", 72.51),
    ("Indonesia", 68.07),
    ("Vietnam", 83.82),
    ("India", 72.81),
    ("South Africa", 56.68),
    ("Egypt", 82.73),
    ("Pakistan", 73.20),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    outrank::logging::init();
    let config_arg = std::env::args().nth(1);
    let config = PipelineConfig::resolve(config_arg.as_deref().map(Path::new))?;

    let mut manifest = Manifest::load(&config.manifest_path)?;
    let base = load_snapshot(manifest.latest(DATASET)?)?;
    let registry = base.registry()?;

    let source = LiteralSource::new(
        SOURCE,
        POLLUTION.iter().map(|(name, value)| (*name, Some(*value))),
    )
    .with_year("2025")
    .with_zero_policy(ZeroPolicy::Data);
    let (outcome, coverage, _) = reconcile(
        &registry,
        &source,
        FIELD,
        &config.normalizer()?,
        &config.thresholds,
    )?;
    print!("{}", report::render_merge(&outcome));
    print!("{}", report::render_coverage(&coverage));

    let indicator = Indicator {
        name: "Pollution Index".to_string(),
        description: "Which country has the lowest pollution (cleanest environment)?".to_string(),
        data_field: FIELD.to_string(),
        direction: Direction::LowerBetter,
        unit: "Index score (0-100)".to_string(),
        source: SOURCE.to_string(),
        zero_policy: ZeroPolicy::Data,
        statistics: None,
    };
    let provenance = Provenance {
        source: "Numbeo Pollution Index".to_string(),
        url: Some(
            "https://www.numbeo.com/pollution/rankings_by_country.jsp?title=2025-mid&displayColumn=0"
                .to_string(),
        ),
        date: Some("2025 Mid-Year".to_string()),
        verification: Some("Manual extraction July 2025".to_string()),
        note: Some("Higher score = higher pollution (worse environmental quality)".to_string()),
        coverage: None,
    };

    let now = Utc::now();
    let next = base.with_indicator(indicator, &outcome, Some(provenance), now)?;
    let path = write_snapshot_in(&config.data_dir, DATASET, &next, now)?;
    manifest.record(DATASET, SOURCE, next.version(), &path, &format_timestamp(now));
    manifest.save(&config.manifest_path)?;

    println!(
        "v{} -> v{}: {} indicators, written to {}",
        base.version(),
        next.version(),
        next.dataset_info.indicator_count,
        path.display()
    );
    Ok(())
}
