//! Drop Luxembourg and Egypt from the latest `know_it_all` snapshot so every indicator can
//! reach complete coverage. Writes a new snapshot and points the manifest at it.
//! Optional argument: config path.

use std::path::Path;

use chrono::Utc;

use outrank::config::PipelineConfig;
use outrank::data::manifest::Manifest;
use outrank::data::snapshot::{format_timestamp, load_snapshot};
use outrank::data::writer::write_snapshot_in;
use outrank::report;

const DATASET: &str = "know_it_all";
const REMOVE: &[&str] = &["LUX", "EGY"];
const REASON: &str = "Missing data in happiness indicators";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    outrank::logging::init();
    let config_arg = std::env::args().nth(1);
    let config = PipelineConfig::resolve(config_arg.as_deref().map(Path::new))?;

    let mut manifest = Manifest::load(&config.manifest_path)?;
    let base = load_snapshot(manifest.latest(DATASET)?)?;
    let now = Utc::now();
    let next = base.without_countries(REMOVE, REASON, now)?;

    for change in &next.dataset_info.changes {
        println!("- {change}");
    }
    for coverage in next.coverage_reports(&config.thresholds) {
        print!("{}", report::render_coverage(&coverage));
    }

    let path = write_snapshot_in(&config.data_dir, DATASET, &next, now)?;
    manifest.record(DATASET, "registry amendment", next.version(), &path, &format_timestamp(now));
    manifest.save(&config.manifest_path)?;
    println!(
        "{} -> {} countries, written to {}",
        base.countries.len(),
        next.countries.len(),
        path.display()
    );
    Ok(())
}
