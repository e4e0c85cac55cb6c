use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use outrank::data::country::{Country, CountryRegistry};
use outrank::data::merge::merge_indicator;
use outrank::data::normalize::NameNormalizer;
use outrank::data::snapshot::{Direction, Indicator, Snapshot};
use outrank::data::source::{LiteralSource, SourceLoader, ZeroPolicy};
use outrank::data::writer::write_snapshot;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_outrank")
}

fn unique_temp_path(name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("outrank-{name}-{stamp}"))
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env_remove("OUTRANK_CONFIG")
        .output()
        .expect("outrank should run")
}

fn write_fixture_snapshot(dir: &Path) -> PathBuf {
    let registry = CountryRegistry::new(vec![
        Country::new("France", "FRA"),
        Country::new("Egypt", "EGY"),
        Country::new("Austria", "AUT"),
    ])
    .expect("registry should be valid");
    let table = LiteralSource::new("numbeo", [("France", Some(43.67)), ("Austria", Some(20.64))])
        .load()
        .expect("literal source should load");
    let outcome = merge_indicator(&registry, &table, "pollution_index", &NameNormalizer::default());
    let indicator = Indicator {
        name: "Pollution Index".to_string(),
        description: "Which country has the lowest pollution?".to_string(),
        data_field: "pollution_index".to_string(),
        direction: Direction::LowerBetter,
        unit: "Index score (0-100)".to_string(),
        source: "Numbeo".to_string(),
        zero_policy: ZeroPolicy::Data,
        statistics: None,
    };
    let snapshot = Snapshot::from_registry("know_it_all", &registry, Utc::now())
        .with_indicator(indicator, &outcome, None, Utc::now())
        .expect("indicator should be added");
    fs::create_dir_all(dir).expect("temp dir should be created");
    write_snapshot(&snapshot, &dir.join("snapshot.json")).expect("snapshot should be written")
}

#[test]
fn unknown_command_prints_usage() {
    let output = run(&["serve"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: outrank"));
}

#[test]
fn rank_command_returns_usage_without_field() {
    let output = run(&["rank", "snapshot.json"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: outrank rank"));
}

#[test]
fn validate_command_accepts_written_snapshot() {
    let dir = unique_temp_path("validate");
    let snapshot = write_fixture_snapshot(&dir);

    let output = run(&["validate", snapshot.to_string_lossy().as_ref()]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("validation passed"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn validate_command_returns_non_zero_on_invalid_snapshot() {
    let dir = unique_temp_path("invalid");
    fs::create_dir_all(&dir).expect("temp dir should be created");
    let path = dir.join("broken.json");
    fs::write(&path, "{\"dataset_info\": {}}").expect("fixture should be written");

    let output = run(&["validate", path.to_string_lossy().as_ref()]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation failed"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn export_csv_command_writes_next_to_snapshot() {
    let dir = unique_temp_path("export");
    let snapshot = write_fixture_snapshot(&dir);

    let output = run(&["export-csv", snapshot.to_string_lossy().as_ref()]);

    assert_eq!(output.status.code(), Some(0));
    let csv = fs::read_to_string(dir.join("snapshot.csv")).expect("csv should exist");
    assert_eq!(csv.lines().count(), 6);
    assert!(csv.contains("Egypt,N/A"));

    // A second export must not overwrite the first.
    let again = run(&["export-csv", snapshot.to_string_lossy().as_ref()]);
    assert_eq!(again.status.code(), Some(1));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn rank_and_coverage_commands_read_snapshot() {
    let dir = unique_temp_path("rank");
    let snapshot = write_fixture_snapshot(&dir);
    let path = snapshot.to_string_lossy().to_string();

    let ranked = run(&["rank", &path, "pollution_index"]);
    assert_eq!(ranked.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&ranked.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[1], "  1. Austria (AUT) 20.64");
    assert_eq!(lines[2], "  2. France (FRA) 43.67");
    assert_eq!(lines.len(), 3);

    let coverage = run(&["coverage", &path]);
    assert_eq!(coverage.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&coverage.stdout);
    assert!(stdout.contains("pollution_index: 2/3 countries (66.7%) - limited"));
    assert!(stdout.contains("Egypt (EGY): 1 missing"));

    let unknown = run(&["rank", &path, "gdp"]);
    assert_eq!(unknown.status.code(), Some(1));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn merge_command_runs_plan_and_records_manifest() {
    let dir = unique_temp_path("merge");
    fs::create_dir_all(&dir).expect("temp dir should be created");
    fs::write(
        dir.join("countries.json"),
        r#"[{"name": "France", "iso3": "FRA"}, {"name": "Czech Republic", "iso3": "CZE"}]"#,
    )
    .expect("registry should be written");
    fs::write(
        dir.join("plan.yaml"),
        r#"dataset: know_it_all
registry: countries.json
indicator:
  name: Pollution Index
  description: Which country has the lowest pollution?
  data_field: pollution_index
  type: lower_better
  unit: Index score (0-100)
  source: Numbeo
source:
  kind: literal
  values:
    France: 43.67
    Czechia: 34.56
"#,
    )
    .expect("plan should be written");
    let config = dir.join("outrank.yaml");
    fs::write(
        &config,
        format!(
            "data_dir: {}\nmanifest_path: {}\n",
            dir.join("snapshots").display(),
            dir.join("manifest.json").display()
        ),
    )
    .expect("config should be written");
    let config = config.to_string_lossy().to_string();
    let plan = dir.join("plan.yaml").to_string_lossy().to_string();

    let output = run(&["merge", &plan, "--config", &config]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pollution_index <- Numbeo: 2/2 countries matched"));
    assert!(stdout.contains("(as 'Czechia')"));
    assert!(stdout.contains("wrote v1.1 (from v1.0)"));

    let latest = run(&["latest", "know_it_all", "--config", &config]);
    assert_eq!(latest.status.code(), Some(0));
    let written = String::from_utf8_lossy(&latest.stdout).trim().to_string();
    assert!(Path::new(&written).exists());

    let _ = fs::remove_dir_all(dir);
}
