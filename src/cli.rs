use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::data::delta::diff_snapshots;
use crate::data::ranking::rank_countries;
use crate::data::snapshot::load_snapshot;
use crate::data::validate::{validate_snapshot_file, ValidationSeverity};
use crate::data::writer::export_csv;
use crate::data::manifest::Manifest;
use crate::pipeline::{load_plan, run_plan};
use crate::report;

const USAGE: &str = "usage: outrank <merge|coverage|validate|export-csv|delta|rank|latest> [args] [--config <path>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Merge,
    Coverage,
    Validate,
    ExportCsv,
    Delta,
    Rank,
    Latest,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("merge") => Some(Command::Merge),
        Some("coverage") => Some(Command::Coverage),
        Some("validate") => Some(Command::Validate),
        Some("export-csv") => Some(Command::ExportCsv),
        Some("delta") => Some(Command::Delta),
        Some("rank") => Some(Command::Rank),
        Some("latest") => Some(Command::Latest),
        _ => None,
    }
}

/// Split `--config <path>` out of the argument list.
fn split_config(args: &[String]) -> (Vec<String>, Option<PathBuf>) {
    let mut rest = Vec::with_capacity(args.len());
    let mut config = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().map(PathBuf::from);
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg.clone());
        }
    }
    (rest, config)
}

pub fn run_with_args(args: &[String]) -> i32 {
    let (args, config_path) = split_config(args);
    let Some(command) = parse_command(&args) else {
        eprintln!("{USAGE}");
        return 2;
    };
    let config = match PipelineConfig::resolve(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };
    match command {
        Command::Merge => handle_merge(&args, &config),
        Command::Coverage => handle_coverage(&args, &config),
        Command::Validate => handle_validate(&args, &config),
        Command::ExportCsv => handle_export_csv(&args),
        Command::Delta => handle_delta(&args),
        Command::Rank => handle_rank(&args),
        Command::Latest => handle_latest(&args, &config),
    }
}

fn handle_merge(args: &[String], config: &PipelineConfig) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: outrank merge <plan.yaml>");
        return 2;
    };
    let plan_path = Path::new(path);
    let plan = match load_plan(plan_path) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("merge failed: {err}");
            return 1;
        }
    };
    let base_dir = plan_path.parent().unwrap_or_else(|| Path::new("."));
    match run_plan(&plan, base_dir, config, Utc::now()) {
        Ok(run) => {
            print!("{}", report::render_run(&run));
            0
        }
        Err(err) => {
            eprintln!("merge failed: {err}");
            1
        }
    }
}

fn handle_coverage(args: &[String], config: &PipelineConfig) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: outrank coverage <snapshot.json>");
        return 2;
    };
    match load_snapshot(path) {
        Ok(snapshot) => {
            let reports = snapshot.coverage_reports(&config.thresholds);
            print!(
                "{}",
                report::render_snapshot_coverage(
                    &snapshot,
                    &reports,
                    &snapshot.completeness(),
                    &snapshot.country_gaps()
                )
            );
            0
        }
        Err(err) => {
            eprintln!("coverage failed: {err}");
            1
        }
    }
}

fn handle_validate(args: &[String], config: &PipelineConfig) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: outrank validate <snapshot.json>");
        return 2;
    };
    match validate_snapshot_file(path, &config.thresholds) {
        Ok(report) if report.has_errors() => {
            eprint!("{}", report::render_validation(&report));
            eprintln!(
                "validation failed: {} error(s), {} warning(s)",
                report.count(ValidationSeverity::Error),
                report.count(ValidationSeverity::Warning)
            );
            1
        }
        Ok(report) => {
            print!("{}", report::render_validation(&report));
            println!(
                "validation passed: {path} ({} warning(s))",
                report.count(ValidationSeverity::Warning)
            );
            0
        }
        Err(err) => {
            eprintln!("validation failed: {err}");
            1
        }
    }
}

fn handle_export_csv(args: &[String]) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: outrank export-csv <snapshot.json> [out.csv]");
        return 2;
    };
    let output = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(path).with_extension("csv"));
    let result = load_snapshot(path).and_then(|snapshot| export_csv(&snapshot, &output));
    match result {
        Ok(written) => {
            println!("exported: {}", written.display());
            0
        }
        Err(err) => {
            eprintln!("export failed: {err}");
            1
        }
    }
}

fn handle_delta(args: &[String]) -> i32 {
    let (Some(old), Some(new)) = (args.get(2), args.get(3)) else {
        eprintln!("usage: outrank delta <old.json> <new.json>");
        return 2;
    };
    match (load_snapshot(old), load_snapshot(new)) {
        (Ok(old), Ok(new)) => {
            print!("{}", report::render_delta(&diff_snapshots(&old, &new)));
            0
        }
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("delta failed: {err}");
            1
        }
    }
}

fn handle_rank(args: &[String]) -> i32 {
    let (Some(path), Some(field)) = (args.get(2), args.get(3)) else {
        eprintln!("usage: outrank rank <snapshot.json> <field>");
        return 2;
    };
    let result = load_snapshot(path).and_then(|snapshot| rank_countries(&snapshot, field));
    match result {
        Ok(ranked) => {
            print!("{}", report::render_ranking(field, &ranked));
            0
        }
        Err(err) => {
            eprintln!("rank failed: {err}");
            1
        }
    }
}

fn handle_latest(args: &[String], config: &PipelineConfig) -> i32 {
    let manifest = match Manifest::load(&config.manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("manifest error: {err}");
            return 1;
        }
    };
    match args.get(2) {
        Some(dataset) => match manifest.latest(dataset) {
            Ok(path) => {
                println!("{}", path.display());
                0
            }
            Err(err) => {
                eprintln!("{err}");
                1
            }
        },
        None => {
            for (name, entry) in &manifest.datasets {
                println!(
                    "{name}\tv{}\t{}",
                    entry.data_version.as_deref().unwrap_or("?"),
                    entry.path
                );
            }
            0
        }
    }
}

/// Run with the process arguments.
pub fn run() -> i32 {
    let args: Vec<String> = env::args().collect();
    run_with_args(&args)
}
