//! Plain-text rendering of pipeline results for the console.

use std::fmt::Write as _;

use crate::data::coverage::{CountryGaps, CoverageReport, DatasetCompleteness};
use crate::data::delta::SnapshotDelta;
use crate::data::merge::{MergeOutcome, MissingReason};
use crate::data::ranking::RankedCountry;
use crate::data::snapshot::Snapshot;
use crate::data::validate::ValidationReport;
use crate::pipeline::PipelineRun;

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

pub fn render_merge(outcome: &MergeOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} <- {}: {}/{} countries matched",
        outcome.field,
        outcome.source_label,
        outcome.matched_count(),
        outcome.values.len()
    );
    for value in &outcome.values {
        match (value.value, &value.matched_key) {
            (Some(v), Some(key)) => {
                let _ = writeln!(out, "  ok   {}: {v} (as '{key}')", value.name);
            }
            (Some(v), None) => {
                let _ = writeln!(out, "  ok   {}: {v}", value.name);
            }
            (None, _) => {
                let _ = writeln!(out, "  --   {}: no data", value.name);
            }
        }
    }
    if !outcome.missing.is_empty() {
        let _ = writeln!(out, "missing ({}):", outcome.missing.len());
        for missing in &outcome.missing {
            let reason = match missing.reason {
                MissingReason::NotCovered => "not in source",
                MissingReason::ExplicitNull => "listed without data",
            };
            let _ = writeln!(out, "  {} ({}): {reason}", missing.name, missing.iso3);
        }
    }
    if !outcome.unmatched_source_keys.is_empty() {
        let _ = writeln!(
            out,
            "unmatched source rows: {}",
            outcome.unmatched_source_keys.join(", ")
        );
    }
    for conflict in &outcome.conflicts {
        let _ = writeln!(
            out,
            "conflict for {}: used '{}' = {:?}, ignored '{}' = {:?}",
            conflict.country,
            conflict.used_key,
            conflict.used_value,
            conflict.ignored_key,
            conflict.ignored_value
        );
    }
    out
}

pub fn render_coverage(report: &CoverageReport) -> String {
    let stats = &report.statistics;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {}/{} countries ({:.1}%) - {}",
        report.field,
        stats.countries_with_data,
        stats.countries_analyzed,
        stats.coverage_percent,
        report.suitability
    );
    let _ = writeln!(
        out,
        "  range {} .. {}, average {}, zeros {}",
        fmt_opt(stats.range_min),
        fmt_opt(stats.range_max),
        fmt_opt(stats.average),
        stats.countries_with_zero
    );
    if !stats.missing_countries.is_empty() {
        let _ = writeln!(out, "  missing: {}", stats.missing_countries.join(", "));
    }
    let _ = writeln!(out, "  recommendation: {}", report.recommendation());
    out
}

pub fn render_snapshot_coverage(
    snapshot: &Snapshot,
    reports: &[CoverageReport],
    completeness: &DatasetCompleteness,
    gaps: &[CountryGaps],
) -> String {
    let mut out = String::new();
    let info = &snapshot.dataset_info;
    let _ = writeln!(
        out,
        "{} v{}: {} countries, {} indicators",
        info.name, info.version, info.country_count, info.indicator_count
    );
    for report in reports {
        out.push_str(&render_coverage(report));
    }
    let _ = writeln!(
        out,
        "completeness: {}/{} cells ({:.1}%) - {}",
        completeness.filled_cells,
        completeness.total_cells,
        completeness.percent,
        completeness.grade.as_str()
    );
    let with_gaps: Vec<&CountryGaps> = gaps.iter().filter(|g| g.missing > 0).collect();
    if !with_gaps.is_empty() {
        let _ = writeln!(out, "countries with gaps:");
        for gap in with_gaps {
            let _ = writeln!(
                out,
                "  {} ({}): {} missing [{}]",
                gap.name,
                gap.iso3,
                gap.missing,
                gap.missing_fields.join(", ")
            );
        }
    }
    out
}

pub fn render_run(run: &PipelineRun) -> String {
    let mut out = render_merge(&run.outcome);
    out.push_str(&render_coverage(&run.coverage));
    for failure in &run.source_failures {
        let _ = writeln!(out, "source problem: {}: {}", failure.key, failure.message);
    }
    let info = &run.snapshot.dataset_info;
    let _ = writeln!(
        out,
        "wrote v{} (from v{}) to {}",
        info.version,
        info.previous_version.as_deref().unwrap_or("-"),
        run.path.display()
    );
    out
}

pub fn render_delta(delta: &SnapshotDelta) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "v{} -> v{}", delta.from_version, delta.to_version);
    if delta.is_empty() {
        let _ = writeln!(out, "no differences");
        return out;
    }
    let lists = [
        ("added countries", &delta.added_countries),
        ("removed countries", &delta.removed_countries),
        ("added indicators", &delta.added_indicators),
        ("removed indicators", &delta.removed_indicators),
    ];
    for (label, items) in lists {
        if !items.is_empty() {
            let _ = writeln!(out, "{label}: {}", items.join(", "));
        }
    }
    if !delta.changed_values.is_empty() {
        let _ = writeln!(out, "changed values ({}):", delta.changed_values.len());
        for change in &delta.changed_values {
            let _ = writeln!(
                out,
                "  {} {}: {} -> {}",
                change.country,
                change.field,
                fmt_opt(change.before),
                fmt_opt(change.after)
            );
        }
    }
    out
}

pub fn render_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    for diag in &report.diagnostics {
        let _ = writeln!(out, "[{}] {}: {}", diag.severity, diag.context, diag.message);
    }
    out
}

pub fn render_ranking(field: &str, ranked: &[RankedCountry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{field}:");
    for entry in ranked {
        let _ = writeln!(out, "{:>3}. {} ({}) {}", entry.position, entry.name, entry.iso3, entry.value);
    }
    out
}
