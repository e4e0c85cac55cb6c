//! Bulk pull of the World Bank indicator set for every country in the latest `know_it_all`
//! snapshot: most recent non-null value in the configured year range, one request at a time.
//! Progress is cached and reused, so an interrupted run resumes where it stopped.
//! Optional argument: config path.

use std::path::Path;

use chrono::Utc;

use outrank::config::PipelineConfig;
use outrank::data::coverage::DatasetCompleteness;
use outrank::data::manifest::Manifest;
use outrank::data::merge::merge_indicator;
use outrank::data::progress::{fetch_into_cache, ProgressCache};
use outrank::data::snapshot::Direction::{self, HigherBetter as Higher, LowerBetter as Lower};
use outrank::data::snapshot::{format_timestamp, load_snapshot, Indicator, Provenance};
use outrank::data::source::ZeroPolicy;
use outrank::data::worldbank::WorldBankClient;
use outrank::data::writer::write_snapshot_in;
use outrank::report;

const DATASET: &str = "know_it_all";

struct Series {
    code: &'static str,
    field: &'static str,
    name: &'static str,
    description: &'static str,
    direction: Direction,
    unit: &'static str,
}

const fn series(
    code: &'static str,
    field: &'static str,
    name: &'static str,
    description: &'static str,
    direction: Direction,
    unit: &'static str,
) -> Series {
    Series {
        code,
        field,
        name,
        description,
        direction,
        unit,
    }
}

const SERIES: &[Series] = &[
    series("SP.DYN.CBRT.IN", "birth_rate", "Birth Rate", "Which country has the highest birth rate?", Higher, "per 1,000 people"),
    series("SP.DYN.LE00.IN", "life_expectancy", "Life Expectancy", "Which country has the highest life expectancy?", Higher, "years"),
    series("SP.POP.0014.TO.ZS", "population_0_14", "Population Ages 0-14", "Which country has the largest share of children?", Higher, "% of population"),
    series("SP.POP.65UP.TO.ZS", "population_65_plus", "Population Ages 65+", "Which country has the largest share of people over 65?", Higher, "% of population"),
    series("SP.POP.TOTL", "population", "Population", "Which country has the largest population?", Higher, "people"),
    series("NY.GDP.MKTP.CD", "gdp", "GDP", "Which country has the largest economy?", Higher, "current US$"),
    series("NY.GDP.MKTP.KD.ZG", "gdp_growth", "GDP Growth", "Which country has the fastest GDP growth?", Higher, "annual %"),
    series("IT.NET.BBND.P2", "broadband_subscriptions", "Fixed Broadband", "Which country has the most broadband subscriptions per person?", Higher, "per 100 people"),
    series("IT.CEL.SETS.P2", "mobile_subscriptions", "Mobile Subscriptions", "Which country has the most mobile subscriptions per person?", Higher, "per 100 people"),
    series("IT.NET.SECR.P6", "secure_servers", "Secure Internet Servers", "Which country has the most secure internet servers per person?", Higher, "per 1 million people"),
    series("EG.ELC.COAL.ZS", "electricity_coal", "Electricity from Coal", "Which country relies least on coal for electricity?", Lower, "% of total"),
    series("EG.ELC.PETR.ZS", "electricity_oil", "Electricity from Oil", "Which country relies least on oil for electricity?", Lower, "% of total"),
    series("AG.LND.FRST.ZS", "forest_area", "Forest Area", "Which country has the most forest cover?", Higher, "% of land area"),
    series("EG.FEC.RNEW.ZS", "renewable_energy", "Renewable Energy", "Which country uses the most renewable energy?", Higher, "% of final energy consumption"),
    series("SH.XPD.CHEX.GD.ZS", "health_expenditure", "Health Expenditure", "Which country spends the most on health?", Higher, "% of GDP"),
    series("SE.TER.ENRR", "tertiary_enrollment", "Tertiary Enrollment", "Which country has the highest university enrollment?", Higher, "% gross"),
    series("SL.TLF.CACT.FE.ZS", "female_labor_participation", "Female Labor Participation", "Which country has the highest female labor force participation?", Higher, "% of female population 15+"),
    series("IP.PAT.RESD", "patent_applications", "Patent Applications", "Which country files the most patents?", Higher, "applications by residents"),
    series("SP.RUR.TOTL.ZS", "rural_population", "Rural Population", "Which country is the most rural?", Higher, "% of population"),
    series("SL.UEM.TOTL.ZS", "unemployment_rate", "Unemployment Rate", "Which country has the lowest unemployment?", Lower, "% of labor force"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    outrank::logging::init();
    let config_arg = std::env::args().nth(1);
    let config = PipelineConfig::resolve(config_arg.as_deref().map(Path::new))?;

    let mut manifest = Manifest::load(&config.manifest_path)?;
    let base = load_snapshot(manifest.latest(DATASET)?)?;
    let registry = base.registry()?;
    let codes: Vec<&str> = SERIES.iter().map(|s| s.code).collect();

    println!(
        "fetching {} indicators for {} countries ({} requests)",
        codes.len(),
        registry.len(),
        codes.len() * registry.len()
    );
    let client = WorldBankClient::new(config.request.clone())?;
    let mut cache = ProgressCache::load(&config.progress_path)?;
    let failures = fetch_into_cache(
        &client,
        &registry,
        &codes,
        &mut cache,
        &config.progress_path,
        config.save_every,
    )?;
    for failure in &failures {
        eprintln!("request failed: {} ({})", failure.key, failure.message);
    }
    if !failures.is_empty() {
        eprintln!("{} requests failed and stay uncached; rerun to retry them", failures.len());
    }

    let normalizer = config.normalizer()?;
    let now = Utc::now();
    let mut additions = Vec::with_capacity(SERIES.len());
    let mut filled = 0;
    for series in SERIES {
        let table = cache.table_for(series.code, &registry, ZeroPolicy::Data);
        let outcome = merge_indicator(&registry, &table, series.field, &normalizer);
        filled += outcome.matched_count();
        let indicator = Indicator {
            name: series.name.to_string(),
            description: series.description.to_string(),
            data_field: series.field.to_string(),
            direction: series.direction,
            unit: series.unit.to_string(),
            source: format!("World Bank {}", series.code),
            zero_policy: ZeroPolicy::Data,
            statistics: None,
        };
        let provenance = Provenance {
            source: "World Bank Open Data API".to_string(),
            url: Some(client.indicator_url("all", series.code, 1)),
            date: Some(config.request.date_range.clone()),
            verification: Some("Most recent non-null value".to_string()),
            note: None,
            coverage: None,
        };
        additions.push((indicator, outcome, Some(provenance)));
    }
    let next = base.with_indicators(additions, now)?;

    for coverage in next.coverage_reports(&config.thresholds) {
        print!("{}", report::render_coverage(&coverage));
    }
    let completeness = DatasetCompleteness::from_counts(filled, codes.len() * registry.len());
    println!(
        "data points: {}/{} ({:.1}%) - {}",
        completeness.filled_cells,
        completeness.total_cells,
        completeness.percent,
        completeness.grade.as_str()
    );

    let path = write_snapshot_in(&config.data_dir, DATASET, &next, now)?;
    manifest.record(DATASET, "World Bank Open Data API", next.version(), &path, &format_timestamp(now));
    manifest.save(&config.manifest_path)?;
    println!("v{} -> v{}, written to {}", base.version(), next.version(), path.display());
    Ok(())
}
