use std::fs;
use std::path::PathBuf;

use outrank::data::worldbank::{latest_observation, parse_page, WorldBankClient, WorldBankSettings};
use outrank::Error;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/worldbank")
        .join(name);
    fs::read_to_string(&path).expect("fixture should exist")
}

#[test]
fn first_page_reports_paging_and_keeps_nulls() {
    let page = parse_page(&fixture("life_expectancy_page1.json")).expect("page should parse");

    assert_eq!(page.page, 1);
    assert_eq!(page.pages, 2);
    assert_eq!(page.observations.len(), 3);
    assert_eq!(page.observations[0].year, "2024");
    assert_eq!(page.observations[0].value, None);
}

#[test]
fn latest_non_null_value_wins_across_pages() {
    let mut observations = parse_page(&fixture("life_expectancy_page1.json"))
        .expect("page should parse")
        .observations;
    let second = parse_page(&fixture("life_expectancy_page2.json")).expect("page should parse");
    assert_eq!(second.page, 2);
    observations.extend(second.observations);

    let latest = latest_observation(&observations).expect("some year has data");
    assert_eq!(latest.year, "2023");
    assert_eq!(latest.value, Some(83.3317073170732));
}

#[test]
fn empty_series_has_no_observation() {
    let page = parse_page(&fixture("empty.json")).expect("page should parse");
    assert!(page.observations.is_empty());
    assert!(latest_observation(&page.observations).is_none());
}

#[test]
fn api_message_is_reported_as_error() {
    let err = parse_page(&fixture("invalid_indicator.json")).expect_err("message payload is an error");
    match err {
        Error::WorldBank(message) => {
            assert_eq!(message, "120: The provided parameter value is not valid");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn client_builds_paged_indicator_url() {
    let client = WorldBankClient::new(WorldBankSettings {
        base_url: "http://localhost:9".to_string(),
        ..WorldBankSettings::default()
    })
    .expect("client should build");
    let url = client.indicator_url("FRA", "SP.DYN.LE00.IN", 2);
    assert!(url.starts_with("http://localhost:9/country/FRA/indicator/SP.DYN.LE00.IN?"));
    assert!(url.contains("date=2020:2024"));
    assert!(url.contains("page=2"));
}
