//! Integration tests for ccreport

mod common;

use ccreport::{
    aggregation::{Aggregator, ReportType, Totals},
    data_loader::DataLoader,
    export::{ExportFormat, render},
    filters::{self, FilterSpec, SortDirection, SortKey, SortSpec},
    pricing::{CostCalculator, PricingTable},
    timezone::TimezoneConfig,
    types::CostMode,
};
use chrono::NaiveDate;
use common::{usage_line, usage_tree};
use std::sync::Arc;

fn utc_aggregator() -> Aggregator {
    let calculator = Arc::new(CostCalculator::new(PricingTable::embedded()));
    Aggregator::new(calculator, TimezoneConfig::from_cli(None, true).unwrap())
}

#[tokio::test]
async fn test_end_to_end_daily_report() {
    let l1 = usage_line(
        "s1",
        "2024-01-01T10:00:00Z",
        "claude-3-5-sonnet-20241022",
        1000,
        500,
        None,
    );
    let l2 = usage_line(
        "s2",
        "2024-01-01T12:00:00Z",
        "claude-3-5-sonnet-20241022",
        2000,
        1000,
        None,
    );
    let l3 = usage_line(
        "s3",
        "2024-01-02T09:00:00Z",
        "claude-3-5-sonnet-20241022",
        100,
        50,
        Some(0.5),
    );
    let tree = usage_tree(&[("proj-a", &[l1.as_str(), l2.as_str()]), ("proj-b", &[l3.as_str()])]);

    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let aggregator = utc_aggregator();
    let report = aggregator
        .aggregate(loader.load_usage_events(), ReportType::Daily, CostMode::Auto)
        .await
        .unwrap();

    assert_eq!(report.rows.len(), 2);
    let day1 = &report.rows[0];
    assert_eq!(day1.bucket.to_string(), "2024-01-01");
    assert_eq!(day1.tokens.input_tokens, 3000);
    assert_eq!(day1.event_count, 2);
    assert_eq!(day1.session_count, 2);
    // 3000 input at $3/MTok + 1500 output at $15/MTok
    assert!((day1.total_cost - 0.0315).abs() < 1e-9);

    let day2 = &report.rows[1];
    assert_eq!(day2.bucket.to_string(), "2024-01-02");
    // auto mode trusts the precomputed cost
    assert!((day2.total_cost - 0.5).abs() < 1e-9);
    assert!(day2.projects.iter().any(|p| p.as_str() == "proj-b"));
}

#[tokio::test]
async fn test_calculate_mode_ignores_precomputed() {
    let line = usage_line(
        "s1",
        "2024-01-01T10:00:00Z",
        "claude-3-5-sonnet-20241022",
        1000,
        500,
        Some(99.0),
    );
    let tree = usage_tree(&[("proj", &[line.as_str()])]);

    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let report = utc_aggregator()
        .aggregate(
            loader.load_usage_events(),
            ReportType::Daily,
            CostMode::Calculate,
        )
        .await
        .unwrap();

    assert!((report.rows[0].total_cost - 0.0105).abs() < 1e-9);
}

#[tokio::test]
async fn test_export_is_idempotent_and_round_trips() {
    let l1 = usage_line(
        "s1",
        "2024-01-01T10:00:00Z",
        "claude-3-opus-20240229",
        100,
        50,
        None,
    );
    let l2 = usage_line(
        "s2",
        "2024-01-03T10:00:00Z",
        "claude-3-5-haiku-20241022",
        200,
        100,
        None,
    );
    let tree = usage_tree(&[("proj", &[l1.as_str(), l2.as_str()])]);
    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let aggregator = utc_aggregator();

    let first = aggregator
        .aggregate(loader.load_usage_events(), ReportType::Daily, CostMode::Auto)
        .await
        .unwrap();
    let second = aggregator
        .aggregate(loader.load_usage_events(), ReportType::Daily, CostMode::Auto)
        .await
        .unwrap();

    let a = render(&first, &first.rows, ExportFormat::Json).unwrap();
    let b = render(&second, &second.rows, ExportFormat::Json).unwrap();
    assert_eq!(a, b);

    let parsed: serde_json::Value = serde_json::from_str(&a).unwrap();
    assert_eq!(parsed["rows"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["rows"][0]["bucket"], "2024-01-01");
    assert_eq!(
        parsed["rows"][0]["models_used"][0],
        "claude-3-opus-20240229"
    );
    assert_eq!(
        parsed["rows"][0]["model_breakdown"]["claude-3-opus-20240229"]["total_tokens"],
        150
    );

    let csv_a = render(&first, &first.rows, ExportFormat::Csv).unwrap();
    let csv_b = render(&second, &second.rows, ExportFormat::Csv).unwrap();
    assert_eq!(csv_a, csv_b);
    assert_eq!(csv_a.lines().count(), 3);
}

#[tokio::test]
async fn test_date_filtering_is_inclusive() {
    let lines: Vec<String> = ["2024-01-01", "2024-01-15", "2024-02-01"]
        .iter()
        .enumerate()
        .map(|(i, date)| {
            usage_line(
                &format!("s{i}"),
                &format!("{date}T10:00:00Z"),
                "claude-3-opus-20240229",
                100,
                50,
                None,
            )
        })
        .collect();
    let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let tree = usage_tree(&[("proj", refs.as_slice())]);

    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let report = utc_aggregator()
        .aggregate(loader.load_usage_events(), ReportType::Daily, CostMode::Auto)
        .await
        .unwrap();

    let filter = FilterSpec::new()
        .with_since(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        .with_until(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    let rows = filters::apply(report.rows.clone(), &filter, SortSpec::default());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].bucket.to_string(), "2024-01-15");
    assert_eq!(rows[1].bucket.to_string(), "2024-02-01");

    // the empty filter keeps everything
    let all = filters::apply(report.rows.clone(), &FilterSpec::new(), SortSpec::default());
    assert_eq!(all.len(), report.rows.len());
}

#[tokio::test]
async fn test_sorted_session_report_by_cost() {
    let cheap = usage_line(
        "aaa",
        "2024-01-01T10:00:00Z",
        "claude-3-5-haiku-20241022",
        100,
        50,
        None,
    );
    let pricey = usage_line(
        "zzz",
        "2024-01-01T11:00:00Z",
        "claude-3-opus-20240229",
        100_000,
        50_000,
        None,
    );
    let tree = usage_tree(&[("proj", &[cheap.as_str(), pricey.as_str()])]);

    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let report = utc_aggregator()
        .aggregate(
            loader.load_usage_events(),
            ReportType::Session,
            CostMode::Auto,
        )
        .await
        .unwrap();

    let rows = filters::apply(
        report.rows,
        &FilterSpec::new(),
        SortSpec::new(SortKey::Cost, SortDirection::Desc),
    );
    assert_eq!(rows[0].bucket.to_string(), "zzz");
    assert_eq!(rows[1].bucket.to_string(), "aaa");
}

#[tokio::test]
async fn test_totals_conserve_tokens_across_report_types() {
    let lines: Vec<String> = (0..12)
        .map(|i| {
            usage_line(
                &format!("s{}", i % 3),
                &format!("2024-0{}-{:02}T{:02}:00:00Z", 1 + i % 2, 1 + i, (i * 2) % 24),
                "claude-3-opus-20240229",
                100 + i as u64,
                50,
                None,
            )
        })
        .collect();
    let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let tree = usage_tree(&[("proj", refs.as_slice())]);
    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let aggregator = utc_aggregator();

    let mut grand_totals = Vec::new();
    for report_type in [
        ReportType::Daily,
        ReportType::Weekly,
        ReportType::Monthly,
        ReportType::Session,
        ReportType::Blocks,
    ] {
        let report = aggregator
            .aggregate(loader.load_usage_events(), report_type, CostMode::Calculate)
            .await
            .unwrap();
        grand_totals.push(Totals::from_rows(&report.rows));
    }

    // every report type sums the same events, totals must agree
    for totals in &grand_totals[1..] {
        assert_eq!(totals.tokens, grand_totals[0].tokens);
        assert_eq!(totals.event_count, grand_totals[0].event_count);
        assert!((totals.total_cost - grand_totals[0].total_cost).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_unknown_model_costs_zero_with_warning() {
    let line = usage_line(
        "s1",
        "2024-01-01T10:00:00Z",
        "some-future-model",
        1000,
        500,
        None,
    );
    let tree = usage_tree(&[("proj", &[line.as_str()])]);

    let loader = DataLoader::new(vec![tree.path().to_path_buf()]).unwrap();
    let calculator = Arc::new(CostCalculator::new(PricingTable::embedded()));
    let aggregator = Aggregator::new(
        Arc::clone(&calculator),
        TimezoneConfig::from_cli(None, true).unwrap(),
    );

    let report = aggregator
        .aggregate(loader.load_usage_events(), ReportType::Daily, CostMode::Auto)
        .await
        .unwrap();

    assert_eq!(report.rows[0].total_cost, 0.0);
    assert_eq!(report.rows[0].tokens.input_tokens, 1000);
    assert!(
        calculator
            .warnings()
            .unknown_models
            .contains(&"some-future-model".to_string())
    );
}
