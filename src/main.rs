//! ccreport - Summarize Claude Code usage logs from local JSONL files

use ccreport::{
    aggregation::{Aggregator, ReportType},
    cli::{Cli, Command, parse_week_start},
    data_loader::DataLoader,
    error::Result,
    export::{render, write_export},
    filters::{self, FilterSpec, SortSpec, parse_date_filter},
    pricing::{CostCalculator, PricingTable},
    timezone::TimezoneConfig,
};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. RUST_LOG overrides the --verbose default.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            tracing_subscriber::EnvFilter::new("ccreport=info")
        } else {
            tracing_subscriber::EnvFilter::new("warn")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let report_type = match &cli.command {
        Command::Daily => ReportType::Daily,
        Command::Weekly(_) => ReportType::Weekly,
        Command::Monthly => ReportType::Monthly,
        Command::Session => ReportType::Session,
        Command::Blocks => ReportType::Blocks,
    };
    info!("Running {report_type} usage report");

    let tz_config = TimezoneConfig::from_cli(cli.timezone.as_deref(), cli.utc)?;
    info!("Using timezone: {}", tz_config.display_name());

    let loader = DataLoader::new(cli.resolved_sources())?;
    let pricing_table = match &cli.pricing_file {
        Some(path) => PricingTable::from_file(path)?,
        None => PricingTable::embedded(),
    };
    let cost_calculator = Arc::new(CostCalculator::new(pricing_table));
    let mut aggregator = Aggregator::new(Arc::clone(&cost_calculator), tz_config);
    if let Command::Weekly(args) = &cli.command {
        aggregator = aggregator.with_week_start(parse_week_start(&args.start_of_week)?);
    }

    let mut filter = FilterSpec::new()
        .with_projects(cli.project.iter().cloned())
        .with_models(cli.model.iter().cloned());
    if let Some(since) = &cli.since {
        filter = filter.with_since(parse_date_filter(since, false)?);
    }
    if let Some(until) = &cli.until {
        filter = filter.with_until(parse_date_filter(until, true)?);
    }
    let sort = SortSpec::new(cli.sort_by, cli.order);

    let events = loader.load_usage_events();
    let report = aggregator.aggregate(events, report_type, cli.mode).await?;
    let rows = filters::apply(report.rows.clone(), &filter, sort);

    match &cli.output {
        Some(path) => {
            write_export(&report, &rows, cli.format, path)?;
            info!("Report written to {}", path.display());
        }
        None => print!("{}", render(&report, &rows, cli.format)?),
    }

    report_diagnostics(&loader, &report, &cost_calculator);

    Ok(())
}

/// Surface data quality problems without failing the run
fn report_diagnostics(
    loader: &DataLoader,
    report: &ccreport::aggregation::Report,
    cost_calculator: &CostCalculator,
) {
    let stats = loader.stats();
    let skipped = stats.skipped_lines.load(Ordering::Relaxed);
    if skipped > 0 {
        warn!(
            "Skipped {skipped} malformed line(s) out of {} read",
            stats.lines_read.load(Ordering::Relaxed)
        );
        for sample in stats.rejection_samples() {
            warn!("  {sample}");
        }
    }

    let invalid_timestamps = stats.invalid_timestamps.load(Ordering::Relaxed);
    if invalid_timestamps > 0 {
        warn!("{invalid_timestamps} event(s) carried an unparseable timestamp");
    }
    if report.events_without_timestamp > 0 {
        warn!(
            "{} event(s) without a usable timestamp were excluded from {} buckets",
            report.events_without_timestamp, report.report_type
        );
    }

    let warnings = cost_calculator.warnings();
    for model in &warnings.unknown_models {
        warn!("No pricing for model '{model}', its events cost $0.00");
    }
    if warnings.missing_precomputed > 0 {
        warn!(
            "{} event(s) had no precomputed cost in display mode",
            warnings.missing_precomputed
        );
    }
}
