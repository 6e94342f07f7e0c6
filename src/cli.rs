//! Command-line interface for ccreport
//!
//! Flat subcommand structure: `ccreport <report> [flags]`, one subcommand
//! per report type. Filtering, cost mode, timezone and export flags are
//! global so they work the same way on every report.
//!
//! # Example
//!
//! ```bash
//! # Daily usage for January 2024, costs always recomputed
//! ccreport daily --since 2024-01-01 --until 2024-01-31 --mode calculate
//!
//! # Weekly report with weeks starting on Sunday, exported as CSV
//! ccreport weekly --start-of-week sunday --format csv --output usage.csv
//!
//! # 5-hour billing blocks for one project
//! ccreport blocks --project my-app
//! ```

use crate::error::{CcreportError, Result};
use crate::export::ExportFormat;
use crate::filters::{SortDirection, SortKey};
use crate::types::CostMode;
use chrono::Weekday;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Summarize Claude Code usage logs
#[derive(Parser, Debug, Clone)]
#[command(name = "ccreport")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show informational output (default is quiet mode with only warnings and errors)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Cost calculation mode
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub mode: CostMode,

    /// Filter by start date (YYYY-MM-DD or YYYY-MM)
    #[arg(long, global = true)]
    pub since: Option<String>,

    /// Filter by end date (YYYY-MM-DD or YYYY-MM)
    #[arg(long, global = true)]
    pub until: Option<String>,

    /// Filter by project name (repeatable)
    #[arg(long, short = 'p', global = true)]
    pub project: Vec<String>,

    /// Filter by model name (repeatable)
    #[arg(long, short = 'm', global = true)]
    pub model: Vec<String>,

    /// Field to sort rows by
    #[arg(long, value_enum, default_value = "bucket", global = true)]
    pub sort_by: SortKey,

    /// Sort direction
    #[arg(long, value_enum, default_value = "asc", global = true)]
    pub order: SortDirection,

    /// Timezone for date grouping (e.g. "America/New_York", "Asia/Tokyo", "UTC")
    /// If not specified, uses the system's local timezone
    #[arg(long, short = 'z', global = true)]
    pub timezone: Option<String>,

    /// Use UTC for date grouping (overrides --timezone)
    #[arg(long, global = true)]
    pub utc: bool,

    /// Export format
    #[arg(long, short = 'f', value_enum, default_value = "json", global = true)]
    pub format: ExportFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    /// Usage log directory (repeatable; defaults to the Claude data directories)
    #[arg(long, global = true)]
    pub source: Vec<PathBuf>,

    /// Pricing table JSON file (defaults to the bundled table)
    #[arg(long, global = true)]
    pub pricing_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Arguments for the weekly report
#[derive(Args, Debug, Clone)]
pub struct WeeklyArgs {
    /// Day to start the week (default: monday)
    #[arg(long, default_value = "monday")]
    pub start_of_week: String,
}

/// Available report subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show daily usage summary
    Daily,
    /// Show weekly usage summary
    Weekly(WeeklyArgs),
    /// Show monthly usage summary
    Monthly,
    /// Show session-based usage
    Session,
    /// Show 5-hour billing blocks
    Blocks,
}

impl Cli {
    /// Source directories to scan, falling back to the default Claude
    /// data locations when none are given
    pub fn resolved_sources(&self) -> Vec<PathBuf> {
        if !self.source.is_empty() {
            return self.source.clone();
        }
        default_sources()
    }
}

/// Default usage log locations, newest layout first
pub fn default_sources() -> Vec<PathBuf> {
    let mut sources = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sources.push(home.join(".claude").join("projects"));
        sources.push(home.join(".config").join("claude").join("projects"));
    }
    sources
}

/// Parse a week start day name ("monday", "sun", ...)
pub fn parse_week_start(value: &str) -> Result<Weekday> {
    value.parse::<Weekday>().map_err(|_| {
        CcreportError::InvalidArgument(format!(
            "invalid start of week '{value}', expected a day name like monday"
        ))
    })
}
