//! ccreport - Summarize Claude Code usage logs from local JSONL files
//!
//! This library provides functionality to:
//! - Discover and parse JSONL usage logs across configured directories
//! - Normalize raw records into usage events, collecting diagnostics for
//!   malformed lines instead of failing the run
//! - Calculate token costs from a bundled pricing table, honoring
//!   precomputed costs per the selected cost mode
//! - Aggregate events into daily, weekly, monthly, session and 5-hour
//!   block reports
//! - Filter and sort report rows, and export them as deterministic JSON
//!   or CSV
//!
//! # Examples
//!
//! ```no_run
//! use ccreport::{
//!     aggregation::{Aggregator, ReportType},
//!     data_loader::DataLoader,
//!     pricing::{CostCalculator, PricingTable},
//!     timezone::TimezoneConfig,
//!     types::CostMode,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ccreport::Result<()> {
//!     let loader = DataLoader::new(vec!["/home/me/.claude/projects".into()])?;
//!     let calculator = Arc::new(CostCalculator::new(PricingTable::embedded()));
//!     let aggregator = Aggregator::new(calculator, TimezoneConfig::default());
//!
//!     let events = loader.load_usage_events();
//!     let report = aggregator
//!         .aggregate(events, ReportType::Daily, CostMode::Auto)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod cli;
pub mod data_loader;
pub mod error;
pub mod export;
pub mod filters;
pub mod pricing;
pub mod timezone;
pub mod types;

// Re-export commonly used types
pub use error::{CcreportError, Result};
pub use types::{CostMode, DailyDate, ISOTimestamp, ModelName, ProjectId, SessionId, TokenCounts};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
