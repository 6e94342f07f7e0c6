//! Aggregation engine for summarizing usage events
//!
//! One [`Aggregator`] serves all five report types; they share the same
//! summation logic and differ only in the bucket key derived for each event.
//! This keeps the token and cost arithmetic from drifting between report
//! types.
//!
//! Daily, weekly, monthly and session reports fold the event stream in a
//! single pass with bounded memory. The blocks report is the exception: it
//! sorts events by timestamp before bucketing and therefore materializes
//! the full event set for the run.
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
//! # async fn example() -> ccreport::Result<()> {
//! let loader = DataLoader::new(vec!["/var/log/claude".into()])?;
//! let calculator = Arc::new(CostCalculator::new(PricingTable::embedded()));
//! let aggregator = Aggregator::new(calculator, TimezoneConfig::default());
//!
//! let events = loader.load_usage_events();
//! let report = aggregator
//!     .aggregate(events, ReportType::Daily, CostMode::Auto)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::pricing::CostCalculator;
use crate::timezone::TimezoneConfig;
use crate::types::{CostMode, DailyDate, ModelName, ProjectId, SessionId, TokenCounts, UsageEvent};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use futures::stream::{Stream, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Length of one billing block
pub const BLOCK_HOURS: i64 = 5;

/// The five supported report types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    /// One bucket per calendar date
    Daily,
    /// One bucket per week, keyed by the week-start date
    Weekly,
    /// One bucket per year-month
    Monthly,
    /// One bucket per session id
    Session,
    /// One bucket per 5-hour billing block
    Blocks,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Session => write!(f, "session"),
            Self::Blocks => write!(f, "blocks"),
        }
    }
}

/// Key identifying one bucket of a report
///
/// Key functions are total and deterministic, so ties never occur within a
/// report and no event contributes to two buckets of the same report type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BucketKey {
    /// Calendar date (daily report)
    Day(DailyDate),
    /// Week-start date (weekly report)
    Week(DailyDate),
    /// Year-month as YYYY-MM (monthly report)
    Month(String),
    /// Session id verbatim (session report)
    Session(SessionId),
    /// Block start timestamp (blocks report)
    Block(DateTime<Utc>),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(date) | Self::Week(date) => write!(f, "{date}"),
            Self::Month(month) => write!(f, "{month}"),
            Self::Session(id) => write!(f, "{id}"),
            Self::Block(start) => write!(f, "{}", start.format("%Y-%m-%dT%H:%M:%SZ")),
        }
    }
}

impl BucketKey {
    /// Representative calendar date of this bucket, if it has one
    ///
    /// Sessions have no inherent date; their date filtering goes through
    /// the row's first event timestamp instead.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Day(date) | Self::Week(date) => Some(*date.inner()),
            Self::Month(month) => NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok(),
            Self::Session(_) => None,
            Self::Block(start) => Some(start.date_naive()),
        }
    }
}

/// Token and cost share of one model within a bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelBreakdown {
    /// Tokens attributed to this model
    pub tokens: TokenCounts,
    /// Cost attributed to this model
    pub cost: f64,
}

/// One bucket of a report
///
/// Created fresh per aggregation run and never mutated after the run
/// completes. Token totals are exact sums of the contributing events.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Bucket identity
    pub bucket: BucketKey,
    /// Summed token counts
    pub tokens: TokenCounts,
    /// Summed cost in USD
    pub total_cost: f64,
    /// Unique models contributing to the bucket, sorted
    pub models_used: Vec<String>,
    /// Per-model token and cost shares; sums to the row totals
    pub model_breakdown: BTreeMap<ModelName, ModelBreakdown>,
    /// Number of contributing events
    pub event_count: u64,
    /// Projects the contributing events belong to
    pub projects: BTreeSet<ProjectId>,
    /// Distinct sessions contributing to the bucket
    pub session_count: u64,
    /// Earliest contributing event timestamp
    pub first_event: Option<DateTime<Utc>>,
    /// Latest contributing event timestamp
    pub last_event: Option<DateTime<Utc>>,
}

impl AggregateRow {
    /// Total tokens across all four categories
    pub fn total_tokens(&self) -> u64 {
        self.tokens.total()
    }

    /// Minutes between first and last contributing event
    pub fn duration_minutes(&self) -> f64 {
        match (self.first_event, self.last_event) {
            (Some(first), Some(last)) => (last - first).num_seconds() as f64 / 60.0,
            _ => 0.0,
        }
    }

    /// Block end time: start plus five hours (blocks report only)
    pub fn block_end(&self) -> Option<DateTime<Utc>> {
        match self.bucket {
            BucketKey::Block(start) => Some(start + Duration::hours(BLOCK_HOURS)),
            _ => None,
        }
    }
}

/// Accumulator for one bucket
#[derive(Debug, Default)]
struct BucketAccumulator {
    tokens: TokenCounts,
    cost: f64,
    per_model: BTreeMap<ModelName, ModelBreakdown>,
    projects: BTreeSet<ProjectId>,
    sessions: BTreeSet<SessionId>,
    first_event: Option<DateTime<Utc>>,
    last_event: Option<DateTime<Utc>>,
    count: u64,
}

impl BucketAccumulator {
    fn add_event(&mut self, event: &UsageEvent, calculated_cost: f64) {
        self.tokens += event.tokens;
        self.cost += calculated_cost;
        let share = self.per_model.entry(event.model.clone()).or_default();
        share.tokens += event.tokens;
        share.cost += calculated_cost;
        self.sessions.insert(event.session_id.clone());
        if let Some(project) = &event.project {
            self.projects.insert(project.clone());
        }

        if let Some(ts) = &event.timestamp {
            let instant = *ts.inner();
            if self.first_event.is_none_or(|first| instant < first) {
                self.first_event = Some(instant);
            }
            if self.last_event.is_none_or(|last| instant > last) {
                self.last_event = Some(instant);
            }
        }

        self.count += 1;
    }

    fn into_row(self, bucket: BucketKey) -> AggregateRow {
        AggregateRow {
            bucket,
            tokens: self.tokens,
            total_cost: self.cost,
            models_used: self.per_model.keys().map(|m| m.to_string()).collect(),
            model_breakdown: self.per_model,
            event_count: self.count,
            projects: self.projects,
            session_count: self.sessions.len() as u64,
            first_event: self.first_event,
            last_event: self.last_event,
        }
    }
}

/// Result of one aggregation run
#[derive(Debug, Clone)]
pub struct Report {
    /// Which report was computed
    pub report_type: ReportType,
    /// One row per distinct bucket, ascending bucket order
    pub rows: Vec<AggregateRow>,
    /// Events excluded from date-keyed buckets for lack of a parseable
    /// timestamp (always zero for session reports)
    pub events_without_timestamp: u64,
}

/// Totals across all rows of a report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    /// Summed token counts
    pub tokens: TokenCounts,
    /// Summed cost
    pub total_cost: f64,
    /// Summed event count
    pub event_count: u64,
}

impl Totals {
    /// Compute totals from report rows
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.tokens += row.tokens;
            totals.total_cost += row.total_cost;
            totals.event_count += row.event_count;
        }
        totals
    }
}

/// Main aggregation engine
pub struct Aggregator {
    cost_calculator: Arc<CostCalculator>,
    timezone: TimezoneConfig,
    week_start: Weekday,
}

impl Aggregator {
    /// Create a new Aggregator
    pub fn new(cost_calculator: Arc<CostCalculator>, timezone: TimezoneConfig) -> Self {
        Self {
            cost_calculator,
            timezone,
            week_start: Weekday::Mon,
        }
    }

    /// Set the day the week starts on (default Monday)
    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    /// The timezone used for date bucketing
    pub fn timezone(&self) -> &TimezoneConfig {
        &self.timezone
    }

    /// Aggregate an event stream into one report
    ///
    /// Input order is irrelevant for daily, weekly, monthly and session
    /// reports; block bucketing sorts by timestamp internally. Each
    /// invocation consumes the stream exactly once and owns its own bucket
    /// set, so independently obtained streams can be aggregated
    /// concurrently.
    pub async fn aggregate(
        &self,
        events: impl Stream<Item = Result<UsageEvent>>,
        report_type: ReportType,
        cost_mode: CostMode,
    ) -> Result<Report> {
        if report_type == ReportType::Blocks {
            return self.aggregate_blocks(events, cost_mode).await;
        }

        let mut buckets: BTreeMap<BucketKey, BucketAccumulator> = BTreeMap::new();
        let mut missing_timestamps = 0u64;

        tokio::pin!(events);
        while let Some(result) = events.next().await {
            let event = result?;

            let key = match self.bucket_key(&event, report_type) {
                Some(key) => key,
                None => {
                    // No parseable timestamp; date-keyed buckets cannot
                    // place the event, session buckets can
                    missing_timestamps += 1;
                    continue;
                }
            };

            let cost = self.cost_calculator.calculate_with_mode(
                &event.tokens,
                &event.model,
                event.cost_usd,
                cost_mode,
            );

            buckets.entry(key).or_default().add_event(&event, cost);
        }

        Ok(Report {
            report_type,
            rows: buckets
                .into_iter()
                .map(|(key, acc)| acc.into_row(key))
                .collect(),
            events_without_timestamp: missing_timestamps,
        })
    }

    /// Bucket key for an event, or None when the event cannot be placed
    fn bucket_key(&self, event: &UsageEvent, report_type: ReportType) -> Option<BucketKey> {
        match report_type {
            ReportType::Session => Some(BucketKey::Session(event.session_id.clone())),
            ReportType::Daily => {
                let ts = event.timestamp.as_ref()?;
                Some(BucketKey::Day(DailyDate::from_timestamp_with_tz(
                    ts,
                    &self.timezone.tz,
                )))
            }
            ReportType::Weekly => {
                let ts = event.timestamp.as_ref()?;
                let date = ts.date_in(&self.timezone.tz);
                Some(BucketKey::Week(DailyDate::new(week_start_of(
                    date,
                    self.week_start,
                ))))
            }
            ReportType::Monthly => {
                let ts = event.timestamp.as_ref()?;
                let date = ts.date_in(&self.timezone.tz);
                Some(BucketKey::Month(date.format("%Y-%m").to_string()))
            }
            ReportType::Blocks => event.block_start().map(BucketKey::Block),
        }
    }

    /// Aggregate into fixed 5-hour billing blocks
    ///
    /// Blocks are 5-hour slots aligned to midnight UTC, the same alignment
    /// the upstream billing cycle uses. Events are materialized and sorted
    /// by timestamp before bucketing so first/last activity per block is
    /// exact, which is why this report type alone cannot stream.
    async fn aggregate_blocks(
        &self,
        events: impl Stream<Item = Result<UsageEvent>>,
        cost_mode: CostMode,
    ) -> Result<Report> {
        let mut all_events = Vec::new();
        let mut missing_timestamps = 0u64;

        tokio::pin!(events);
        while let Some(result) = events.next().await {
            let event = result?;
            if event.timestamp.is_some() {
                all_events.push(event);
            } else {
                missing_timestamps += 1;
            }
        }

        all_events.sort_by_key(|e| e.timestamp);

        let mut buckets: BTreeMap<BucketKey, BucketAccumulator> = BTreeMap::new();
        for event in &all_events {
            let key = match event.block_start() {
                Some(start) => BucketKey::Block(start),
                None => continue,
            };

            let cost = self.cost_calculator.calculate_with_mode(
                &event.tokens,
                &event.model,
                event.cost_usd,
                cost_mode,
            );

            buckets.entry(key).or_default().add_event(event, cost);
        }

        Ok(Report {
            report_type: ReportType::Blocks,
            rows: buckets
                .into_iter()
                .map(|(key, acc)| acc.into_row(key))
                .collect(),
            events_without_timestamp: missing_timestamps,
        })
    }
}

/// Start of the week containing `date`, for a configurable week start day
pub fn week_start_of(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let days_since_start =
        (date.weekday().num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(days_since_start))
}
