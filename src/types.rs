//! Core domain types for ccreport
//!
//! Strongly-typed wrappers for model names, session ids, project ids,
//! timestamps and token counts, plus the normalized [`UsageEvent`] that the
//! rest of the pipeline operates on.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Strongly-typed model name wrapper
///
/// # Examples
/// ```
/// use ccreport::types::ModelName;
///
/// let model = ModelName::new("claude-3-opus");
/// assert_eq!(model.as_str(), "claude-3-opus");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    /// Create a new ModelName from any string-like type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed session ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new SessionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strongly-typed project identifier
///
/// Derived from the directory that contains a log file, or from an explicit
/// record field when present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new ProjectId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO timestamp wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ISOTimestamp(DateTime<Utc>);

impl ISOTimestamp {
    /// Create a new ISOTimestamp
    pub fn new(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get the inner DateTime
    pub fn inner(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Convert to DailyDate in UTC
    pub fn to_daily_date(&self) -> DailyDate {
        DailyDate::new(self.0.date_naive())
    }

    /// Calendar date of this instant in the given timezone
    pub fn date_in(&self, tz: &Tz) -> NaiveDate {
        self.0.with_timezone(tz).date_naive()
    }
}

impl AsRef<DateTime<Utc>> for ISOTimestamp {
    fn as_ref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

/// Daily date for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyDate(NaiveDate);

impl DailyDate {
    /// Create a new DailyDate
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Get the inner NaiveDate
    pub fn inner(&self) -> &NaiveDate {
        &self.0
    }

    /// Calendar date of a timestamp in the given timezone
    pub fn from_timestamp_with_tz(ts: &ISOTimestamp, tz: &Tz) -> Self {
        Self(ts.date_in(tz))
    }

    /// Format with a chrono format string
    pub fn format(&self, fmt: &str) -> String {
        self.0.format(fmt).to_string()
    }
}

impl fmt::Display for DailyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Token counts for usage tracking
///
/// Tracks all four token categories billed separately: direct input and
/// output plus cache creation and cache read.
///
/// # Examples
/// ```
/// use ccreport::types::TokenCounts;
///
/// let tokens = TokenCounts::new(100, 50, 10, 5);
/// assert_eq!(tokens.total(), 165);
///
/// let more = TokenCounts::new(50, 25, 5, 2);
/// let combined = tokens + more;
/// assert_eq!(combined.input_tokens, 150);
/// ```
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenCounts {
    /// Input tokens used
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
    /// Cache creation tokens
    pub cache_creation_tokens: u64,
    /// Cache read tokens
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    /// Create new TokenCounts
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        cache_creation_tokens: u64,
        cache_read_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
        }
    }

    /// Total across all four categories
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

impl Add for TokenCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens + other.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens + other.cache_read_tokens,
        }
    }
}

impl AddAssign for TokenCounts {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

/// Cost calculation mode
///
/// Governs whether a per-event cost is trusted from the source record or
/// recomputed from token counts and the pricing table. The decision is made
/// independently per event; no state carries over between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Use pre-calculated costs when present and non-negative, else calculate
    Auto,
    /// Always calculate from tokens
    Calculate,
    /// Only trust pre-calculated costs; unknown cost reports as zero
    Display,
}

impl Default for CostMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Calculate => write!(f, "calculate"),
            Self::Display => write!(f, "display"),
        }
    }
}

impl std::str::FromStr for CostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "calculate" => Ok(Self::Calculate),
            "display" => Ok(Self::Display),
            _ => Err(format!("Invalid cost mode: {s}")),
        }
    }
}

/// One normalized usage event
///
/// The sole input of the aggregation engine. Produced by the data loader
/// from a raw JSONL line; downstream components never see raw records.
///
/// `timestamp` is `None` only for records whose timestamp string was present
/// but unparsable while a session id was available. Such events still count
/// toward session reports but are excluded from every date-keyed bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Session identifier
    pub session_id: SessionId,
    /// Timestamp of the usage, if it parsed to a valid instant
    pub timestamp: Option<ISOTimestamp>,
    /// Model used
    pub model: ModelName,
    /// Token counts
    #[serde(flatten)]
    pub tokens: TokenCounts,
    /// Pre-calculated cost in USD from the source record (optional)
    pub cost_usd: Option<f64>,
    /// Project the event belongs to (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
}

impl UsageEvent {
    /// Block start for this event: 5-hour slots aligned to midnight UTC
    ///
    /// Slots begin at 00:00, 05:00, 10:00, 15:00 and 20:00 UTC of each day,
    /// so the assignment is total and deterministic regardless of input
    /// order. Returns `None` when the event has no parseable timestamp.
    pub fn block_start(&self) -> Option<DateTime<Utc>> {
        use chrono::Timelike;
        let ts = self.timestamp?;
        let dt = ts.inner();
        let block_hour = dt.hour() / 5 * 5;
        dt.date_naive()
            .and_hms_opt(block_hour, 0, 0)
            .map(|naive| naive.and_utc())
    }
}
