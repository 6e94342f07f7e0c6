//! Row filtering and ordering
//!
//! Filtering and sorting run after aggregation on the finished rows, so a
//! filtered report is always a subset of an unfiltered run of the same
//! input. Both stages are pure: they never touch the loader or mutate row
//! contents.

use crate::aggregation::{AggregateRow, BucketKey};
use crate::error::{CcreportError, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;
use std::fmt;

/// Criteria for narrowing a report
///
/// An empty set for any criterion means no restriction on that axis; all
/// criteria that are set must match (AND semantics). Date bounds are
/// inclusive on both ends.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// Keep buckets dated on or after this day
    pub since: Option<NaiveDate>,
    /// Keep buckets dated on or before this day
    pub until: Option<NaiveDate>,
    /// Keep rows touching at least one of these projects
    pub projects: BTreeSet<String>,
    /// Keep rows touching at least one of these models
    pub models: BTreeSet<String>,
}

impl FilterSpec {
    /// A spec that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to buckets on or after `date`
    pub fn with_since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Restrict to buckets on or before `date`
    pub fn with_until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    /// Restrict to rows touching one of `projects`
    pub fn with_projects(mut self, projects: impl IntoIterator<Item = String>) -> Self {
        self.projects = projects.into_iter().collect();
        self
    }

    /// Restrict to rows touching one of `models`
    pub fn with_models(mut self, models: impl IntoIterator<Item = String>) -> Self {
        self.models = models.into_iter().collect();
        self
    }

    /// Whether the spec restricts anything at all
    pub fn is_unrestricted(&self) -> bool {
        self.since.is_none()
            && self.until.is_none()
            && self.projects.is_empty()
            && self.models.is_empty()
    }

    fn matches(&self, row: &AggregateRow) -> bool {
        if self.since.is_some() || self.until.is_some() {
            // Buckets without an inherent date (sessions) are judged by
            // their first event; a session that never produced a dated
            // event cannot match a date-bounded filter
            let date = match row_date(row) {
                Some(date) => date,
                None => return false,
            };
            if self.since.is_some_and(|since| date < since) {
                return false;
            }
            if self.until.is_some_and(|until| date > until) {
                return false;
            }
        }

        if !self.projects.is_empty()
            && !row.projects.iter().any(|p| self.projects.contains(p.as_str()))
        {
            return false;
        }

        if !self.models.is_empty()
            && !row.models_used.iter().any(|m| self.models.contains(m))
        {
            return false;
        }

        true
    }
}

/// Date used for filtering a row
fn row_date(row: &AggregateRow) -> Option<NaiveDate> {
    match &row.bucket {
        BucketKey::Session(_) => row.first_event.map(|ts| ts.date_naive()),
        other => other.date(),
    }
}

/// Field to order report rows by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    /// Natural bucket order (date, session id or block start)
    #[default]
    Bucket,
    /// Total cost in USD
    Cost,
    /// Total tokens across all categories
    Tokens,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket => write!(f, "bucket"),
            Self::Cost => write!(f, "cost"),
            Self::Tokens => write!(f, "tokens"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Asc,
    /// Largest first
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = CcreportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(CcreportError::InvalidArgument(format!(
                "invalid sort direction: {other} (expected asc or desc)"
            ))),
        }
    }
}

/// How to order report rows
#[derive(Debug, Clone, Copy, Default)]
pub struct SortSpec {
    /// Field to compare
    pub key: SortKey,
    /// Direction to order in
    pub direction: SortDirection,
}

impl SortSpec {
    /// Sort by `key` in `direction`
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

/// Filter rows, then order the survivors
///
/// The sort is stable, so rows comparing equal under the sort key keep
/// their bucket order. With a default [`FilterSpec`] and [`SortSpec`] the
/// rows pass through unchanged.
pub fn apply(rows: Vec<AggregateRow>, filter: &FilterSpec, sort: SortSpec) -> Vec<AggregateRow> {
    let mut rows: Vec<AggregateRow> = rows.into_iter().filter(|r| filter.matches(r)).collect();

    // Descending order inverts the comparison, not the sorted result;
    // reversing afterwards would flip rows with equal keys too.
    rows.sort_by(|a, b| {
        let ord = match sort.key {
            SortKey::Bucket => a.bucket.cmp(&b.bucket),
            SortKey::Cost => a
                .total_cost
                .partial_cmp(&b.total_cost)
                .unwrap_or(std::cmp::Ordering::Equal),
            SortKey::Tokens => a.total_tokens().cmp(&b.total_tokens()),
        };
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    rows
}

/// Parse a date filter value
///
/// Accepts `YYYY-MM-DD` for a single day and `YYYY-MM`, which expands to
/// the first of the month for a `since` bound and the last day of the
/// month for an `until` bound.
pub fn parse_date_filter(value: &str, is_until: bool) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    let first = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
        .map_err(|_| CcreportError::InvalidDate(value.to_string()))?;
    if !is_until {
        return Ok(first);
    }

    // last day of the month: first of the next month minus one day
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next_month
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| CcreportError::InvalidDate(value.to_string()))
}
