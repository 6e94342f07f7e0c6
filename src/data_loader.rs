//! Data loader module for discovering and normalizing JSONL usage logs
//!
//! Walks the configured source roots for `.jsonl` files and streams
//! normalized [`UsageEvent`]s one line at a time, so memory stays bounded
//! regardless of log volume. Malformed lines are skipped and counted, never
//! fatal; the counts are available through [`DataLoader::stats`] after the
//! stream has been drained.
//!
//! A project id is derived from the directory containing each log file
//! (the directory layout groups logs by project) unless the record carries
//! an explicit `project` field.
//!
//! # Examples
//!
//! ```no_run
//! use ccreport::data_loader::DataLoader;
//! use futures::StreamExt;
//!
//! # async fn example() -> ccreport::Result<()> {
//! let loader = DataLoader::new(vec!["/var/log/claude".into()])?;
//!
//! let events = loader.load_usage_events();
//! tokio::pin!(events);
//! while let Some(result) = events.next().await {
//!     let event = result?;
//!     println!("Session: {}, Tokens: {}", event.session_id, event.tokens.total());
//! }
//! use std::sync::atomic::Ordering;
//! let skipped = loader.stats().skipped_lines.load(Ordering::Relaxed);
//! println!("skipped {skipped} malformed lines");
//! # Ok(())
//! # }
//! ```

use crate::error::{CcreportError, Result};
use crate::types::{ISOTimestamp, ModelName, ProjectId, SessionId, TokenCounts, UsageEvent};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use futures::stream::Stream;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Maximum number of rejection reasons retained for diagnostics
const MAX_REJECTION_SAMPLES: usize = 8;

/// Counters accumulated while streaming log lines
///
/// Shared between the loader and its streams; read it after a stream has
/// been fully consumed. A fresh stream resets nothing, so counters are
/// cumulative across scans from the same loader.
#[derive(Debug, Default)]
pub struct LoadStats {
    /// Total lines read (excluding blank lines)
    pub lines_read: AtomicU64,
    /// Events successfully normalized
    pub events_emitted: AtomicU64,
    /// Lines rejected as malformed
    pub skipped_lines: AtomicU64,
    /// Events kept for session reporting despite an unparsable timestamp
    pub invalid_timestamps: AtomicU64,
    /// Bounded sample of rejection reasons
    rejection_samples: std::sync::Mutex<Vec<String>>,
}

impl LoadStats {
    fn record_rejection(&self, reason: String) {
        self.skipped_lines.fetch_add(1, Ordering::Relaxed);
        let mut samples = self
            .rejection_samples
            .lock()
            .expect("rejection sample lock poisoned");
        if samples.len() < MAX_REJECTION_SAMPLES {
            samples.push(reason);
        }
    }

    /// Sample of rejection reasons seen so far (at most eight)
    pub fn rejection_samples(&self) -> Vec<String> {
        self.rejection_samples
            .lock()
            .expect("rejection sample lock poisoned")
            .clone()
    }
}

/// Why a raw line could not be normalized
enum Rejection {
    Unparsable(String),
    MissingTimestamp,
    UnparsableTimestamp(String),
    NegativeTokenCount,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparsable(e) => write!(f, "unparsable structure: {e}"),
            Self::MissingTimestamp => write!(f, "missing timestamp"),
            Self::UnparsableTimestamp(s) => write!(f, "unparsable timestamp: {s}"),
            Self::NegativeTokenCount => write!(f, "negative token count"),
        }
    }
}

/// Raw wire-format usage payload
///
/// Token counts arrive as signed integers so negative values can be
/// detected and rejected instead of silently wrapping.
#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    cache_creation_input_tokens: i64,
    #[serde(default)]
    cache_read_input_tokens: i64,
}

/// Raw wire-format record; unknown fields are ignored for forward
/// compatibility
#[derive(Debug, Deserialize)]
struct RawRecord {
    timestamp: Option<serde_json::Value>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    model: Option<String>,
    usage: Option<RawUsage>,
    #[serde(rename = "costUSD")]
    cost_usd: Option<f64>,
    project: Option<String>,
}

impl RawRecord {
    fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
        match value {
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
            serde_json::Value::Number(n) => {
                let secs = n.as_f64()?;
                Utc.timestamp_opt(secs as i64, 0).single()
            }
            _ => None,
        }
    }

    /// Normalize into a [`UsageEvent`], or explain why the line is rejected
    ///
    /// A record whose timestamp string fails to parse is *kept* with no
    /// timestamp when it carries an explicit session id: such events still
    /// feed session reports, which have no minimum timestamp requirement.
    fn normalize(self, fallback_project: Option<&ProjectId>) -> std::result::Result<UsageEvent, Rejection> {
        let timestamp = match &self.timestamp {
            None => return Err(Rejection::MissingTimestamp),
            Some(value) => match Self::parse_timestamp(value) {
                Some(dt) => Some(ISOTimestamp::new(dt)),
                None if self.session_id.is_some() => None,
                None => return Err(Rejection::UnparsableTimestamp(value.to_string())),
            },
        };

        let usage = self.usage.unwrap_or_default();
        if usage.input_tokens < 0
            || usage.output_tokens < 0
            || usage.cache_creation_input_tokens < 0
            || usage.cache_read_input_tokens < 0
        {
            return Err(Rejection::NegativeTokenCount);
        }

        let project = self
            .project
            .map(ProjectId::new)
            .or_else(|| fallback_project.cloned());

        Ok(UsageEvent {
            session_id: SessionId::new(self.session_id.unwrap_or_else(|| "unknown".to_string())),
            timestamp,
            model: ModelName::new(self.model.unwrap_or_else(|| "unknown".to_string())),
            tokens: TokenCounts::new(
                usage.input_tokens as u64,
                usage.output_tokens as u64,
                usage.cache_creation_input_tokens as u64,
                usage.cache_read_input_tokens as u64,
            ),
            cost_usd: self.cost_usd,
            project,
        })
    }
}

/// Data loader for discovering and streaming JSONL usage logs
pub struct DataLoader {
    /// Readable source roots
    source_roots: Vec<PathBuf>,
    /// Shared diagnostics counters
    stats: Arc<LoadStats>,
}

impl DataLoader {
    /// Create a new DataLoader over the given source roots
    ///
    /// # Errors
    ///
    /// Returns [`CcreportError::SourceUnavailable`] when none of the
    /// configured roots exists; a run cannot proceed without at least one
    /// readable source.
    pub fn new(roots: Vec<PathBuf>) -> Result<Self> {
        let source_roots: Vec<PathBuf> = roots.iter().filter(|p| p.is_dir()).cloned().collect();
        if source_roots.is_empty() {
            return Err(CcreportError::SourceUnavailable(roots));
        }

        debug!("Using {} usage-log source roots", source_roots.len());
        Ok(Self {
            source_roots,
            stats: Arc::new(LoadStats::default()),
        })
    }

    /// Diagnostics accumulated by streams from this loader
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// The configured source roots
    pub fn paths(&self) -> &[PathBuf] {
        &self.source_roots
    }

    /// Find all JSONL files under the source roots
    ///
    /// The result is sorted so every scan visits files in the same order,
    /// which keeps downstream output deterministic.
    pub fn find_jsonl_files(&self) -> Vec<PathBuf> {
        let mut jsonl_files = Vec::new();

        for base_path in &self.source_roots {
            for entry in walkdir::WalkDir::new(base_path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                    jsonl_files.push(path.to_path_buf());
                }
            }
        }

        jsonl_files.sort();
        debug!("Found {} JSONL files", jsonl_files.len());
        jsonl_files
    }

    /// Load usage events as an async stream
    ///
    /// The stream is lazy and restartable: each call re-scans the source
    /// roots and reads files one line at a time. Dropping the stream
    /// abandons the scan with nothing to clean up.
    pub fn load_usage_events(&self) -> impl Stream<Item = Result<UsageEvent>> + '_ {
        let stats = Arc::clone(&self.stats);
        async_stream::stream! {
            for file_path in self.find_jsonl_files() {
                let project = project_from_path(&file_path);
                let entries = Self::parse_jsonl_stream(file_path, project, Arc::clone(&stats));
                tokio::pin!(entries);
                while let Some(result) = entries.next().await {
                    yield result;
                }
            }
        }
    }

    /// Parse a single JSONL file as a stream of normalized events
    fn parse_jsonl_stream(
        path: PathBuf,
        project: Option<ProjectId>,
        stats: Arc<LoadStats>,
    ) -> impl Stream<Item = Result<UsageEvent>> {
        async_stream::stream! {
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    // Unreadable file, not a malformed record; surface it
                    yield Err(e.into());
                    return;
                }
            };

            let reader = BufReader::new(file);
            let mut lines = reader.lines();
            let mut line_number = 0u64;

            while let Ok(Some(line)) = lines.next_line().await {
                line_number += 1;

                if line.trim().is_empty() {
                    continue;
                }
                stats.lines_read.fetch_add(1, Ordering::Relaxed);

                let raw: RawRecord = match serde_json::from_str(&line) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(
                            "Skipping line {} in {}: {}",
                            line_number,
                            path.display(),
                            e
                        );
                        stats.record_rejection(format!(
                            "{}:{}: {}",
                            path.display(),
                            line_number,
                            Rejection::Unparsable(e.to_string())
                        ));
                        continue;
                    }
                };

                match raw.normalize(project.as_ref()) {
                    Ok(event) => {
                        if event.timestamp.is_none() {
                            stats.invalid_timestamps.fetch_add(1, Ordering::Relaxed);
                        }
                        stats.events_emitted.fetch_add(1, Ordering::Relaxed);
                        yield Ok(event);
                    }
                    Err(rejection) => {
                        warn!(
                            "Skipping line {} in {}: {}",
                            line_number,
                            path.display(),
                            rejection
                        );
                        stats.record_rejection(format!(
                            "{}:{}: {}",
                            path.display(),
                            line_number,
                            rejection
                        ));
                    }
                }
            }
        }
    }
}

/// Project id for a log file: the name of its containing directory
fn project_from_path(path: &Path) -> Option<ProjectId> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(ProjectId::new)
}

/// Distinct project ids present in a materialized event list, sorted
pub fn known_projects(events: &[UsageEvent]) -> Vec<ProjectId> {
    events
        .iter()
        .filter_map(|e| e.project.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct model names present in a materialized event list, sorted
pub fn known_models(events: &[UsageEvent]) -> Vec<ModelName> {
    events
        .iter()
        .map(|e| e.model.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
}
