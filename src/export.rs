//! Deterministic report export
//!
//! Identical report rows always serialize to identical bytes: JSON object
//! keys are emitted in sorted order, model lists are sorted upstream, and
//! costs are rounded to six decimal places. No timestamps of the export
//! run itself appear in the output.

use crate::aggregation::{AggregateRow, BucketKey, Report, Totals};
use crate::error::{CcreportError, Result};
use serde_json::{Map, Value, json};
use std::fmt;
use std::path::Path;

/// Decimal places kept for exported costs
const COST_PRECISION: f64 = 1_000_000.0;

/// Supported export encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    /// Pretty-printed JSON document
    #[default]
    Json,
    /// Comma-separated values with a header row
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = CcreportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(CcreportError::InvalidArgument(format!(
                "invalid export format: {other} (expected json or csv)"
            ))),
        }
    }
}

/// Round a cost to six decimal places for export
fn round_cost(cost: f64) -> f64 {
    (cost * COST_PRECISION).round() / COST_PRECISION
}

/// Render a report in the requested format
pub fn render(report: &Report, rows: &[AggregateRow], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => render_json(report, rows),
        ExportFormat::Csv => Ok(render_csv(rows)),
    }
}

/// Render a report and write it to `path`
pub fn write_export(
    report: &Report,
    rows: &[AggregateRow],
    format: ExportFormat,
    path: &Path,
) -> Result<()> {
    let rendered = render(report, rows, format)?;
    std::fs::write(path, rendered).map_err(|source| CcreportError::ExportIo {
        path: path.to_path_buf(),
        source,
    })
}

fn render_json(report: &Report, rows: &[AggregateRow]) -> Result<String> {
    let totals = Totals::from_rows(rows);

    // serde_json's Map is a BTreeMap, so key order is sorted and stable
    let mut root = Map::new();
    root.insert(
        "report_type".to_string(),
        Value::String(report.report_type.to_string()),
    );
    root.insert(
        "rows".to_string(),
        Value::Array(rows.iter().map(row_to_json).collect()),
    );
    root.insert(
        "totals".to_string(),
        json!({
            "input_tokens": totals.tokens.input_tokens,
            "output_tokens": totals.tokens.output_tokens,
            "cache_creation_tokens": totals.tokens.cache_creation_tokens,
            "cache_read_tokens": totals.tokens.cache_read_tokens,
            "total_tokens": totals.tokens.total(),
            "total_cost": round_cost(totals.total_cost),
            "event_count": totals.event_count,
        }),
    );

    let mut out = serde_json::to_string_pretty(&Value::Object(root))?;
    out.push('\n');
    Ok(out)
}

fn row_to_json(row: &AggregateRow) -> Value {
    let mut obj = Map::new();
    obj.insert("bucket".to_string(), Value::String(row.bucket.to_string()));
    obj.insert("input_tokens".to_string(), row.tokens.input_tokens.into());
    obj.insert("output_tokens".to_string(), row.tokens.output_tokens.into());
    obj.insert(
        "cache_creation_tokens".to_string(),
        row.tokens.cache_creation_tokens.into(),
    );
    obj.insert(
        "cache_read_tokens".to_string(),
        row.tokens.cache_read_tokens.into(),
    );
    obj.insert("total_tokens".to_string(), row.total_tokens().into());
    obj.insert(
        "total_cost".to_string(),
        json!(round_cost(row.total_cost)),
    );
    obj.insert(
        "models_used".to_string(),
        Value::Array(
            row.models_used
                .iter()
                .map(|m| Value::String(m.clone()))
                .collect(),
        ),
    );
    let mut breakdown = Map::new();
    for (model, share) in &row.model_breakdown {
        breakdown.insert(
            model.to_string(),
            json!({
                "input_tokens": share.tokens.input_tokens,
                "output_tokens": share.tokens.output_tokens,
                "cache_creation_tokens": share.tokens.cache_creation_tokens,
                "cache_read_tokens": share.tokens.cache_read_tokens,
                "total_tokens": share.tokens.total(),
                "total_cost": round_cost(share.cost),
            }),
        );
    }
    obj.insert("model_breakdown".to_string(), Value::Object(breakdown));
    obj.insert("event_count".to_string(), row.event_count.into());
    obj.insert("session_count".to_string(), row.session_count.into());
    if matches!(row.bucket, BucketKey::Session(_)) {
        obj.insert(
            "duration_minutes".to_string(),
            json!(row.duration_minutes()),
        );
    }
    obj.insert(
        "projects".to_string(),
        Value::Array(
            row.projects
                .iter()
                .map(|p| Value::String(p.to_string()))
                .collect(),
        ),
    );
    if let Some(first) = row.first_event {
        obj.insert(
            "first_event".to_string(),
            Value::String(first.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
    }
    if let Some(last) = row.last_event {
        obj.insert(
            "last_event".to_string(),
            Value::String(last.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
    }
    if let Some(end) = row.block_end() {
        obj.insert(
            "block_end".to_string(),
            Value::String(end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
    }
    Value::Object(obj)
}

const CSV_HEADER: &str = "bucket,input_tokens,output_tokens,cache_creation_tokens,\
cache_read_tokens,total_tokens,total_cost,models_used,event_count,session_count";

fn render_csv(rows: &[AggregateRow]) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for row in rows {
        let models = row.models_used.join(";");
        let line = [
            csv_field(&row.bucket.to_string()),
            row.tokens.input_tokens.to_string(),
            row.tokens.output_tokens.to_string(),
            row.tokens.cache_creation_tokens.to_string(),
            row.tokens.cache_read_tokens.to_string(),
            row.total_tokens().to_string(),
            format!("{:.6}", row.total_cost),
            csv_field(&models),
            row.event_count.to_string(),
            row.session_count.to_string(),
        ]
        .join(",");
        out.push_str(&line);
        out.push('\n');
    }

    out
}

/// Quote a CSV field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
