//! Pricing table and cost resolution
//!
//! A [`PricingTable`] maps model identifiers to per-million-token rates for
//! the four token categories. It is loaded once per run (from a JSON file or
//! the embedded default) and treated as immutable for the duration of a
//! report computation; refreshing the table from the network is an external
//! concern.
//!
//! The [`CostCalculator`] resolves a per-event cost under one of three
//! modes. Unknown models resolve to a zero rate with a recorded warning
//! rather than failing the run, so logs written by newer tool versions keep
//! aggregating.

use crate::error::{CcreportError, Result};
use crate::types::{CostMode, ModelName, TokenCounts};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Embedded default pricing data
const EMBEDDED_PRICING: &str = include_str!("../embedded/pricing.json");

const TOKENS_PER_MTOK: f64 = 1_000_000.0;

/// Per-million-token rates for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    /// USD per million input tokens
    pub input_per_mtok: f64,
    /// USD per million output tokens
    pub output_per_mtok: f64,
    /// USD per million cache creation tokens
    pub cache_creation_per_mtok: f64,
    /// USD per million cache read tokens
    pub cache_read_per_mtok: f64,
}

/// Immutable mapping from model identifier to rates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    /// Table version or snapshot date
    pub version: String,
    /// Rates keyed by model identifier
    pub models: BTreeMap<String, ModelRates>,
}

impl PricingTable {
    /// The pricing table compiled into the binary
    pub fn embedded() -> Self {
        serde_json::from_str(EMBEDDED_PRICING).expect("embedded pricing data is valid JSON")
    }

    /// Load a pricing table from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CcreportError::PricingTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&data).map_err(|e| CcreportError::PricingTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Find rates for a model, with partial matching
    ///
    /// Exact match first, then a substring match in either direction so
    /// that e.g. "opus" resolves against "claude-3-opus-20240229" and a
    /// dated model id resolves against a family entry.
    pub fn rates_for(&self, model_name: &str) -> Option<&ModelRates> {
        if let Some(rates) = self.models.get(model_name) {
            return Some(rates);
        }

        for (key, rates) in &self.models {
            if key.contains(model_name) || model_name.contains(key) {
                debug!("Using rates for {} via partial match {}", model_name, key);
                return Some(rates);
            }
        }

        None
    }
}

/// Warnings accumulated while resolving costs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingWarnings {
    /// Models with no entry in the pricing table (resolved at zero rate)
    pub unknown_models: Vec<String>,
    /// Events with no pre-calculated cost in display mode (reported as zero)
    pub missing_precomputed: u64,
}

impl PricingWarnings {
    /// Whether any warning was recorded
    pub fn is_empty(&self) -> bool {
        self.unknown_models.is_empty() && self.missing_precomputed == 0
    }
}

/// Resolves per-event costs from token usage and pricing
///
/// The resolution is deterministic and stateless per event: the mode alone
/// decides whether a pre-calculated cost is trusted, and nothing is cached
/// between events.
pub struct CostCalculator {
    table: PricingTable,
    unknown_models: Mutex<BTreeSet<String>>,
    missing_precomputed: AtomicU64,
}

impl CostCalculator {
    /// Create a new CostCalculator over a pricing table
    pub fn new(table: PricingTable) -> Self {
        Self {
            table,
            unknown_models: Mutex::new(BTreeSet::new()),
            missing_precomputed: AtomicU64::new(0),
        }
    }

    /// The table this calculator resolves against
    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    /// Cost from token counts and rates
    pub fn cost_from_rates(tokens: &TokenCounts, rates: &ModelRates) -> f64 {
        tokens.input_tokens as f64 / TOKENS_PER_MTOK * rates.input_per_mtok
            + tokens.output_tokens as f64 / TOKENS_PER_MTOK * rates.output_per_mtok
            + tokens.cache_creation_tokens as f64 / TOKENS_PER_MTOK * rates.cache_creation_per_mtok
            + tokens.cache_read_tokens as f64 / TOKENS_PER_MTOK * rates.cache_read_per_mtok
    }

    /// Cost for token usage under the table rates
    ///
    /// Unknown models resolve to zero with a recorded warning.
    pub fn calculate_cost(&self, tokens: &TokenCounts, model_name: &ModelName) -> f64 {
        match self.table.rates_for(model_name.as_str()) {
            Some(rates) => Self::cost_from_rates(tokens, rates),
            None => {
                let mut unknown = self
                    .unknown_models
                    .lock()
                    .expect("unknown-model lock poisoned");
                if unknown.insert(model_name.as_str().to_string()) {
                    warn!("No pricing for model {}, using zero rate", model_name);
                }
                0.0
            }
        }
    }

    /// Resolve a cost under the given mode
    ///
    /// - `auto`: trust `pre_calculated` when present and non-negative,
    ///   otherwise fall back to calculation
    /// - `calculate`: always recompute from tokens
    /// - `display`: only trust `pre_calculated`; absent costs report as
    ///   zero and are counted in [`CostCalculator::warnings`]
    pub fn calculate_with_mode(
        &self,
        tokens: &TokenCounts,
        model_name: &ModelName,
        pre_calculated: Option<f64>,
        mode: CostMode,
    ) -> f64 {
        match mode {
            CostMode::Auto => match pre_calculated {
                Some(cost) if cost >= 0.0 => cost,
                _ => self.calculate_cost(tokens, model_name),
            },
            CostMode::Calculate => self.calculate_cost(tokens, model_name),
            CostMode::Display => pre_calculated.unwrap_or_else(|| {
                self.missing_precomputed.fetch_add(1, Ordering::Relaxed);
                0.0
            }),
        }
    }

    /// Snapshot of warnings recorded so far
    pub fn warnings(&self) -> PricingWarnings {
        PricingWarnings {
            unknown_models: self
                .unknown_models
                .lock()
                .expect("unknown-model lock poisoned")
                .iter()
                .cloned()
                .collect(),
            missing_precomputed: self.missing_precomputed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table() -> PricingTable {
        let mut models = BTreeMap::new();
        models.insert(
            "claude-3-opus".to_string(),
            ModelRates {
                input_per_mtok: 3.0,
                output_per_mtok: 15.0,
                cache_creation_per_mtok: 3.75,
                cache_read_per_mtok: 0.3,
            },
        );
        PricingTable {
            version: "test".to_string(),
            models,
        }
    }

    #[test]
    fn test_cost_calculation() {
        // 1000 input at $3/1M + 500 output at $15/1M = 0.003 + 0.0075
        let calc = CostCalculator::new(test_table());
        let tokens = TokenCounts::new(1000, 500, 0, 0);
        let cost = calc.calculate_cost(&tokens, &ModelName::new("claude-3-opus"));
        assert!((cost - 0.0105).abs() < 1e-12);
    }

    #[test]
    fn test_auto_mode_prefers_precomputed() {
        let calc = CostCalculator::new(test_table());
        let tokens = TokenCounts::new(1000, 500, 0, 0);

        let cost = calc.calculate_with_mode(
            &tokens,
            &ModelName::new("claude-3-opus"),
            Some(1.23),
            CostMode::Auto,
        );
        assert_eq!(cost, 1.23);

        // negative precomputed values are not trusted
        let cost = calc.calculate_with_mode(
            &tokens,
            &ModelName::new("claude-3-opus"),
            Some(-0.5),
            CostMode::Auto,
        );
        assert!((cost - 0.0105).abs() < 1e-12);

        // no precomputed value falls back to calculation
        let cost = calc.calculate_with_mode(
            &tokens,
            &ModelName::new("claude-3-opus"),
            None,
            CostMode::Auto,
        );
        assert!((cost - 0.0105).abs() < 1e-12);
    }

    #[test]
    fn test_calculate_mode_ignores_precomputed() {
        let calc = CostCalculator::new(test_table());
        let tokens = TokenCounts::new(1000, 500, 0, 0);
        let cost = calc.calculate_with_mode(
            &tokens,
            &ModelName::new("claude-3-opus"),
            Some(99.0),
            CostMode::Calculate,
        );
        assert!((cost - 0.0105).abs() < 1e-12);
    }

    #[test]
    fn test_display_mode_flags_missing_cost() {
        let calc = CostCalculator::new(test_table());
        let tokens = TokenCounts::new(1000, 500, 0, 0);

        let cost = calc.calculate_with_mode(
            &tokens,
            &ModelName::new("claude-3-opus"),
            None,
            CostMode::Display,
        );
        assert_eq!(cost, 0.0);
        assert_eq!(calc.warnings().missing_precomputed, 1);
    }

    #[test]
    fn test_unknown_model_zero_rate_with_warning() {
        let calc = CostCalculator::new(test_table());
        let tokens = TokenCounts::new(1000, 500, 0, 0);

        let cost = calc.calculate_cost(&tokens, &ModelName::new("future-model-x"));
        assert_eq!(cost, 0.0);
        assert_eq!(
            calc.warnings().unknown_models,
            vec!["future-model-x".to_string()]
        );
    }

    #[test]
    fn test_partial_model_match() {
        let table = test_table();
        assert!(table.rates_for("opus").is_some());
        assert!(table.rates_for("claude-3-opus-20240229").is_some());
        assert!(table.rates_for("gpt-4").is_none());
    }

    #[test]
    fn test_table_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rates.json");
        std::fs::write(&path, serde_json::to_string(&test_table()).unwrap()).unwrap();

        let table = PricingTable::from_file(&path).unwrap();
        assert_eq!(table.version, "test");
        assert_eq!(
            table.rates_for("claude-3-opus").unwrap().input_per_mtok,
            3.0
        );
    }

    #[test]
    fn test_from_file_errors_name_the_path() {
        let missing = PricingTable::from_file(Path::new("/nonexistent/rates.json")).unwrap_err();
        assert!(matches!(missing, CcreportError::PricingTable { .. }));
        assert!(missing.to_string().contains("/nonexistent/rates.json"));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();
        let broken = PricingTable::from_file(&path).unwrap_err();
        assert!(matches!(broken, CcreportError::PricingTable { .. }));
    }

    #[test]
    fn test_embedded_table_parses() {
        let table = PricingTable::embedded();
        assert!(!table.models.is_empty());
        assert!(table.rates_for("claude-3-opus-20240229").is_some());
    }
}
