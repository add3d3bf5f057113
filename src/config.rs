//! Run configuration: match settings, rulebook, precedence map
//!
//! `MatchConfig` is TOML-loadable with serde defaults so a config file only
//! needs to name the matching columns:
//!
//! ```toml
//! # match.toml
//! fuzzy_columns = ["first_name", "last_name"]
//! exact_columns = ["email"]
//! overall_threshold = 90.0
//!
//! [thresholds]
//! first_name = 85.0
//! ```
//!
//! The rulebook and precedence map load from any readable table (CSV or
//! XLSX) with `source_system` / `winning_criteria` and `source_system` /
//! `precedence` columns respectively.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::winner::WinningCriteria;
use crate::EngineError;

/// Default per-column fuzzy threshold (percent).
pub const DEFAULT_COLUMN_THRESHOLD: f64 = 90.0;
/// Default minimum for the mean of per-column scores.
pub const DEFAULT_OVERALL_THRESHOLD: f64 = 90.0;
/// Default block splitting cap.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1000;
/// Default points subtracted from a column threshold in the length gate.
pub const DEFAULT_LENGTH_SLACK: f64 = 20.0;
/// Precedence assigned to sources absent from the map (effectively last).
pub const PRECEDENCE_SENTINEL: i64 = 999;

/// Matching configuration for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Columns compared by fuzzy ratio, in order.
    pub fuzzy_columns: Vec<String>,
    /// Columns compared by post-normalization equality.
    pub exact_columns: Vec<String>,
    /// Per-column minimum percent; absent columns use 90.
    pub thresholds: HashMap<String, f64>,
    /// Minimum average of the per-column fuzzy scores.
    pub overall_threshold: f64,
    /// Blocks larger than this are split into contiguous slices.
    pub max_block_size: usize,
    /// Worker count; `None` means cores − 1 (min 1). `Some(1)` forces sequential.
    pub parallelism: Option<usize>,
    /// Slack for the length-ratio pre-filter, in points.
    pub length_prefilter_slack: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            fuzzy_columns: Vec::new(),
            exact_columns: Vec::new(),
            thresholds: HashMap::new(),
            overall_threshold: DEFAULT_OVERALL_THRESHOLD,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            parallelism: None,
            length_prefilter_slack: DEFAULT_LENGTH_SLACK,
        }
    }
}

impl MatchConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: MatchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(
            fuzzy = ?config.fuzzy_columns,
            exact = ?config.exact_columns,
            overall = config.overall_threshold,
            "Loaded match config"
        );
        Ok(config)
    }

    /// Threshold for one column (default 90).
    pub fn threshold_for(&self, column: &str) -> f64 {
        self.thresholds
            .get(column)
            .copied()
            .unwrap_or(DEFAULT_COLUMN_THRESHOLD)
    }

    /// Effective worker count: configured value, or cores − 1 with a floor of 1.
    pub fn workers(&self) -> usize {
        match self.parallelism {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1),
        }
    }
}

/// `source_system -> winning_criteria`; missing entries mean latest date.
#[derive(Debug, Clone, Default)]
pub struct Rulebook {
    rules: HashMap<String, WinningCriteria>,
}

impl Rulebook {
    pub fn insert(&mut self, source: &str, criteria: WinningCriteria) {
        self.rules.insert(source.trim().to_string(), criteria);
    }

    /// Criterion for a source system, defaulting to `latest_transaction_date`.
    pub fn criterion_for(&self, source: &str) -> WinningCriteria {
        match self.rules.get(source.trim()) {
            Some(c) => *c,
            None => {
                tracing::warn!(source, "source system not in rulebook; using default criteria");
                WinningCriteria::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build from a table with `source_system` and `winning_criteria` columns.
    ///
    /// An unrecognized criterion is a configuration error, not a silent
    /// fallback.
    pub fn from_table(table: &Table) -> Result<Self, EngineError> {
        let source_col = table
            .column_index("source_system")
            .ok_or_else(|| EngineError::MissingColumn("source_system".into()))?;
        let criteria_col = table
            .column_index("winning_criteria")
            .ok_or_else(|| EngineError::MissingColumn("winning_criteria".into()))?;

        let mut rulebook = Rulebook::default();
        for row in table.rows() {
            let source = row[source_col].to_display();
            let raw = row[criteria_col].to_display();
            let criteria = WinningCriteria::parse(&raw)
                .ok_or_else(|| EngineError::UnknownCriterion(raw.trim().to_string()))?;
            rulebook.insert(&source, criteria);
        }
        Ok(rulebook)
    }

    /// Load from a CSV or XLSX file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let table = crate::io::read_table(path)
            .with_context(|| format!("Failed to read rulebook {}", path.display()))?;
        Ok(Self::from_table(&table)?)
    }
}

/// `source_system -> precedence` (lower wins); missing entries rank last.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceMap {
    ranks: HashMap<String, i64>,
}

impl PrecedenceMap {
    pub fn insert(&mut self, source: &str, precedence: i64) {
        self.ranks.insert(source.trim().to_string(), precedence);
    }

    /// Rank for a source system; unknown sources get the 999 sentinel.
    pub fn precedence_for(&self, source: &str) -> i64 {
        self.ranks
            .get(source.trim())
            .copied()
            .unwrap_or(PRECEDENCE_SENTINEL)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Build from a table with `source_system` and `precedence` columns.
    pub fn from_table(table: &Table) -> Result<Self, EngineError> {
        let source_col = table
            .column_index("source_system")
            .ok_or_else(|| EngineError::MissingColumn("source_system".into()))?;
        let prec_col = table
            .column_index("precedence")
            .ok_or_else(|| EngineError::MissingColumn("precedence".into()))?;

        let mut map = PrecedenceMap::default();
        for row in table.rows() {
            let source = row[source_col].to_display();
            let rank = match &row[prec_col] {
                crate::table::Value::Int(i) => *i,
                crate::table::Value::Float(f) => *f as i64,
                other => other
                    .to_display()
                    .trim()
                    .parse::<i64>()
                    .unwrap_or(PRECEDENCE_SENTINEL),
            };
            map.insert(&source, rank);
        }
        Ok(map)
    }

    /// Load from a CSV or XLSX file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let table = crate::io::read_table(path)
            .with_context(|| format!("Failed to read precedence map {}", path.display()))?;
        Ok(Self::from_table(&table)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    #[test]
    fn test_config_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.overall_threshold, DEFAULT_OVERALL_THRESHOLD);
        assert_eq!(config.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
        assert_eq!(config.threshold_for("anything"), DEFAULT_COLUMN_THRESHOLD);
        assert!(config.workers() >= 1);
    }

    #[test]
    fn test_config_from_toml() {
        let config: MatchConfig = toml::from_str(
            r#"
fuzzy_columns = ["first_name", "last_name"]
exact_columns = ["email"]
overall_threshold = 85.0

[thresholds]
first_name = 80.0
"#,
        )
        .unwrap();
        assert_eq!(config.fuzzy_columns, vec!["first_name", "last_name"]);
        assert_eq!(config.threshold_for("first_name"), 80.0);
        assert_eq!(config.threshold_for("last_name"), DEFAULT_COLUMN_THRESHOLD);
        assert_eq!(config.overall_threshold, 85.0);
    }

    #[test]
    fn test_rulebook_default_criterion() {
        let rulebook = Rulebook::default();
        assert_eq!(
            rulebook.criterion_for("unknown"),
            WinningCriteria::LatestTransactionDate
        );
    }

    #[test]
    fn test_rulebook_from_table() {
        let mut t = Table::new(["source_system", "winning_criteria"]);
        t.push_row(vec![
            Value::Str("crm".into()),
            Value::Str("earliest_transaction_date".into()),
        ]);
        let rulebook = Rulebook::from_table(&t).unwrap();
        assert_eq!(
            rulebook.criterion_for("crm"),
            WinningCriteria::EarliestTransactionDate
        );
    }

    #[test]
    fn test_rulebook_rejects_unknown_criterion() {
        let mut t = Table::new(["source_system", "winning_criteria"]);
        t.push_row(vec![
            Value::Str("crm".into()),
            Value::Str("coin_flip".into()),
        ]);
        let err = Rulebook::from_table(&t).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCriterion(ref c) if c == "coin_flip"));
    }

    #[test]
    fn test_precedence_sentinel() {
        let mut map = PrecedenceMap::default();
        map.insert("A", 1);
        assert_eq!(map.precedence_for("A"), 1);
        assert_eq!(map.precedence_for("nope"), PRECEDENCE_SENTINEL);
    }

    #[test]
    fn test_precedence_from_table_parses_values() {
        let mut t = Table::new(["source_system", "precedence"]);
        t.push_row(vec![Value::Str("A".into()), Value::Int(1)]);
        t.push_row(vec![Value::Str("B".into()), Value::Str("2".into())]);
        t.push_row(vec![Value::Str("C".into()), Value::Str("junk".into())]);
        let map = PrecedenceMap::from_table(&t).unwrap();
        assert_eq!(map.precedence_for("A"), 1);
        assert_eq!(map.precedence_for("B"), 2);
        assert_eq!(map.precedence_for("C"), PRECEDENCE_SENTINEL);
    }
}
