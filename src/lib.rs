//! # fuzzydup - Fuzzy Record Deduplication
//!
//! Finds near-duplicate records in tabular datasets and elects a single
//! surviving record per duplicate cluster.
//!
//! ## How it works
//!
//! - **Blocking**: candidate blocks keyed on exact columns (or a normalized
//!   prefix fallback) cut the O(n²) comparison space by orders of magnitude
//! - **Scored matching**: exact-column gate, length pre-filter, per-column
//!   fuzzy ratios, and an overall-mean threshold, short-circuiting cheapest
//!   check first
//! - **Clustering**: Union-Find over matched pairs with deterministic dense
//!   group ids
//! - **Survivorship**: rule-driven winner election per cluster, by source
//!   system rulebook (single-source) or precedence map (cross-source)
//!
//! Blocks are scored in parallel; the engine falls back to sequential
//! scoring with identical results when no worker pool is available.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fuzzydup::{deduplicate, MatchConfig, Rulebook};
//!
//! # fn main() -> anyhow::Result<()> {
//! let table = fuzzydup::io::read_table(std::path::Path::new("crm_batch.csv"))?;
//!
//! let config = MatchConfig {
//!     fuzzy_columns: vec!["first_name".into(), "last_name".into()],
//!     exact_columns: vec!["email".into()],
//!     ..Default::default()
//! };
//!
//! let bundle = deduplicate(&table, &config, &Rulebook::default(), "crm")?;
//! println!(
//!     "{} records in, {} out, {} duplicate clusters",
//!     bundle.stats.input_records,
//!     bundle.stats.final_records,
//!     bundle.stats.duplicate_clusters,
//! );
//! # Ok(())
//! # }
//! ```

// Public library API modules
pub mod block;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod io;
pub mod normalize;
pub mod registry;
pub mod score;
pub mod synth;
pub mod table;
pub mod winner;

pub use block::{build_blocks, BlockSet, BlockingMode};
pub use config::{MatchConfig, PrecedenceMap, Rulebook};
pub use engine::{
    deduplicate, deduplicate_cross, OutputBundle, PhaseTimings, RunStats, CUST_ID_COLUMN,
    SOURCE_SYSTEM_COLUMN,
};
pub use io::{source_key, source_system_from_path};
pub use registry::{OutputEntry, OutputRegistry};
pub use table::{Table, Value};
pub use winner::WinningCriteria;

/// Errors surfaced by the engine and the rulebook/precedence loaders.
///
/// Worker-pool failures are not here: they are recovered locally by the
/// sequential fallback and only logged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no usable matching columns: none of the configured fuzzy or exact columns exist in the table")]
    NoMatchColumns,
    #[error("required column `{0}` is missing")]
    MissingColumn(String),
    #[error("unknown winning criterion `{0}` (expected latest_transaction_date, earliest_transaction_date, or largest_name)")]
    UnknownCriterion(String),
}
