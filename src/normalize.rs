//! Matching-time normalization
//!
//! Builds the read-only [`MatchView`] the blocker and scorer work against:
//! every matching column canonicalized (missing → empty, trimmed, upper-cased)
//! and fuzzy-column lengths precomputed for the cheap length pre-filter.
//! Original table values are never mutated.

use crate::table::{Table, Value};

/// Canonical matching form of a single cell.
///
/// Idempotent: `canonical` of an already-canonical string is itself.
pub fn canonical(value: &Value) -> String {
    if value.is_blank() {
        return String::new();
    }
    value.to_display().trim().to_uppercase()
}

/// Normalized view of the matching columns, indexed `[column][row]`.
///
/// Shared read-only across scoring workers; built once per run.
#[derive(Debug)]
pub struct MatchView {
    fuzzy_columns: Vec<String>,
    exact_columns: Vec<String>,
    fuzzy: Vec<Vec<String>>,
    exact: Vec<Vec<String>>,
    lengths: Vec<Vec<u32>>,
    row_count: usize,
}

impl MatchView {
    /// Build the view for the given (already validated) column lists.
    pub fn build(table: &Table, fuzzy_columns: &[String], exact_columns: &[String]) -> Self {
        let rows = table.row_count();
        let normalize_column = |name: &String| -> Vec<String> {
            let idx = table
                .column_index(name)
                .expect("matching columns are validated before view construction");
            (0..rows)
                .map(|r| canonical(&table.row(r)[idx]))
                .collect()
        };

        let fuzzy: Vec<Vec<String>> = fuzzy_columns.iter().map(normalize_column).collect();
        let exact: Vec<Vec<String>> = exact_columns.iter().map(normalize_column).collect();
        let lengths = fuzzy
            .iter()
            .map(|col| col.iter().map(|v| v.chars().count() as u32).collect())
            .collect();

        MatchView {
            fuzzy_columns: fuzzy_columns.to_vec(),
            exact_columns: exact_columns.to_vec(),
            fuzzy,
            exact,
            lengths,
            row_count: rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn fuzzy_columns(&self) -> &[String] {
        &self.fuzzy_columns
    }

    pub fn exact_columns(&self) -> &[String] {
        &self.exact_columns
    }

    pub fn fuzzy_value(&self, column: usize, row: usize) -> &str {
        &self.fuzzy[column][row]
    }

    pub fn exact_value(&self, column: usize, row: usize) -> &str {
        &self.exact[column][row]
    }

    /// Precomputed char length of a fuzzy-column value.
    pub fn fuzzy_len(&self, column: usize, row: usize) -> u32 {
        self.lengths[column][row]
    }
}
