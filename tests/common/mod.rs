//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::{people_config, table};
//! ```

use fuzzydup::{MatchConfig, Table, Value};

/// Build a table of string cells; empty strings become `Value::Empty`.
pub fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    let mut t = Table::new(columns.iter().copied());
    for row in rows {
        t.push_row(
            row.iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Empty
                    } else {
                        Value::Str((*cell).to_string())
                    }
                })
                .collect(),
        );
    }
    t
}

/// Fuzzy first/last name at one threshold, exact email.
pub fn people_config(name_threshold: f64) -> MatchConfig {
    let mut config = MatchConfig {
        fuzzy_columns: vec!["first_name".into(), "last_name".into()],
        exact_columns: vec!["email".into()],
        ..Default::default()
    };
    config.thresholds.insert("first_name".into(), name_threshold);
    config.thresholds.insert("last_name".into(), name_threshold);
    config
}

/// Cust_Id column of a table, as display strings in row order.
pub fn cust_ids(t: &Table) -> Vec<String> {
    (0..t.row_count())
        .map(|i| t.get(i, "Cust_Id").map(|v| v.to_display()).unwrap_or_default())
        .collect()
}
