//! Winner election within duplicate clusters
//!
//! Picks exactly one surviving row per multi-row cluster. Single-source mode
//! applies the rulebook criterion for the source system; cross-source mode
//! joins rows against the precedence map and keeps the highest-precedence
//! (lowest number) source. Every criterion breaks ties on the lowest row
//! index, so repeated runs elect the same winner.

use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::PrecedenceMap;
use crate::normalize::canonical;
use crate::table::{Table, Value};

/// Transaction-date column aliases, searched in order.
pub const DATE_COLUMN_ALIASES: [&str; 6] = [
    "Transaction Date",
    "Transaction_Date",
    "transaction_date",
    "TransactionDate",
    "Date",
    "date",
];

/// Name column aliases for `largest_name`, searched in order.
pub const NAME_COLUMN_ALIASES: [&str; 6] = [
    "first_name",
    "First_Name",
    "firstName",
    "FirstName",
    "fname",
    "name",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Within-cluster survivorship rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinningCriteria {
    #[default]
    LatestTransactionDate,
    EarliestTransactionDate,
    LargestName,
}

impl WinningCriteria {
    /// Parse the rulebook spelling; `None` for unknown criteria.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "latest_transaction_date" => Some(Self::LatestTransactionDate),
            "earliest_transaction_date" => Some(Self::EarliestTransactionDate),
            "largest_name" => Some(Self::LargestName),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatestTransactionDate => "latest_transaction_date",
            Self::EarliestTransactionDate => "earliest_transaction_date",
            Self::LargestName => "largest_name",
        }
    }
}

impl std::fmt::Display for WinningCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elected winners: `group_id -> winning row index`.
#[derive(Debug, Default)]
pub struct Election {
    pub winner_of_group: HashMap<u32, usize>,
}

/// First present transaction-date column, by alias order.
pub fn resolve_date_column(table: &Table) -> Option<usize> {
    DATE_COLUMN_ALIASES
        .iter()
        .find_map(|name| table.column_index(name))
}

/// First present name column, by alias order.
pub fn resolve_name_column(table: &Table) -> Option<usize> {
    NAME_COLUMN_ALIASES
        .iter()
        .find_map(|name| table.column_index(name))
}

fn fallback_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).expect("static calendar date")
}

/// Parse a cell as a date. Bare four-digit years resolve to January 1st.
fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Str(s) => {
            let s = s.trim();
            for fmt in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt.date());
                }
            }
            for fmt in DATE_FORMATS {
                if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                    return Some(d);
                }
            }
            if s.len() == 4 {
                if let Ok(year) = s.parse::<i32>() {
                    return NaiveDate::from_ymd_opt(year, 1, 1);
                }
            }
            None
        }
        _ => None,
    }
}

/// Effective transaction date per row.
///
/// No date column at all synthesizes `2023-01-01 + row_index` days, which
/// keeps `latest`/`earliest` total but is a correctness hazard for real
/// survivorship decisions; both that and unparseable cells are warned.
pub fn effective_dates(table: &Table) -> Vec<NaiveDate> {
    match resolve_date_column(table) {
        Some(col) => {
            let mut unparseable = 0usize;
            let dates: Vec<NaiveDate> = table
                .rows()
                .iter()
                .map(|row| {
                    parse_date(&row[col]).unwrap_or_else(|| {
                        if !row[col].is_blank() {
                            unparseable += 1;
                        }
                        fallback_date()
                    })
                })
                .collect();
            if unparseable > 0 {
                tracing::warn!(
                    column = %table.columns()[col],
                    rows = unparseable,
                    "unparseable transaction dates defaulted to 2023-01-01"
                );
            }
            dates
        }
        None => {
            tracing::warn!(
                "no transaction date column found; synthesizing dates from row order (latest/earliest criteria will follow input order)"
            );
            let base = fallback_date();
            (0..table.row_count())
                .map(|i| base.checked_add_days(Days::new(i as u64)).unwrap_or(base))
                .collect()
        }
    }
}

/// Pick one row per cluster under a single-source criterion.
///
/// `dup_clusters` holds `(group_id, ascending member rows)` for clusters of
/// size > 1. `largest_name` without a usable name column degrades to
/// `latest_transaction_date`.
pub fn elect_single(
    table: &Table,
    dup_clusters: &[(u32, Vec<usize>)],
    criteria: WinningCriteria,
) -> Election {
    let criteria = match criteria {
        WinningCriteria::LargestName if resolve_name_column(table).is_none() => {
            tracing::warn!("no name column found; falling back to latest_transaction_date");
            WinningCriteria::LatestTransactionDate
        }
        other => other,
    };

    tracing::debug!(criteria = %criteria, clusters = dup_clusters.len(), "electing winners");

    match criteria {
        WinningCriteria::LatestTransactionDate => {
            let dates = effective_dates(table);
            elect_by(dup_clusters, |row| dates[row], |best, cand| cand > best)
        }
        WinningCriteria::EarliestTransactionDate => {
            let dates = effective_dates(table);
            elect_by(dup_clusters, |row| dates[row], |best, cand| cand < best)
        }
        WinningCriteria::LargestName => {
            let col = resolve_name_column(table).expect("checked above");
            let lengths: Vec<usize> = table
                .rows()
                .iter()
                .map(|row| canonical(&row[col]).chars().count())
                .collect();
            elect_by(dup_clusters, |row| lengths[row], |best, cand| cand > best)
        }
    }
}

/// Cross-source election: minimum precedence wins, ties to the lowest index.
pub fn elect_cross(
    table: &Table,
    dup_clusters: &[(u32, Vec<usize>)],
    precedence: &PrecedenceMap,
    source_col: usize,
) -> Election {
    let ranks: Vec<i64> = table
        .rows()
        .iter()
        .map(|row| precedence.precedence_for(row[source_col].to_display().trim()))
        .collect();
    elect_by(dup_clusters, |row| ranks[row], |best, cand| cand < best)
}

/// Shared selection loop. `better(best, candidate)` must be strict so that
/// scanning members in ascending order leaves ties with the lowest index.
fn elect_by<K: Copy>(
    dup_clusters: &[(u32, Vec<usize>)],
    key: impl Fn(usize) -> K,
    better: impl Fn(K, K) -> bool,
) -> Election {
    let mut election = Election::default();
    for (group, members) in dup_clusters {
        let mut iter = members.iter();
        let Some(&first) = iter.next() else { continue };
        let mut winner = first;
        let mut best = key(first);
        for &row in iter {
            let cand = key(row);
            if better(best, cand) {
                best = cand;
                winner = row;
            }
        }
        election.winner_of_group.insert(*group, winner);
    }
    election
}
