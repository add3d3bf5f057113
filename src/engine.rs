//! Engine orchestration
//!
//! Composes the pipeline leaves-first: normalize → block → score (parallel
//! over blocks) → cluster → elect → assemble. All intermediate annotations
//! (`group_id`, scores, winners) live in vectors keyed by row index and are
//! joined into output tables at the end; the input table is never mutated.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::block::{build_blocks, BlockingMode};
use crate::cluster::{assign_groups, clusters_of, UnionFind};
use crate::config::{MatchConfig, PrecedenceMap, Rulebook};
use crate::normalize::MatchView;
use crate::score::{score_block, PairMatch, ScoreParams};
use crate::table::{Table, Value};
use crate::winner::{elect_cross, elect_single, WinningCriteria};
use crate::EngineError;

/// Business-key column required on every input table.
pub const CUST_ID_COLUMN: &str = "Cust_Id";
/// Source tag column required in cross-source mode.
pub const SOURCE_SYSTEM_COLUMN: &str = "Source_System";

/// Annotation column names added to duplicate/unique outputs.
pub const GROUP_ID_COLUMN: &str = "group_id";
pub const MATCH_PERCENTAGE_COLUMN: &str = "match_percentage";
pub const WINNER_COLUMN: &str = "winner";
pub const WINNER_SOURCE_COLUMN: &str = "winner_source";

/// Wall-clock milliseconds per pipeline phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseTimings {
    pub normalize_ms: u64,
    pub block_ms: u64,
    pub score_ms: u64,
    pub cluster_ms: u64,
    pub elect_ms: u64,
}

/// Statistics for one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub input_records: usize,
    pub final_records: usize,
    /// Total clusters, singletons included.
    pub cluster_count: usize,
    pub duplicate_clusters: usize,
    pub duplicate_records: usize,
    pub unique_records: usize,
    pub blocks: usize,
    pub blocking: Option<BlockingMode>,
    pub comparisons: u64,
    pub matched_pairs: usize,
    pub timings: PhaseTimings,
}

impl RunStats {
    fn empty(input_records: usize) -> Self {
        RunStats {
            input_records,
            final_records: 0,
            cluster_count: 0,
            duplicate_clusters: 0,
            duplicate_records: 0,
            unique_records: 0,
            blocks: 0,
            blocking: None,
            comparisons: 0,
            matched_pairs: 0,
            timings: PhaseTimings::default(),
        }
    }
}

/// Everything one run produces.
///
/// `duplicate_rows` and `unique_rows` carry score/group annotations;
/// `winner_rows` is the annotated winning subset of the duplicates;
/// `final_rows` is winners-then-uniques projected back onto the original
/// columns, each part preserving ascending input order.
#[derive(Debug)]
pub struct OutputBundle {
    pub final_rows: Table,
    pub winner_rows: Table,
    pub duplicate_rows: Table,
    pub unique_rows: Table,
    pub stats: RunStats,
}

#[derive(Clone, Copy)]
enum Mode<'a> {
    Single(WinningCriteria),
    Cross(&'a PrecedenceMap),
}

/// Single-source deduplication. The winning criterion comes from the
/// rulebook entry for `source_key` (default: latest transaction date).
pub fn deduplicate(
    table: &Table,
    config: &MatchConfig,
    rulebook: &Rulebook,
    source_key: &str,
) -> Result<OutputBundle, EngineError> {
    run(table, config, Mode::Single(rulebook.criterion_for(source_key)))
}

/// Cross-source deduplication; `table` must carry `Source_System` and the
/// winner of each cluster is the member with the lowest precedence number.
pub fn deduplicate_cross(
    table: &Table,
    config: &MatchConfig,
    precedence: &PrecedenceMap,
) -> Result<OutputBundle, EngineError> {
    run(table, config, Mode::Cross(precedence))
}

fn run(table: &Table, config: &MatchConfig, mode: Mode) -> Result<OutputBundle, EngineError> {
    let input_records = table.row_count();
    if input_records == 0 {
        tracing::info!("empty input table; emitting empty bundle");
        return Ok(empty_bundle(table));
    }

    let cust_col = table
        .column_index(CUST_ID_COLUMN)
        .ok_or_else(|| EngineError::MissingColumn(CUST_ID_COLUMN.into()))?;
    let source_col = match mode {
        Mode::Cross(_) => Some(
            table
                .column_index(SOURCE_SYSTEM_COLUMN)
                .ok_or_else(|| EngineError::MissingColumn(SOURCE_SYSTEM_COLUMN.into()))?,
        ),
        Mode::Single(_) => None,
    };

    let (fuzzy, exact) = resolve_match_columns(table, config)?;

    let mut timings = PhaseTimings::default();

    let started = Instant::now();
    let view = MatchView::build(table, &fuzzy, &exact);
    timings.normalize_ms = started.elapsed().as_millis() as u64;

    let started = Instant::now();
    let block_set = build_blocks(&view, config.max_block_size);
    timings.block_ms = started.elapsed().as_millis() as u64;

    let params = ScoreParams {
        fuzzy_thresholds: fuzzy.iter().map(|c| config.threshold_for(c)).collect(),
        overall_threshold: config.overall_threshold,
        length_slack: config.length_prefilter_slack,
    };

    let started = Instant::now();
    let (matches, comparisons) = score_blocks(&view, &params, &block_set.blocks, config.workers());
    timings.score_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        blocks = block_set.blocks.len(),
        comparisons,
        matched_pairs = matches.len(),
        "block scoring complete"
    );

    let started = Instant::now();
    let mut uf = UnionFind::new(input_records);
    for m in &matches {
        uf.union(m.a, m.b);
    }
    let groups = assign_groups(&mut uf);
    let clusters = clusters_of(&groups);
    timings.cluster_ms = started.elapsed().as_millis() as u64;

    // Advisory per-row scores: last writer wins across overlapping matches,
    // in the deterministic block-then-pair enumeration order.
    let mut match_pct = vec![0.0f64; input_records];
    let mut per_col: Vec<Vec<f64>> = vec![vec![0.0f64; input_records]; fuzzy.len()];
    for m in &matches {
        match_pct[m.a] = m.overall;
        match_pct[m.b] = m.overall;
        for (c, score) in m.per_column.iter().enumerate() {
            per_col[c][m.a] = *score;
            per_col[c][m.b] = *score;
        }
    }

    let dup_clusters: Vec<(u32, Vec<usize>)> = clusters
        .iter()
        .enumerate()
        .filter(|(_, members)| members.len() > 1)
        .map(|(i, members)| ((i + 1) as u32, members.clone()))
        .collect();

    let mut dup_rows: Vec<usize> = dup_clusters
        .iter()
        .flat_map(|(_, members)| members.iter().copied())
        .collect();
    dup_rows.sort_unstable();
    let unique_rows: Vec<usize> = {
        let mut dup_flag = vec![false; input_records];
        for &i in &dup_rows {
            dup_flag[i] = true;
        }
        (0..input_records).filter(|&i| !dup_flag[i]).collect()
    };

    let started = Instant::now();
    let election = match mode {
        Mode::Single(criteria) => elect_single(table, &dup_clusters, criteria),
        Mode::Cross(precedence) => {
            let col = source_col.expect("validated for cross mode");
            elect_cross(table, &dup_clusters, precedence, col)
        }
    };
    timings.elect_ms = started.elapsed().as_millis() as u64;

    // Winner annotation values, per duplicate group.
    let winner_ids: HashMap<u32, Value> = election
        .winner_of_group
        .iter()
        .map(|(&g, &row)| (g, table.row(row)[cust_col].clone()))
        .collect();
    let winner_sources: HashMap<u32, Value> = match source_col {
        Some(col) => election
            .winner_of_group
            .iter()
            .map(|(&g, &row)| (g, table.row(row)[col].clone()))
            .collect(),
        None => HashMap::new(),
    };

    // A duplicate row survives when it carries the elected identity: the
    // winner's Cust_Id in single mode, the winning source in cross mode.
    let survives = |row: usize| -> bool {
        let group = groups[row];
        match mode {
            Mode::Single(_) => winner_ids
                .get(&group)
                .is_some_and(|w| value_eq(w, &table.row(row)[cust_col])),
            Mode::Cross(_) => {
                let col = source_col.expect("validated for cross mode");
                winner_sources
                    .get(&group)
                    .is_some_and(|w| value_eq(w, &table.row(row)[col]))
            }
        }
    };
    let winner_rows_idx: Vec<usize> = dup_rows.iter().copied().filter(|&i| survives(i)).collect();

    let annotate = |indices: &[usize], with_winner: bool| -> Table {
        let mut out = table.select(indices);
        out.add_column(
            GROUP_ID_COLUMN,
            indices.iter().map(|&i| Value::Int(groups[i] as i64)).collect(),
        );
        out.add_column(
            MATCH_PERCENTAGE_COLUMN,
            indices.iter().map(|&i| Value::Float(match_pct[i])).collect(),
        );
        for (c, column) in fuzzy.iter().enumerate() {
            out.add_column(
                &format!("{column}_fuzzy_match_percentage"),
                indices.iter().map(|&i| Value::Float(per_col[c][i])).collect(),
            );
        }
        if with_winner {
            out.add_column(
                WINNER_COLUMN,
                indices
                    .iter()
                    .map(|&i| winner_ids.get(&groups[i]).cloned().unwrap_or(Value::Empty))
                    .collect(),
            );
            if matches!(mode, Mode::Cross(_)) {
                out.add_column(
                    WINNER_SOURCE_COLUMN,
                    indices
                        .iter()
                        .map(|&i| {
                            winner_sources.get(&groups[i]).cloned().unwrap_or(Value::Empty)
                        })
                        .collect(),
                );
            }
        }
        out
    };

    let duplicate_table = annotate(&dup_rows, true);
    let winner_table = annotate(&winner_rows_idx, true);
    let unique_table = annotate(&unique_rows, false);

    let mut final_order = winner_rows_idx.clone();
    final_order.extend(&unique_rows);
    let final_table = table.select(&final_order);

    let stats = RunStats {
        input_records,
        final_records: final_table.row_count(),
        cluster_count: clusters.len(),
        duplicate_clusters: dup_clusters.len(),
        duplicate_records: dup_rows.len(),
        unique_records: unique_rows.len(),
        blocks: block_set.blocks.len(),
        blocking: Some(block_set.mode),
        comparisons,
        matched_pairs: matches.len(),
        timings,
    };

    tracing::info!(
        input = stats.input_records,
        final_records = stats.final_records,
        clusters = stats.cluster_count,
        duplicates = stats.duplicate_records,
        "deduplication complete"
    );

    Ok(OutputBundle {
        final_rows: final_table,
        winner_rows: winner_table,
        duplicate_rows: duplicate_table,
        unique_rows: unique_table,
        stats,
    })
}

/// Keep only configured columns that exist; error when nothing is usable.
fn resolve_match_columns(
    table: &Table,
    config: &MatchConfig,
) -> Result<(Vec<String>, Vec<String>), EngineError> {
    let present = |names: &[String]| -> Vec<String> {
        names
            .iter()
            .filter(|c| table.has_column(c))
            .cloned()
            .collect()
    };
    let fuzzy = present(&config.fuzzy_columns);
    let exact = present(&config.exact_columns);

    for dropped in config.fuzzy_columns.iter().filter(|c| !table.has_column(c)) {
        tracing::warn!(column = %dropped, "configured fuzzy column not in table; ignoring");
    }
    for dropped in config.exact_columns.iter().filter(|c| !table.has_column(c)) {
        tracing::warn!(column = %dropped, "configured exact column not in table; ignoring");
    }

    if fuzzy.is_empty() && exact.is_empty() {
        return Err(EngineError::NoMatchColumns);
    }
    if fuzzy.is_empty() {
        tracing::warn!("no fuzzy columns resolved; exact-only configuration yields no duplicate pairs");
    }
    Ok((fuzzy, exact))
}

/// Score all blocks, in parallel when a worker pool is available and the
/// work is worth fanning out. Per-block results are folded in block order,
/// so the matched-pair stream is identical on both paths.
fn score_blocks(
    view: &MatchView,
    params: &ScoreParams,
    blocks: &[Vec<usize>],
    workers: usize,
) -> (Vec<PairMatch>, u64) {
    let sequential =
        |blocks: &[Vec<usize>]| -> Vec<(Vec<PairMatch>, u64)> {
            blocks.iter().map(|b| score_block(view, params, b)).collect()
        };

    let per_block: Vec<(Vec<PairMatch>, u64)> = if workers > 1 && blocks.len() > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| {
                blocks
                    .par_iter()
                    .map(|b| score_block(view, params, b))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "worker pool unavailable; falling back to sequential scoring");
                sequential(blocks)
            }
        }
    } else {
        sequential(blocks)
    };

    let mut matches = Vec::new();
    let mut comparisons = 0u64;
    for (block_matches, block_comparisons) in per_block {
        matches.extend(block_matches);
        comparisons += block_comparisons;
    }
    (matches, comparisons)
}

fn value_eq(a: &Value, b: &Value) -> bool {
    a == b || a.to_display() == b.to_display()
}

fn empty_bundle(table: &Table) -> OutputBundle {
    let empty = || Table::new(table.columns().iter().map(String::as_str));
    OutputBundle {
        final_rows: empty(),
        winner_rows: empty(),
        duplicate_rows: empty(),
        unique_rows: empty(),
        stats: RunStats::empty(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        let mut t = Table::new([
            "Cust_Id",
            "first_name",
            "last_name",
            "email",
            "Transaction Date",
        ]);
        for (id, first, last, email, date) in [
            (1, "Jon", "Doe", "a@x.com", "2024-01-01"),
            (2, "John", "Doe", "a@x.com", "2024-06-01"),
            (3, "Alice", "Roe", "b@x.com", "2024-02-01"),
        ] {
            t.push_row(vec![
                Value::Int(id),
                Value::Str(first.into()),
                Value::Str(last.into()),
                Value::Str(email.into()),
                Value::Str(date.into()),
            ]);
        }
        t
    }

    fn config() -> MatchConfig {
        let mut config = MatchConfig {
            fuzzy_columns: vec!["first_name".into(), "last_name".into()],
            exact_columns: vec!["email".into()],
            ..Default::default()
        };
        config.thresholds.insert("first_name".into(), 85.0);
        config.thresholds.insert("last_name".into(), 85.0);
        config
    }

    #[test]
    fn test_empty_table_empty_bundle() {
        let t = Table::new(["Cust_Id", "first_name"]);
        let bundle = deduplicate(&t, &config(), &Rulebook::default(), "src").unwrap();
        assert!(bundle.final_rows.is_empty());
        assert_eq!(bundle.stats.cluster_count, 0);
    }

    #[test]
    fn test_missing_cust_id_is_data_error() {
        let mut t = Table::new(["first_name", "last_name", "email"]);
        t.push_row(vec![
            Value::Str("A".into()),
            Value::Str("B".into()),
            Value::Str("c".into()),
        ]);
        let err = deduplicate(&t, &config(), &Rulebook::default(), "src").unwrap_err();
        assert!(matches!(err, EngineError::MissingColumn(ref c) if c == CUST_ID_COLUMN));
    }

    #[test]
    fn test_no_match_columns_is_config_error() {
        let t = people();
        let config = MatchConfig {
            fuzzy_columns: vec!["nope".into()],
            exact_columns: vec!["also_nope".into()],
            ..Default::default()
        };
        let err = deduplicate(&t, &config, &Rulebook::default(), "src").unwrap_err();
        assert!(matches!(err, EngineError::NoMatchColumns));
    }

    #[test]
    fn test_cross_requires_source_system() {
        let t = people();
        let err = deduplicate_cross(&t, &config(), &PrecedenceMap::default()).unwrap_err();
        assert!(matches!(err, EngineError::MissingColumn(ref c) if c == SOURCE_SYSTEM_COLUMN));
    }

    #[test]
    fn test_single_source_cluster_and_winner() {
        let bundle = deduplicate(&people(), &config(), &Rulebook::default(), "src").unwrap();
        // {1,2} cluster, winner 2 (latest date); 3 unique.
        assert_eq!(bundle.stats.duplicate_clusters, 1);
        assert_eq!(bundle.stats.duplicate_records, 2);
        assert_eq!(bundle.stats.unique_records, 1);
        assert_eq!(bundle.winner_rows.row_count(), 1);
        assert_eq!(bundle.winner_rows.get(0, "Cust_Id"), Some(&Value::Int(2)));
        assert_eq!(bundle.final_rows.row_count(), 2);
        // Winners before uniques, and no annotation columns on final rows.
        assert_eq!(bundle.final_rows.get(0, "Cust_Id"), Some(&Value::Int(2)));
        assert_eq!(bundle.final_rows.get(1, "Cust_Id"), Some(&Value::Int(3)));
        assert!(!bundle.final_rows.has_column(GROUP_ID_COLUMN));
    }

    #[test]
    fn test_annotations_present_on_duplicates() {
        let bundle = deduplicate(&people(), &config(), &Rulebook::default(), "src").unwrap();
        let dup = &bundle.duplicate_rows;
        for col in [
            GROUP_ID_COLUMN,
            MATCH_PERCENTAGE_COLUMN,
            "first_name_fuzzy_match_percentage",
            "last_name_fuzzy_match_percentage",
            WINNER_COLUMN,
        ] {
            assert!(dup.has_column(col), "missing {col}");
        }
        assert_eq!(dup.get(0, GROUP_ID_COLUMN), dup.get(1, GROUP_ID_COLUMN));
        match dup.get(0, MATCH_PERCENTAGE_COLUMN) {
            Some(Value::Float(p)) => assert!(*p >= 90.0),
            other => panic!("unexpected match_percentage: {:?}", other),
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mut seq_config = config();
        seq_config.parallelism = Some(1);
        let mut par_config = config();
        par_config.parallelism = Some(4);

        let rulebook = Rulebook::default();
        let sequential = deduplicate(&people(), &seq_config, &rulebook, "src").unwrap();
        let parallel = deduplicate(&people(), &par_config, &rulebook, "src").unwrap();

        assert_eq!(sequential.final_rows, parallel.final_rows);
        assert_eq!(sequential.duplicate_rows, parallel.duplicate_rows);
        assert_eq!(sequential.unique_rows, parallel.unique_rows);
    }
}
