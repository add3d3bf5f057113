//! Candidate-block construction
//!
//! Cuts the O(n²) comparison space down to within-block pairs. Keys are
//! coarse but discriminating: two rows that agree on the exact columns always
//! share an exact-key block, so that rule loses no true matches. The prefix
//! fallback is a heuristic and is logged when it is the active mode.

use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::MatchView;

/// Separator joining exact-column values into a block key.
pub const BLOCK_KEY_SEPARATOR: &str = "||";

/// Which blocking rule produced the blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// Keyed on the first (up to two) exact columns.
    ExactKey,
    /// Keyed on prefix + length bucket of the first fuzzy column.
    FuzzyPrefix,
    /// One block holding every row.
    SingleBlock,
}

/// The candidate blocks for a run. Only blocks of size ≥ 2 are kept;
/// rows appearing in no block are singletons by construction.
#[derive(Debug)]
pub struct BlockSet {
    pub blocks: Vec<Vec<usize>>,
    pub mode: BlockingMode,
}

impl BlockSet {
    /// Total within-block pair count (what the scorer will actually do).
    pub fn comparison_count(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| (b.len() as u64) * (b.len() as u64 - 1) / 2)
            .sum()
    }
}

/// Partition row indices into candidate blocks.
///
/// Rule order: exact-key when any exact column exists, else prefix blocking
/// on the first fuzzy column, else a single all-rows block. Oversize blocks
/// are split into contiguous slices of `max_block_size` (a recall-vs-latency
/// trade-off; the cap is caller-configurable).
pub fn build_blocks(view: &MatchView, max_block_size: usize) -> BlockSet {
    let rows = view.row_count();

    let (keyed, mode) = if !view.exact_columns().is_empty() {
        (exact_key_blocks(view, rows), BlockingMode::ExactKey)
    } else if !view.fuzzy_columns().is_empty() {
        tracing::warn!(
            column = %view.fuzzy_columns()[0],
            "no exact columns available; falling back to prefix blocking (may miss matches whose normalized prefixes differ)"
        );
        (prefix_blocks(view, rows), BlockingMode::FuzzyPrefix)
    } else {
        tracing::warn!("no blocking key available; comparing all rows in one block");
        (vec![(0..rows).collect()], BlockingMode::SingleBlock)
    };

    let blocks = split_oversize(keyed, max_block_size.max(2));

    tracing::debug!(
        mode = ?mode,
        blocks = blocks.len(),
        rows,
        "blocking complete"
    );

    BlockSet { blocks, mode }
}

/// Rule B1: key = first up-to-two exact columns joined by `||`.
fn exact_key_blocks(view: &MatchView, rows: usize) -> Vec<Vec<usize>> {
    let key_columns = view.exact_columns().len().min(2);
    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for row in 0..rows {
        let mut key = String::new();
        for col in 0..key_columns {
            if col > 0 {
                key.push_str(BLOCK_KEY_SEPARATOR);
            }
            key.push_str(view.exact_value(col, row));
        }
        push_keyed(&mut order, &mut by_key, key, row);
    }
    order
}

/// Rule B2: key = first 3 chars of the first fuzzy column + `_` + ⌊len/5⌋.
/// Values shorter than 3 chars are their own key.
fn prefix_blocks(view: &MatchView, rows: usize) -> Vec<Vec<usize>> {
    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for row in 0..rows {
        let value = view.fuzzy_value(0, row);
        let len = view.fuzzy_len(0, row) as usize;
        let key = if len >= 3 {
            let prefix: String = value.chars().take(3).collect();
            format!("{}_{}", prefix, len / 5)
        } else {
            value.to_string()
        };
        push_keyed(&mut order, &mut by_key, key, row);
    }
    order
}

fn push_keyed(
    order: &mut Vec<Vec<usize>>,
    by_key: &mut HashMap<String, usize>,
    key: String,
    row: usize,
) {
    // First-appearance ordering keeps the pair stream deterministic.
    let slot = *by_key.entry(key).or_insert_with(|| {
        order.push(Vec::new());
        order.len() - 1
    });
    order[slot].push(row);
}

/// Split blocks larger than the cap into contiguous slices; drop singletons.
fn split_oversize(keyed: Vec<Vec<usize>>, max_block_size: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    for block in keyed {
        if block.len() <= max_block_size {
            if block.len() > 1 {
                result.push(block);
            }
            continue;
        }
        for slice in block.chunks(max_block_size) {
            if slice.len() > 1 {
                result.push(slice.to_vec());
            }
        }
    }
    result
}
