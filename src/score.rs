//! Pairwise match scoring
//!
//! Decides match / no-match for an ordered pair inside a block, cheapest
//! check first: exact-column gate, then the length pre-filter, then the
//! per-column fuzzy ratio, then the overall mean. Pure function of the
//! normalized view and the thresholds, so workers can score blocks in any
//! order and still produce the same pair set.

use crate::normalize::MatchView;

/// Resolved thresholds for one run, aligned with the view's fuzzy columns.
#[derive(Debug, Clone)]
pub struct ScoreParams {
    /// Per-fuzzy-column minimum percent, same order as `MatchView::fuzzy_columns`.
    pub fuzzy_thresholds: Vec<f64>,
    /// Minimum mean of the per-column scores.
    pub overall_threshold: f64,
    /// Points subtracted from a column threshold for the length-ratio gate.
    pub length_slack: f64,
}

/// A matched pair with its overall and per-fuzzy-column scores.
#[derive(Debug, Clone)]
pub struct PairMatch {
    pub a: usize,
    pub b: usize,
    pub overall: f64,
    pub per_column: Vec<f64>,
}

/// Similarity ratio in [0, 100] between two normalized strings.
///
/// Equal strings short-circuit to 100 (so a threshold of 100 demands
/// post-normalization equality); an empty side scores 0 against a non-empty
/// one. Otherwise Jaro-Winkler, which tolerates the single-token name
/// variants this engine exists for (Jon/John, Katherine/Kathryn).
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(a, b) * 100.0
}

/// Score one pair. Returns `None` as soon as any gate fails.
pub fn score_pair(
    view: &MatchView,
    params: &ScoreParams,
    a: usize,
    b: usize,
) -> Option<PairMatch> {
    // Gate 1: every exact column must agree post-normalization.
    for col in 0..view.exact_columns().len() {
        if view.exact_value(col, a) != view.exact_value(col, b) {
            return None;
        }
    }

    // Gate 2: length pre-filter. A large length gap bounds the best possible
    // ratio, so skip the expensive comparison outright.
    for (col, threshold) in params.fuzzy_thresholds.iter().enumerate() {
        let len_a = view.fuzzy_len(col, a);
        let len_b = view.fuzzy_len(col, b);
        if len_a > 0 && len_b > 0 {
            let ratio = 100.0 * f64::from(len_a.min(len_b)) / f64::from(len_a.max(len_b));
            if ratio < threshold - params.length_slack {
                return None;
            }
        }
    }

    // Gate 3: per-column fuzzy scores, short-circuiting below threshold.
    let fuzzy_count = view.fuzzy_columns().len();
    let mut per_column = Vec::with_capacity(fuzzy_count);
    for (col, threshold) in params.fuzzy_thresholds.iter().enumerate() {
        let score = fuzzy_ratio(view.fuzzy_value(col, a), view.fuzzy_value(col, b));
        if score < *threshold {
            return None;
        }
        per_column.push(score);
    }

    // A pair with no fuzzy scores never matches (exact-only configurations
    // block together but are not declared duplicates).
    if per_column.is_empty() {
        return None;
    }

    // Gate 4: overall mean.
    let overall = per_column.iter().sum::<f64>() / per_column.len() as f64;
    if overall < params.overall_threshold {
        return None;
    }

    Some(PairMatch {
        a,
        b,
        overall,
        per_column,
    })
}

/// Score every pair inside a block. Returns the matches plus the number of
/// comparisons attempted (for run statistics).
pub fn score_block(
    view: &MatchView,
    params: &ScoreParams,
    indices: &[usize],
) -> (Vec<PairMatch>, u64) {
    let mut matches = Vec::new();
    let mut comparisons = 0u64;
    for (pos, &a) in indices.iter().enumerate() {
        for &b in &indices[pos + 1..] {
            comparisons += 1;
            if let Some(m) = score_pair(view, params, a, b) {
                matches.push(m);
            }
        }
    }
    (matches, comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Table, Value};

    fn view(rows: &[(&str, &str, &str)]) -> MatchView {
        let mut t = Table::new(["first_name", "last_name", "email"]);
        for (f, l, e) in rows {
            t.push_row(vec![
                Value::Str((*f).into()),
                Value::Str((*l).into()),
                Value::Str((*e).into()),
            ]);
        }
        MatchView::build(
            &t,
            &["first_name".into(), "last_name".into()],
            &["email".into()],
        )
    }

    fn params(fuzzy: &[f64], overall: f64) -> ScoreParams {
        ScoreParams {
            fuzzy_thresholds: fuzzy.to_vec(),
            overall_threshold: overall,
            length_slack: 20.0,
        }
    }

    #[test]
    fn test_exact_gate_rejects_differing_email() {
        let v = view(&[("Bob", "Smith", "a@x.com"), ("Bob", "Smith", "b@x.com")]);
        assert!(score_pair(&v, &params(&[85.0, 85.0], 90.0), 0, 1).is_none());
    }

    #[test]
    fn test_near_identical_names_match() {
        let v = view(&[("Jon", "Doe", "a@x.com"), ("John", "Doe", "a@x.com")]);
        let m = score_pair(&v, &params(&[85.0, 85.0], 90.0), 0, 1).expect("should match");
        assert!(m.overall >= 90.0);
        assert_eq!(m.per_column.len(), 2);
        assert!((m.per_column[1] - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_commutative() {
        let v = view(&[("Katherine", "K", "a"), ("Kathryn", "K", "a")]);
        let p = params(&[80.0, 80.0], 80.0);
        let ab = score_pair(&v, &p, 0, 1).expect("match");
        let ba = score_pair(&v, &p, 1, 0).expect("match");
        assert!((ab.overall - ba.overall).abs() < 1e-9);
        assert_eq!(ab.per_column.len(), ba.per_column.len());
    }

    #[test]
    fn test_length_prefilter_rejects_wide_gap() {
        // "AB" vs "ABCDEFGHIJ": length ratio 20 < 90 - 20.
        let v = view(&[("AB", "x", "a"), ("ABCDEFGHIJ", "x", "a")]);
        assert!(score_pair(&v, &params(&[90.0, 90.0], 90.0), 0, 1).is_none());
    }

    #[test]
    fn test_length_prefilter_spares_true_match() {
        // Katherine (9) vs Kathryn (7): ratio 77.8 >= 80 - 20, and the
        // fuzzy score clears the 80 threshold.
        let v = view(&[("Katherine", "K", "a"), ("Kathryn", "K", "a")]);
        let m = score_pair(&v, &params(&[80.0, 80.0], 80.0), 0, 1);
        assert!(m.is_some());
    }

    #[test]
    fn test_threshold_100_requires_equality() {
        let v = view(&[("Jon", "Doe", "a"), ("John", "Doe", "a")]);
        assert!(score_pair(&v, &params(&[100.0, 100.0], 90.0), 0, 1).is_none());

        let v = view(&[("Jon", "Doe", "a"), ("Jon", "Doe", "a")]);
        let m = score_pair(&v, &params(&[100.0, 100.0], 100.0), 0, 1).expect("equal rows");
        assert!((m.overall - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_zero_tolerates_empty_strings() {
        let v = view(&[("", "Doe", "a"), ("Anything", "Doe", "a")]);
        let p = params(&[0.0, 0.0], 0.0);
        // Must not panic; empty-vs-nonempty scores 0 which passes threshold 0.
        let m = score_pair(&v, &p, 0, 1).expect("threshold zero matches");
        assert!((m.per_column[0] - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_both_empty_column_scores_100() {
        let v = view(&[("", "Doe", "a"), ("", "Doe", "a")]);
        let m = score_pair(&v, &params(&[90.0, 90.0], 90.0), 0, 1).expect("empty==empty");
        assert!((m.per_column[0] - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_mean_gate() {
        // Per-column threshold low, overall high: borderline first name drags
        // the mean below the overall bar.
        let v = view(&[("Jon", "Doe", "a"), ("Jan", "Doe", "a")]);
        let per_col = params(&[70.0, 70.0], 95.0);
        assert!(score_pair(&v, &per_col, 0, 1).is_none());
    }

    #[test]
    fn test_score_block_counts_comparisons() {
        let v = view(&[
            ("Jon", "Doe", "a"),
            ("John", "Doe", "a"),
            ("Alice", "Roe", "a"),
        ]);
        let (matches, comparisons) = score_block(&v, &params(&[85.0, 85.0], 90.0), &[0, 1, 2]);
        assert_eq!(comparisons, 3);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].a, matches[0].b), (0, 1));
    }
}
