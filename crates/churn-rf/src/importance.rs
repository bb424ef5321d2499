//! Feature importance aggregation across trees.

use serde::{Deserialize, Serialize};

/// A ranked feature with name, importance score, and rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub name: String,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Sum per-tree importances, normalize, and rank descending.
///
/// Ties keep column order, so ranking is stable across runs.
pub(crate) fn aggregate_importances(per_tree: &[Vec<f64>], names: &[String]) -> Vec<RankedFeature> {
    let mut totals = vec![0.0f64; names.len()];
    for tree_importances in per_tree {
        for (total, value) in totals.iter_mut().zip(tree_importances) {
            *total += value;
        }
    }
    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|v| *v /= sum);
    }

    let mut ranked: Vec<RankedFeature> = names
        .iter()
        .zip(totals)
        .map(|(name, importance)| RankedFeature {
            name: name.clone(),
            importance,
            rank: 0,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, feature) in ranked.iter_mut().enumerate() {
        feature.rank = i + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::aggregate_importances;

    #[test]
    fn ranks_by_summed_importance() {
        let names: Vec<String> = ["gender", "tenure", "Contract"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let per_tree = vec![vec![0.0, 0.75, 0.25], vec![0.0, 0.25, 0.75], vec![0.1, 0.6, 0.3]];
        let ranked = aggregate_importances(&per_tree, &names);
        assert_eq!(ranked[0].name, "tenure");
        assert_eq!(ranked[1].name, "Contract");
        assert_eq!(ranked[2].rank, 3);
        let total: f64 = ranked.iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_trees_gives_zero_importances() {
        let ranked = aggregate_importances(&[], &["tenure".to_string()]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].importance, 0.0);
    }
}
