use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// An empty node is pure.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let proportions = class_counts.iter().map(|&c| c as f64 / n);
        let value = match self {
            SplitCriterion::Gini => 1.0 - proportions.map(|p| p * p).sum::<f64>(),
            SplitCriterion::Entropy => -proportions
                .filter(|&p| p > 0.0)
                .map(|p| p * p.ln())
                .sum::<f64>(),
        };
        Impurity::new(value)
    }
}

/// Column-major view of the training data shared by every node of one tree.
pub(crate) struct SplitContext<'a> {
    /// `columns[feature_idx][sample_idx]`.
    pub(crate) columns: &'a [Vec<f64>],
    pub(crate) labels: &'a [usize],
    pub(crate) n_classes: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_features: usize,
    pub(crate) min_samples_leaf: usize,
}

/// Best split found for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    /// `n·I(parent) - n_l·I(left) - n_r·I(right)`.
    pub(crate) impurity_decrease: f64,
    pub(crate) left_indices: Vec<usize>,
    pub(crate) right_indices: Vec<usize>,
}

impl SplitContext<'_> {
    /// Count the classes of the given samples.
    pub(crate) fn class_counts(&self, sample_indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &si in sample_indices {
            counts[self.labels[si]] += 1;
        }
        counts
    }

    /// Find the best exact CART split among `max_features` randomly drawn features.
    ///
    /// Each candidate feature is sorted once and scanned left to right with
    /// incremental class counts. Thresholds sit halfway between consecutive
    /// distinct values. Returns `None` when every candidate feature is
    /// constant over the node or no boundary satisfies `min_samples_leaf`.
    pub(crate) fn find_best_split(
        &self,
        sample_indices: &[usize],
        rng: &mut impl Rng,
    ) -> Option<SplitResult> {
        let n_features = self.columns.len();
        let n_samples = sample_indices.len();
        if n_samples < 2 || n_features == 0 {
            return None;
        }

        let parent_counts = self.class_counts(sample_indices);
        let weighted_parent =
            n_samples as f64 * self.criterion.impurity(&parent_counts, n_samples).value();

        // Partial Fisher-Yates over the feature order.
        let take = self.max_features.min(n_features);
        let mut feature_order: Vec<usize> = (0..n_features).collect();
        for i in 0..take {
            let j = rng.gen_range(i..n_features);
            feature_order.swap(i, j);
        }

        let mut best: Option<(f64, usize, f64)> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n_samples);

        for &feat_idx in &feature_order[..take] {
            let column = &self.columns[feat_idx];
            sorted.clear();
            sorted.extend(sample_indices.iter().map(|&si| (column[si], self.labels[si])));
            sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = parent_counts.clone();

            for i in 0..n_samples - 1 {
                let (value, class) = sorted[i];
                left_counts[class] += 1;
                right_counts[class] -= 1;

                let next_value = sorted[i + 1].0;
                if value == next_value {
                    continue;
                }
                let n_left = i + 1;
                let n_right = n_samples - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let decrease = weighted_parent
                    - n_left as f64 * self.criterion.impurity(&left_counts, n_left).value()
                    - n_right as f64 * self.criterion.impurity(&right_counts, n_right).value();

                if best.is_none_or(|(best_decrease, _, _)| decrease > best_decrease) {
                    best = Some((decrease, feat_idx, (value + next_value) / 2.0));
                }
            }
        }

        let (impurity_decrease, feat_idx, threshold) = best?;
        let column = &self.columns[feat_idx];
        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
            .iter()
            .copied()
            .partition(|&si| column[si] <= threshold);

        Some(SplitResult {
            feature: FeatureIndex::new(feat_idx),
            threshold,
            impurity_decrease,
            left_indices,
            right_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn context<'a>(
        columns: &'a [Vec<f64>],
        labels: &'a [usize],
        min_samples_leaf: usize,
    ) -> SplitContext<'a> {
        SplitContext {
            columns,
            labels,
            n_classes: 2,
            criterion: SplitCriterion::Gini,
            max_features: columns.len(),
            min_samples_leaf,
        }
    }

    #[test]
    fn gini_values() {
        assert!(SplitCriterion::Gini.impurity(&[10, 0], 10).is_pure());
        let balanced = SplitCriterion::Gini.impurity(&[5, 5], 10);
        assert!((balanced.value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_values() {
        assert!(SplitCriterion::Entropy.impurity(&[0, 7], 7).is_pure());
        let balanced = SplitCriterion::Entropy.impurity(&[5, 5], 10);
        assert!((balanced.value() - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn empty_node_is_pure() {
        assert!(SplitCriterion::Gini.impurity(&[0, 0], 0).is_pure());
    }

    #[test]
    fn contract_code_separates_churners() {
        // Contract codes: month-to-month churns, longer contracts stay.
        let columns = vec![vec![0.0, 0.0, 0.0, 1.0, 2.0, 2.0]];
        let labels = vec![1, 1, 1, 0, 0, 0];
        let samples: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = context(&columns, &labels, 1)
            .find_best_split(&samples, &mut rng)
            .expect("split exists");
        assert_eq!(split.feature.index(), 0);
        assert!((split.threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
        assert!((split.impurity_decrease - 3.0).abs() < 1e-10);
    }

    #[test]
    fn constant_feature_has_no_split() {
        let columns = vec![vec![1.0; 4]];
        let labels = vec![0, 1, 0, 1];
        let samples: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(context(&columns, &labels, 1)
            .find_best_split(&samples, &mut rng)
            .is_none());
    }

    #[test]
    fn min_samples_leaf_blocks_split() {
        let columns = vec![vec![1.0, 10.0]];
        let labels = vec![0, 1];
        let samples = vec![0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(context(&columns, &labels, 2)
            .find_best_split(&samples, &mut rng)
            .is_none());
    }
}
