//! Prediction methods for the Random Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;
use crate::tree::argmax;

/// Class probability distribution averaged over all trees.
#[derive(Debug, Clone)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class (argmax of probabilities, lowest class on ties).
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        argmax(&self.probs)
    }

    /// Probability of `class`, or 0.0 when the forest never saw that class.
    #[must_use]
    pub fn probability(&self, class: usize) -> f64 {
        self.probs.get(class).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

impl RandomForest {
    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, RfError> {
        Ok(self.predict_proba(sample)?.predicted_class())
    }

    /// Average the leaf distributions of every tree for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_proba(&self, sample: &[f64]) -> Result<ClassDistribution, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }

        let mut avg = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in avg.iter_mut().zip(tree.leaf_distribution(sample)?) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        avg.iter_mut().for_each(|v| *v /= n);

        Ok(ClassDistribution::new(avg))
    }

    /// Predict class labels for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return probability distributions for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_proba_batch(
        &self,
        features: &[Vec<f64>],
    ) -> Result<Vec<ClassDistribution>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict_proba(sample))
            .collect()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature names in the column order the forest was trained on.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use super::ClassDistribution;
    use crate::RandomForestConfig;

    #[test]
    fn distribution_accessors() {
        let dist = ClassDistribution::new(vec![0.3, 0.7]);
        assert_eq!(dist.predicted_class(), 1);
        assert!((dist.probability(1) - 0.7).abs() < f64::EPSILON);
        assert_eq!(dist.probability(5), 0.0);
    }

    #[test]
    fn batch_matches_single() {
        let features = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![30.0, 2.0],
            vec![45.0, 2.0],
        ];
        let labels = vec![1, 1, 0, 0];
        let names = vec!["tenure".to_string(), "Contract".to_string()];
        let forest = RandomForestConfig::new(8)
            .unwrap()
            .fit(&features, &labels, &names)
            .unwrap()
            .into_forest();

        let batch = forest.predict_proba_batch(&features).unwrap();
        for (sample, dist) in features.iter().zip(&batch) {
            let single = forest.predict_proba(sample).unwrap();
            assert_eq!(single.as_slice(), dist.as_slice());
            let sum: f64 = single.as_slice().iter().sum();
            assert!((sum - 1.0).abs() < 1e-10);
        }
        assert_eq!(forest.n_trees(), 8);
        assert_eq!(forest.feature_names(), names.as_slice());
    }
}
