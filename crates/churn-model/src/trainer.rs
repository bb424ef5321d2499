//! Holdout training and evaluation.

use chrono::{DateTime, Utc};
use churn_rf::{
    ClassificationReport, ConfusionMatrix, RandomForestConfig, RankedFeature, TrainingMetadata,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, instrument};

use crate::artifact::ModelArtifact;
use crate::error::ModelError;
use crate::prepare::PreparedTable;

/// Holdout split and forest settings.
///
/// # Defaults
///
/// | Parameter       | Default                          |
/// |-----------------|----------------------------------|
/// | `test_fraction` | 0.2                              |
/// | `seed`          | 42 (split shuffle)               |
/// | `forest`        | `RandomForestConfig::new(100)`   |
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    test_fraction: f64,
    seed: u64,
    forest: RandomForestConfig,
}

impl TrainerConfig {
    #[must_use]
    pub fn new(forest: RandomForestConfig) -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            forest,
        }
    }

    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTestFraction`] unless `0 < test_fraction < 1`.
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Result<Self, ModelError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(ModelError::InvalidTestFraction { test_fraction });
        }
        self.test_fraction = test_fraction;
        Ok(self)
    }

    /// Seed for the split shuffle. The forest keeps its own seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    #[must_use]
    pub fn forest(&self) -> &RandomForestConfig {
        &self.forest
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitSizes {
    pub n_train: usize,
    pub n_test: usize,
}

/// Everything a training run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: ClassificationReport,
    pub split: SplitSizes,
    pub importances: Vec<RankedFeature>,
    /// Shape of the forest fit on the train side.
    pub metadata: TrainingMetadata,
}

/// JSON shape of the training report file.
#[derive(Debug, Serialize)]
pub struct TrainingSummary<'a> {
    pub trained_at: DateTime<Utc>,
    pub n_trees: usize,
    pub n_features: usize,
    pub n_classes: usize,
    /// Features drawn at each split.
    pub max_features: usize,
    pub split: SplitSizes,
    pub accuracy: f64,
    pub report: &'a ClassificationReport,
    pub feature_importances: &'a [RankedFeature],
}

impl TrainingOutcome {
    #[must_use]
    pub fn summary(&self) -> TrainingSummary<'_> {
        TrainingSummary {
            trained_at: self.artifact.trained_at,
            n_trees: self.metadata.n_trees,
            n_features: self.metadata.n_features,
            n_classes: self.metadata.n_classes,
            max_features: self.metadata.max_features_resolved,
            split: self.split,
            accuracy: self.report.accuracy,
            report: &self.report,
            feature_importances: &self.importances,
        }
    }
}

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    #[must_use]
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Shuffle-split `prepared`, fit the forest on the train side, and
    /// evaluate on the held-out side.
    ///
    /// The test side takes `ceil(n * test_fraction)` rows of a seeded
    /// shuffle, so the same input and seeds give the same split and forest.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::SplitTooSmall`] | Either side of the split would be empty |
    /// | [`ModelError::Forest`] | Forest training or evaluation failed |
    #[instrument(skip_all, fields(n_samples = prepared.n_samples(), test_fraction = self.config.test_fraction))]
    pub fn train(&self, prepared: &PreparedTable) -> Result<TrainingOutcome, ModelError> {
        let n_samples = prepared.n_samples();
        let (train_idx, test_idx) = self.split_indices(n_samples)?;

        let take = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
            idx.iter()
                .map(|&i| (prepared.features[i].clone(), prepared.labels[i]))
                .unzip()
        };
        let (train_x, train_y) = take(&train_idx);
        let (test_x, test_y) = take(&test_idx);

        let names: Vec<String> = prepared.schema.names().map(String::from).collect();
        let n_classes = prepared.class_names.len();
        let (forest, importances, metadata) = self
            .config
            .forest
            .clone()
            .with_n_classes(Some(n_classes))
            .fit(&train_x, &train_y, &names)?
            .into_parts();

        let predicted = forest.predict_batch(&test_x)?;
        let matrix = ConfusionMatrix::from_labels(&test_y, &predicted, n_classes)?;
        let class_names: Vec<&str> = prepared.class_names.iter().map(String::as_str).collect();
        let report = ClassificationReport::new(&matrix, &class_names);

        let split = SplitSizes {
            n_train: train_idx.len(),
            n_test: test_idx.len(),
        };
        info!(
            n_train = split.n_train,
            n_test = split.n_test,
            accuracy = report.accuracy,
            "holdout evaluation complete"
        );

        Ok(TrainingOutcome {
            artifact: ModelArtifact {
                trained_at: Utc::now(),
                schema: prepared.schema.clone(),
                class_names: prepared.class_names.to_vec(),
                forest,
            },
            report,
            split,
            importances,
            metadata,
        })
    }

    fn split_indices(&self, n_samples: usize) -> Result<(Vec<usize>, Vec<usize>), ModelError> {
        let test_fraction = self.config.test_fraction;
        let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n_samples {
            return Err(ModelError::SplitTooSmall {
                n_samples,
                test_fraction,
            });
        }
        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut ChaCha8Rng::seed_from_u64(self.config.seed));
        let train = indices.split_off(n_test);
        Ok((train, indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer(test_fraction: f64) -> Trainer {
        Trainer::new(
            TrainerConfig::new(RandomForestConfig::new(10).unwrap())
                .with_test_fraction(test_fraction)
                .unwrap(),
        )
    }

    #[test]
    fn split_sizes_round_test_side_up() {
        let (train, test) = trainer(0.2).split_indices(11).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_seeded() {
        let a = trainer(0.2).split_indices(50).unwrap();
        let b = trainer(0.2).split_indices(50).unwrap();
        assert_eq!(a, b);
        let c = Trainer::new(TrainerConfig::new(RandomForestConfig::new(10).unwrap()).with_seed(7))
            .split_indices(50)
            .unwrap();
        assert_ne!(a.1, c.1);
    }

    #[test]
    fn degenerate_splits_rejected() {
        assert!(matches!(
            trainer(0.5).split_indices(1),
            Err(ModelError::SplitTooSmall { .. })
        ));
        assert!(matches!(
            TrainerConfig::new(RandomForestConfig::new(10).unwrap()).with_test_fraction(1.0),
            Err(ModelError::InvalidTestFraction { .. })
        ));
        assert!(TrainerConfig::new(RandomForestConfig::new(10).unwrap())
            .with_test_fraction(f64::NAN)
            .is_err());
    }
}
