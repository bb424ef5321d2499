//! Churn inference for single records and uploaded tables.

use std::path::Path;

use churn_io::{RawTable, PREDICTION_COLUMN, PROBABILITY_COLUMN};
use serde::Serialize;
use tracing::{info, instrument};

use crate::artifact::ModelArtifact;
use crate::error::ModelError;
use crate::record::CustomerRecord;

/// Positive-class index: the customer churns.
const CHURN_CLASS: usize = 1;

/// Outcome for one customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChurnPrediction {
    /// 1 = churn, 0 = retained.
    pub churn_prediction: u8,
    /// Churn probability rounded to two decimals.
    pub churn_probability: f64,
}

/// Outcome for an uploaded table.
#[derive(Debug, Clone)]
pub struct BatchPrediction {
    /// The upload with fresh `prediction` and `probability` columns last.
    pub results: RawTable,
    /// The upload projected onto the model's feature columns, in schema order.
    pub features: RawTable,
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
}

impl BatchPrediction {
    #[must_use]
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    #[must_use]
    pub fn n_churn(&self) -> usize {
        self.predictions.iter().filter(|&&p| p == 1).count()
    }
}

/// Wraps a loaded [`ModelArtifact`].
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: ModelArtifact,
}

impl Predictor {
    #[must_use]
    pub fn new(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    /// # Errors
    ///
    /// Any load error from [`ModelArtifact::load`].
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        Ok(Self::new(ModelArtifact::load(model_path)?))
    }

    #[must_use]
    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Load the model from `model_path` and predict one record.
    ///
    /// The model file is read on every call.
    ///
    /// # Errors
    ///
    /// Model load errors, or encoding errors from
    /// [`FeatureSchema::encode_record`](crate::FeatureSchema::encode_record).
    #[instrument(skip(record), fields(path = %model_path.display()))]
    pub fn predict_from_input(
        model_path: &Path,
        record: &CustomerRecord,
    ) -> Result<ChurnPrediction, ModelError> {
        Self::load(model_path)?.predict_record(record)
    }

    /// Load the model from `model_path` and predict every row of `table`.
    ///
    /// # Errors
    ///
    /// Model load errors, or errors from [`predict_table`](Self::predict_table).
    #[instrument(skip(table), fields(path = %model_path.display(), n_rows = table.n_rows()))]
    pub fn predict_batch(model_path: &Path, table: &RawTable) -> Result<BatchPrediction, ModelError> {
        Self::load(model_path)?.predict_table(table)
    }

    /// # Errors
    ///
    /// Encoding errors, see [`FeatureSchema::encode_record`](crate::FeatureSchema::encode_record).
    pub fn predict_record(&self, record: &CustomerRecord) -> Result<ChurnPrediction, ModelError> {
        let features = self.artifact.schema.encode_record(record)?;
        self.predict_encoded(&features)
    }

    /// Predict one already-encoded row in schema order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Forest`] when the row length differs from the schema.
    pub fn predict_encoded(&self, features: &[f64]) -> Result<ChurnPrediction, ModelError> {
        let dist = self.artifact.forest.predict_proba(features)?;
        Ok(ChurnPrediction {
            churn_prediction: u8::from(dist.predicted_class() == CHURN_CLASS),
            churn_probability: round2(dist.probability(CHURN_CLASS)),
        })
    }

    /// Predict every row of `table`, matching columns by name.
    ///
    /// # Errors
    ///
    /// `IoError::MissingColumns` (wrapped) when a feature column is absent,
    /// or a row encoding error.
    pub fn predict_table(&self, table: &RawTable) -> Result<BatchPrediction, ModelError> {
        let rows = self.artifact.schema.encode_table(table)?;
        let dists = self.artifact.forest.predict_proba_batch(&rows)?;

        let predictions: Vec<u8> = dists
            .iter()
            .map(|d| u8::from(d.predicted_class() == CHURN_CLASS))
            .collect();
        let probabilities: Vec<f64> = dists
            .iter()
            .map(|d| round2(d.probability(CHURN_CLASS)))
            .collect();

        let names: Vec<&str> = self.artifact.schema.names().collect();
        let features = table.select(&names)?;
        // A re-uploaded results file already carries these columns.
        let mut results = table.clone();
        results.drop_column(PREDICTION_COLUMN);
        results.drop_column(PROBABILITY_COLUMN);
        results.push_column(
            PREDICTION_COLUMN,
            predictions.iter().map(ToString::to_string).collect(),
        )?;
        results.push_column(
            PROBABILITY_COLUMN,
            probabilities.iter().map(ToString::to_string).collect(),
        )?;

        let batch = BatchPrediction {
            results,
            features,
            predictions,
            probabilities,
        };
        info!(n_rows = batch.len(), n_churn = batch.n_churn(), "batch predicted");
        Ok(batch)
    }
}

fn round2(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(0.456), 0.46);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(1.0), 1.0);
        assert_eq!(round2(0.333_333), 0.33);
    }
}
