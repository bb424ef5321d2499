//! Customer churn model: feature encoding, training, persistence, inference.
//!
//! [`prepare`] turns a raw customer CSV into numeric features and a fitted
//! [`FeatureSchema`]; [`Trainer`] fits and evaluates a random forest on it;
//! the resulting [`ModelArtifact`] stores forest and schema together so
//! [`Predictor`] encodes inputs exactly as the training data was encoded.

mod artifact;
mod encoder;
mod error;
mod predictor;
mod prepare;
mod record;
mod schema;
mod trainer;

pub use artifact::{ModelArtifact, FORMAT_VERSION};
pub use encoder::{CategoryEncoder, Encoded};
pub use error::ModelError;
pub use predictor::{BatchPrediction, ChurnPrediction, Predictor};
pub use prepare::{prepare, prepare_table, PrepareConfig, PreparedTable};
pub use record::{CustomerRecord, FieldValue};
pub use schema::{ColumnKind, FeatureColumn, FeatureSchema};
pub use trainer::{SplitSizes, Trainer, TrainerConfig, TrainingOutcome, TrainingSummary};
