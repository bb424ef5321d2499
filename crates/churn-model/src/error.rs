//! Error types for churn-model.

use std::path::PathBuf;

use churn_io::IoError;
use churn_rf::RfError;

use crate::schema::ColumnKind;

/// Errors from feature preparation, training, persistence, and prediction.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Forest(#[from] RfError),

    /// A categorical value absent from the fitted code table (single-record path).
    #[error("unknown value \"{value}\" for {column}; expected one of: {}", .known.join(", "))]
    UnknownCategory {
        column: String,
        value: String,
        known: Vec<String>,
    },

    /// A value that can be neither encoded nor read as a number.
    #[error("column {column}{}: cannot use \"{value}\" as a number", row_suffix(.row_index))]
    NonNumericValue {
        column: String,
        /// Zero-based data row, when the value came from a table.
        row_index: Option<usize>,
        value: String,
    },

    /// A record lacks a field the model was trained on.
    #[error("missing field: {field}")]
    MissingField { field: String },

    /// A record carries a field the model was not trained on.
    #[error("unexpected field: {field}")]
    UnexpectedField { field: String },

    /// A numeric value supplied for a categorical column.
    #[error("field {field} expects a {expected} value")]
    KindMismatch { field: String, expected: ColumnKind },

    /// A column name the encoder holds no table for.
    #[error("no code table for column {column}")]
    UnknownColumn { column: String },

    /// A target cell outside the configured positive/negative labels.
    #[error("target column {column}, row {row_index}: \"{value}\" is neither {positive} nor {negative}")]
    InvalidTarget {
        column: String,
        row_index: usize,
        value: String,
        positive: String,
        negative: String,
    },

    /// A numeric column with no parseable values, so no median exists.
    #[error("column {column} has no numeric values to impute from")]
    AllMissing { column: String },

    /// After dropping the id and target columns nothing is left to train on.
    #[error("no feature columns remain after dropping id and target")]
    NoFeatureColumns,

    #[error("test_fraction must be in (0, 1), got {test_fraction}")]
    InvalidTestFraction { test_fraction: f64 },

    /// The holdout split would leave the train or test side empty.
    #[error("cannot split {n_samples} rows with test_fraction {test_fraction}")]
    SplitTooSmall { n_samples: usize, test_fraction: f64 },

    #[error("cannot read model file {path}")]
    ReadModel {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write model file {path}")]
    WriteModel {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("model serialization failed")]
    SerializeModel { source: bincode::Error },

    #[error("model file {path} is corrupt")]
    DeserializeModel {
        path: PathBuf,
        source: bincode::Error,
    },

    #[error("model file {path} has format version {found}, expected {expected}")]
    IncompatibleModelVersion {
        expected: u32,
        found: u32,
        path: PathBuf,
    },

    /// The stored forest and schema disagree on the feature count.
    #[error("model file {path}: forest expects {forest} features, schema lists {schema}")]
    SchemaMismatch {
        path: PathBuf,
        forest: usize,
        schema: usize,
    },
}

fn row_suffix(row_index: &Option<usize>) -> String {
    row_index.map_or_else(String::new, |r| format!(", row {r}"))
}

impl ModelError {
    /// True for failures a user can fix by changing their input, as opposed
    /// to a broken model file or an internal fault.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::Io(e) => !matches!(
                e,
                IoError::OutputDirCreate { .. }
                    | IoError::WriteFile { .. }
                    | IoError::LogSchemaMismatch { .. }
                    | IoError::CorruptLogRow { .. }
            ),
            Self::UnknownCategory { .. }
            | Self::NonNumericValue { .. }
            | Self::MissingField { .. }
            | Self::UnexpectedField { .. }
            | Self::KindMismatch { .. }
            | Self::InvalidTarget { .. }
            | Self::AllMissing { .. }
            | Self::NoFeatureColumns => true,
            _ => false,
        }
    }
}
