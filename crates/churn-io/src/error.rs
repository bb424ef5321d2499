//! I/O error types for churn-io.

use std::path::PathBuf;

/// Errors from CSV reading, prediction-log storage, and result writing.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {origin} at byte offset {offset}")]
    CsvParse {
        /// File path or upload name the table came from.
        origin: String,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the table has no header row at all.
    #[error("no header row in {origin}")]
    MissingHeader {
        /// File path or upload name the table came from.
        origin: String,
    },

    /// Returned when the CSV contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {origin}")]
    EmptyDataset {
        /// File path or upload name the table came from.
        origin: String,
    },

    /// Returned when the header names the same column twice.
    #[error("duplicate column \"{column}\" in {origin}")]
    DuplicateColumn {
        /// File path or upload name the table came from.
        origin: String,
        /// The repeated column name.
        column: String,
    },

    /// Returned when a data row has a different number of cells than the header.
    #[error("inconsistent row length in {origin}: row {row_index} has {got} cells, expected {expected}")]
    InconsistentRowLength {
        /// File path or upload name the table came from.
        origin: String,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of cells (from header).
        expected: usize,
        /// Actual number of cells in this row.
        got: usize,
    },

    /// Returned when required columns are absent from a table.
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns {
        /// Names of the absent columns, in the order they were required.
        missing: Vec<String>,
    },

    /// Returned when a new log batch does not match the header already on disk.
    #[error("prediction log {path} has columns [{}], batch has [{}]", .found.join(", "), .expected.join(", "))]
    LogSchemaMismatch {
        /// Path to the log file.
        path: PathBuf,
        /// Header the batch would write.
        expected: Vec<String>,
        /// Header already present in the file.
        found: Vec<String>,
    },

    /// Returned when a log batch has mismatched input, prediction, and probability counts.
    #[error("log batch has {n_rows} input rows but {n_predictions} predictions and {n_probabilities} probabilities")]
    BatchLengthMismatch {
        n_rows: usize,
        n_predictions: usize,
        n_probabilities: usize,
    },

    /// Returned when an input column reuses a bookkeeping column name.
    #[error("input column \"{column}\" collides with a prediction log column")]
    ReservedColumn { column: String },

    /// Returned when a log row has an unreadable prediction, probability, or timestamp.
    #[error("corrupt prediction log {path}: row {row_index}, column {column}, raw value \"{raw}\"")]
    CorruptLogRow {
        /// Path to the log file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The bookkeeping column that failed to parse.
        column: String,
        /// The raw cell value.
        raw: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when encoding rows as CSV fails.
    #[error("cannot encode CSV output")]
    CsvWrite {
        /// Underlying CSV error.
        #[from]
        source: csv::Error,
    },

    /// Returned when encoding a value as JSON fails.
    #[error("cannot encode JSON output")]
    JsonWrite {
        /// Underlying serde_json error.
        #[from]
        source: serde_json::Error,
    },
}
