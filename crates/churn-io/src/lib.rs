//! Tabular I/O for churn prediction: CSV input tables, the prediction log,
//! and result writers.

mod domain;
mod error;
mod log;
mod reader;
mod writer;

pub use domain::RawTable;
pub use error::IoError;
pub use log::{
    CsvPredictionLog, LogBatch, LogEntry, LogFilter, PredictionHistory, PredictionLog,
    PREDICTION_COLUMN, PROBABILITY_COLUMN, TIMESTAMP_COLUMN,
};
pub use reader::TableReader;
pub use writer::{table_to_csv_bytes, ResultWriter};
