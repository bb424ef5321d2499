//! Append-only prediction log.
//!
//! Every logged row is the raw input record followed by three bookkeeping
//! columns: `prediction`, `probability`, and `timestamp` (UTC, RFC 3339).

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, instrument};

use crate::domain::RawTable;
use crate::IoError;

pub const PREDICTION_COLUMN: &str = "prediction";
pub const PROBABILITY_COLUMN: &str = "probability";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

const BOOKKEEPING: [&str; 3] = [PREDICTION_COLUMN, PROBABILITY_COLUMN, TIMESTAMP_COLUMN];

/// A batch of predicted records sharing one timestamp.
#[derive(Debug, Clone)]
pub struct LogBatch {
    inputs: RawTable,
    predictions: Vec<u8>,
    probabilities: Vec<f64>,
    timestamp: DateTime<Utc>,
}

impl LogBatch {
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::BatchLengthMismatch`] | Predictions or probabilities differ from the row count |
    /// | [`IoError::ReservedColumn`] | An input column is named like a bookkeeping column |
    pub fn new(
        inputs: RawTable,
        predictions: Vec<u8>,
        probabilities: Vec<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, IoError> {
        if predictions.len() != inputs.n_rows() || probabilities.len() != inputs.n_rows() {
            return Err(IoError::BatchLengthMismatch {
                n_rows: inputs.n_rows(),
                n_predictions: predictions.len(),
                n_probabilities: probabilities.len(),
            });
        }
        if let Some(column) = inputs
            .headers()
            .iter()
            .find(|h| BOOKKEEPING.contains(&h.as_str()))
        {
            return Err(IoError::ReservedColumn {
                column: column.clone(),
            });
        }
        Ok(Self {
            inputs,
            predictions,
            probabilities,
            timestamp,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.n_rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Full log header: input columns then bookkeeping columns.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        self.inputs
            .headers()
            .iter()
            .cloned()
            .chain(BOOKKEEPING.iter().map(|s| s.to_string()))
            .collect()
    }

    fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        let stamp = format_timestamp(self.timestamp);
        self.inputs
            .rows()
            .iter()
            .zip(self.predictions.iter().zip(&self.probabilities))
            .map(move |(row, (prediction, probability))| {
                let mut record = row.clone();
                record.push(prediction.to_string());
                record.push(probability.to_string());
                record.push(stamp.clone());
                record
            })
    }
}

/// One row read back from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub inputs: Vec<String>,
    pub prediction: u8,
    pub probability: f64,
    pub timestamp: DateTime<Utc>,
}

/// Log contents: the input column names and every entry in append order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionHistory {
    pub input_columns: Vec<String>,
    pub entries: Vec<LogEntry>,
}

impl PredictionHistory {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(churned, retained)` counts.
    #[must_use]
    pub fn class_counts(&self) -> (usize, usize) {
        let churned = self.entries.iter().filter(|e| e.prediction == 1).count();
        (churned, self.entries.len() - churned)
    }

    /// Render back to a flat table in the on-disk column layout.
    #[must_use]
    pub fn to_table(&self) -> RawTable {
        let headers = self
            .input_columns
            .iter()
            .cloned()
            .chain(BOOKKEEPING.iter().map(|s| s.to_string()))
            .collect();
        let rows = self
            .entries
            .iter()
            .map(|e| {
                let mut row = e.inputs.clone();
                row.push(e.prediction.to_string());
                row.push(e.probability.to_string());
                row.push(format_timestamp(e.timestamp));
                row
            })
            .collect();
        RawTable::from_parts_unchecked(headers, rows)
    }

    fn retain(mut self, filter: &LogFilter) -> Self {
        self.entries.retain(|e| filter.matches(e));
        self
    }
}

/// Selection criteria for [`PredictionLog::filter`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    prediction: Option<u8>,
    min_probability: Option<f64>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl LogFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prediction(mut self, prediction: u8) -> Self {
        self.prediction = Some(prediction);
        self
    }

    #[must_use]
    pub fn with_min_probability(mut self, min_probability: f64) -> Self {
        self.min_probability = Some(min_probability);
        self
    }

    /// Keep entries stamped at or after `since`.
    #[must_use]
    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Keep entries stamped at or before `until`.
    #[must_use]
    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.prediction.is_none_or(|p| entry.prediction == p)
            && self.min_probability.is_none_or(|p| entry.probability >= p)
            && self.since.is_none_or(|t| entry.timestamp >= t)
            && self.until.is_none_or(|t| entry.timestamp <= t)
    }
}

/// Append-only store of prediction batches.
pub trait PredictionLog {
    /// Append every row of `batch`. Returns the number of rows written.
    fn append(&self, batch: &LogBatch) -> Result<usize, IoError>;

    /// Read the whole log. A log that was never written is empty.
    fn read_all(&self) -> Result<PredictionHistory, IoError>;

    fn filter(&self, filter: &LogFilter) -> Result<PredictionHistory, IoError> {
        Ok(self.read_all()?.retain(filter))
    }
}

/// [`PredictionLog`] backed by a single CSV file.
///
/// The header is written with the first batch; later batches must carry
/// the same input columns.
#[derive(Debug, Clone)]
pub struct CsvPredictionLog {
    path: PathBuf,
}

impl CsvPredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn existing_header(&self) -> Result<Option<Vec<String>>, IoError> {
        let is_empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IoError::FileNotFound {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        if is_empty {
            return Ok(None);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.parse_error(e))?;
        let header = rdr.headers().map_err(|e| self.parse_error(e))?;
        Ok(Some(header.iter().map(String::from).collect()))
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            origin: self.path.display().to_string(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn corrupt(&self, row_index: usize, column: &str, raw: &str) -> IoError {
        IoError::CorruptLogRow {
            path: self.path.clone(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        }
    }
}

impl PredictionLog for CsvPredictionLog {
    #[instrument(skip_all, fields(path = %self.path.display(), n_rows = batch.len()))]
    fn append(&self, batch: &LogBatch) -> Result<usize, IoError> {
        let header = batch.header();
        let write_header = match self.existing_header()? {
            None => true,
            Some(found) if found == header => false,
            Some(found) => {
                return Err(IoError::LogSchemaMismatch {
                    path: self.path.clone(),
                    expected: header,
                    found,
                });
            }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IoError::WriteFile {
                path: self.path.clone(),
                source: e,
            })?;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if write_header {
            wtr.write_record(&header)?;
            debug!("log header written");
        }
        let mut written = 0;
        for record in batch.records() {
            wtr.write_record(&record)?;
            written += 1;
        }
        wtr.flush().map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })?;

        info!(written, "predictions logged");
        Ok(written)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn read_all(&self) -> Result<PredictionHistory, IoError> {
        let Some(header) = self.existing_header()? else {
            debug!("log not yet written");
            return Ok(PredictionHistory::default());
        };

        let n_inputs = header.len().saturating_sub(BOOKKEEPING.len());
        if header.len() < BOOKKEEPING.len() || header[n_inputs..] != BOOKKEEPING {
            let mut expected = header[..n_inputs].to_vec();
            expected.extend(BOOKKEEPING.iter().map(|s| s.to_string()));
            return Err(IoError::LogSchemaMismatch {
                path: self.path.clone(),
                expected,
                found: header,
            });
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.parse_error(e))?;

        let mut entries = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;
            let cell = |i: usize| record.get(i).unwrap_or("");

            let raw = cell(n_inputs);
            let prediction: u8 = raw
                .parse()
                .map_err(|_| self.corrupt(row_index, PREDICTION_COLUMN, raw))?;
            let raw = cell(n_inputs + 1);
            let probability: f64 = raw
                .parse()
                .map_err(|_| self.corrupt(row_index, PROBABILITY_COLUMN, raw))?;
            let raw = cell(n_inputs + 2);
            let timestamp = DateTime::parse_from_rfc3339(raw)
                .map_err(|_| self.corrupt(row_index, TIMESTAMP_COLUMN, raw))?
                .with_timezone(&Utc);

            entries.push(LogEntry {
                inputs: record.iter().take(n_inputs).map(String::from).collect(),
                prediction,
                probability,
                timestamp,
            });
        }

        info!(n_entries = entries.len(), "prediction log read");
        Ok(PredictionHistory {
            input_columns: header[..n_inputs].to_vec(),
            entries,
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
