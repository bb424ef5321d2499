//! CSV table reader for training files and batch uploads.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::domain::RawTable;
use crate::IoError;

/// Reads a headed CSV into a [`RawTable`].
///
/// Cells are kept as strings; only the table shape is validated.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingHeader`] | Input is empty, not even a header |
/// | [`IoError::DuplicateColumn`] | Header names a column twice |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
pub struct TableReader<R> {
    origin: String,
    source: R,
}

impl TableReader<std::fs::File> {
    /// Open the CSV file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            origin: path.display().to_string(),
            source: file,
        })
    }
}

impl<R: Read> TableReader<R> {
    /// Wrap an in-memory source such as an uploaded file. `origin` names it
    /// in error messages.
    pub fn from_reader(source: R, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            source,
        }
    }

    /// Read and validate the whole table.
    #[instrument(skip(self), fields(origin = %self.origin))]
    pub fn read(self) -> Result<RawTable, IoError> {
        let Self { origin, source } = self;

        // flexible(true) lets our own InconsistentRowLength check fire instead
        // of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let csv_error = |e: csv::Error| IoError::CsvParse {
            origin: origin.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        };

        let header = rdr.headers().map_err(csv_error)?.clone();
        if header.is_empty() {
            return Err(IoError::MissingHeader { origin });
        }
        let headers: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            if seen.insert(name.as_str(), i).is_some() {
                return Err(IoError::DuplicateColumn {
                    origin,
                    column: name.clone(),
                });
            }
        }
        debug!(n_columns = headers.len(), "read CSV header");

        let mut rows = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(csv_error)?;
            if record.len() != headers.len() {
                return Err(IoError::InconsistentRowLength {
                    origin,
                    row_index,
                    expected: headers.len(),
                    got: record.len(),
                });
            }
            rows.push(record.iter().map(String::from).collect::<Vec<_>>());
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset { origin });
        }

        info!(n_rows = rows.len(), n_columns = headers.len(), "table loaded");
        Ok(RawTable::from_parts_unchecked(headers, rows))
    }
}
