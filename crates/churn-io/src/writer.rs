//! CSV and JSON writers for prediction results, log exports, and reports.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::RawTable;
use crate::IoError;

/// Writes result files into one output directory.
///
/// Creates the output directory on construction if it does not exist.
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display()))]
    pub fn new(output_dir: &Path) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Writer for the directory containing `file`, or the current directory
    /// when `file` has no parent.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    pub fn for_file(file: &Path) -> Result<Self, IoError> {
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(dir)
    }

    /// Write `table` as UTF-8 CSV to `file_name` inside the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CsvWrite`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n_rows = table.n_rows()))]
    pub fn write_csv(&self, file_name: &Path, table: &RawTable) -> Result<PathBuf, IoError> {
        let path = self.target(file_name);
        let bytes = table_to_csv_bytes(table)?;
        fs::write(&path, bytes).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "CSV written");
        Ok(path)
    }

    /// Write `value` as pretty JSON to `file_name` inside the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::JsonWrite`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_json<T: Serialize>(&self, file_name: &Path, value: &T) -> Result<PathBuf, IoError> {
        let path = self.target(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "JSON written");
        Ok(path)
    }

    fn target(&self, file_name: &Path) -> PathBuf {
        match file_name.file_name() {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.join(file_name),
        }
    }
}

/// Encode `table` as UTF-8 CSV with its header, for downloads.
///
/// # Errors
///
/// Returns [`IoError::CsvWrite`] if encoding fails.
pub fn table_to_csv_bytes(table: &RawTable) -> Result<Vec<u8>, IoError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(table.headers())?;
    for row in table.rows() {
        wtr.write_record(row)?;
    }
    wtr.into_inner().map_err(|e| IoError::CsvWrite {
        source: csv::Error::from(e.into_error()),
    })
}
