//! Domain types for churn-io.

use crate::IoError;

/// A header plus rows of raw string cells, exactly as read from CSV.
///
/// Every row has one cell per header column. Cells are not trimmed or
/// typed; interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table, checking that every row matches the header width.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InconsistentRowLength`] for the first ragged row.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, IoError> {
        if let Some((row_index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(IoError::InconsistentRowLength {
                origin: "in-memory table".to_string(),
                row_index,
                expected: headers.len(),
                got: row.len(),
            });
        }
        Ok(Self { headers, rows })
    }

    pub(crate) fn from_parts_unchecked(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Iterate the cells of column `name`, or `None` if it does not exist.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Check that every name in `required` is a column of this table.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingColumns`] listing every absent column.
    pub fn require_columns<S: AsRef<str>>(&self, required: &[S]) -> Result<(), IoError> {
        let missing: Vec<String> = required
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| self.column_index(name).is_none())
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IoError::MissingColumns { missing })
        }
    }

    /// Drop the first data row if it repeats the header cell for cell.
    ///
    /// Returns `true` when a row was removed. Only the first row is checked;
    /// that is where a concatenated export leaves its second header.
    pub fn drop_duplicate_header(&mut self) -> bool {
        let duplicated = self.rows.first().is_some_and(|first| {
            first
                .iter()
                .zip(&self.headers)
                .all(|(cell, header)| cell.trim() == header.trim())
        });
        if duplicated {
            self.rows.remove(0);
        }
        duplicated
    }

    /// Remove column `name`. Returns `false` if it was not present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.headers.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Project onto `names`, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingColumns`] if any name is absent.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<RawTable, IoError> {
        self.require_columns(names)?;
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n.as_ref()))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(RawTable {
            headers: names.iter().map(|n| n.as_ref().to_string()).collect(),
            rows,
        })
    }

    /// Append a column. `values` must have one entry per row.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InconsistentRowLength`] when `values.len()` differs
    /// from the row count.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<(), IoError> {
        if values.len() != self.rows.len() {
            return Err(IoError::InconsistentRowLength {
                origin: "in-memory table".to_string(),
                row_index: values.len().min(self.rows.len()),
                expected: self.rows.len(),
                got: values.len(),
            });
        }
        self.headers.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}
