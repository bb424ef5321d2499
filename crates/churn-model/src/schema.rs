//! Feature schema: the ordered, typed column set a trained model expects.

use std::fmt;

use churn_io::RawTable;
use serde::{Deserialize, Serialize};

use crate::encoder::{CategoryEncoder, Encoded};
use crate::error::ModelError;
use crate::record::{CustomerRecord, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
        })
    }
}

/// One feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
    /// Training median, used for blank numeric cells in batch input.
    pub fill_value: Option<f64>,
}

/// Ordered feature columns plus the fitted category encoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
    encoder: CategoryEncoder,
}

impl FeatureSchema {
    pub(crate) fn new(columns: Vec<FeatureColumn>, encoder: CategoryEncoder) -> Self {
        Self { columns, encoder }
    }

    #[must_use]
    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn encoder(&self) -> &CategoryEncoder {
        &self.encoder
    }

    /// Encode one record for the single-record path.
    ///
    /// Every schema field must be present and no others. Categorical values
    /// must be in the fitted table.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::MissingField`] | A schema column is absent from the record |
    /// | [`ModelError::UnexpectedField`] | The record has a field outside the schema |
    /// | [`ModelError::UnknownCategory`] | A categorical value is not in its code table |
    /// | [`ModelError::KindMismatch`] | A number was given for a categorical column |
    /// | [`ModelError::NonNumericValue`] | A numeric field is not a finite number |
    pub fn encode_record(&self, record: &CustomerRecord) -> Result<Vec<f64>, ModelError> {
        if let Some((name, _)) = record
            .iter()
            .find(|(name, _)| !self.columns.iter().any(|c| c.name == *name))
        {
            return Err(ModelError::UnexpectedField {
                field: name.to_string(),
            });
        }

        self.columns
            .iter()
            .map(|column| {
                let value = record.get(&column.name).ok_or_else(|| ModelError::MissingField {
                    field: column.name.clone(),
                })?;
                match (column.kind, value) {
                    (ColumnKind::Categorical, FieldValue::Text(text)) => {
                        Ok(self.encoder.encode_strict(&column.name, text)? as f64)
                    }
                    (ColumnKind::Categorical, FieldValue::Number(_)) => Err(ModelError::KindMismatch {
                        field: column.name.clone(),
                        expected: ColumnKind::Categorical,
                    }),
                    (ColumnKind::Numeric, FieldValue::Number(n)) if n.is_finite() => Ok(*n),
                    (ColumnKind::Numeric, other) => parse_number(&other.to_string()).ok_or_else(|| {
                        ModelError::NonNumericValue {
                            column: column.name.clone(),
                            row_index: None,
                            value: other.to_string(),
                        }
                    }),
                }
            })
            .collect()
    }

    /// Encode one batch row whose cells are already in schema order.
    ///
    /// Unknown categorical values pass through the encoder unchanged and are
    /// kept if they read as numbers. Blank numeric cells take the training
    /// median.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NonNumericValue`] for a cell that is neither a
    /// known category nor a number.
    pub fn encode_row<S: AsRef<str>>(&self, cells: &[S]) -> Result<Vec<f64>, ModelError> {
        self.encode_cells(cells, None)
    }

    /// Encode every row of `table` for the batch path.
    ///
    /// Columns are matched by name, so the table may order them freely and
    /// carry extra columns.
    ///
    /// # Errors
    ///
    /// Returns `IoError::MissingColumns` (wrapped) listing absent schema
    /// columns, or the first row error from [`encode_row`](Self::encode_row).
    pub fn encode_table(&self, table: &RawTable) -> Result<Vec<Vec<f64>>, ModelError> {
        let names: Vec<&str> = self.names().collect();
        let projected = table.select(&names)?;
        projected
            .rows()
            .iter()
            .enumerate()
            .map(|(row_index, row)| self.encode_cells(row, Some(row_index)))
            .collect()
    }

    fn encode_cells<S: AsRef<str>>(
        &self,
        cells: &[S],
        row_index: Option<usize>,
    ) -> Result<Vec<f64>, ModelError> {
        if cells.len() != self.columns.len() {
            return Err(churn_io::IoError::InconsistentRowLength {
                origin: "batch row".to_string(),
                row_index: row_index.unwrap_or(0),
                expected: self.columns.len(),
                got: cells.len(),
            }
            .into());
        }
        self.columns
            .iter()
            .zip(cells)
            .map(|(column, cell)| {
                let cell = cell.as_ref();
                let not_numeric = || ModelError::NonNumericValue {
                    column: column.name.clone(),
                    row_index,
                    value: cell.to_string(),
                };
                match column.kind {
                    ColumnKind::Categorical => match self.encoder.encode_lenient(&column.name, cell)? {
                        Encoded::Code(code) => Ok(code as f64),
                        Encoded::PassThrough(raw) => parse_number(raw).ok_or_else(not_numeric),
                    },
                    ColumnKind::Numeric if cell.trim().is_empty() => {
                        column.fill_value.ok_or_else(not_numeric)
                    }
                    ColumnKind::Numeric => parse_number(cell).ok_or_else(not_numeric),
                }
            })
            .collect()
    }
}

/// Parse a trimmed cell as a finite number.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        let mut encoder = CategoryEncoder::new();
        encoder.fit_column("gender", ["Female", "Male"]);
        encoder.fit_column("Contract", ["Month-to-month", "One year", "Two year"]);
        FeatureSchema::new(
            vec![
                FeatureColumn {
                    name: "gender".into(),
                    kind: ColumnKind::Categorical,
                    fill_value: None,
                },
                FeatureColumn {
                    name: "tenure".into(),
                    kind: ColumnKind::Numeric,
                    fill_value: Some(29.0),
                },
                FeatureColumn {
                    name: "Contract".into(),
                    kind: ColumnKind::Categorical,
                    fill_value: None,
                },
            ],
            encoder,
        )
    }

    fn record() -> CustomerRecord {
        CustomerRecord::new()
            .with("Contract", "Two year")
            .with("gender", "Male")
            .with("tenure", 24u32)
    }

    #[test]
    fn record_encoded_in_schema_order() {
        assert_eq!(schema().encode_record(&record()).unwrap(), vec![1.0, 24.0, 2.0]);
    }

    #[test]
    fn record_accepts_numeric_text() {
        let r = record().with("tenure", " 7 ");
        assert_eq!(schema().encode_record(&r).unwrap()[1], 7.0);
    }

    #[test]
    fn record_errors() {
        let s = schema();
        assert!(matches!(
            s.encode_record(&record().with("Partner", "Yes")),
            Err(ModelError::UnexpectedField { .. })
        ));
        let missing: CustomerRecord = [("gender", "Male"), ("Contract", "One year")].into_iter().collect();
        assert!(matches!(
            s.encode_record(&missing),
            Err(ModelError::MissingField { field }) if field == "tenure"
        ));
        assert!(matches!(
            s.encode_record(&record().with("Contract", "Three year")),
            Err(ModelError::UnknownCategory { .. })
        ));
        assert!(matches!(
            s.encode_record(&record().with("gender", 1u32)),
            Err(ModelError::KindMismatch { .. })
        ));
        assert!(matches!(
            s.encode_record(&record().with("tenure", "long")),
            Err(ModelError::NonNumericValue { row_index: None, .. })
        ));
    }

    #[test]
    fn row_passes_through_numeric_unknowns() {
        let s = schema();
        assert_eq!(s.encode_row(&["Female", "3", "One year"]).unwrap(), vec![0.0, 3.0, 1.0]);
        assert_eq!(s.encode_row(&["1", "", "0"]).unwrap(), vec![1.0, 29.0, 0.0]);
        assert!(matches!(
            s.encode_row(&["Female", "3", "Three year"]),
            Err(ModelError::NonNumericValue { .. })
        ));
    }

    #[test]
    fn table_matches_record_path() {
        let s = schema();
        let table = RawTable::new(
            vec!["customerID".into(), "Contract".into(), "tenure".into(), "gender".into()],
            vec![vec!["0001".into(), "Two year".into(), "24".into(), "Male".into()]],
        )
        .unwrap();
        let rows = s.encode_table(&table).unwrap();
        assert_eq!(rows[0], s.encode_record(&record()).unwrap());
    }

    #[test]
    fn table_missing_columns() {
        let table = RawTable::new(vec!["gender".into()], vec![vec!["Male".into()]]).unwrap();
        match schema().encode_table(&table) {
            Err(ModelError::Io(churn_io::IoError::MissingColumns { missing })) => {
                assert_eq!(missing, vec!["tenure", "Contract"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn table_row_error_carries_index() {
        let table = RawTable::new(
            vec!["gender".into(), "tenure".into(), "Contract".into()],
            vec![
                vec!["Male".into(), "1".into(), "Two year".into()],
                vec!["Other".into(), "1".into(), "Two year".into()],
            ],
        )
        .unwrap();
        assert!(matches!(
            schema().encode_table(&table),
            Err(ModelError::NonNumericValue { row_index: Some(1), .. })
        ));
    }
}
