//! Training-time feature preparation.

use std::path::Path;

use churn_io::{RawTable, TableReader};
use tracing::{debug, info, instrument, warn};

use crate::encoder::CategoryEncoder;
use crate::error::ModelError;
use crate::schema::{parse_number, ColumnKind, FeatureColumn, FeatureSchema};

/// Column roles for [`prepare_table`].
///
/// # Defaults
///
/// | Parameter         | Default          |
/// |-------------------|------------------|
/// | `id_column`       | `customerID`     |
/// | `target_column`   | `Churn`          |
/// | `positive_label`  | `Yes`            |
/// | `negative_label`  | `No`             |
/// | `coerce_columns`  | `[TotalCharges]` |
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareConfig {
    id_column: Option<String>,
    target_column: String,
    positive_label: String,
    negative_label: String,
    coerce_columns: Vec<String>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            id_column: Some("customerID".to_string()),
            target_column: "Churn".to_string(),
            positive_label: "Yes".to_string(),
            negative_label: "No".to_string(),
            coerce_columns: vec!["TotalCharges".to_string()],
        }
    }
}

impl PrepareConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier column to drop, or `None` if the table has none.
    #[must_use]
    pub fn with_id_column(mut self, id_column: Option<String>) -> Self {
        self.id_column = id_column;
        self
    }

    #[must_use]
    pub fn with_target(
        mut self,
        column: impl Into<String>,
        positive: impl Into<String>,
        negative: impl Into<String>,
    ) -> Self {
        self.target_column = column.into();
        self.positive_label = positive.into();
        self.negative_label = negative.into();
        self
    }

    /// Columns forced to numeric; unparseable cells become missing.
    #[must_use]
    pub fn with_coerce_columns(mut self, columns: Vec<String>) -> Self {
        self.coerce_columns = columns;
        self
    }

    #[must_use]
    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// `[negative, positive]`, indexed by class.
    #[must_use]
    pub fn class_names(&self) -> [String; 2] {
        [self.negative_label.clone(), self.positive_label.clone()]
    }
}

/// A fully numeric training table.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub schema: FeatureSchema,
    pub features: Vec<Vec<f64>>,
    /// 0 = negative label, 1 = positive label.
    pub labels: Vec<usize>,
    pub class_names: [String; 2],
}

impl PreparedTable {
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }
}

/// Read the CSV at `path` and prepare it with [`prepare_table`].
///
/// # Errors
///
/// Any [`churn_io::IoError`] from reading, or an error from [`prepare_table`].
#[instrument(skip(config), fields(path = %path.display()))]
pub fn prepare(path: &Path, config: &PrepareConfig) -> Result<PreparedTable, ModelError> {
    let table = TableReader::from_path(path)?.read()?;
    prepare_table(table, config)
}

/// Turn a raw table into model-ready features.
///
/// Drops the id column, encodes the target, then treats each remaining
/// column as numeric (coerced columns, or every non-blank cell parses) or
/// categorical. Missing numeric cells take the column median; categorical
/// columns get sorted-order label codes.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | `IoError::MissingColumns` | Id or target column absent |
/// | [`ModelError::InvalidTarget`] | Target cell is neither label |
/// | [`ModelError::NoFeatureColumns`] | Only id and target present |
/// | [`ModelError::AllMissing`] | A numeric column has no values |
#[instrument(skip_all, fields(n_rows = table.n_rows()))]
pub fn prepare_table(mut table: RawTable, config: &PrepareConfig) -> Result<PreparedTable, ModelError> {
    if table.drop_duplicate_header() {
        warn!("dropped repeated header row");
    }
    if table.is_empty() {
        return Err(churn_io::IoError::EmptyDataset {
            origin: "training table".to_string(),
        }
        .into());
    }

    let mut required = vec![config.target_column.as_str()];
    if let Some(id) = &config.id_column {
        required.push(id.as_str());
        table.require_columns(&required)?;
        table.drop_column(id);
    } else {
        table.require_columns(&required)?;
    }

    let labels = encode_target(&table, config)?;
    table.drop_column(&config.target_column);
    if table.headers().is_empty() {
        return Err(ModelError::NoFeatureColumns);
    }

    let n_rows = table.n_rows();
    let mut features = vec![Vec::with_capacity(table.headers().len()); n_rows];
    let mut columns = Vec::with_capacity(table.headers().len());
    let mut encoder = CategoryEncoder::new();

    for (col, name) in table.headers().iter().enumerate() {
        let cells = || table.rows().iter().map(move |row| row[col].as_str());
        let coerced = config.coerce_columns.iter().any(|c| c == name);
        let parsed: Vec<Option<f64>> = cells().map(parse_number).collect();
        let numeric = coerced
            || cells()
                .zip(&parsed)
                .all(|(cell, value)| value.is_some() || cell.trim().is_empty());

        if numeric {
            let present: Vec<f64> = parsed.iter().flatten().copied().collect();
            let fill = median(present).ok_or_else(|| ModelError::AllMissing {
                column: name.clone(),
            })?;
            let n_missing = parsed.iter().filter(|v| v.is_none()).count();
            if n_missing > 0 {
                debug!(column = %name, n_missing, fill, "imputed missing values with median");
            }
            for (row, value) in features.iter_mut().zip(&parsed) {
                row.push(value.unwrap_or(fill));
            }
            columns.push(FeatureColumn {
                name: name.clone(),
                kind: ColumnKind::Numeric,
                fill_value: Some(fill),
            });
        } else {
            encoder.fit_column(name, cells());
            for (row, cell) in features.iter_mut().zip(cells()) {
                row.push(encoder.encode_strict(name, cell)? as f64);
            }
            columns.push(FeatureColumn {
                name: name.clone(),
                kind: ColumnKind::Categorical,
                fill_value: None,
            });
        }
    }

    let n_categorical = columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Categorical)
        .count();
    info!(
        n_samples = n_rows,
        n_features = columns.len(),
        n_categorical,
        n_positive = labels.iter().filter(|&&l| l == 1).count(),
        "table prepared"
    );

    Ok(PreparedTable {
        schema: FeatureSchema::new(columns, encoder),
        features,
        labels,
        class_names: config.class_names(),
    })
}

fn encode_target(table: &RawTable, config: &PrepareConfig) -> Result<Vec<usize>, ModelError> {
    let Some(cells) = table.column(&config.target_column) else {
        return Err(churn_io::IoError::MissingColumns {
            missing: vec![config.target_column.clone()],
        }
        .into());
    };
    cells
        .enumerate()
        .map(|(row_index, cell)| match cell.trim() {
            v if v == config.positive_label => Ok(1),
            v if v == config.negative_label => Ok(0),
            _ => Err(ModelError::InvalidTarget {
                column: config.target_column.clone(),
                row_index,
                value: cell.to_string(),
                positive: config.positive_label.clone(),
                negative: config.negative_label.clone(),
            }),
        })
        .collect()
}

/// Median with the even-length midpoint convention. `None` when empty.
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(csv: &str) -> RawTable {
        TableReader::from_reader(csv.as_bytes(), "train.csv").read().unwrap()
    }

    const SAMPLE: &str = "\
customerID,gender,SeniorCitizen,tenure,InternetService,TotalCharges,Churn
0001,Female,0,1,DSL,29.85,No
0002,Male,0,34,No,1889.5,No
0003,Male,1,2,Fiber optic, ,Yes
0004,Male,0,45,DSL,1840.75,No
0005,Female,0,2,Fiber optic,151.65,Yes
";

    #[test]
    fn drops_id_and_encodes_target() {
        let prepared = prepare_table(raw(SAMPLE), &PrepareConfig::default()).unwrap();
        assert_eq!(prepared.labels, vec![0, 0, 1, 0, 1]);
        let names: Vec<&str> = prepared.schema.names().collect();
        assert_eq!(
            names,
            vec!["gender", "SeniorCitizen", "tenure", "InternetService", "TotalCharges"]
        );
        assert_eq!(prepared.class_names, ["No".to_string(), "Yes".to_string()]);
    }

    #[test]
    fn infers_kinds_and_label_encodes() {
        let prepared = prepare_table(raw(SAMPLE), &PrepareConfig::default()).unwrap();
        let kinds: Vec<ColumnKind> = prepared.schema.columns().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Categorical,
                ColumnKind::Numeric,
                ColumnKind::Numeric,
                ColumnKind::Categorical,
                ColumnKind::Numeric,
            ]
        );
        // DSL=0, Fiber optic=1, No=2
        let internet: Vec<f64> = prepared.features.iter().map(|r| r[3]).collect();
        assert_eq!(internet, vec![0.0, 2.0, 1.0, 0.0, 1.0]);
        assert_eq!(prepared.features[1][0], 1.0);
    }

    #[test]
    fn blank_total_charges_takes_median() {
        let prepared = prepare_table(raw(SAMPLE), &PrepareConfig::default()).unwrap();
        // present: 29.85, 151.65, 1840.75, 1889.5 -> (151.65 + 1840.75) / 2
        let expected = (151.65 + 1840.75) / 2.0;
        assert!((prepared.features[2][4] - expected).abs() < 1e-9);
        assert_eq!(prepared.schema.columns()[4].fill_value, Some(expected));
    }

    #[test]
    fn coerced_column_with_junk_stays_numeric() {
        let csv = "customerID,TotalCharges,Churn\n1,abc,No\n2,10,Yes\n3,20,No\n";
        let prepared = prepare_table(raw(csv), &PrepareConfig::default()).unwrap();
        assert_eq!(prepared.schema.columns()[0].kind, ColumnKind::Numeric);
        assert_eq!(prepared.features[0][0], 15.0);

        let strict = PrepareConfig::default().with_coerce_columns(vec![]);
        let prepared = prepare_table(raw(csv), &strict).unwrap();
        assert_eq!(prepared.schema.columns()[0].kind, ColumnKind::Categorical);
    }

    #[test]
    fn duplicate_header_row_ignored() {
        let csv = "customerID,tenure,Churn\ncustomerID,tenure,Churn\n1,5,No\n2,7,Yes\n";
        let prepared = prepare_table(raw(csv), &PrepareConfig::default()).unwrap();
        assert_eq!(prepared.n_samples(), 2);
        assert_eq!(prepared.schema.columns()[0].kind, ColumnKind::Numeric);
    }

    #[test]
    fn target_and_column_errors() {
        let bad_target = "customerID,tenure,Churn\n1,5,Maybe\n";
        assert!(matches!(
            prepare_table(raw(bad_target), &PrepareConfig::default()),
            Err(ModelError::InvalidTarget { row_index: 0, .. })
        ));

        let no_target = "customerID,tenure\n1,5\n";
        assert!(matches!(
            prepare_table(raw(no_target), &PrepareConfig::default()),
            Err(ModelError::Io(churn_io::IoError::MissingColumns { .. }))
        ));

        let only_roles = "customerID,Churn\n1,No\n";
        assert!(matches!(
            prepare_table(raw(only_roles), &PrepareConfig::default()),
            Err(ModelError::NoFeatureColumns)
        ));

        let all_blank = "customerID,TotalCharges,Churn\n1, ,No\n";
        assert!(matches!(
            prepare_table(raw(all_blank), &PrepareConfig::default()),
            Err(ModelError::AllMissing { .. })
        ));
    }

    #[test]
    fn without_id_column() {
        let csv = "tenure,Churn\n5,No\n7,Yes\n";
        let config = PrepareConfig::default().with_id_column(None);
        assert_eq!(prepare_table(raw(csv), &config).unwrap().schema.len(), 1);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(vec![]), None);
    }
}
