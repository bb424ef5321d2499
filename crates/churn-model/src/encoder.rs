//! Label encoding of categorical columns.
//!
//! Each column's code table is the sorted list of distinct values seen at
//! fit time; a value's code is its position in that list. The fitted tables
//! travel inside the model artifact, so inference uses exactly the codes the
//! forest was trained on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Result of a lenient lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded<'a> {
    Code(usize),
    /// Value absent from the table, returned unchanged.
    PassThrough(&'a str),
}

/// Fitted per-column code tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    tables: BTreeMap<String, Vec<String>>,
}

impl CategoryEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the code table for `column` from its observed values, replacing
    /// any previous table. Returns the table.
    pub fn fit_column<'v>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = &'v str>,
    ) -> &[String] {
        let mut categories: Vec<String> = values.into_iter().map(str::to_string).collect();
        categories.sort_unstable();
        categories.dedup();
        self.tables.insert(column.to_string(), categories);
        &self.tables[column]
    }

    /// Categories of `column` in code order.
    #[must_use]
    pub fn code_table(&self, column: &str) -> Option<&[String]> {
        self.tables.get(column).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Look up `value`, failing on anything outside the fitted table.
    ///
    /// Matching is exact: no trimming, no case folding.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::UnknownColumn`] | No table was fitted for `column` |
    /// | [`ModelError::UnknownCategory`] | `value` is not in the table |
    pub fn encode_strict(&self, column: &str, value: &str) -> Result<usize, ModelError> {
        let table = self.table(column)?;
        table
            .binary_search_by(|c| c.as_str().cmp(value))
            .map_err(|_| ModelError::UnknownCategory {
                column: column.to_string(),
                value: value.to_string(),
                known: table.clone(),
            })
    }

    /// Look up `value`, passing unknown values through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownColumn`] if no table was fitted for `column`.
    pub fn encode_lenient<'v>(&self, column: &str, value: &'v str) -> Result<Encoded<'v>, ModelError> {
        let table = self.table(column)?;
        Ok(match table.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(code) => Encoded::Code(code),
            Err(_) => Encoded::PassThrough(value),
        })
    }

    fn table(&self, column: &str) -> Result<&Vec<String>, ModelError> {
        self.tables.get(column).ok_or_else(|| ModelError::UnknownColumn {
            column: column.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internet_encoder() -> CategoryEncoder {
        let mut encoder = CategoryEncoder::new();
        encoder.fit_column(
            "InternetService",
            ["Fiber optic", "DSL", "No", "DSL", "Fiber optic"],
        );
        encoder.fit_column(
            "OnlineSecurity",
            ["No", "Yes", "No internet service", "No"],
        );
        encoder
    }

    #[test]
    fn codes_follow_sorted_order() {
        let encoder = internet_encoder();
        assert_eq!(
            encoder.code_table("InternetService").unwrap(),
            &["DSL", "Fiber optic", "No"]
        );
        assert_eq!(encoder.encode_strict("InternetService", "DSL").unwrap(), 0);
        assert_eq!(encoder.encode_strict("InternetService", "Fiber optic").unwrap(), 1);
        assert_eq!(encoder.encode_strict("OnlineSecurity", "No internet service").unwrap(), 1);
        assert_eq!(encoder.encode_strict("OnlineSecurity", "Yes").unwrap(), 2);
    }

    #[test]
    fn strict_and_lenient_agree_on_known_values() {
        let encoder = internet_encoder();
        for column in ["InternetService", "OnlineSecurity"] {
            for value in encoder.code_table(column).unwrap() {
                let strict = encoder.encode_strict(column, value).unwrap();
                assert_eq!(
                    encoder.encode_lenient(column, value).unwrap(),
                    Encoded::Code(strict)
                );
                // repeated lookups are stable
                assert_eq!(encoder.encode_strict(column, value).unwrap(), strict);
            }
        }
    }

    #[test]
    fn unknown_values() {
        let encoder = internet_encoder();
        match encoder.encode_strict("InternetService", "fiber optic") {
            Err(ModelError::UnknownCategory { value, known, .. }) => {
                assert_eq!(value, "fiber optic");
                assert_eq!(known.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            encoder.encode_lenient("InternetService", "Satellite").unwrap(),
            Encoded::PassThrough("Satellite")
        );
        assert!(matches!(
            encoder.encode_strict("Contract", "Two year"),
            Err(ModelError::UnknownColumn { .. })
        ));
    }
}
