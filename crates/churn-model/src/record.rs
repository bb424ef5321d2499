//! Raw customer records as entered on the form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One raw field value: categorical text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

/// An ordered field-name to value mapping for one customer.
///
/// Insertion order is kept; inserting an existing name replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    fields: Vec<(String, FieldValue)>,
}

impl CustomerRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for CustomerRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut record = CustomerRecord::new()
            .with("gender", "Female")
            .with("tenure", 12u32)
            .with("MonthlyCharges", 70.0);
        record.insert("tenure", 24u32);

        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["gender", "tenure", "MonthlyCharges"]);
        assert_eq!(record.get("tenure"), Some(&FieldValue::Number(24.0)));
        assert_eq!(record.get("Contract"), None);
    }

    #[test]
    fn display_formats() {
        assert_eq!(FieldValue::Number(1500.0).to_string(), "1500");
        assert_eq!(FieldValue::Number(70.35).to_string(), "70.35");
        assert_eq!(FieldValue::from("Fiber optic").to_string(), "Fiber optic");
    }

    #[test]
    fn collects_from_pairs() {
        let record: CustomerRecord = [("Partner", "Yes"), ("Dependents", "No")].into_iter().collect();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Partner"), Some(&FieldValue::Text("Yes".into())));
    }
}
