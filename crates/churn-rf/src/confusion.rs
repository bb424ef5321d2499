//! Confusion matrix, per-class metrics, and the classification report.

use std::fmt;

use serde::Serialize;

use crate::error::RfError;

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[true_class][predicted_class]` counts how many samples
/// with true label `true_class` were predicted as `predicted_class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: usize,
    /// TP / (TP + FP); 0.0 if the class was never predicted.
    pub precision: f64,
    /// TP / (TP + FN); 0.0 if the class has no true samples.
    pub recall: f64,
    /// Harmonic mean of precision and recall; 0.0 if both are zero.
    pub f1: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero labels provided |
    /// | [`RfError::PredictionCountMismatch`] | Slices differ in length |
    /// | [`RfError::LabelOutOfRange`] | A label is `>= n_classes` |
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, RfError> {
        if true_labels.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        if true_labels.len() != predicted.len() {
            return Err(RfError::PredictionCountMismatch {
                n_true: true_labels.len(),
                n_predicted: predicted.len(),
            });
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            if let Some(label) = [t, p].into_iter().find(|&l| l >= n_classes) {
                return Err(RfError::LabelOutOfRange { label, n_classes });
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    /// Total number of samples counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        match self.total() {
            0 => 0.0,
            total => correct as f64 / total as f64,
        }
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted: usize = self.matrix.iter().map(|row| row[c]).sum();
                let support: usize = self.matrix[c].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Averaged precision/recall/F1 row of a [`ClassificationReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Precision/recall/F1 per class plus accuracy, macro and weighted averages.
///
/// `Display` renders the familiar plain-text layout:
///
/// ```text
///               precision    recall  f1-score   support
///
///           No       0.83      0.90      0.86      1036
///          Yes       0.64      0.49      0.56       373
///
///     accuracy                           0.79      1409
///    macro avg       0.74      0.70      0.71      1409
/// weighted avg       0.78      0.79      0.78      1409
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub class_names: Vec<String>,
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationReport {
    /// Build a report from a confusion matrix.
    ///
    /// `class_names[c]` labels class `c`; missing names fall back to the index.
    #[must_use]
    pub fn new(matrix: &ConfusionMatrix, class_names: &[&str]) -> Self {
        let classes = matrix.class_metrics();
        let total = matrix.total();
        let n = classes.len().max(1) as f64;

        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: classes.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: classes.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total,
        };
        let weight = |value: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|m| value(m) * m.support as f64).sum::<f64>() / total as f64
            }
        };
        let weighted_avg = AveragedMetrics {
            precision: weight(|m| m.precision),
            recall: weight(|m| m.recall),
            f1: weight(|m| m.f1),
            support: total,
        };

        let class_names = (0..matrix.n_classes())
            .map(|c| class_names.get(c).map_or_else(|| c.to_string(), |s| s.to_string()))
            .collect();

        Self {
            class_names,
            classes,
            accuracy: matrix.accuracy(),
            macro_avg,
            weighted_avg,
            confusion_matrix: matrix.clone(),
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>10} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (name, m) in self.class_names.iter().zip(&self.classes) {
            writeln!(
                f,
                "{name:>12} {:>10.2} {:>9.2} {:>9.2} {:>9}",
                m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{label:>12} {:>10.2} {:>9.2} {:>9.2} {:>9}",
                avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_binary_matrix() {
        // 6 retained (0), 4 churned (1); one churner missed, one false alarm.
        let true_labels = vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        let predicted = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 2).unwrap();
        assert_eq!(cm.as_rows().to_vec(), vec![vec![5usize, 1], vec![1, 3]]);
        assert!((cm.accuracy() - 0.8).abs() < 1e-12);

        let metrics = cm.class_metrics();
        assert!((metrics[1].precision - 0.75).abs() < 1e-12);
        assert!((metrics[1].recall - 0.75).abs() < 1e-12);
        assert_eq!(metrics[0].support, 6);
    }

    #[test]
    fn zero_support_class() {
        let cm = ConfusionMatrix::from_labels(&[0, 0], &[0, 0], 2).unwrap();
        let metrics = cm.class_metrics();
        assert_eq!(metrics[1].support, 0);
        assert_eq!(metrics[1].f1, 0.0);
    }

    #[test]
    fn input_errors() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[], &[], 2),
            Err(RfError::EmptyDataset)
        ));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 1], &[0], 2),
            Err(RfError::PredictionCountMismatch { .. })
        ));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 1], &[0, 2], 2),
            Err(RfError::LabelOutOfRange { label: 2, .. })
        ));
    }

    #[test]
    fn report_averages() {
        let true_labels = vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        let predicted = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 2).unwrap();
        let report = ClassificationReport::new(&cm, &["No", "Yes"]);

        // class 0: precision 5/6, recall 5/6; class 1: 0.75 / 0.75
        let expected_macro = (5.0 / 6.0 + 0.75) / 2.0;
        assert!((report.macro_avg.precision - expected_macro).abs() < 1e-12);
        let expected_weighted = (5.0 / 6.0 * 6.0 + 0.75 * 4.0) / 10.0;
        assert!((report.weighted_avg.recall - expected_weighted).abs() < 1e-12);
        assert_eq!(report.macro_avg.support, 10);

        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("Yes"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("0.80"));
    }

    #[test]
    fn report_falls_back_to_indices() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], 2).unwrap();
        let report = ClassificationReport::new(&cm, &[]);
        assert_eq!(report.class_names, vec!["0", "1"]);
    }
}
