//! Confusion matrix and per-class classification metrics

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Largest supported matrix dimension. Counts are stored densely.
pub const MAX_CLASSES: usize = 1024;

/// Confusion matrix for multi-class classification.
///
/// Element `[i][j]` is the number of samples with true class `i` predicted
/// as class `j`. The matrix is always square and grows when a class index
/// beyond the current dimension is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Create an all-zero `n_classes x n_classes` matrix, clamped to
    /// [`MAX_CLASSES`].
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        let n_classes = n_classes.min(MAX_CLASSES);
        Self {
            counts: vec![vec![0; n_classes]; n_classes],
        }
    }

    /// Build from `(truth, predicted)` pairs, with at least `min_classes`
    /// classes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `min_classes` or a class index
    /// needs more than [`MAX_CLASSES`] classes.
    pub fn from_pairs<I>(pairs: I, min_classes: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        if min_classes > MAX_CLASSES {
            return Err(Error::InvalidInput(format!(
                "{min_classes} classes exceed the limit of {MAX_CLASSES}"
            )));
        }
        let mut cm = Self::new(min_classes);
        for (truth, predicted) in pairs {
            cm.record(truth, predicted)?;
        }
        Ok(cm)
    }

    /// Count one classified example.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a class index is `>=`
    /// [`MAX_CLASSES`]; the matrix is left unchanged.
    pub fn record(&mut self, truth: usize, predicted: usize) -> Result<()> {
        let largest = truth.max(predicted);
        let needed = largest
            .checked_add(1)
            .filter(|&n| n <= MAX_CLASSES)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "class index {largest} exceeds the limit of {MAX_CLASSES} classes"
                ))
            })?;
        if needed > self.n_classes() {
            self.grow(needed);
        }
        self.counts[truth][predicted] += 1;
        Ok(())
    }

    fn grow(&mut self, n_classes: usize) {
        for row in &mut self.counts {
            row.resize(n_classes, 0);
        }
        self.counts.resize_with(n_classes, || vec![0; n_classes]);
    }

    /// Number of classes (matrix dimension).
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    /// Get the raw matrix rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Count at `[truth][predicted]`, zero outside the matrix.
    #[must_use]
    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts
            .get(truth)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    /// True positives for a class.
    #[must_use]
    pub fn true_positives(&self, class: usize) -> u64 {
        self.get(class, class)
    }

    /// False positives for a class (predicted as class but wasn't).
    #[must_use]
    pub fn false_positives(&self, class: usize) -> u64 {
        self.predicted_total(class) - self.true_positives(class)
    }

    /// False negatives for a class (was class but predicted differently).
    #[must_use]
    pub fn false_negatives(&self, class: usize) -> u64 {
        self.support(class) - self.true_positives(class)
    }

    /// True negatives for a class.
    #[must_use]
    pub fn true_negatives(&self, class: usize) -> u64 {
        self.total()
            - self.true_positives(class)
            - self.false_positives(class)
            - self.false_negatives(class)
    }

    /// Row sum: number of samples whose true class is `class`.
    #[must_use]
    pub fn support(&self, class: usize) -> u64 {
        self.counts.get(class).map_or(0, |row| row.iter().sum())
    }

    /// Column sum: number of samples predicted as `class`.
    #[must_use]
    pub fn predicted_total(&self, class: usize) -> u64 {
        self.counts
            .iter()
            .map(|row| row.get(class).copied().unwrap_or(0))
            .sum()
    }

    /// Total number of samples.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Fraction of correct predictions, `None` for an empty matrix.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let correct: u64 = (0..self.n_classes()).map(|i| self.counts[i][i]).sum();
        Some(correct as f64 / total as f64)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes() {
            write!(f, " {:>7}", format!("pred{j}"))?;
        }
        writeln!(f)?;
        for (i, row) in self.counts.iter().enumerate() {
            write!(f, "{:>8}", format!("true{i}"))?;
            for count in row {
                write!(f, " {count:>7}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class: usize,
    /// TP / (TP + FP), 0 when nothing was predicted as this class
    pub precision: f64,
    /// TP / (TP + FN), 0 when the class never occurs
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1: f64,
    /// Number of true instances
    pub support: u64,
}

/// Classification summary derived from a confusion matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// The underlying matrix
    pub matrix: ConfusionMatrix,
    /// Per-class metrics for every class in the matrix
    pub per_class: Vec<ClassMetrics>,
    /// Unweighted mean precision over observed classes
    pub macro_precision: f64,
    /// Unweighted mean recall over observed classes
    pub macro_recall: f64,
    /// Unweighted mean F1 over observed classes
    pub macro_f1: f64,
    /// Overall accuracy
    pub accuracy: f64,
}

impl ClassificationReport {
    /// Derive metrics from a matrix. `None` for an empty matrix.
    ///
    /// Macro averages run over the classes that occur as a true or a
    /// predicted label, so padding the matrix with unused classes does not
    /// change them.
    #[must_use]
    pub fn from_matrix(matrix: ConfusionMatrix) -> Option<Self> {
        let accuracy = matrix.accuracy()?;

        let per_class: Vec<ClassMetrics> = (0..matrix.n_classes())
            .map(|class| {
                let tp = matrix.true_positives(class) as f64;
                let fp = matrix.false_positives(class) as f64;
                let fn_ = matrix.false_negatives(class) as f64;

                let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
                let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    class,
                    precision,
                    recall,
                    f1,
                    support: matrix.support(class),
                }
            })
            .collect();

        let observed: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || matrix.predicted_total(m.class) > 0)
            .collect();
        let n = observed.len() as f64;
        let macro_avg = |f: fn(&ClassMetrics) -> f64| observed.iter().map(|m| f(m)).sum::<f64>() / n;

        Some(Self {
            macro_precision: macro_avg(|m| m.precision),
            macro_recall: macro_avg(|m| m.recall),
            macro_f1: macro_avg(|m| m.f1),
            accuracy,
            per_class,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> ConfusionMatrix {
        // truth:     0 0 0 1 1 2
        // predicted: 0 0 1 1 2 2
        ConfusionMatrix::from_pairs([(0, 0), (0, 0), (0, 1), (1, 1), (1, 2), (2, 2)], 0).unwrap()
    }

    #[test]
    fn test_counts_and_sums() {
        let cm = sample_matrix();
        assert_eq!(cm.n_classes(), 3);
        assert_eq!(cm.get(0, 0), 2);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.support(0), 3);
        assert_eq!(cm.predicted_total(2), 2);
        assert_eq!(cm.false_positives(1), 1);
        assert_eq!(cm.false_negatives(1), 1);
        assert_eq!(cm.true_negatives(0), 3);
    }

    #[test]
    fn test_grows_on_demand() {
        let mut cm = ConfusionMatrix::new(2);
        cm.record(4, 0).unwrap();
        assert_eq!(cm.n_classes(), 5);
        assert!(cm.rows().iter().all(|row| row.len() == 5));
        assert_eq!(cm.get(4, 0), 1);
        assert_eq!(cm.get(9, 9), 0);
    }

    #[test]
    fn test_report_values() {
        let report = ClassificationReport::from_matrix(sample_matrix()).unwrap();
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);

        let c0 = report.per_class[0];
        assert!((c0.precision - 1.0).abs() < 1e-12);
        assert!((c0.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((c0.f1 - 0.8).abs() < 1e-12);

        let expected_macro_p = (1.0 + 0.5 + 0.5) / 3.0;
        assert!((report.macro_precision - expected_macro_p).abs() < 1e-12);
    }

    #[test]
    fn test_padding_does_not_change_macro() {
        let pairs = [(0, 0), (1, 0), (1, 1)];
        let small =
            ClassificationReport::from_matrix(ConfusionMatrix::from_pairs(pairs, 0).unwrap()).unwrap();
        let padded =
            ClassificationReport::from_matrix(ConfusionMatrix::from_pairs(pairs, 10).unwrap()).unwrap();
        assert_eq!(padded.per_class.len(), 10);
        assert!((small.macro_f1 - padded.macro_f1).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix_has_no_report() {
        assert!(ClassificationReport::from_matrix(ConfusionMatrix::new(3)).is_none());
    }

    #[test]
    fn test_display() {
        let text = ConfusionMatrix::from_pairs([(0, 1)], 2).unwrap().to_string();
        assert!(text.contains("pred1"));
        assert!(text.contains("true0"));
    }

    #[test]
    fn test_class_index_limit() {
        let mut cm = ConfusionMatrix::new(0);
        assert!(matches!(cm.record(usize::MAX, 0), Err(Error::InvalidInput(_))));
        assert!(cm.record(0, MAX_CLASSES).is_err());
        assert_eq!(cm.n_classes(), 0);

        cm.record(MAX_CLASSES - 1, 0).unwrap();
        assert_eq!(cm.n_classes(), MAX_CLASSES);
        assert_eq!(cm.total(), 1);
    }

    #[test]
    fn test_min_classes_limit() {
        assert!(ConfusionMatrix::from_pairs([(0, 0)], MAX_CLASSES + 1).is_err());
        assert_eq!(ConfusionMatrix::new(usize::MAX).n_classes(), MAX_CLASSES);
    }
}
