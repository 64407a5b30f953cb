//! # Evaluation Metrics
//!
//! Scores a fitted classifier against held-out labels.
//!
//! - `roc_auc`: rank-based (Mann-Whitney) area under the ROC curve, with
//!   average ranks for tied scores.
//! - `ConfusionMatrix` and `ClassificationReport`: threshold-dependent
//!   counts and per-class precision/recall/F1.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores closer than this are ranked as ties.
const TIE_TOLERANCE: f64 = 1e-10;

/// Area under the ROC curve of `scores` against binary `labels`.
///
/// Returns 0.5 when either class is absent.
pub fn roc_auc(labels: ArrayView1<f64>, scores: ArrayView1<f64>) -> f64 {
    assert_eq!(labels.len(), scores.len());
    let n = labels.len();
    let n_pos = labels.iter().filter(|&&t| t > 0.5).count() as f64;
    let n_neg = n as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&i, &j| scores[i].total_cmp(&scores[j]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && (scores[idx[j]] - scores[idx[i]]).abs() < TIE_TOLERANCE {
            j += 1;
        }
        let avg_rank = (i + j - 1) as f64 / 2.0 + 1.0;
        for &k in &idx[i..j] {
            ranks[k] = avg_rank;
        }
        i = j;
    }

    let sum_ranks_pos: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|&(&y, _)| y > 0.5)
        .map(|(_, &r)| r)
        .sum();

    // U = R_pos - n_pos(n_pos+1)/2
    (sum_ranks_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Mean and population standard deviation.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// 2x2 contingency table; rows are actual class, columns predicted class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: ArrayView1<f64>, predicted: &[u8]) -> Self {
        assert_eq!(labels.len(), predicted.len());
        let mut cm = Self::default();
        for (&y, &p) in labels.iter().zip(predicted) {
            match (y > 0.5, p == 1) {
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
                (true, true) => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }

    /// Precision, recall, F1 and support for class 0 or 1.
    pub fn class_stats(&self, class: u8) -> ClassStats {
        let (tp, fp, fn_) = if class == 1 {
            (self.true_positive, self.false_positive, self.false_negative)
        } else {
            (self.true_negative, self.false_negative, self.false_positive)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassStats {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              predicted 0  predicted 1")?;
        writeln!(
            f,
            "actual 0      {:>11}  {:>11}",
            self.true_negative, self.false_positive
        )?;
        write!(
            f,
            "actual 1      {:>11}  {:>11}",
            self.false_negative, self.true_positive
        )
    }
}

/// Zero when the denominator is zero.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 with accuracy and averaged rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub negative: ClassStats,
    pub positive: ClassStats,
    pub accuracy: f64,
    pub macro_avg: ClassStats,
    pub weighted_avg: ClassStats,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = cm.class_stats(0);
        let positive = cm.class_stats(1);
        let total = cm.total();
        let macro_avg = ClassStats {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1: (negative.f1 + positive.f1) / 2.0,
            support: total,
        };
        let weighted = |a: f64, b: f64| {
            if total == 0 {
                0.0
            } else {
                (a * negative.support as f64 + b * positive.support as f64) / total as f64
            }
        };
        let weighted_avg = ClassStats {
            precision: weighted(negative.precision, positive.precision),
            recall: weighted(negative.recall, positive.recall),
            f1: weighted(negative.f1, positive.f1),
            support: total,
        };
        Self {
            negative,
            positive,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        write_row(f, "0", &self.negative)?;
        write_row(f, "1", &self.positive)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write!(
            f,
            "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "weighted avg",
            self.weighted_avg.precision,
            self.weighted_avg.recall,
            self.weighted_avg.f1,
            self.weighted_avg.support
        )
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, s: &ClassStats) -> fmt::Result {
    writeln!(
        f,
        "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
        name, s.precision, s.recall, s.f1, s.support
    )
}
