//! Zero-value imputation and stratified train/test partitioning.
//!
//! Five clinical measurements cannot physically be zero; a literal `0` in those
//! columns is the dataset's missing-value sentinel. The imputer replaces each
//! such zero with the median of the column's non-zero values. Every other
//! column, including zero-valued pregnancy counts, is left untouched.

use crate::data::{Dataset, FEATURE_NAMES, column};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Indices of the columns whose zero entries are treated as missing.
pub const IMPUTED_COLUMNS: [usize; 5] = [
    column::GLUCOSE,
    column::BLOOD_PRESSURE,
    column::SKIN_THICKNESS,
    column::INSULIN,
    column::BMI,
];

/// Which rows the imputation medians are computed over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationScope {
    /// Every row of the dataset, before partitioning.
    #[default]
    Dataset,
    /// Only the training partition.
    TrainingSplit,
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Test fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidTestFraction(f64),
    #[error(
        "Class {class} has {count} rows; a stratified split needs at least 2 so both partitions receive it."
    )]
    ClassTooSmall { class: u8, count: usize },
    #[error("Imputation column '{column}' does not match feature '{expected}' at index {index}.")]
    ColumnMismatch {
        column: String,
        expected: String,
        index: usize,
    },
}

/// A fitted median for one imputed column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMedian {
    pub column: String,
    pub index: usize,
    pub median: f64,
}

/// Fitted imputation statistics. Persisted inside the scaler artifact so
/// inference imputes with exactly the statistics training used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZeroImputer {
    pub medians: Vec<ColumnMedian>,
}

/// Outcome of imputing one column, reported by the training pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImputationRecord {
    pub column: String,
    pub replaced: usize,
    pub median: f64,
}

impl ZeroImputer {
    /// Fits medians over the given rows of `features`.
    pub fn fit(features: ArrayView2<f64>, rows: &[usize]) -> Self {
        let medians = IMPUTED_COLUMNS
            .iter()
            .map(|&index| {
                let column = FEATURE_NAMES[index];
                let values = features.column(index);
                let median = median_of_nonzero(rows.iter().map(|&r| values[r])).unwrap_or_else(|| {
                    log::warn!("Column {column} has no non-zero values; imputing with 0.0");
                    0.0
                });
                ColumnMedian {
                    column: column.to_string(),
                    index,
                    median,
                }
            })
            .collect();
        Self { medians }
    }

    /// Fits medians over every row.
    pub fn fit_all(features: ArrayView2<f64>) -> Self {
        let rows: Vec<usize> = (0..features.nrows()).collect();
        Self::fit(features, &rows)
    }

    pub fn median_for(&self, column: &str) -> Option<f64> {
        self.medians
            .iter()
            .find(|m| m.column == column)
            .map(|m| m.median)
    }

    /// Checks that every stored column still refers to the canonical feature at its index.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        for m in &self.medians {
            match FEATURE_NAMES.get(m.index) {
                Some(&expected) if expected == m.column => {}
                other => {
                    return Err(PreprocessError::ColumnMismatch {
                        column: m.column.clone(),
                        expected: other.map_or_else(|| "<none>".to_string(), |s| s.to_string()),
                        index: m.index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Replaces zeros in place and reports how many cells changed per column.
    pub fn apply(&self, features: &mut Array2<f64>) -> Vec<ImputationRecord> {
        let mut records = Vec::with_capacity(self.medians.len());
        for m in &self.medians {
            if m.index >= features.ncols() {
                continue;
            }
            let mut replaced = 0;
            for value in features.column_mut(m.index).iter_mut() {
                if *value == 0.0 {
                    *value = m.median;
                    replaced += 1;
                }
            }
            if replaced > 0 {
                log::info!(
                    "Replaced {replaced} zeros in {} with median value {:.2}",
                    m.column,
                    m.median
                );
            }
            records.push(ImputationRecord {
                column: m.column.clone(),
                replaced,
                median: m.median,
            });
        }
        records
    }

    /// Replaces zeros in a single record.
    pub fn apply_row(&self, mut row: ArrayViewMut1<f64>) {
        for m in &self.medians {
            if let Some(value) = row.get_mut(m.index) {
                if *value == 0.0 {
                    *value = m.median;
                }
            }
        }
    }
}

/// Median of the non-zero values, or `None` if there are none.
/// An even count averages the two middle values.
pub fn median_of_nonzero(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut kept: Vec<f64> = values.filter(|&v| v != 0.0).collect();
    if kept.is_empty() {
        return None;
    }
    kept.sort_by(f64::total_cmp);
    let mid = kept.len() / 2;
    if kept.len() % 2 == 0 {
        Some((kept[mid - 1] + kept[mid]) / 2.0)
    } else {
        Some(kept[mid])
    }
}

/// Row indices of the two partitions, each sorted ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partitions rows so each class keeps its share in both partitions.
///
/// Each class is shuffled independently with one `StdRng` seeded by `seed`,
/// and `round(n_class * test_fraction)` of its rows go to the test side.
pub fn stratified_split(
    labels: ArrayView1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<Split, PreprocessError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PreprocessError::InvalidTestFraction(test_fraction));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &y)| (y > 0.5) == (class == 1))
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 {
            return Err(PreprocessError::ClassTooSmall {
                class,
                count: members.len(),
            });
        }
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}

/// Imputes a full dataset according to `scope`, returning the fitted imputer
/// and the per-column replacement counts.
pub fn impute(
    dataset: &mut Dataset,
    split: &Split,
    scope: ImputationScope,
) -> (ZeroImputer, Vec<ImputationRecord>) {
    let imputer = match scope {
        ImputationScope::Dataset => ZeroImputer::fit_all(dataset.features.view()),
        ImputationScope::TrainingSplit => ZeroImputer::fit(dataset.features.view(), &split.train),
    };
    let records = imputer.apply(&mut dataset.features);
    (imputer, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class_counts;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};

    fn toy_features() -> Array2<f64> {
        // Pregnancies, Glucose, BP, Skin, Insulin, BMI, Pedigree, Age
        array![
            [0.0, 100.0, 70.0, 0.0, 0.0, 30.0, 0.5, 25.0],
            [2.0, 0.0, 80.0, 20.0, 90.0, 0.0, 0.4, 35.0],
            [0.0, 120.0, 0.0, 30.0, 0.0, 25.0, 0.3, 45.0],
            [4.0, 140.0, 60.0, 40.0, 110.0, 35.0, 0.0, 55.0],
        ]
    }

    #[test]
    fn median_ignores_zeros() {
        assert_eq!(median_of_nonzero([0.0, 3.0, 1.0, 0.0, 2.0].into_iter()), Some(2.0));
        assert_eq!(median_of_nonzero([0.0, 0.0].into_iter()), None);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median_of_nonzero([4.0, 1.0, 3.0, 2.0].into_iter()), Some(2.5));
    }

    #[test]
    fn imputation_only_touches_designated_columns() {
        let mut features = toy_features();
        let imputer = ZeroImputer::fit_all(features.view());
        let records = imputer.apply(&mut features);

        // Pregnancies and pedigree keep their zeros.
        assert_eq!(features[[0, 0]], 0.0);
        assert_eq!(features[[2, 0]], 0.0);
        assert_eq!(features[[3, 6]], 0.0);

        assert_abs_diff_eq!(features[[1, 1]], 120.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features[[2, 2]], 70.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features[[0, 3]], 30.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features[[0, 4]], 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features[[2, 4]], 100.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features[[1, 5]], 30.0, epsilon = 1e-12);

        let insulin = records.iter().find(|r| r.column == "Insulin").unwrap();
        assert_eq!(insulin.replaced, 2);

        for idx in IMPUTED_COLUMNS {
            assert!(features.column(idx).iter().all(|&v| v != 0.0));
        }
    }

    #[test]
    fn imputation_is_deterministic() {
        let mut a = toy_features();
        let mut b = toy_features();
        ZeroImputer::fit_all(a.view()).apply(&mut a);
        ZeroImputer::fit_all(b.view()).apply(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn all_zero_column_imputes_with_zero() {
        let mut features = toy_features();
        features.column_mut(4).fill(0.0);
        let imputer = ZeroImputer::fit_all(features.view());
        assert_eq!(imputer.median_for("Insulin"), Some(0.0));
        imputer.apply(&mut features);
        assert!(features.column(4).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn fit_over_subset_uses_only_those_rows() {
        let features = toy_features();
        let imputer = ZeroImputer::fit(features.view(), &[0, 1]);
        assert_eq!(imputer.median_for("Glucose"), Some(100.0));
        assert_eq!(imputer.median_for("BloodPressure"), Some(75.0));
    }

    #[test]
    fn apply_row_matches_apply() {
        let mut features = toy_features();
        let imputer = ZeroImputer::fit_all(features.view());
        let mut row = features.row(2).to_owned();
        imputer.apply_row(row.view_mut());
        imputer.apply(&mut features);
        assert_eq!(row, features.row(2));
    }

    #[test]
    fn validate_rejects_shifted_columns() {
        let mut imputer = ZeroImputer::fit_all(toy_features().view());
        assert!(imputer.validate().is_ok());
        imputer.medians[0].index = 0;
        assert!(matches!(
            imputer.validate(),
            Err(PreprocessError::ColumnMismatch { .. })
        ));
    }

    fn imbalanced_labels(n: usize, positives_every: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| if i % positives_every == 0 { 1.0 } else { 0.0 }))
    }

    #[test]
    fn stratified_split_preserves_class_ratio() {
        let labels = imbalanced_labels(768, 3);
        let split = stratified_split(labels.view(), 0.2, 42).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 768);
        let overall = class_counts(labels.view()).1 as f64 / 768.0;
        let train_labels = labels.select(ndarray::Axis(0), &split.train);
        let test_labels = labels.select(ndarray::Axis(0), &split.test);
        let train_ratio = class_counts(train_labels.view()).1 as f64 / split.train.len() as f64;
        let test_ratio = class_counts(test_labels.view()).1 as f64 / split.test.len() as f64;
        assert!((train_ratio - overall).abs() < 0.02);
        assert!((test_ratio - overall).abs() < 0.02);
        assert!((split.test.len() as f64 / 768.0 - 0.2).abs() < 0.01);
    }

    #[test]
    fn stratified_split_is_disjoint_sorted_and_reproducible() {
        let labels = imbalanced_labels(200, 4);
        let a = stratified_split(labels.view(), 0.25, 7).unwrap();
        let b = stratified_split(labels.view(), 0.25, 7).unwrap();
        let c = stratified_split(labels.view(), 0.25, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.test, c.test);
        assert!(a.train.windows(2).all(|w| w[0] < w[1]));
        assert!(a.test.iter().all(|i| a.train.binary_search(i).is_err()));
    }

    #[test]
    fn stratified_split_rejects_bad_fraction() {
        let labels = imbalanced_labels(20, 2);
        assert!(matches!(
            stratified_split(labels.view(), 1.0, 1),
            Err(PreprocessError::InvalidTestFraction(_))
        ));
        assert!(matches!(
            stratified_split(labels.view(), 0.0, 1),
            Err(PreprocessError::InvalidTestFraction(_))
        ));
    }

    #[test]
    fn stratified_split_rejects_singleton_class() {
        let mut labels = Array1::zeros(20);
        labels[3] = 1.0;
        assert!(matches!(
            stratified_split(labels.view(), 0.2, 1),
            Err(PreprocessError::ClassTooSmall { class: 1, count: 1 })
        ));
    }
}
