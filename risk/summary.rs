//! # Dataset Summary
//!
//! Descriptive statistics of the raw (un-imputed) dataset: class balance,
//! per-class feature means, zero counts in the imputed columns, outcome rates
//! by age group and by simple risk factor, and the Pearson correlation matrix
//! over all nine columns.

use crate::data::{Dataset, FEATURE_NAMES, LABEL_COLUMN, NUM_FEATURES, column};
use crate::preprocess::IMPUTED_COLUMNS;
use ndarray::{Array2, ArrayView1, Axis};
use serde::Serialize;
use std::fmt;

/// Upper age bound (inclusive) and label of each age group.
const AGE_GROUPS: [(f64, &str); 5] = [
    (30.0, "<30"),
    (40.0, "30-39"),
    (50.0, "40-49"),
    (60.0, "50-59"),
    (f64::INFINITY, "60+"),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupRate {
    pub label: String,
    pub total: usize,
    pub positive: usize,
    pub rate: f64,
}

impl GroupRate {
    fn from_mask(label: &str, labels: ArrayView1<f64>, mask: impl Iterator<Item = bool>) -> Self {
        let (total, positive) = labels
            .iter()
            .zip(mask)
            .filter(|&(_, m)| m)
            .fold((0, 0), |(t, p), (&y, _)| (t + 1, p + usize::from(y > 0.5)));
        Self {
            label: label.to_string(),
            total,
            positive,
            rate: if total == 0 { 0.0 } else { positive as f64 / total as f64 },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    /// `(negatives, positives)`.
    pub class_counts: (usize, usize),
    /// Mean of each feature among negatives.
    pub negative_means: Vec<f64>,
    /// Mean of each feature among positives.
    pub positive_means: Vec<f64>,
    /// `(column, zero count)` for each imputed column.
    pub zero_counts: Vec<(String, usize)>,
    pub age_groups: Vec<GroupRate>,
    pub risk_factors: Vec<GroupRate>,
    /// Names of the rows/columns of `correlation`: features then outcome.
    pub columns: Vec<String>,
    pub correlation: Array2<f64>,
}

/// Pearson correlation; NaN when either side has zero variance.
pub fn pearson(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let n = a.len() as f64;
    if n == 0.0 {
        return f64::NAN;
    }
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return f64::NAN;
    }
    cov / (var_a * var_b).sqrt()
}

fn class_means(dataset: &Dataset, positive: bool) -> Vec<f64> {
    let rows: Vec<usize> = dataset
        .labels
        .iter()
        .enumerate()
        .filter(|&(_, &y)| (y > 0.5) == positive)
        .map(|(i, _)| i)
        .collect();
    let subset = dataset.features.select(Axis(0), &rows);
    subset
        .mean_axis(Axis(0))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![f64::NAN; NUM_FEATURES])
}

pub fn summarize(dataset: &Dataset) -> DatasetSummary {
    let features = &dataset.features;
    let labels = dataset.labels.view();
    let zero_counts = IMPUTED_COLUMNS
        .iter()
        .map(|&j| {
            let zeros = features.column(j).iter().filter(|&&v| v == 0.0).count();
            (FEATURE_NAMES[j].to_string(), zeros)
        })
        .collect();

    let age = features.column(column::AGE);
    let mut lower = f64::NEG_INFINITY;
    let mut age_groups = Vec::with_capacity(AGE_GROUPS.len());
    for (upper, label) in AGE_GROUPS {
        let lo = lower;
        age_groups.push(GroupRate::from_mask(
            label,
            labels,
            age.iter().map(move |&a| a > lo && a <= upper),
        ));
        lower = upper;
    }

    let risk_factors = vec![
        GroupRate::from_mask(
            "High Glucose",
            labels,
            features.column(column::GLUCOSE).iter().map(|&v| v > 140.0),
        ),
        GroupRate::from_mask(
            "High BMI",
            labels,
            features.column(column::BMI).iter().map(|&v| v > 30.0),
        ),
        GroupRate::from_mask(
            "High Blood Pressure",
            labels,
            features.column(column::BLOOD_PRESSURE).iter().map(|&v| v > 90.0),
        ),
        GroupRate::from_mask("Advanced Age", labels, age.iter().map(|&v| v > 50.0)),
        GroupRate::from_mask(
            "Multiple Pregnancies",
            labels,
            features.column(column::PREGNANCIES).iter().map(|&v| v > 3.0),
        ),
    ];

    let mut all = Array2::zeros((dataset.n_rows(), NUM_FEATURES + 1));
    all.slice_mut(ndarray::s![.., ..NUM_FEATURES]).assign(features);
    all.column_mut(NUM_FEATURES).assign(&labels);
    let k = NUM_FEATURES + 1;
    let mut correlation = Array2::from_elem((k, k), 1.0);
    for i in 0..k {
        for j in (i + 1)..k {
            let r = pearson(all.column(i), all.column(j));
            correlation[[i, j]] = r;
            correlation[[j, i]] = r;
        }
    }

    let mut columns: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    columns.push(LABEL_COLUMN.to_string());

    DatasetSummary {
        n_rows: dataset.n_rows(),
        class_counts: dataset.class_counts(),
        negative_means: class_means(dataset, false),
        positive_means: class_means(dataset, true),
        zero_counts,
        age_groups,
        risk_factors,
        columns,
        correlation,
    }
}

impl DatasetSummary {
    /// Correlation of each feature with the outcome, strongest first.
    pub fn outcome_correlations(&self) -> Vec<(String, f64)> {
        let last = self.columns.len() - 1;
        let mut pairs: Vec<(String, f64)> = self.columns[..last]
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), self.correlation[[i, last]]))
            .collect();
        pairs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        pairs
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (neg, pos) = self.class_counts;
        writeln!(f, "Rows: {}", self.n_rows)?;
        writeln!(
            f,
            "Outcome: {neg} negative ({:.1}%), {pos} positive ({:.1}%)",
            100.0 * neg as f64 / self.n_rows.max(1) as f64,
            100.0 * pos as f64 / self.n_rows.max(1) as f64
        )?;
        writeln!(f)?;
        writeln!(f, "{:<26} {:>12} {:>12}", "Feature mean", "Outcome=0", "Outcome=1")?;
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            writeln!(
                f,
                "{:<26} {:>12.2} {:>12.2}",
                name, self.negative_means[i], self.positive_means[i]
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Zero entries treated as missing:")?;
        for (name, zeros) in &self.zero_counts {
            writeln!(f, "  {name:<24} {zeros:>6}")?;
        }
        writeln!(f)?;
        writeln!(f, "{:<22} {:>7} {:>9} {:>7}", "Group", "Total", "Positive", "Rate")?;
        for g in self.age_groups.iter().chain(&self.risk_factors) {
            writeln!(
                f,
                "{:<22} {:>7} {:>9} {:>6.1}%",
                g.label,
                g.total,
                g.positive,
                100.0 * g.rate
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Correlation with {LABEL_COLUMN}:")?;
        for (name, r) in self.outcome_correlations() {
            writeln!(f, "  {name:<26} {r:>+7.3}")?;
        }
        Ok(())
    }
}
