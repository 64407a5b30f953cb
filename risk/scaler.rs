use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard deviations below this are treated as zero variance.
const MIN_STD_DEV: f64 = 1e-12;

/// Per-feature standardization fitted on the training partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation of each feature.
    pub scale: Vec<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Feature '{feature}' has zero variance in the training partition (std = {std_dev:e}); standardization would divide by zero."
)]
pub struct DegenerateFeatureError {
    pub feature: String,
    pub std_dev: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalerError {
    #[error("Input has {found} feature columns, but the scaler was fitted on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Scaler is internally inconsistent: {0}")]
    Corrupt(String),
}

impl StandardScaler {
    /// Fits mean and standard deviation per column of `x`.
    pub fn fit(x: ArrayView2<f64>, feature_names: &[&str]) -> Result<Self, DegenerateFeatureError> {
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let name = feature_names
                .get(j)
                .map_or_else(|| format!("feature_{j}"), |s| s.to_string());
            let m = column.mean().unwrap_or(0.0);
            let variance = if n > 0.0 {
                column.fold(0.0, |acc, &v| acc + (v - m) * (v - m)) / n
            } else {
                0.0
            };
            let std_dev = variance.sqrt();
            if !(std_dev > MIN_STD_DEV) {
                return Err(DegenerateFeatureError {
                    feature: name,
                    std_dev,
                });
            }
            mean.push(m);
            scale.push(std_dev);
        }

        Ok(Self {
            feature_names: feature_names.iter().map(|s| s.to_string()).collect(),
            mean,
            scale,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Checks that the stored vectors agree in length and hold usable values.
    pub fn validate(&self) -> Result<(), ScalerError> {
        if self.scale.len() != self.mean.len() || self.feature_names.len() != self.mean.len() {
            return Err(ScalerError::Corrupt(format!(
                "{} names, {} means, {} scales",
                self.feature_names.len(),
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(j) = self
            .scale
            .iter()
            .position(|&s| !(s.is_finite() && s > MIN_STD_DEV))
        {
            return Err(ScalerError::Corrupt(format!(
                "non-positive scale for '{}'",
                self.feature_names[j]
            )));
        }
        Ok(())
    }

    /// Applies `(x - mean) / scale` column-wise.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ScalerError> {
        self.check_width(x.ncols())?;
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        Ok((&x - &mean) / &scale)
    }

    /// Applies the transform to a single record.
    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>, ScalerError> {
        self.check_width(row.len())?;
        Ok(ndarray::Zip::from(&row)
            .and(&self.mean[..])
            .and(&self.scale[..])
            .map_collect(|&v, &m, &s| (v - m) / s))
    }

    fn check_width(&self, found: usize) -> Result<(), ScalerError> {
        if found != self.n_features() {
            return Err(ScalerError::MismatchedFeatureCount {
                found,
                expected: self.n_features(),
            });
        }
        Ok(())
    }
}
