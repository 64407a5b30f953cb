//! # Persisted Model Artifacts
//!
//! The two artifacts the inference path needs:
//!
//! - `LogisticModel`: coefficients, intercept and decision threshold, plus the
//!   provenance of the training run that produced them.
//! - `Preprocessor`: the fitted zero-imputer and standard scaler, applied in
//!   that order to raw features before the classifier sees them.
//!
//! Both serialize to human-readable TOML.

use crate::estimate::{LogisticFit, sigmoid};
use crate::preprocess::{ImputationScope, PreprocessError, ZeroImputer};
use crate::scaler::{ScalerError, StandardScaler};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Bumped whenever the artifact layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 2;

/// Probabilities strictly above this are classified positive.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write artifact file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML artifact: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Input has {found} feature columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Artifact format version {found} is not supported (expected {expected}).")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Scaler error: {0}")]
    Scaler(#[from] ScalerError),
    #[error("Imputer error: {0}")]
    Imputer(#[from] PreprocessError),
    #[error("Artifact is internally inconsistent: {0}")]
    Inconsistent(String),
}

/// Shared TOML (de)serialization for the persisted artifacts.
pub trait Artifact: Serialize + DeserializeOwned + Sized {
    /// Human-readable artifact name used in log and error messages.
    const KIND: &'static str;

    /// Structural checks run after every load.
    fn validate(&self) -> Result<(), ModelError>;

    fn to_toml(&self) -> Result<String, ModelError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn from_toml(text: &str) -> Result<Self, ModelError> {
        let artifact: Self = toml::from_str(text)?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

/// Identifier shared by the classifier and preprocessor of one training run.
pub fn new_run_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Settings and sizes of the run that produced a model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingProvenance {
    /// Must equal the preprocessor's `run_id`.
    pub run_id: String,
    pub inverse_regularization: f64,
    pub tolerance: f64,
    pub iterations: usize,
    pub seed: u64,
    pub n_train: usize,
    pub n_test: usize,
    pub imputation_scope: ImputationScope,
    /// Seconds since the Unix epoch.
    pub trained_at: u64,
}

/// A fitted binary logistic-regression classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub threshold: f64,
    pub training: TrainingProvenance,
}

/// One coefficient, for importance rankings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub coefficient: f64,
}

impl FeatureWeight {
    pub fn importance(&self) -> f64 {
        self.coefficient.abs()
    }
}

impl LogisticModel {
    pub fn from_fit(fit: &LogisticFit, feature_names: &[&str], training: TrainingProvenance) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            feature_names: feature_names.iter().map(|s| s.to_string()).collect(),
            coefficients: fit.coefficients.to_vec(),
            intercept: fit.intercept,
            threshold: DEFAULT_THRESHOLD,
            training,
        }
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Linear predictor `x . w + b` for each row of standardized features.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.n_features(),
            });
        }
        let w = ArrayView1::from(&self.coefficients[..]);
        Ok(x.dot(&w) + self.intercept)
    }

    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Hard 0/1 labels at the model threshold.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>, ModelError> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|&p| self.label_for(p))
            .collect())
    }

    /// Label and probability for one standardized record.
    pub fn predict_one(&self, row: ArrayView1<f64>) -> Result<(u8, f64), ModelError> {
        if row.len() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: row.len(),
                expected: self.n_features(),
            });
        }
        let eta = row.dot(&ArrayView1::from(&self.coefficients[..])) + self.intercept;
        let p = sigmoid(eta);
        Ok((self.label_for(p), p))
    }

    pub fn label_for(&self, probability: f64) -> u8 {
        u8::from(probability > self.threshold)
    }

    /// Coefficients ranked by absolute value, largest first.
    pub fn feature_importance(&self) -> Vec<FeatureWeight> {
        let mut weights: Vec<FeatureWeight> = self
            .feature_names
            .iter()
            .zip(&self.coefficients)
            .map(|(name, &coefficient)| FeatureWeight {
                feature: name.clone(),
                coefficient,
            })
            .collect();
        weights.sort_by(|a, b| b.importance().total_cmp(&a.importance()));
        weights
    }
}

impl Artifact for LogisticModel {
    const KIND: &'static str = "classifier";

    fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if self.coefficients.len() != self.feature_names.len() {
            return Err(ModelError::Inconsistent(format!(
                "{} coefficients for {} feature names",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        if self
            .coefficients
            .iter()
            .chain([&self.intercept, &self.threshold])
            .any(|v| !v.is_finite())
        {
            return Err(ModelError::Inconsistent(
                "non-finite coefficient, intercept or threshold".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(ModelError::Inconsistent(format!(
                "threshold {} outside [0, 1)",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Raw-feature transform applied ahead of the classifier: zero-imputation
/// followed by standardization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub format_version: u32,
    /// Run that fitted these statistics.
    pub run_id: String,
    pub imputer: ZeroImputer,
    pub scaler: StandardScaler,
}

impl Preprocessor {
    pub fn new(imputer: ZeroImputer, scaler: StandardScaler, run_id: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            run_id: run_id.into(),
            imputer,
            scaler,
        }
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Imputes and standardizes every row of raw features.
    pub fn transform(&self, raw: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if raw.ncols() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: raw.ncols(),
                expected: self.n_features(),
            });
        }
        let mut imputed = raw.to_owned();
        for row in imputed.rows_mut() {
            self.imputer.apply_row(row);
        }
        Ok(self.scaler.transform(imputed.view())?)
    }

    /// Imputes and standardizes a single raw record.
    pub fn transform_row(&self, raw: ArrayView1<f64>) -> Result<Array1<f64>, ModelError> {
        if raw.len() != self.n_features() {
            return Err(ModelError::MismatchedFeatureCount {
                found: raw.len(),
                expected: self.n_features(),
            });
        }
        let mut imputed = raw.to_owned();
        self.imputer.apply_row(imputed.view_mut());
        Ok(self.scaler.transform_row(imputed.view())?)
    }
}

impl Artifact for Preprocessor {
    const KIND: &'static str = "scaler";

    fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        self.scaler.validate()?;
        self.imputer.validate()?;
        if let Some(m) = self
            .imputer
            .medians
            .iter()
            .find(|m| m.index >= self.n_features())
        {
            return Err(ModelError::Inconsistent(format!(
                "imputed column '{}' at index {} is outside the {} scaled features",
                m.column,
                m.index,
                self.n_features()
            )));
        }
        Ok(())
    }
}

/// Checks that a classifier and preprocessor come from the same training run
/// and were built for the same features.
pub fn check_compatible(model: &LogisticModel, preprocessor: &Preprocessor) -> Result<(), ModelError> {
    if model.training.run_id != preprocessor.run_id {
        return Err(ModelError::Inconsistent(format!(
            "classifier from run {} paired with scaler from run {}",
            model.training.run_id, preprocessor.run_id
        )));
    }
    if model.feature_names != preprocessor.scaler.feature_names {
        return Err(ModelError::Inconsistent(format!(
            "classifier features {:?} do not match scaler features {:?}",
            model.feature_names, preprocessor.scaler.feature_names
        )));
    }
    Ok(())
}
