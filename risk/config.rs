//! # Pipeline Configuration
//!
//! Every tunable of the training and inference paths, loadable from a TOML file.
//! Absent fields fall back to the defaults below, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! dataset = "diabetes.csv"
//!
//! [artifacts]
//! dir = "."
//! model_file = "logistic_model.toml"
//! scaler_file = "scaler.toml"
//!
//! [training]
//! test_fraction = 0.2
//! seed = 42
//! cv_folds = 5
//! inverse_regularization = 1.0
//! max_iterations = 1000
//! tolerance = 1e-5
//! imputation_scope = "dataset"
//!
//! [logging]
//! level = "info"
//! ```

use crate::estimate::FitConfig;
use crate::logging::{LoggingConfig, parse_level};
use crate::persist::ArtifactStore;
use crate::preprocess::ImputationScope;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the two artifacts live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub model_file: String,
    pub scaler_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            model_file: "logistic_model.toml".to_string(),
            scaler_file: "scaler.toml".to_string(),
        }
    }
}

impl ArtifactConfig {
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.dir, self.model_file.clone(), self.scaler_file.clone())
    }
}

/// Split, cross-validation and solver settings for one training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub inverse_regularization: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub imputation_scope: ImputationScope,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let fit = FitConfig::default();
        Self {
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 5,
            inverse_regularization: fit.inverse_regularization,
            max_iterations: fit.max_iterations,
            tolerance: fit.tolerance,
            imputation_scope: ImputationScope::default(),
        }
    }
}

impl TrainingConfig {
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            inverse_regularization: self.inverse_regularization,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_fraction must lie strictly between 0 and 1, got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(ConfigError::Invalid(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.seed > i64::MAX as u64 {
            return Err(ConfigError::Invalid(format!(
                "seed must be at most {} to be stored in TOML artifacts, got {}",
                i64::MAX,
                self.seed
            )));
        }
        self.fit_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: PathBuf,
    pub artifacts: ArtifactConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("diabetes.csv"),
            artifacts: ArtifactConfig::default(),
            training: TrainingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.training.validate()?;
        if self.artifacts.model_file == self.artifacts.scaler_file {
            return Err(ConfigError::Invalid(
                "model_file and scaler_file must differ".to_string(),
            ));
        }
        parse_level(&self.logging.level).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config.dataset, PathBuf::from("diabetes.csv"));
        assert_eq!(config.artifacts.model_file, "logistic_model.toml");
        assert_eq!(config.artifacts.scaler_file, "scaler.toml");
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.cv_folds, 5);
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.training.inverse_regularization, 1.0);
        assert_eq!(config.training.imputation_scope, ImputationScope::Dataset);
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config = PipelineConfig::from_toml(
            r#"
dataset = "data/pima.csv"

[training]
seed = 7
imputation_scope = "training_split"

[artifacts]
dir = "models"
"#,
        )
        .unwrap();
        assert_eq!(config.dataset, PathBuf::from("data/pima.csv"));
        assert_eq!(config.training.seed, 7);
        assert_eq!(
            config.training.imputation_scope,
            ImputationScope::TrainingSplit
        );
        assert_eq!(config.training.cv_folds, 5);
        assert_eq!(config.artifacts.dir, PathBuf::from("models"));
        assert_eq!(config.artifacts.scaler_file, "scaler.toml");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[training]\ncv_folds = 3").unwrap();
        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.training.cv_folds, 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            PipelineConfig::load(Some(missing.as_path())),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for text in [
            "[training]\ntest_fraction = 1.0",
            "[training]\ntest_fraction = 0.0",
            "[training]\ncv_folds = 1",
            "[training]\ninverse_regularization = -1.0",
            "[training]\ntolerance = 0.0",
            "[logging]\nlevel = \"chatty\"",
            "[artifacts]\nmodel_file = \"a.toml\"\nscaler_file = \"a.toml\"",
        ] {
            let config = PipelineConfig::from_toml(text).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn seed_beyond_toml_integer_range_is_rejected() {
        let mut training = TrainingConfig {
            seed: i64::MAX as u64,
            ..TrainingConfig::default()
        };
        training.validate().unwrap();

        training.seed = i64::MAX as u64 + 1;
        match training.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("seed"), "{msg}"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_scope_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml("[training]\nimputation_scope = \"everything\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = PipelineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
