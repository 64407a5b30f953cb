//! # Training Pipeline
//!
//! Runs the stages in order: impute, split, standardize, fit, evaluate,
//! and (through [`train_and_persist`]) save. Every stage fails fast; the first
//! error aborts the run and nothing is written.

use crate::config::{ConfigError, PipelineConfig, TrainingConfig};
use crate::data::{DataLoadError, Dataset, FEATURE_NAMES, load_dataset};
use crate::estimate::{EstimationError, cross_validate_auc, fit_logistic};
use crate::metrics::{ClassificationReport, ConfusionMatrix, mean_and_std, roc_auc};
use crate::model::{
    FeatureWeight, LogisticModel, ModelError, Preprocessor, TrainingProvenance, new_run_id,
};
use crate::persist::{ArtifactStore, PersistError, SaveReport, StoreGuard};
use crate::preprocess::{ImputationRecord, ImputationScope, PreprocessError, impute, stratified_split};
use crate::scaler::{DegenerateFeatureError, ScalerError, StandardScaler};
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataLoadError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    DegenerateFeature(#[from] DegenerateFeatureError),
    #[error(transparent)]
    Scaler(#[from] ScalerError),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Diagnostics of one training run.
#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub n_rows: usize,
    /// `(negatives, positives)` in the full dataset.
    pub class_counts: (usize, usize),
    pub imputation_scope: ImputationScope,
    pub imputation: Vec<ImputationRecord>,
    pub n_train: usize,
    pub n_test: usize,
    pub solver_iterations: usize,
    pub cv_auc: Vec<f64>,
    pub cv_auc_mean: f64,
    pub cv_auc_std: f64,
    pub test_auc: f64,
    pub confusion: ConfusionMatrix,
    pub classification: ClassificationReport,
    pub importance: Vec<FeatureWeight>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Dataset: {} rows ({} negative, {} positive)",
            self.n_rows, self.class_counts.0, self.class_counts.1
        )?;
        for r in &self.imputation {
            writeln!(
                f,
                "  Replaced {} zeros in {} with median {:.2}",
                r.replaced, r.column, r.median
            )?;
        }
        writeln!(f, "Training rows: {}, test rows: {}", self.n_train, self.n_test)?;
        writeln!(f, "Solver iterations: {}", self.solver_iterations)?;
        let folds: Vec<String> = self.cv_auc.iter().map(|a| format!("{a:.4}")).collect();
        writeln!(f, "Cross-validation AUC scores: [{}]", folds.join(", "))?;
        writeln!(
            f,
            "Mean CV AUC: {:.4} (+/- {:.4})",
            self.cv_auc_mean,
            self.cv_auc_std * 2.0
        )?;
        writeln!(f, "Test AUC: {:.4}", self.test_auc)?;
        writeln!(f)?;
        writeln!(f, "Classification report:")?;
        writeln!(f, "{}", self.classification)?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix:")?;
        writeln!(f, "{}", self.confusion)?;
        writeln!(f)?;
        writeln!(f, "Feature importance (|coefficient|):")?;
        for w in &self.importance {
            writeln!(f, "  {:<26} {:>8.4}  ({:+.4})", w.feature, w.importance(), w.coefficient)?;
        }
        Ok(())
    }
}

/// Everything a successful run produces.
#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    pub model: LogisticModel,
    pub preprocessor: Preprocessor,
    pub report: TrainingReport,
}

/// Trains and evaluates a classifier on `dataset`. Writes nothing to disk.
pub fn train(dataset: &Dataset, config: &TrainingConfig) -> Result<TrainingOutcome, PipelineError> {
    config.validate()?;
    let fit_config = config.fit_config();

    let mut data = dataset.clone();
    let split = stratified_split(data.labels.view(), config.test_fraction, config.seed)?;
    let (imputer, imputation) = impute(&mut data, &split, config.imputation_scope);

    let train_set = data.select(&split.train);
    let test_set = data.select(&split.test);
    log::info!(
        "Training set: {} rows, test set: {} rows",
        train_set.n_rows(),
        test_set.n_rows()
    );

    let scaler = StandardScaler::fit(train_set.features.view(), &FEATURE_NAMES)?;
    let x_train = scaler.transform(train_set.features.view())?;
    let x_test = scaler.transform(test_set.features.view())?;

    let fit = fit_logistic(x_train.view(), train_set.labels.view(), &fit_config)?;

    let cv_auc = cross_validate_auc(
        x_train.view(),
        train_set.labels.view(),
        config.cv_folds,
        &fit_config,
    )?;
    let (cv_auc_mean, cv_auc_std) = mean_and_std(&cv_auc);
    log::info!("Cross-validation AUC scores: {cv_auc:.4?}");
    log::info!("Mean CV AUC: {cv_auc_mean:.4} (+/- {:.4})", cv_auc_std * 2.0);

    let run_id = new_run_id();
    let model = LogisticModel::from_fit(
        &fit,
        &FEATURE_NAMES,
        TrainingProvenance {
            run_id: run_id.clone(),
            inverse_regularization: fit_config.inverse_regularization,
            tolerance: fit_config.tolerance,
            iterations: fit.iterations,
            seed: config.seed,
            n_train: train_set.n_rows(),
            n_test: test_set.n_rows(),
            imputation_scope: config.imputation_scope,
            trained_at: unix_now(),
        },
    );

    let probabilities = model.predict_proba(x_test.view())?;
    let predicted = model.predict(x_test.view())?;
    let test_auc = roc_auc(test_set.labels.view(), probabilities.view());
    let confusion = ConfusionMatrix::from_predictions(test_set.labels.view(), &predicted);
    let classification = ClassificationReport::from_confusion(&confusion);
    log::info!("Test AUC: {test_auc:.4}");
    log::info!("Confusion matrix: {confusion:?}");

    let importance = model.feature_importance();
    for w in &importance {
        log::debug!("{}: {:.4}", w.feature, w.coefficient);
    }

    let report = TrainingReport {
        n_rows: dataset.n_rows(),
        class_counts: dataset.class_counts(),
        imputation_scope: config.imputation_scope,
        imputation,
        n_train: train_set.n_rows(),
        n_test: test_set.n_rows(),
        solver_iterations: fit.iterations,
        cv_auc,
        cv_auc_mean,
        cv_auc_std,
        test_auc,
        confusion,
        classification,
        importance,
    };

    Ok(TrainingOutcome {
        model,
        preprocessor: Preprocessor::new(imputer, scaler, run_id),
        report,
    })
}

/// Loads the configured dataset, trains, and saves both artifacts under `guard`.
pub fn train_and_persist(
    config: &PipelineConfig,
    store: &ArtifactStore,
    guard: &StoreGuard<'_>,
) -> Result<(TrainingReport, SaveReport), PipelineError> {
    log::info!("Loading dataset from {}", config.dataset.display());
    let dataset = load_dataset(&config.dataset)?;
    let outcome = train(&dataset, &config.training)?;
    let saved = store.save(guard, &outcome.model, &outcome.preprocessor)?;
    log::info!(
        "Training complete; artifacts written to {} and {}",
        saved.model_path.display(),
        saved.preprocessor_path.display()
    );
    Ok((outcome.report, saved))
}

/// Full training run against the configured artifact store.
pub fn run(config: &PipelineConfig) -> Result<(TrainingReport, SaveReport), PipelineError> {
    config.validate()?;
    let store = config.artifacts.store();
    let guard = store.lock()?;
    train_and_persist(config, &store, &guard)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NUM_FEATURES;
    use crate::model::check_compatible;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Small cohort where glucose and BMI drive the outcome.
    fn cohort(n: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, NUM_FEATURES));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let glucose: f64 = rng.gen_range(70.0..190.0);
            let bmi: f64 = rng.gen_range(19.0..45.0);
            x[[i, 0]] = rng.gen_range(0..6) as f64;
            x[[i, 1]] = if i % 37 == 0 { 0.0 } else { glucose };
            x[[i, 2]] = rng.gen_range(55.0..95.0);
            x[[i, 3]] = if i % 5 == 0 { 0.0 } else { rng.gen_range(10.0..45.0) };
            x[[i, 4]] = if i % 3 == 0 { 0.0 } else { rng.gen_range(20.0..300.0) };
            x[[i, 5]] = bmi;
            x[[i, 6]] = rng.gen_range(0.1..1.5);
            x[[i, 7]] = rng.gen_range(21.0..70.0);
            let eta = 0.05 * (glucose - 125.0) + 0.1 * (bmi - 31.0);
            let u: f64 = rng.gen_range(0.0..1.0);
            y[i] = if u < 1.0 / (1.0 + (-eta).exp()) { 1.0 } else { 0.0 };
        }
        Dataset::new(x, y)
    }

    #[test]
    fn report_covers_every_diagnostic() {
        let data = cohort(300, 1);
        let outcome = train(&data, &TrainingConfig::default()).unwrap();
        let report = &outcome.report;

        assert_eq!(report.n_rows, 300);
        assert_eq!(report.n_train + report.n_test, 300);
        assert_eq!(report.cv_auc.len(), 5);
        assert!(report.test_auc > 0.7);
        assert_eq!(report.confusion.total(), report.n_test);
        assert_eq!(report.importance.len(), NUM_FEATURES);
        let top: Vec<&str> = report.importance[..2].iter().map(|w| w.feature.as_str()).collect();
        assert!(top.contains(&"Glucose"), "top features were {top:?}");

        let text = report.to_string();
        assert!(text.contains("Mean CV AUC"));
        assert!(text.contains("Confusion matrix"));
        assert!(text.contains("Replaced"));
    }

    #[test]
    fn training_does_not_mutate_the_input() {
        let data = cohort(200, 2);
        let before = data.clone();
        train(&data, &TrainingConfig::default()).unwrap();
        assert_eq!(data, before);
    }

    #[test]
    fn identical_inputs_give_identical_models() {
        let data = cohort(250, 3);
        let a = train(&data, &TrainingConfig::default()).unwrap();
        let b = train(&data, &TrainingConfig::default()).unwrap();
        assert_eq!(a.model.coefficients, b.model.coefficients);
        assert_eq!(a.model.intercept, b.model.intercept);
        assert_eq!(a.preprocessor.imputer, b.preprocessor.imputer);
        assert_eq!(a.preprocessor.scaler, b.preprocessor.scaler);
        assert_eq!(a.report.cv_auc, b.report.cv_auc);
    }

    #[test]
    fn each_run_pairs_its_artifacts_under_one_run_id() {
        let data = cohort(250, 3);
        let a = train(&data, &TrainingConfig::default()).unwrap();
        let b = train(&data, &TrainingConfig::default()).unwrap();
        assert_eq!(a.model.training.run_id, a.preprocessor.run_id);
        assert_ne!(a.preprocessor.run_id, b.preprocessor.run_id);
        assert!(check_compatible(&a.model, &b.preprocessor).is_err());
    }

    #[test]
    fn training_split_scope_fits_medians_on_training_rows_only() {
        let data = cohort(250, 4);
        let config = TrainingConfig {
            imputation_scope: ImputationScope::TrainingSplit,
            ..TrainingConfig::default()
        };
        let outcome = train(&data, &config).unwrap();
        assert_eq!(outcome.model.training.imputation_scope, ImputationScope::TrainingSplit);

        let split = stratified_split(data.labels.view(), config.test_fraction, config.seed).unwrap();
        let expected = crate::preprocess::ZeroImputer::fit(data.features.view(), &split.train);
        assert_eq!(outcome.preprocessor.imputer, expected);
    }

    #[test]
    fn constant_feature_fails_with_degenerate_error() {
        let mut data = cohort(200, 5);
        data.features.column_mut(6).fill(0.5);
        assert!(matches!(
            train(&data, &TrainingConfig::default()),
            Err(PipelineError::DegenerateFeature(DegenerateFeatureError { ref feature, .. }))
                if feature == "DiabetesPedigreeFunction"
        ));
    }

    #[test]
    fn invalid_config_is_rejected_before_training() {
        let data = cohort(100, 6);
        let config = TrainingConfig {
            cv_folds: 1,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            train(&data, &config),
            Err(PipelineError::Config(ConfigError::Invalid(_)))
        ));
    }
}
