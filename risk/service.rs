//! # Inference Service
//!
//! Single-patient predictions from the persisted artifacts.
//!
//! - Artifacts and the dataset are held in explicit [`FileCache`]s keyed by file
//!   path, modification time and length. A cache entry is reused only while the
//!   file on disk is unchanged; [`RiskService::invalidate`] drops everything.
//! - Training on demand is an explicit call, [`RiskService::ensure_artifacts_present`],
//!   guarded by the store's writer lock so concurrent callers train at most once.

use crate::config::PipelineConfig;
use crate::data::{DataLoadError, Dataset, FEATURE_NAMES, NUM_FEATURES, SAMPLE_RECORD, load_dataset};
use crate::model::{FeatureWeight, LogisticModel, Preprocessor, check_compatible};
use crate::persist::{ArtifactStore, PersistError};
use crate::pipeline::{PipelineError, TrainingReport, train_and_persist};
use crate::triage::{Confidence, RiskBand};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(
        "Model artifacts are missing ({}). Train the model first.",
        .missing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    ArtifactMissing { missing: Vec<PathBuf> },
    #[error("Prediction failed: {0}")]
    Prediction(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Data(#[from] DataLoadError),
    #[error("Training failed: {0}")]
    Training(#[from] PipelineError),
}

/// The eight raw inputs of one patient.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub pregnancies: f64,
    /// Plasma glucose, mg/dL.
    pub glucose: f64,
    /// Diastolic blood pressure, mmHg.
    pub blood_pressure: f64,
    /// Triceps skinfold thickness, mm.
    pub skin_thickness: f64,
    /// Two-hour serum insulin, mu U/ml.
    pub insulin: f64,
    pub bmi: f64,
    pub diabetes_pedigree: f64,
    pub age: f64,
}

impl PatientRecord {
    pub fn from_features(values: [f64; NUM_FEATURES]) -> Self {
        let [
            pregnancies,
            glucose,
            blood_pressure,
            skin_thickness,
            insulin,
            bmi,
            diabetes_pedigree,
            age,
        ] = values;
        Self {
            pregnancies,
            glucose,
            blood_pressure,
            skin_thickness,
            insulin,
            bmi,
            diabetes_pedigree,
            age,
        }
    }

    /// The reference mid-range patient.
    pub fn sample() -> Self {
        Self::from_features(SAMPLE_RECORD)
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.pregnancies,
            self.glucose,
            self.blood_pressure,
            self.skin_thickness,
            self.insulin,
            self.bmi,
            self.diabetes_pedigree,
            self.age,
        ]
    }

    pub fn to_features(&self) -> Array1<f64> {
        Array1::from(self.to_array().to_vec())
    }

    /// Rejects non-finite or negative inputs.
    pub fn validate(&self) -> Result<(), InferenceError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(InferenceError::Prediction(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
            if value < 0.0 {
                return Err(InferenceError::Prediction(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: u8,
    pub probability: f64,
    pub band: RiskBand,
    pub confidence: Confidence,
}

/// Identity of a file's current contents, as far as the filesystem reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// One lazily loaded value backed by a file.
pub struct FileCache<T> {
    path: PathBuf,
    entry: Mutex<Option<(FileStamp, Arc<T>)>>,
}

impl<T> FileCache<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entry: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached value if the file is unchanged, otherwise reloads it.
    pub fn get_or_load<E>(
        &self,
        load: impl FnOnce(&Path) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let stamp = FileStamp::of(&self.path);
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        if let (Some(current), Some((cached_stamp, value))) = (&stamp, entry.as_ref()) {
            if current == cached_stamp {
                return Ok(Arc::clone(value));
            }
        }
        let value = Arc::new(load(&self.path)?);
        *entry = stamp.map(|s| (s, Arc::clone(&value)));
        Ok(value)
    }

    pub fn invalidate(&self) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_cached(&self) -> bool {
        self.entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Result of [`RiskService::ensure_artifacts_present`].
#[derive(Debug)]
pub enum EnsureOutcome {
    AlreadyPresent,
    Trained(Box<TrainingReport>),
}

/// Prediction front end over an artifact store.
pub struct RiskService {
    config: PipelineConfig,
    store: ArtifactStore,
    model: FileCache<LogisticModel>,
    preprocessor: FileCache<Preprocessor>,
    dataset: FileCache<Dataset>,
}

impl RiskService {
    pub fn new(config: PipelineConfig) -> Self {
        let store = config.artifacts.store();
        Self {
            model: FileCache::new(store.model_path()),
            preprocessor: FileCache::new(store.preprocessor_path()),
            dataset: FileCache::new(config.dataset.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Trains and saves the artifacts unless both already exist.
    pub fn ensure_artifacts_present(&self) -> Result<EnsureOutcome, InferenceError> {
        let guard = self.store.lock()?;
        if self.store.artifacts_present() {
            return Ok(EnsureOutcome::AlreadyPresent);
        }
        log::info!("Model artifacts not found; training a new model");
        let (report, _) = train_and_persist(&self.config, &self.store, &guard)?;
        drop(guard);
        self.invalidate();
        Ok(EnsureOutcome::Trained(Box::new(report)))
    }

    fn artifacts(&self) -> Result<(Arc<LogisticModel>, Arc<Preprocessor>), InferenceError> {
        let missing: Vec<PathBuf> = [self.model.path(), self.preprocessor.path()]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(Path::to_path_buf)
            .collect();
        if !missing.is_empty() {
            return Err(InferenceError::ArtifactMissing { missing });
        }
        let model = self.model.get_or_load(|_| self.store.load_model())?;
        let preprocessor = self
            .preprocessor
            .get_or_load(|_| self.store.load_preprocessor())?;
        Ok((model, preprocessor))
    }

    /// Scores one patient. Fails with `ArtifactMissing` if no model has been saved.
    pub fn predict(&self, record: &PatientRecord) -> Result<Prediction, InferenceError> {
        record.validate()?;
        let (model, preprocessor) = self.artifacts()?;
        check_compatible(&model, &preprocessor)
            .map_err(|e| InferenceError::Prediction(e.to_string()))?;

        let z = preprocessor
            .transform_row(record.to_features().view())
            .map_err(|e| InferenceError::Prediction(e.to_string()))?;
        let (label, probability) = model
            .predict_one(z.view())
            .map_err(|e| InferenceError::Prediction(e.to_string()))?;

        let prediction = Prediction {
            label,
            probability,
            band: RiskBand::from_probability(probability),
            confidence: Confidence::from_probability(probability),
        };
        match prediction_log_line(record, &prediction) {
            Ok(line) => log::info!(target: "glyco::prediction", "{line}"),
            Err(e) => log::warn!("Failed to serialize prediction log entry: {e}"),
        }
        Ok(prediction)
    }

    /// [`ensure_artifacts_present`](Self::ensure_artifacts_present) followed by [`predict`](Self::predict).
    pub fn predict_or_train(&self, record: &PatientRecord) -> Result<Prediction, InferenceError> {
        self.ensure_artifacts_present()?;
        self.predict(record)
    }

    /// Coefficients of the saved classifier, largest magnitude first.
    pub fn feature_importance(&self) -> Result<Vec<FeatureWeight>, InferenceError> {
        let (model, _) = self.artifacts()?;
        Ok(model.feature_importance())
    }

    /// The configured dataset, loaded once per file version.
    pub fn dataset(&self) -> Result<Arc<Dataset>, InferenceError> {
        Ok(self.dataset.get_or_load(|p| load_dataset(p))?)
    }

    /// Drops every cached artifact and the cached dataset.
    pub fn invalidate(&self) {
        self.model.invalidate();
        self.preprocessor.invalidate();
        self.dataset.invalidate();
    }
}

#[derive(Serialize)]
struct PredictionLogEntry<'a> {
    timestamp: u64,
    inputs: &'a PatientRecord,
    prediction: u8,
    probability: f64,
    band: RiskBand,
}

/// One-line JSON record of a prediction, for audit logs.
pub fn prediction_log_line(
    record: &PatientRecord,
    prediction: &Prediction,
) -> Result<String, serde_json::Error> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    serde_json::to_string(&PredictionLogEntry {
        timestamp,
        inputs: record,
        prediction: prediction.label,
        probability: prediction.probability,
        band: prediction.band,
    })
}
