//! # Artifact Persistence
//!
//! Saves and loads the classifier and preprocessor artifacts in one directory.
//!
//! A save runs entirely under the store's single-writer lock (an in-process
//! mutex plus an advisory lock on `<dir>/.glyco.lock`, so concurrent training
//! runs in other processes are serialized too):
//!
//! 1. Both artifacts are serialized up front; nothing on disk changes if that fails.
//! 2. Any existing artifact is copied to `<stem>_backup.<ext>`. Only the latest
//!    backup is kept.
//! 3. Both new artifacts are written and synced to temporary files in the
//!    same directory. Until this step finishes the live files are untouched.
//! 4. Each temporary file is atomically renamed over its live path. Readers
//!    see either the old or the new file, never a partial one.
//! 5. Both files are read back and checked against what was written, and the
//!    sample record is pushed through the full transform and predict path.
//!
//! The two artifacts of one save share a run id. If the process dies between
//! the two renames, the mismatched pair left on disk is refused at load time
//! by [`check_compatible`]. A failed verification is reported; the backups are
//! left in place and are not restored automatically.

use crate::data::SAMPLE_RECORD;
use crate::model::{Artifact, LogisticModel, ModelError, Preprocessor, check_compatible};
use ndarray::ArrayView1;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const LOCK_FILE_NAME: &str = ".glyco.lock";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize the {kind}: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: ModelError,
    },
    #[error("Failed to load the {kind} from '{path}': {source}")]
    Load {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: ModelError,
    },
    #[error("Verification of the saved {kind} failed: {reason}")]
    Verification { kind: &'static str, reason: String },
    #[error("The artifact store lock was poisoned by a writer that panicked.")]
    LockPoisoned,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Proof that the caller holds the store's writer lock. Released on drop.
pub struct StoreGuard<'a> {
    _in_process: MutexGuard<'a, ()>,
    lock_file: File,
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock_file.unlock() {
            log::warn!("Failed to release artifact lock file: {e}");
        }
    }
}

/// What a successful save wrote.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub model_path: PathBuf,
    pub preprocessor_path: PathBuf,
    /// Backups created from artifacts that existed before this save.
    pub backups: Vec<PathBuf>,
}

/// Directory holding the two artifacts.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    model_file: String,
    preprocessor_file: String,
    writer: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(
        dir: impl AsRef<Path>,
        model_file: impl Into<String>,
        preprocessor_file: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            model_file: model_file.into(),
            preprocessor_file: preprocessor_file.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model_file)
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.dir.join(&self.preprocessor_file)
    }

    /// `logistic_model.toml` -> `logistic_model_backup.toml`.
    pub fn backup_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{stem}_backup.{}", ext.to_string_lossy()),
            None => format!("{stem}_backup"),
        };
        path.with_file_name(name)
    }

    pub fn artifacts_present(&self) -> bool {
        self.model_path().is_file() && self.preprocessor_path().is_file()
    }

    /// Acquires the single-writer lock, blocking until it is available.
    pub fn lock(&self) -> Result<StoreGuard<'_>, PersistError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let in_process = self
            .writer
            .lock()
            .map_err(|_| PersistError::LockPoisoned)?;
        let lock_path = self.dir.join(LOCK_FILE_NAME);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;
        lock_file.lock().map_err(io_error(&lock_path))?;
        log::debug!("Acquired artifact lock {}", lock_path.display());
        Ok(StoreGuard {
            _in_process: in_process,
            lock_file,
        })
    }

    /// Backs up, atomically replaces and then verifies both artifacts.
    ///
    /// Both backups are taken and both replacements are staged as synced
    /// temporary files before either live artifact is touched, so a failure
    /// in any of those steps leaves the previous pair in place.
    pub fn save(
        &self,
        _guard: &StoreGuard<'_>,
        model: &LogisticModel,
        preprocessor: &Preprocessor,
    ) -> Result<SaveReport, PersistError> {
        let model_text = model.to_toml().map_err(|source| PersistError::Serialize {
            kind: LogisticModel::KIND,
            source,
        })?;
        let preprocessor_text =
            preprocessor
                .to_toml()
                .map_err(|source| PersistError::Serialize {
                    kind: Preprocessor::KIND,
                    source,
                })?;

        let model_path = self.model_path();
        let preprocessor_path = self.preprocessor_path();
        let targets = [
            (&model_path, &model_text, LogisticModel::KIND),
            (&preprocessor_path, &preprocessor_text, Preprocessor::KIND),
        ];

        let mut backups = Vec::new();
        for (path, _, kind) in targets {
            if path.is_file() {
                let backup = Self::backup_path(path);
                fs::copy(path, &backup).map_err(io_error(&backup))?;
                log::info!("Backed up existing {kind} to {}", backup.display());
                backups.push(backup);
            }
        }

        let mut staged = Vec::with_capacity(targets.len());
        for (path, text, kind) in targets {
            staged.push((stage(path, text)?, path, kind));
        }

        for (tmp, path, kind) in staged {
            tmp.persist(path).map_err(|e| PersistError::Io {
                path: path.to_path_buf(),
                source: e.error,
            })?;
            log::info!("Saved {kind} to {}", path.display());
        }

        self.verify(model, preprocessor)?;
        log::info!("Verified saved artifacts in {}", self.dir.display());

        Ok(SaveReport {
            model_path,
            preprocessor_path,
            backups,
        })
    }

    /// Reloads both artifacts and checks they reproduce `model` and `preprocessor`.
    pub fn verify(
        &self,
        model: &LogisticModel,
        preprocessor: &Preprocessor,
    ) -> Result<(), PersistError> {
        let verification = |kind: &'static str| {
            move |e: PersistError| PersistError::Verification {
                kind,
                reason: e.to_string(),
            }
        };
        let loaded_model = self
            .load_model()
            .map_err(verification(LogisticModel::KIND))?;
        let loaded_preprocessor = self
            .load_preprocessor()
            .map_err(verification(Preprocessor::KIND))?;

        if &loaded_model != model {
            return Err(PersistError::Verification {
                kind: LogisticModel::KIND,
                reason: "reloaded classifier differs from the one written".to_string(),
            });
        }
        if &loaded_preprocessor != preprocessor {
            return Err(PersistError::Verification {
                kind: Preprocessor::KIND,
                reason: "reloaded scaler differs from the one written".to_string(),
            });
        }
        check_compatible(&loaded_model, &loaded_preprocessor).map_err(|e| {
            PersistError::Verification {
                kind: LogisticModel::KIND,
                reason: e.to_string(),
            }
        })?;

        let sample = ArrayView1::from(&SAMPLE_RECORD[..]);
        let (label, probability) = loaded_preprocessor
            .transform_row(sample)
            .and_then(|z| loaded_model.predict_one(z.view()))
            .map_err(|e| PersistError::Verification {
                kind: LogisticModel::KIND,
                reason: format!("sample prediction failed: {e}"),
            })?;
        if !(0.0..=1.0).contains(&probability) || label > 1 {
            return Err(PersistError::Verification {
                kind: LogisticModel::KIND,
                reason: format!("sample prediction returned label {label}, probability {probability}"),
            });
        }
        Ok(())
    }

    pub fn load_model(&self) -> Result<LogisticModel, PersistError> {
        load_artifact(&self.model_path())
    }

    pub fn load_preprocessor(&self) -> Result<Preprocessor, PersistError> {
        load_artifact(&self.preprocessor_path())
    }
}

fn load_artifact<A: Artifact>(path: &Path) -> Result<A, PersistError> {
    A::load(path).map_err(|source| PersistError::Load {
        kind: A::KIND,
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `contents` to a synced temporary file beside `path`. Dropping the
/// result without persisting it removes the file.
fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, PersistError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    tmp.write_all(contents.as_bytes())
        .map_err(io_error(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_error(path))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FEATURE_NAMES;
    use crate::model::{DEFAULT_THRESHOLD, FORMAT_VERSION, TrainingProvenance};
    use crate::preprocess::{ImputationScope, ZeroImputer};
    use crate::scaler::StandardScaler;
    use ndarray::array;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn artifacts(offset: f64) -> (LogisticModel, Preprocessor) {
        let raw = array![
            [1.0, 100.0, 70.0, 20.0, 80.0, 30.0, 0.3, 25.0],
            [3.0, 0.0, 80.0, 0.0, 0.0, 25.0, 0.6, 40.0],
            [0.0, 140.0, 0.0, 35.0, 120.0, 0.0, 0.9, 55.0],
            [5.0, 120.0, 60.0, 30.0, 100.0, 35.0, 0.2, 33.0],
        ];
        let imputer = ZeroImputer::fit_all(raw.view());
        let mut imputed = raw.clone();
        imputer.apply(&mut imputed);
        let scaler = StandardScaler::fit(imputed.view(), &FEATURE_NAMES).unwrap();
        let model = LogisticModel {
            format_version: FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            coefficients: vec![0.1, 1.1 + offset, -0.2, 0.05, -0.1, 0.7, 0.3, 0.4],
            intercept: -0.8,
            threshold: DEFAULT_THRESHOLD,
            training: TrainingProvenance {
                inverse_regularization: 1.0,
                tolerance: 1e-5,
                iterations: 12,
                seed: 42,
                n_train: 3,
                n_test: 1,
                imputation_scope: ImputationScope::Dataset,
                trained_at: 0,
                run_id: format!("run-{offset}"),
            },
        };
        let run_id = model.training.run_id.clone();
        (model, Preprocessor::new(imputer, scaler, run_id))
    }

    fn store_in(dir: &Path) -> ArtifactStore {
        ArtifactStore::new(dir, "logistic_model.toml", "scaler.toml")
    }

    #[test]
    fn backup_path_inserts_suffix_before_extension() {
        assert_eq!(
            ArtifactStore::backup_path(Path::new("/a/logistic_model.toml")),
            PathBuf::from("/a/logistic_model_backup.toml")
        );
        assert_eq!(
            ArtifactStore::backup_path(Path::new("scaler")),
            PathBuf::from("scaler_backup")
        );
    }

    #[test]
    fn first_save_writes_both_artifacts_without_backups() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.artifacts_present());

        let (model, pre) = artifacts(0.0);
        let guard = store.lock().unwrap();
        let report = store.save(&guard, &model, &pre).unwrap();
        drop(guard);

        assert!(store.artifacts_present());
        assert!(report.backups.is_empty());
        assert_eq!(store.load_model().unwrap(), model);
        assert_eq!(store.load_preprocessor().unwrap(), pre);
    }

    #[test]
    fn second_save_keeps_previous_artifacts_as_backups() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (first_model, first_pre) = artifacts(0.0);
        let (second_model, second_pre) = artifacts(0.5);

        {
            let guard = store.lock().unwrap();
            store.save(&guard, &first_model, &first_pre).unwrap();
        }
        let guard = store.lock().unwrap();
        let report = store.save(&guard, &second_model, &second_pre).unwrap();
        drop(guard);

        assert_eq!(report.backups.len(), 2);
        let backup_model =
            LogisticModel::load(ArtifactStore::backup_path(&store.model_path())).unwrap();
        assert_eq!(backup_model, first_model);
        assert_eq!(store.load_model().unwrap(), second_model);
    }

    #[test]
    fn verify_detects_tampered_classifier() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (model, pre) = artifacts(0.0);
        {
            let guard = store.lock().unwrap();
            store.save(&guard, &model, &pre).unwrap();
        }

        let (other, _) = artifacts(1.0);
        fs::write(store.model_path(), other.to_toml().unwrap()).unwrap();
        let err = store.verify(&model, &pre).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Verification {
                kind: "classifier",
                ..
            }
        ));
    }

    #[test]
    fn verify_reports_unreadable_scaler() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (model, pre) = artifacts(0.0);
        {
            let guard = store.lock().unwrap();
            store.save(&guard, &model, &pre).unwrap();
        }
        fs::write(store.preprocessor_path(), "not toml [").unwrap();
        assert!(matches!(
            store.verify(&model, &pre),
            Err(PersistError::Verification { kind: "scaler", .. })
        ));
    }

    #[test]
    fn loading_missing_artifact_names_the_path() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        match store.load_model() {
            Err(PersistError::Load { kind, path, .. }) => {
                assert_eq!(kind, "classifier");
                assert_eq!(path, store.model_path());
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[test]
    fn failed_backup_leaves_live_pair_untouched() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (first_model, first_pre) = artifacts(0.0);
        let (second_model, second_pre) = artifacts(0.5);
        {
            let guard = store.lock().unwrap();
            store.save(&guard, &first_model, &first_pre).unwrap();
        }

        fs::create_dir(ArtifactStore::backup_path(&store.preprocessor_path())).unwrap();
        let guard = store.lock().unwrap();
        let err = store.save(&guard, &second_model, &second_pre).unwrap_err();
        drop(guard);
        assert!(matches!(err, PersistError::Io { .. }), "{err:?}");

        let model = store.load_model().unwrap();
        let pre = store.load_preprocessor().unwrap();
        assert_eq!(model, first_model);
        assert_eq!(pre, first_pre);
        check_compatible(&model, &pre).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn half_replaced_pair_is_rejected() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (first_model, first_pre) = artifacts(0.0);
        let (second_model, _) = artifacts(0.5);
        {
            let guard = store.lock().unwrap();
            store.save(&guard, &first_model, &first_pre).unwrap();
        }

        fs::write(store.model_path(), second_model.to_toml().unwrap()).unwrap();
        let model = store.load_model().unwrap();
        let pre = store.load_preprocessor().unwrap();
        assert!(matches!(
            check_compatible(&model, &pre),
            Err(ModelError::Inconsistent(_))
        ));
        assert!(matches!(
            store.verify(&second_model, &first_pre),
            Err(PersistError::Verification { .. })
        ));
    }

    #[test]
    fn concurrent_saves_are_serialized() {
        let dir = tempdir().unwrap();
        let store = Arc::new(store_in(dir.path()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let (model, pre) = artifacts(i as f64);
                    let guard = store.lock().unwrap();
                    store.save(&guard, &model, &pre).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let model = store.load_model().unwrap();
        let pre = store.load_preprocessor().unwrap();
        store.verify(&model, &pre).unwrap();
    }
}
