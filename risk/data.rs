//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for the patient dataset. It reads a
//! comma-separated file, validates it against a strict, fixed schema, and
//! transforms it into the `ndarray` structures the rest of the crate consumes.
//!
//! - Strict Schema: the header must be exactly the nine canonical column names,
//!   in canonical order. Feature order is the implicit contract shared by
//!   training and inference, so a reordered file is rejected rather than
//!   silently remapped.
//! - User-Centric Errors: failures are assumed to be user-input errors. Every
//!   `DataLoadError` names the offending row and column.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Canonical feature columns, in the order used by every downstream stage.
pub const FEATURE_NAMES: [&str; 8] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
];

/// Indices into `FEATURE_NAMES`.
pub mod column {
    pub const PREGNANCIES: usize = 0;
    pub const GLUCOSE: usize = 1;
    pub const BLOOD_PRESSURE: usize = 2;
    pub const SKIN_THICKNESS: usize = 3;
    pub const INSULIN: usize = 4;
    pub const BMI: usize = 5;
    pub const DIABETES_PEDIGREE: usize = 6;
    pub const AGE: usize = 7;
}

/// The binary outcome column. Always the last column of the file.
pub const LABEL_COLUMN: &str = "Outcome";

/// Number of feature columns.
pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// A plausible mid-range patient, in `FEATURE_NAMES` order. Used as the check
/// record when verifying saved artifacts and in health checks.
pub const SAMPLE_RECORD: [f64; NUM_FEATURES] = [1.0, 120.0, 80.0, 20.0, 80.0, 25.0, 0.5, 30.0];

const MINIMUM_ROWS: usize = 10;

/// A validated, in-memory copy of the dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Feature matrix, shape `[n_rows, NUM_FEATURES]`, columns in `FEATURE_NAMES` order.
    pub features: Array2<f64>,
    /// Outcome vector with values drawn from {0.0, 1.0}.
    pub labels: Array1<f64>,
}

/// A comprehensive error type for all dataset loading and validation failures.
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Failed to open dataset file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unexpected header. Expected columns {expected:?}, found {found:?}.")]
    Schema {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Row {row}: column '{column}' is empty. Missing values are not allowed.")]
    MissingValue { row: usize, column: String },
    #[error("Row {row}: column '{column}' contains non-numeric value '{value}'.")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Row {row}: column '{column}' contains a non-finite value.")]
    NonFinite { row: usize, column: String },
    #[error("Row {row}: label '{value}' is outside {{0, 1}}.")]
    InvalidLabel { row: usize, value: String },
    #[error("Dataset contains only {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
    #[error("Dataset contains only class {0}; both outcome classes are required.")]
    SingleClass(u8),
}

impl Dataset {
    /// Builds a dataset from already-validated parts.
    ///
    /// # Panics
    /// Panics if the row counts disagree or the feature matrix is not
    /// `NUM_FEATURES` wide. Loader output always satisfies both.
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Self {
        assert_eq!(features.nrows(), labels.len(), "rows and labels must agree");
        assert_eq!(features.ncols(), NUM_FEATURES, "feature width mismatch");
        Self { features, labels }
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    /// Returns `(negatives, positives)`.
    pub fn class_counts(&self) -> (usize, usize) {
        class_counts(self.labels.view())
    }

    /// Copies the given rows, in the given order, into a new dataset.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), rows),
            labels: self.labels.select(Axis(0), rows),
        }
    }
}

/// Counts `(negatives, positives)` in a label vector.
pub fn class_counts(labels: ArrayView1<f64>) -> (usize, usize) {
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    (labels.len() - positives, positives)
}

/// Loads and validates the dataset at `path`.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, DataLoadError> {
    let path = path.as_ref();
    log::info!("Loading dataset from '{}'", path.display());
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_from_reader(file)
}

/// Parses and validates a dataset from any reader.
pub fn load_from_reader<R: Read>(reader: R) -> Result<Dataset, DataLoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let expected: Vec<String> = FEATURE_NAMES
        .iter()
        .chain(std::iter::once(&LABEL_COLUMN))
        .map(|s| s.to_string())
        .collect();
    if header != expected {
        return Err(DataLoadError::Schema {
            expected,
            found: header,
        });
    }

    let mut feature_buffer: Vec<f64> = Vec::new();
    let mut labels: Vec<f64> = Vec::new();

    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let row = idx + 1;
        for (col, column) in FEATURE_NAMES.iter().enumerate() {
            let cell = record.get(col).unwrap_or("");
            feature_buffer.push(parse_cell(cell, row, column)?);
        }
        let raw_label = record.get(NUM_FEATURES).unwrap_or("");
        let label = parse_cell(raw_label, row, LABEL_COLUMN)?;
        if label != 0.0 && label != 1.0 {
            return Err(DataLoadError::InvalidLabel {
                row,
                value: raw_label.to_string(),
            });
        }
        labels.push(label);
    }

    if labels.len() < MINIMUM_ROWS {
        return Err(DataLoadError::InsufficientRows {
            found: labels.len(),
            required: MINIMUM_ROWS,
        });
    }

    let n_rows = labels.len();
    let features = Array2::from_shape_vec((n_rows, NUM_FEATURES), feature_buffer)
        .map_err(|_| DataLoadError::InsufficientRows {
            found: n_rows,
            required: MINIMUM_ROWS,
        })?;
    let dataset = Dataset {
        features,
        labels: Array1::from_vec(labels),
    };

    let (negatives, positives) = dataset.class_counts();
    if positives == 0 {
        return Err(DataLoadError::SingleClass(0));
    }
    if negatives == 0 {
        return Err(DataLoadError::SingleClass(1));
    }

    log::info!(
        "Dataset loaded successfully. Shape: ({}, {})",
        n_rows,
        NUM_FEATURES + 1
    );
    log::info!("Target distribution: 0 -> {negatives}, 1 -> {positives}");
    Ok(dataset)
}

fn parse_cell(cell: &str, row: usize, column: &str) -> Result<f64, DataLoadError> {
    if cell.is_empty() {
        return Err(DataLoadError::MissingValue {
            row,
            column: column.to_string(),
        });
    }
    let value: f64 = cell.parse().map_err(|_| DataLoadError::NonNumeric {
        row,
        column: column.to_string(),
        value: cell.to_string(),
    })?;
    if !value.is_finite() {
        return Err(DataLoadError::NonFinite {
            row,
            column: column.to_string(),
        });
    }
    Ok(value)
}
