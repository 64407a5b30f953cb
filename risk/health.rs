//! # Readiness Checks
//!
//! Inspects the configured dataset and artifact store without modifying
//! either. Missing artifacts are a warning since the first training run
//! creates them; anything that would make training or prediction fail is a
//! failure.

use crate::config::PipelineConfig;
use crate::data::{NUM_FEATURES, SAMPLE_RECORD, load_dataset};
use crate::model::check_compatible;
use ndarray::ArrayView1;
use serde::Serialize;
use std::fmt;

/// Row and column count of the reference dataset.
pub const CANONICAL_SHAPE: (usize, usize) = (768, NUM_FEATURES + 1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: Status,
    pub detail: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct HealthReport {
    pub checks: Vec<Check>,
}

impl HealthReport {
    fn record(&mut self, name: &'static str, status: Status, detail: impl Into<String>) {
        let detail = detail.into();
        match status {
            Status::Pass => log::info!("{name}: {detail}"),
            Status::Warn => log::warn!("{name}: {detail}"),
            Status::Fail => log::error!("{name}: {detail}"),
        }
        self.checks.push(Check {
            name,
            status,
            detail,
        });
    }

    /// True when no check failed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != Status::Fail)
    }

    pub fn status_of(&self, name: &str) -> Option<Status> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.checks {
            writeln!(f, "[{}] {:<20} {}", c.status, c.name, c.detail)?;
        }
        let failed = self.checks.iter().filter(|c| c.status == Status::Fail).count();
        if failed == 0 {
            write!(f, "All checks passed.")
        } else {
            write!(f, "{failed} check(s) failed.")
        }
    }
}

/// Runs every check against `config`.
pub fn run_checks(config: &PipelineConfig) -> HealthReport {
    let mut report = HealthReport::default();

    if config.dataset.is_file() {
        report.record("dataset file", Status::Pass, config.dataset.display().to_string());
        match load_dataset(&config.dataset) {
            Ok(dataset) => {
                let shape = (dataset.n_rows(), NUM_FEATURES + 1);
                if shape == CANONICAL_SHAPE {
                    report.record("dataset contents", Status::Pass, format!("shape {shape:?}"));
                } else {
                    report.record(
                        "dataset contents",
                        Status::Warn,
                        format!("shape {shape:?}, expected {CANONICAL_SHAPE:?}"),
                    );
                }
            }
            Err(e) => report.record("dataset contents", Status::Fail, e.to_string()),
        }
    } else {
        report.record(
            "dataset file",
            Status::Fail,
            format!("{} is missing (required)", config.dataset.display()),
        );
    }

    let store = config.artifacts.store();
    let mut all_present = true;
    for (name, path) in [
        ("classifier file", store.model_path()),
        ("scaler file", store.preprocessor_path()),
    ] {
        if path.is_file() {
            report.record(name, Status::Pass, path.display().to_string());
        } else {
            all_present = false;
            report.record(
                name,
                Status::Warn,
                format!("{} is missing (will be created)", path.display()),
            );
        }
    }
    if !all_present {
        report.record("sample prediction", Status::Warn, "skipped: artifacts not found");
        return report;
    }

    let model = store.load_model();
    let preprocessor = store.load_preprocessor();
    let (model, preprocessor) = match (model, preprocessor) {
        (Ok(m), Ok(p)) => {
            report.record("artifacts", Status::Pass, "classifier and scaler load");
            (m, p)
        }
        (m, p) => {
            let errors: Vec<String> = [m.err(), p.err()]
                .into_iter()
                .flatten()
                .map(|e| e.to_string())
                .collect();
            report.record("artifacts", Status::Fail, errors.join("; "));
            return report;
        }
    };

    if let Err(e) = check_compatible(&model, &preprocessor) {
        report.record("sample prediction", Status::Fail, e.to_string());
        return report;
    }
    let sample = ArrayView1::from(&SAMPLE_RECORD[..]);
    match preprocessor
        .transform_row(sample)
        .and_then(|z| model.predict_one(z.view()))
    {
        Ok((label, p)) if label <= 1 && (0.0..=1.0).contains(&p) => report.record(
            "sample prediction",
            Status::Pass,
            format!("label {label}, probability {p:.3}"),
        ),
        Ok((label, p)) => report.record(
            "sample prediction",
            Status::Fail,
            format!("invalid output: label {label}, probability {p}"),
        ),
        Err(e) => report.record("sample prediction", Status::Fail, e.to_string()),
    }

    report
}
