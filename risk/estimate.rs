//! # Logistic Regression Estimation
//!
//! Fits an L2-regularized binary logistic regression by minimizing
//!
//! ```text
//! J(w, b) = (1/n) * sum_i [ log(1 + exp(eta_i)) - y_i * eta_i ] + ||w||^2 / (2 * C * n)
//! ```
//!
//! where `eta_i = x_i . w + b`. The intercept is unpenalized. This is the
//! same minimizer as the summed log-loss plus `||w||^2 / (2C)`, rescaled so the
//! gradient tolerance does not depend on the number of rows.
//!
//! The objective is minimized with BFGS from `wolfe_bfgs`, starting from zero.
//! Any failure to reach the gradient tolerance within the iteration budget is
//! reported as `EstimationError::DidNotConverge`; an unconverged model is never
//! returned.

use crate::metrics::roc_auc;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// A solution is accepted if its gradient norm is within this factor of the
/// requested tolerance.
const CONVERGENCE_SLACK: f64 = 100.0;

/// Linear predictors are clamped to this magnitude before exponentiation.
const ETA_CLAMP: f64 = 700.0;

#[derive(Error, Debug)]
pub enum EstimationError {
    #[error(
        "Logistic regression did not converge within {max_iterations} iterations: {reason}"
    )]
    DidNotConverge {
        max_iterations: usize,
        reason: String,
    },

    #[error("Training labels contain only class {0}; both classes are required.")]
    SingleClass(u8),

    #[error(
        "Class {class} has {count} members, fewer than the {folds} folds requested for cross-validation."
    )]
    InsufficientClassMembers { class: u8, count: usize, folds: usize },

    #[error("Invalid fit configuration: {0}")]
    InvalidConfig(String),

    #[error("Feature matrix has {rows} rows but {labels} labels were provided.")]
    MismatchedDimensions { rows: usize, labels: usize },
}

/// Solver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Inverse of the L2 penalty strength (`C`); larger is weaker.
    pub inverse_regularization: f64,
    pub max_iterations: usize,
    /// Target Euclidean norm of the objective gradient.
    pub tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            inverse_regularization: 1.0,
            max_iterations: 1000,
            tolerance: 1e-5,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), EstimationError> {
        if !(self.inverse_regularization.is_finite() && self.inverse_regularization > 0.0) {
            return Err(EstimationError::InvalidConfig(format!(
                "inverse regularization must be positive and finite, got {}",
                self.inverse_regularization
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(EstimationError::InvalidConfig(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(EstimationError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output of a converged fit.
#[derive(Clone, Debug)]
pub struct LogisticFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub iterations: usize,
    /// Objective value at the solution.
    pub objective: f64,
    pub gradient_norm: f64,
}

/// Logistic function with the linear predictor clamped to avoid overflow.
#[inline]
pub fn sigmoid(eta: f64) -> f64 {
    let eta = eta.clamp(-ETA_CLAMP, ETA_CLAMP);
    1.0 / (1.0 + (-eta).exp())
}

/// `log(1 + exp(eta))` without overflow.
#[inline]
fn softplus(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

/// Objective value and gradient at `params = [w_1, ..., w_p, b]`.
pub fn objective_and_gradient(
    params: &Array1<f64>,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    inverse_regularization: f64,
) -> (f64, Array1<f64>) {
    let p = x.ncols();
    let n = x.nrows() as f64;
    let w = params.slice(s![..p]);
    let b = params[p];

    let eta = x.dot(&w) + b;
    let loss: f64 = eta
        .iter()
        .zip(y.iter())
        .map(|(&e, &yi)| softplus(e) - yi * e)
        .sum();
    let residual = ndarray::Zip::from(&eta)
        .and(&y)
        .map_collect(|&e, &yi| sigmoid(e) - yi);

    let penalty_scale = 1.0 / (inverse_regularization * n);
    let cost = loss / n + 0.5 * penalty_scale * w.dot(&w);

    let mut grad = Array1::<f64>::zeros(p + 1);
    let grad_w = x.t().dot(&residual) / n + &w * penalty_scale;
    grad.slice_mut(s![..p]).assign(&grad_w);
    grad[p] = residual.sum() / n;

    (cost, grad)
}

/// Fits the classifier on `x` (already standardized) and binary labels `y`.
pub fn fit_logistic(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &FitConfig,
) -> Result<LogisticFit, EstimationError> {
    config.validate()?;
    if x.nrows() != y.len() {
        return Err(EstimationError::MismatchedDimensions {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    let positives = y.iter().filter(|&&v| v > 0.5).count();
    if positives == 0 {
        return Err(EstimationError::SingleClass(0));
    }
    if positives == y.len() {
        return Err(EstimationError::SingleClass(1));
    }

    let p = x.ncols();
    let x_owned: Array2<f64> = x.to_owned();
    let y_owned: Array1<f64> = y.to_owned();
    let c = config.inverse_regularization;
    let cost_and_grad = move |params: &Array1<f64>| -> (f64, Array1<f64>) {
        objective_and_gradient(params, x_owned.view(), y_owned.view(), c)
    };

    log::debug!(
        "Starting BFGS on {} rows, {} parameters (C = {}, tol = {:e})",
        y.len(),
        p + 1,
        c,
        config.tolerance
    );

    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = Bfgs::new(Array1::zeros(p + 1), cost_and_grad)
        .with_tolerance(config.tolerance)
        .with_max_iterations(config.max_iterations)
        .run()
        .map_err(|e| EstimationError::DidNotConverge {
            max_iterations: config.max_iterations,
            reason: format!("BFGS failed: {e:?}"),
        })?;

    if final_point.iter().any(|v| !v.is_finite()) || !final_value.is_finite() {
        return Err(EstimationError::DidNotConverge {
            max_iterations: config.max_iterations,
            reason: "solver produced non-finite parameters".to_string(),
        });
    }

    let (objective, grad) = objective_and_gradient(&final_point, x, y, c);
    let gradient_norm = grad.dot(&grad).sqrt();
    if gradient_norm > config.tolerance * CONVERGENCE_SLACK {
        return Err(EstimationError::DidNotConverge {
            max_iterations: config.max_iterations,
            reason: format!(
                "gradient norm {gradient_norm:.3e} exceeds tolerance {:.3e}",
                config.tolerance
            ),
        });
    }

    log::info!(
        "Logistic fit converged in {iterations} iterations (objective {objective:.6}, |grad| {gradient_norm:.2e})"
    );

    Ok(LogisticFit {
        coefficients: final_point.slice(s![..p]).to_owned(),
        intercept: final_point[p],
        iterations,
        objective,
        gradient_norm,
    })
}

/// Partitions row indices into `k` stratified folds without shuffling.
///
/// Within each class, rows keep their original order and are cut into `k`
/// contiguous chunks whose sizes differ by at most one; fold `i` is the union
/// of chunk `i` from each class. Returns the held-out indices of each fold,
/// sorted ascending.
pub fn stratified_folds(
    labels: ArrayView1<f64>,
    k: usize,
) -> Result<Vec<Vec<usize>>, EstimationError> {
    if k < 2 {
        return Err(EstimationError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }
    let mut folds = vec![Vec::new(); k];
    for class in [0u8, 1u8] {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &y)| (y > 0.5) == (class == 1))
            .map(|(i, _)| i)
            .collect();
        if members.len() < k {
            return Err(EstimationError::InsufficientClassMembers {
                class,
                count: members.len(),
                folds: k,
            });
        }
        let base = members.len() / k;
        let extra = members.len() % k;
        let mut start = 0;
        for (fold_idx, fold) in folds.iter_mut().enumerate() {
            let len = base + usize::from(fold_idx < extra);
            fold.extend_from_slice(&members[start..start + len]);
            start += len;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// K-fold cross-validated ROC AUC on the given (standardized) training data.
///
/// Each fold refits the classifier on the remaining folds and scores the
/// held-out fold with predicted probabilities.
pub fn cross_validate_auc(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    k: usize,
    config: &FitConfig,
) -> Result<Vec<f64>, EstimationError> {
    if x.nrows() != y.len() {
        return Err(EstimationError::MismatchedDimensions {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    let folds = stratified_folds(y, k)?;
    let mut scores = Vec::with_capacity(k);

    for (fold_idx, held_out) in folds.iter().enumerate() {
        let mut in_fold = vec![false; y.len()];
        for &i in held_out {
            in_fold[i] = true;
        }
        let train_idx: Vec<usize> = (0..y.len()).filter(|&i| !in_fold[i]).collect();

        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_val = x.select(Axis(0), held_out);
        let y_val = y.select(Axis(0), held_out);

        let fit = fit_logistic(x_train.view(), y_train.view(), config)?;
        let probabilities = (x_val.dot(&fit.coefficients) + fit.intercept).mapv(sigmoid);
        let auc = roc_auc(y_val.view(), probabilities.view());
        log::debug!("CV fold {}/{}: AUC {:.4}", fold_idx + 1, k, auc);
        scores.push(auc);
    }

    Ok(scores)
}
