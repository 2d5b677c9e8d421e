//! RBF kernel support vector machine with Platt-calibrated probabilities
//!
//! The soft-margin dual is solved by `linfa-svm` with a Gaussian kernel. The
//! per-class penalties `C⁺` and `C⁻` are the configured `c` scaled by the
//! balanced weight of each class. Only the support vectors, their signed dual
//! coefficients and the offset are kept, so the fitted model serializes with
//! the rest of the bundle.
//!
//! Probabilities come from a sigmoid fitted on out-of-fold decision values:
//! the training set is split into stratified folds and every sample is scored
//! by a machine that never saw it.

use crate::classifier::{balanced_class_weights, clamp_probability, BinaryClassifier};
use crate::config::{Gamma, SvmConfig};
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use reviewlens_core::{Error, Recommendation, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Seed for the calibration fold assignment
const CALIBRATION_SEED: u64 = 42;

/// Fitted kernel SVM (classifier C)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSvm {
    support_vectors: Array2<f64>,
    /// `α_i · y_i` for every support vector
    dual_coef: Array1<f64>,
    rho: f64,
    gamma: f64,
    platt: PlattScaling,
    /// Folds used to calibrate `platt`; 0 when calibrated in-sample
    calibration_folds: usize,
}

impl KernelSvm {
    pub fn fit(samples: &Array2<f64>, labels: &[Recommendation], config: &SvmConfig) -> Result<Self> {
        let (n_samples, n_features) = samples.dim();
        if n_samples != labels.len() {
            return Err(Error::internal(format!(
                "{} samples but {} labels",
                n_samples,
                labels.len()
            )));
        }
        if n_features == 0 {
            return Err(Error::feature_extraction("cannot fit an SVM on zero features"));
        }

        let gamma = resolve_gamma(config.gamma, samples);
        let start = Instant::now();
        let machine = DualModel::fit(samples, labels, gamma, config)?;
        info!(
            "SVM fitted in {:?} (gamma={:.5}, {} of {} samples are support vectors)",
            start.elapsed(),
            gamma,
            machine.support_vectors.nrows(),
            n_samples
        );

        let (platt, calibration_folds) = match calibration_folds(labels, config.calibration_folds) {
            Some(folds) => {
                let decisions = out_of_fold_decisions(samples, labels, &folds, gamma, config)?;
                debug!(folds = folds.len(), "Platt scaling fitted on out-of-fold decisions");
                (PlattScaling::fit(&decisions, labels), folds.len())
            }
            None => {
                debug!("Too few samples per class for calibration folds, calibrating in-sample");
                let decisions: Vec<f64> = samples
                    .rows()
                    .into_iter()
                    .map(|row| machine.decision(row))
                    .collect();
                (PlattScaling::fit(&decisions, labels), 0)
            }
        };

        Ok(Self {
            support_vectors: machine.support_vectors,
            dual_coef: machine.dual_coef,
            rho: machine.rho,
            gamma,
            platt,
            calibration_folds,
        })
    }

    /// Signed margin; positive means recommended
    pub fn decision_function(&self, features: ArrayView1<'_, f64>) -> f64 {
        rbf_decision(
            &self.support_vectors,
            &self.dual_coef,
            self.rho,
            self.gamma,
            features,
        )
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.support_vectors.ncols()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn platt(&self) -> &PlattScaling {
        &self.platt
    }

    pub fn calibration_folds(&self) -> usize {
        self.calibration_folds
    }
}

impl BinaryClassifier for KernelSvm {
    type Input = Array1<f64>;

    fn predict_probability(&self, features: &Array1<f64>) -> f64 {
        clamp_probability(self.platt.probability(self.decision_function(features.view())))
    }
}

/// Support vectors and offset of one solved dual problem
struct DualModel {
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    rho: f64,
    gamma: f64,
}

impl DualModel {
    fn fit(
        samples: &Array2<f64>,
        labels: &[Recommendation],
        gamma: f64,
        config: &SvmConfig,
    ) -> Result<Self> {
        let weights = balanced_class_weights(labels)?;
        let targets: Array1<bool> = labels.iter().map(|l| l.is_recommended()).collect();
        let dataset = Dataset::new(samples.clone(), targets);

        // linfa's Gaussian kernel is exp(-|x - y|² / eps)
        let svm = Svm::<f64, bool>::params()
            .pos_neg_weights(config.c * weights[1], config.c * weights[0])
            .gaussian_kernel(1.0 / gamma)
            .eps(config.tolerance)
            .fit(&dataset)
            .map_err(|e| Error::internal(format!("SVM training failed: {}", e)))?;

        // alpha holds α_i · y_i for every training sample
        let support: Vec<usize> = svm
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| a.abs() > 100.0 * f64::EPSILON)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            support_vectors: samples.select(Axis(0), &support),
            dual_coef: support.iter().map(|&i| svm.alpha[i]).collect(),
            rho: svm.rho,
            gamma,
        })
    }

    fn decision(&self, features: ArrayView1<'_, f64>) -> f64 {
        rbf_decision(
            &self.support_vectors,
            &self.dual_coef,
            self.rho,
            self.gamma,
            features,
        )
    }
}

/// `Σ coef_i · exp(-γ |sv_i - x|²) − ρ`
fn rbf_decision(
    support_vectors: &Array2<f64>,
    dual_coef: &Array1<f64>,
    rho: f64,
    gamma: f64,
    features: ArrayView1<'_, f64>,
) -> f64 {
    let mut sum = 0.0;
    for (sv, coef) in support_vectors.rows().into_iter().zip(dual_coef.iter()) {
        let d2: f64 = sv
            .iter()
            .zip(features.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        sum += coef * (-gamma * d2).exp();
    }
    sum - rho
}

/// `1 / (d · var(X))`, or 1 when the features carry no variance
fn resolve_gamma(gamma: Gamma, samples: &Array2<f64>) -> f64 {
    match gamma {
        Gamma::Value(value) => value,
        Gamma::Scale => {
            let mean = samples.mean().unwrap_or(0.0);
            let variance = samples.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);
            if variance > 0.0 {
                1.0 / (samples.ncols() as f64 * variance)
            } else {
                1.0
            }
        }
    }
}

/// Stratified fold membership for calibration
///
/// `None` when fewer than two folds are requested or a class has fewer
/// samples than folds.
fn calibration_folds(labels: &[Recommendation], k: usize) -> Option<Vec<Vec<usize>>> {
    if k < 2 {
        return None;
    }

    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, label) in labels.iter().enumerate() {
        classes[usize::from(label.as_u8())].push(i);
    }
    if classes.iter().any(|class| class.len() < k) {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(CALIBRATION_SEED);
    let mut folds = vec![Vec::new(); k];
    for class in classes.iter_mut() {
        class.shuffle(&mut rng);
        for (position, &index) in class.iter().enumerate() {
            folds[position % k].push(index);
        }
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Some(folds)
}

/// Decision value of every sample from a machine fitted without its fold
fn out_of_fold_decisions(
    samples: &Array2<f64>,
    labels: &[Recommendation],
    folds: &[Vec<usize>],
    gamma: f64,
    config: &SvmConfig,
) -> Result<Vec<f64>> {
    let scored = folds
        .par_iter()
        .enumerate()
        .map(|(held_out, fold)| -> Result<Vec<(usize, f64)>> {
            let train: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(f, _)| *f != held_out)
                .flat_map(|(_, indices)| indices.iter().copied())
                .collect();
            let train_labels: Vec<Recommendation> = train.iter().map(|&i| labels[i]).collect();
            let machine =
                DualModel::fit(&samples.select(Axis(0), &train), &train_labels, gamma, config)?;
            Ok(fold
                .iter()
                .map(|&i| (i, machine.decision(samples.row(i))))
                .collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>>>()?;

    let mut decisions = vec![0.0; labels.len()];
    for (i, decision) in scored.into_iter().flatten() {
        decisions[i] = decision;
    }
    Ok(decisions)
}

/// Sigmoid `P(recommended | f) = 1 / (1 + exp(a·f + b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    const MAX_ITER: usize = 100;
    const MIN_STEP: f64 = 1e-10;
    const SIGMA: f64 = 1e-12;
    const EPS: f64 = 1e-5;

    /// Newton's method with backtracking on regularized targets
    pub fn fit(decisions: &[f64], labels: &[Recommendation]) -> Self {
        let positives = labels.iter().filter(|l| l.is_recommended()).count() as f64;
        let negatives = labels.len() as f64 - positives;

        let hi_target = (positives + 1.0) / (positives + 2.0);
        let lo_target = 1.0 / (negatives + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|l| if l.is_recommended() { hi_target } else { lo_target })
            .collect();

        let mut a = 0.0;
        let mut b = ((negatives + 1.0) / (positives + 1.0)).ln();
        let mut fval = Self::objective(decisions, &targets, a, b);

        for iteration in 0..Self::MAX_ITER {
            let mut h11 = Self::SIGMA;
            let mut h22 = Self::SIGMA;
            let mut h21 = 0.0;
            let mut g1 = 0.0;
            let mut g2 = 0.0;

            for (&f, &t) in decisions.iter().zip(&targets) {
                let f_ap_b = f * a + b;
                let (p, q) = if f_ap_b >= 0.0 {
                    let e = (-f_ap_b).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_ap_b.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < Self::EPS && g2.abs() < Self::EPS {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= Self::MIN_STEP {
                let new_a = a + step * da;
                let new_b = b + step * db;
                let new_f = Self::objective(decisions, &targets, new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }

            if step < Self::MIN_STEP {
                debug!(iteration, "Platt scaling line search stalled");
                break;
            }
        }

        Self { a, b }
    }

    fn objective(decisions: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
        decisions
            .iter()
            .zip(targets)
            .map(|(&f, &t)| {
                let f_ap_b = f * a + b;
                if f_ap_b >= 0.0 {
                    t * f_ap_b + (1.0 + (-f_ap_b).exp()).ln()
                } else {
                    (t - 1.0) * f_ap_b + (1.0 + f_ap_b.exp()).ln()
                }
            })
            .sum()
    }

    pub fn probability(&self, decision: f64) -> f64 {
        let f_ap_b = decision * self.a + self.b;
        if f_ap_b >= 0.0 {
            let e = (-f_ap_b).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + f_ap_b.exp())
        }
    }
}
