//! L2-regularized logistic regression over sparse term counts
//!
//! Minimizes the class-weighted mean log-loss
//!
//! ```text
//! J(w, b) = (1/S) Σ s_i ℓ(y_i, σ(w·x_i + b)) + ||w||² / (2 C S),   S = Σ s_i
//! ```
//!
//! which has the same minimizer as `C Σ s_i ℓ_i + ||w||²/2`. The intercept is
//! not regularized. Optimization is accelerated full-batch gradient descent
//! with a fixed `1/L` step, where `L` bounds the Lipschitz constant of `∇J`.

use crate::classifier::{clamp_probability, sample_weights, BinaryClassifier};
use crate::config::LogisticConfig;
use crate::features::SparseVector;
use ndarray::Array1;
use reviewlens_core::{Error, Recommendation, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fitted logistic regression model (classifier A)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Array1<f64>,
    intercept: f64,
    iterations: usize,
    converged: bool,
}

impl LogisticRegression {
    pub fn fit(
        samples: &[SparseVector],
        labels: &[Recommendation],
        config: &LogisticConfig,
    ) -> Result<Self> {
        if samples.len() != labels.len() {
            return Err(Error::internal(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        let dim = samples
            .first()
            .map(SparseVector::dim)
            .ok_or_else(|| Error::feature_extraction("cannot fit logistic regression on zero samples"))?;
        if samples.iter().any(|x| x.dim() != dim) {
            return Err(Error::feature_extraction("count vectors have inconsistent dimensions"));
        }

        let start = Instant::now();
        let weights = sample_weights(labels)?;
        let targets: Vec<f64> = labels.iter().map(|l| f64::from(l.as_u8())).collect();
        let total_weight: f64 = weights.iter().sum();
        let l2 = 1.0 / (config.c * total_weight);

        let lipschitz = 0.25 / total_weight
            * samples
                .iter()
                .zip(&weights)
                .map(|(x, s)| s * (x.squared_norm() + 1.0))
                .sum::<f64>()
            + l2;
        let step = 1.0 / lipschitz;

        let objective = Objective {
            samples,
            targets: &targets,
            weights: &weights,
            total_weight,
            l2,
        };

        // FISTA iterates: (w, b) current, (v, vb) extrapolated
        let mut w = Array1::<f64>::zeros(dim);
        let mut b = 0.0;
        let mut v = w.clone();
        let mut vb = b;
        let mut t = 1.0f64;
        let mut converged = false;
        let mut iterations = 0;

        for iteration in 0..config.max_iter {
            iterations = iteration + 1;
            let (grad_w, grad_b) = objective.gradient(&v, vb);
            let grad_norm = (grad_w.dot(&grad_w) + grad_b * grad_b).sqrt();

            if grad_norm < config.tolerance {
                w = v;
                b = vb;
                converged = true;
                break;
            }

            let next_w = &v - &(grad_w * step);
            let next_b = vb - step * grad_b;

            let next_t = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / next_t;
            v = &next_w + &((&next_w - &w) * momentum);
            vb = next_b + momentum * (next_b - b);

            w = next_w;
            b = next_b;
            t = next_t;

            if iteration % 100 == 0 {
                debug!(iteration, grad_norm, "logistic regression progress");
            }
        }

        if converged {
            info!(
                "Logistic regression converged after {} iterations in {:?} ({} features)",
                iterations,
                start.elapsed(),
                dim
            );
        } else {
            warn!(
                "Logistic regression reached max_iter={} without converging (tolerance {})",
                config.max_iter, config.tolerance
            );
        }

        Ok(Self {
            weights: w,
            intercept: b,
            iterations,
            converged,
        })
    }

    /// Linear score `w·x + b`
    pub fn decision_function(&self, features: &SparseVector) -> f64 {
        features
            .iter()
            .filter_map(|(i, x)| self.weights.get(i).map(|w| w * x))
            .sum::<f64>()
            + self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

impl BinaryClassifier for LogisticRegression {
    type Input = SparseVector;

    fn predict_probability(&self, features: &SparseVector) -> f64 {
        clamp_probability(sigmoid(self.decision_function(features)))
    }
}

struct Objective<'a> {
    samples: &'a [SparseVector],
    targets: &'a [f64],
    weights: &'a [f64],
    total_weight: f64,
    l2: f64,
}

impl Objective<'_> {
    fn gradient(&self, w: &Array1<f64>, b: f64) -> (Array1<f64>, f64) {
        let mut grad_w = w * self.l2;
        let mut grad_b = 0.0;

        for ((x, &y), &s) in self.samples.iter().zip(self.targets).zip(self.weights) {
            let z = x.dot(w) + b;
            let residual = s * (sigmoid(z) - y) / self.total_weight;
            for (i, value) in x.iter() {
                grad_w[i] += residual * value;
            }
            grad_b += residual;
        }

        (grad_w, grad_b)
    }
}

/// Numerically stable logistic function
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Recommendation::{NotRecommended as N, Recommended as R};

    fn doc(dim: usize, pairs: &[(usize, f64)]) -> SparseVector {
        SparseVector::from_pairs(dim, pairs.to_vec())
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_separates_sentiment_terms() {
        // 0 = "love", 1 = "great", 2 = "awful", 3 = "return", 4 = "dress"
        let samples = vec![
            doc(5, &[(0, 1.0), (4, 1.0)]),
            doc(5, &[(1, 2.0)]),
            doc(5, &[(0, 1.0), (1, 1.0)]),
            doc(5, &[(2, 1.0), (4, 1.0)]),
            doc(5, &[(3, 1.0)]),
            doc(5, &[(2, 1.0), (3, 1.0)]),
        ];
        let labels = vec![R, R, R, N, N, N];

        let model = LogisticRegression::fit(&samples, &labels, &LogisticConfig::default()).unwrap();
        assert!(model.converged());

        for (x, y) in samples.iter().zip(&labels) {
            assert_eq!(model.predict(x), *y);
            let p = model.predict_probability(x);
            assert!((0.0..=1.0).contains(&p));
        }

        assert!(model.predict_probability(&doc(5, &[(0, 1.0)])) > 0.5);
        assert!(model.predict_probability(&doc(5, &[(2, 1.0)])) < 0.5);
    }

    #[test]
    fn test_balanced_weighting_removes_prior() {
        // identical inputs: only the class prior could move the output
        let x = doc(2, &[(0, 1.0)]);
        let samples = vec![x.clone(); 4];
        let labels = vec![R, N, N, N];

        let model = LogisticRegression::fit(&samples, &labels, &LogisticConfig::default()).unwrap();
        assert!((model.predict_probability(&x) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_indices_are_ignored() {
        let samples = vec![doc(2, &[(0, 1.0)]), doc(2, &[(1, 1.0)])];
        let model = LogisticRegression::fit(&samples, &[R, N], &LogisticConfig::default()).unwrap();
        let wider = doc(10, &[(0, 1.0), (9, 5.0)]);
        assert_eq!(
            model.predict_probability(&wider),
            model.predict_probability(&samples[0])
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = LogisticConfig::default();
        assert!(LogisticRegression::fit(&[], &[], &config).is_err());

        let samples = vec![doc(2, &[(0, 1.0)]), doc(2, &[(1, 1.0)])];
        assert!(LogisticRegression::fit(&samples, &[R, R], &config).is_err());
        assert!(LogisticRegression::fit(&samples, &[R], &config).is_err());
    }
}
