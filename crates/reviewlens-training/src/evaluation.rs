//! Held-out evaluation and cross-validation reports

use reviewlens_classifiers::EvaluationSummary;
use reviewlens_core::{ModelKind, Recommendation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Precision, recall, and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(true_positive: usize, predicted: usize, actual: usize) -> Self {
        let precision = ratio(true_positive, predicted);
        let recall = ratio(true_positive, actual);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: actual,
        }
    }
}

/// Zero when the denominator is empty
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Fraction of matching decisions
pub fn accuracy(truth: &[Recommendation], predicted: &[Recommendation]) -> f64 {
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    ratio(correct, truth.len().min(predicted.len()))
}

/// Binary classification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub not_recommended: ClassMetrics,
    pub recommended: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,

    /// `confusion_matrix[truth][predicted]`, indexed by label
    pub confusion_matrix: [[usize; 2]; 2],
}

impl ClassificationReport {
    pub fn from_predictions(truth: &[Recommendation], predicted: &[Recommendation]) -> Self {
        let mut matrix = [[0usize; 2]; 2];
        for (t, p) in truth.iter().zip(predicted) {
            matrix[usize::from(t.as_u8())][usize::from(p.as_u8())] += 1;
        }

        let class = |c: usize| {
            let other = 1 - c;
            ClassMetrics::from_counts(
                matrix[c][c],
                matrix[c][c] + matrix[other][c],
                matrix[c][c] + matrix[c][other],
            )
        };
        let negative = class(0);
        let positive = class(1);
        let total = negative.support + positive.support;

        let macro_avg = ClassMetrics {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1: (negative.f1 + positive.f1) / 2.0,
            support: total,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                (f(&negative) * negative.support as f64 + f(&positive) * positive.support as f64)
                    / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            accuracy: ratio(matrix[0][0] + matrix[1][1], total),
            not_recommended: negative,
            recommended: positive,
            macro_avg,
            weighted_avg,
            confusion_matrix: matrix,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.weighted_avg.support;
        let mut out = String::new();
        writeln!(out, "{:>18} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(out)?;
        for (name, m) in [
            (Recommendation::NotRecommended.label(), &self.not_recommended),
            (Recommendation::Recommended.label(), &self.recommended),
        ] {
            writeln!(
                out,
                "{:>18} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(out)?;
        writeln!(out, "{:>18} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, total)?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                out,
                "{:>18} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        f.write_str(&out)
    }
}

/// Per-fold accuracy from stratified k-fold cross-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub folds: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation across folds
    pub std: f64,
}

impl CrossValidation {
    pub fn from_scores(folds: Vec<f64>) -> Self {
        if folds.is_empty() {
            return Self {
                folds,
                mean: 0.0,
                std: 0.0,
            };
        }
        let n = folds.len() as f64;
        let mean = folds.iter().sum::<f64>() / n;
        let variance = folds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            folds,
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Evaluation of one ensemble member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model: ModelKind,
    pub name: String,
    pub features: String,
    pub fit_seconds: f64,
    pub test: ClassificationReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidation>,
}

/// Everything measured during a training run, persisted as `evaluation.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub train_samples: usize,
    pub test_samples: usize,

    /// `(not recommended, recommended)` counts of the preprocessed corpus
    pub class_distribution: (usize, usize),

    pub models: Vec<ModelEvaluation>,
    pub ensemble: ClassificationReport,
}

impl EvaluationReport {
    /// Headline numbers recorded in the bundle manifest
    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            train_samples: self.train_samples,
            test_samples: self.test_samples,
            model_accuracy: self
                .models
                .iter()
                .map(|m| (m.model, m.test.accuracy))
                .collect::<BTreeMap<_, _>>(),
            ensemble_accuracy: Some(self.ensemble.accuracy),
        }
    }

    pub fn model(&self, kind: ModelKind) -> Option<&ModelEvaluation> {
        self.models.iter().find(|m| m.model == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Recommendation::{NotRecommended as N, Recommended as R};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_report_on_known_confusion() {
        // truth:     N N N N R R R R R R
        // predicted: N N N R R R R R N R
        let truth = [N, N, N, N, R, R, R, R, R, R];
        let predicted = [N, N, N, R, R, R, R, R, N, R];
        let report = ClassificationReport::from_predictions(&truth, &predicted);

        assert_eq!(report.confusion_matrix, [[3, 1], [1, 5]]);
        assert!(approx(report.accuracy, 0.8));

        assert!(approx(report.not_recommended.precision, 0.75));
        assert!(approx(report.not_recommended.recall, 0.75));
        assert_eq!(report.not_recommended.support, 4);

        assert!(approx(report.recommended.precision, 5.0 / 6.0));
        assert!(approx(report.recommended.recall, 5.0 / 6.0));
        assert_eq!(report.recommended.support, 6);

        assert!(approx(report.macro_avg.f1, (0.75 + 5.0 / 6.0) / 2.0));
        assert!(approx(report.weighted_avg.recall, 0.8));
        assert_eq!(report.weighted_avg.support, 10);
    }

    #[test]
    fn test_never_predicted_class_has_zero_precision() {
        let truth = [N, R, R];
        let predicted = [R, R, R];
        let report = ClassificationReport::from_predictions(&truth, &predicted);

        assert_eq!(report.not_recommended.precision, 0.0);
        assert_eq!(report.not_recommended.f1, 0.0);
        assert!(approx(report.recommended.recall, 1.0));
    }

    #[test]
    fn test_report_renders_both_classes() {
        let report = ClassificationReport::from_predictions(&[N, R], &[N, R]);
        let text = report.to_string();
        assert!(text.contains("Not Recommended"));
        assert!(text.contains("Recommended"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn test_accuracy_and_cross_validation() {
        assert!(approx(accuracy(&[N, R, R, N], &[N, R, N, N]), 0.75));
        assert_eq!(accuracy(&[], &[]), 0.0);

        let cv = CrossValidation::from_scores(vec![0.8, 0.9, 1.0]);
        assert!(approx(cv.mean, 0.9));
        assert!(approx(cv.std, (0.02f64 / 3.0).sqrt()));
    }

    #[test]
    fn test_summary_carries_accuracies() {
        let perfect = ClassificationReport::from_predictions(&[N, R], &[N, R]);
        let report = EvaluationReport {
            train_samples: 8,
            test_samples: 2,
            class_distribution: (4, 6),
            models: vec![ModelEvaluation {
                model: ModelKind::Svm,
                name: "SVM".into(),
                features: "Weighted Embeddings".into(),
                fit_seconds: 0.1,
                test: perfect.clone(),
                cross_validation: None,
            }],
            ensemble: perfect,
        };

        let summary = report.summary();
        assert_eq!(summary.test_samples, 2);
        assert_eq!(summary.model_accuracy[&ModelKind::Svm], 1.0);
        assert_eq!(summary.ensemble_accuracy, Some(1.0));
        assert!(report.model(ModelKind::RandomForest).is_none());
    }
}
