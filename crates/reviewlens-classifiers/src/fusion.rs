//! Fusion of the three ensemble members into one decision
//!
//! - prediction: majority vote of the binary decisions
//! - confidence: mean positive-class probability, independent of the vote
//! - consensus: all three decisions agree

use reviewlens_core::{ModelKind, ModelVote, PredictionResult, Recommendation};
use std::collections::BTreeMap;

/// Description reported by model info
pub const FUSION_METHOD: &str = "Majority Vote + Average Probability";

/// One member's vote, tagged with the member that cast it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub model: ModelKind,
    pub vote: ModelVote,
}

impl ModelOutput {
    pub fn new(model: ModelKind, vote: ModelVote) -> Self {
        Self { model, vote }
    }
}

/// Fused decision, before per-model details are attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub prediction: Recommendation,
    pub confidence: f64,
    pub consensus: bool,
}

/// Combine three member outputs; the result does not depend on their order
pub fn fuse(outputs: &[ModelOutput; 3]) -> Fusion {
    let recommended = outputs
        .iter()
        .filter(|o| o.vote.prediction.is_recommended())
        .count();

    // sorted summation keeps the mean bit-identical under reordering
    let mut probabilities = outputs.map(|o| o.vote.confidence);
    probabilities.sort_by(f64::total_cmp);
    let confidence = probabilities.iter().sum::<f64>() / 3.0;

    Fusion {
        prediction: Recommendation::from_bool(recommended >= 2),
        confidence,
        consensus: recommended == 0 || recommended == 3,
    }
}

/// Fuse and attach the per-model breakdown
pub fn fuse_outputs(outputs: [ModelOutput; 3]) -> PredictionResult {
    let fusion = fuse(&outputs);
    let per_model: BTreeMap<ModelKind, ModelVote> =
        outputs.into_iter().map(|o| (o.model, o.vote)).collect();

    PredictionResult {
        ensemble_prediction: fusion.prediction,
        ensemble_confidence: fusion.confidence,
        consensus: fusion.consensus,
        per_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output(model: ModelKind, probability: f64) -> ModelOutput {
        ModelOutput::new(
            model,
            ModelVote::new(Recommendation::from_probability(probability), probability),
        )
    }

    fn outputs(p: [f64; 3]) -> [ModelOutput; 3] {
        [
            output(ModelKind::LogisticRegression, p[0]),
            output(ModelKind::RandomForest, p[1]),
            output(ModelKind::Svm, p[2]),
        ]
    }

    #[test]
    fn test_majority_with_dissent() {
        let result = fuse_outputs(outputs([0.9, 0.6, 0.2]));
        assert_eq!(result.ensemble_prediction, Recommendation::Recommended);
        assert!(!result.consensus);
        assert!((result.ensemble_confidence - (0.9 + 0.6 + 0.2) / 3.0).abs() < 1e-12);
        assert_eq!(result.per_model.len(), 3);
        assert_eq!(
            result.per_model[&ModelKind::Svm].prediction,
            Recommendation::NotRecommended
        );
    }

    #[test]
    fn test_confidence_is_not_gated_by_vote() {
        // two weak positives outvote one confident negative
        let fusion = fuse(&outputs([0.51, 0.52, 0.01]));
        assert_eq!(fusion.prediction, Recommendation::Recommended);
        assert!(fusion.confidence < 0.5);
    }

    #[test]
    fn test_unanimous_negative() {
        let fusion = fuse(&outputs([0.1, 0.2, 0.3]));
        assert_eq!(fusion.prediction, Recommendation::NotRecommended);
        assert!(fusion.consensus);
    }

    proptest! {
        #[test]
        fn prop_fusion_is_order_independent(
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
            c in 0.0f64..=1.0,
        ) {
            let base = fuse(&outputs([a, b, c]));
            let rotated = fuse(&[
                output(ModelKind::Svm, c),
                output(ModelKind::LogisticRegression, a),
                output(ModelKind::RandomForest, b),
            ]);
            let swapped = fuse(&outputs([b, a, c]));
            prop_assert_eq!(base, rotated);
            prop_assert_eq!(base, swapped);
        }

        #[test]
        fn prop_fusion_semantics(
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
            c in 0.0f64..=1.0,
        ) {
            let fusion = fuse(&outputs([a, b, c]));
            let votes = [a, b, c].iter().filter(|p| **p >= 0.5).count();

            prop_assert!((fusion.confidence - (a + b + c) / 3.0).abs() < 1e-12);
            prop_assert!(fusion.confidence >= 0.0 && fusion.confidence <= 1.0);
            prop_assert_eq!(fusion.prediction.is_recommended(), votes >= 2);
            prop_assert_eq!(fusion.consensus, votes == 0 || votes == 3);
        }
    }
}
