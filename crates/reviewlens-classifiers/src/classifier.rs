//! Classifier trait and shared training helpers

use reviewlens_core::{Error, ModelVote, Recommendation, Result};

/// Binary classifier over one feature representation
///
/// `predict` is defined by `predict_probability`, so the two can never
/// disagree.
pub trait BinaryClassifier: Send + Sync {
    /// Feature representation consumed by the model
    type Input: ?Sized;

    /// Probability of the positive ("recommended") class, in `[0, 1]`
    fn predict_probability(&self, features: &Self::Input) -> f64;

    /// Binary decision; ties at exactly 0.5 resolve to recommended
    fn predict(&self, features: &Self::Input) -> Recommendation {
        Recommendation::from_probability(self.predict_probability(features))
    }

    /// Decision and probability together
    fn vote(&self, features: &Self::Input) -> ModelVote {
        let probability = self.predict_probability(features);
        ModelVote::new(Recommendation::from_probability(probability), probability)
    }
}

/// Balanced class weights `n / (2 * n_c)`, indexed by label (`0`, `1`)
///
/// Both classes must be present.
pub fn balanced_class_weights(labels: &[Recommendation]) -> Result<[f64; 2]> {
    let positives = labels.iter().filter(|l| l.is_recommended()).count();
    let negatives = labels.len() - positives;

    if positives == 0 || negatives == 0 {
        return Err(Error::feature_extraction(format!(
            "training requires both classes, got {negatives} negative and {positives} positive samples"
        )));
    }

    let n = labels.len() as f64;
    Ok([n / (2.0 * negatives as f64), n / (2.0 * positives as f64)])
}

/// Per-sample weights from [`balanced_class_weights`]
pub fn sample_weights(labels: &[Recommendation]) -> Result<Vec<f64>> {
    let weights = balanced_class_weights(labels)?;
    Ok(labels
        .iter()
        .map(|l| weights[usize::from(l.as_u8())])
        .collect())
}

/// Clamp a probability into `[0, 1]`, mapping NaN to 0.5
pub(crate) fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.5
    } else {
        p.clamp(0.0, 1.0)
    }
}
