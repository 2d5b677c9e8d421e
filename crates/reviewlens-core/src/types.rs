//! Core types for ReviewLens

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A free-text product review as received from the caller or the corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReview {
    /// Review body
    pub text: String,

    /// Review title
    #[serde(default)]
    pub title: String,

    /// Star rating (1-5), accepted but unused by the current features
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    /// Ground-truth label, present only for training examples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Recommendation>,
}

impl RawReview {
    /// Create an unlabeled review
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the rating
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: Recommendation) -> Self {
        self.label = Some(label);
        self
    }

    /// Normalized `title + text`
    pub fn normalized(&self) -> String {
        crate::text::combine(&self.title, &self.text)
    }
}

/// Binary recommendation decision; serialized as `0` / `1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Recommendation {
    NotRecommended,
    Recommended,
}

impl Recommendation {
    /// Decision from a positive-class probability
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.5 {
            Self::Recommended
        } else {
            Self::NotRecommended
        }
    }

    pub fn from_bool(recommended: bool) -> Self {
        if recommended {
            Self::Recommended
        } else {
            Self::NotRecommended
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotRecommended => 0,
            Self::Recommended => 1,
        }
    }

    pub fn is_recommended(self) -> bool {
        self == Self::Recommended
    }

    /// Human readable label shown by the web layer
    pub fn label(self) -> &'static str {
        match self {
            Self::NotRecommended => "Not Recommended",
            Self::Recommended => "Recommended",
        }
    }
}

impl From<Recommendation> for u8 {
    fn from(value: Recommendation) -> Self {
        value.as_u8()
    }
}

impl TryFrom<u8> for Recommendation {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NotRecommended),
            1 => Ok(Self::Recommended),
            other => Err(format!("recommendation must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ensemble member identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Classifier A: linear model over bag-of-words counts
    LogisticRegression,
    /// Classifier B: tree ensemble over scaled embeddings
    RandomForest,
    /// Classifier C: kernel model over scaled TF-IDF weighted embeddings
    Svm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [Self::LogisticRegression, Self::RandomForest, Self::Svm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogisticRegression => "logistic_regression",
            Self::RandomForest => "random_forest",
            Self::Svm => "svm",
        }
    }

    /// Display name used in model info
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LogisticRegression => "Logistic Regression",
            Self::RandomForest => "Random Forest",
            Self::Svm => "SVM",
        }
    }

    /// Name of the feature representation this model consumes
    pub fn feature_name(&self) -> &'static str {
        match self {
            Self::LogisticRegression => "Bag of Words",
            Self::RandomForest => "Word Embeddings",
            Self::Svm => "TF-IDF Weighted Embeddings",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ensemble member's output for a single review
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelVote {
    /// Binary decision
    pub prediction: Recommendation,

    /// Probability of the positive ("recommended") class
    pub confidence: f64,

    /// Display label for `prediction`
    pub label: &'static str,
}

impl ModelVote {
    pub fn new(prediction: Recommendation, confidence: f64) -> Self {
        Self {
            prediction,
            confidence,
            label: prediction.label(),
        }
    }
}

/// Fused prediction for one review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Majority vote of the three members
    pub ensemble_prediction: Recommendation,

    /// Mean positive-class probability across the members
    pub ensemble_confidence: f64,

    /// All members agree
    pub consensus: bool,

    /// Individual member outputs
    pub per_model: BTreeMap<ModelKind, ModelVote>,
}

impl PredictionResult {
    pub fn ensemble_label(&self) -> &'static str {
        self.ensemble_prediction.label()
    }

    /// Shape consumed by the external web layer
    pub fn to_response(&self) -> PredictionResponse {
        PredictionResponse {
            prediction: self.ensemble_prediction,
            confidence: self.ensemble_confidence,
            label: self.ensemble_label(),
            details: PredictionDetails {
                individual_results: self.per_model.clone(),
                consensus: self.consensus,
                ensemble_prediction: self.ensemble_prediction,
                ensemble_confidence: self.ensemble_confidence,
                ensemble_label: self.ensemble_label(),
            },
        }
    }
}

/// Response body of the inference API
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub prediction: Recommendation,
    pub confidence: f64,
    pub label: &'static str,
    pub details: PredictionDetails,
}

/// Per-model breakdown attached to a response
#[derive(Debug, Clone, Serialize)]
pub struct PredictionDetails {
    pub individual_results: BTreeMap<ModelKind, ModelVote>,
    pub consensus: bool,
    pub ensemble_prediction: Recommendation,
    pub ensemble_confidence: f64,
    pub ensemble_label: &'static str,
}
