//! Error types for ReviewLens

use std::fmt;

/// Result type alias using ReviewLens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ReviewLens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Artifact bundle missing, partial, or corrupt
    #[error("artifact load error: {0}")]
    ArtifactLoad(String),

    /// Prediction requested before a bundle was loaded
    #[error("models not loaded")]
    ModelsNotLoaded,

    /// Review text normalized to nothing
    #[error("review text is empty after normalization")]
    EmptyInput,

    /// Input or fitted state defeated a feature extractor
    #[error("feature extraction error: {0}")]
    FeatureExtraction(String),

    /// Training pipeline failure, tagged with the stage that failed
    #[error("training failed during {stage}: {message}")]
    Training {
        stage: TrainingStage,
        message: String,
    },

    /// Corpus parsing errors
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new artifact load error
    pub fn artifact_load(msg: impl Into<String>) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    /// Create a new feature extraction error
    pub fn feature_extraction(msg: impl Into<String>) -> Self {
        Self::FeatureExtraction(msg.into())
    }

    /// Create a new training error for the given stage
    pub fn training(stage: TrainingStage, msg: impl Into<String>) -> Self {
        Self::Training {
            stage,
            message: msg.into(),
        }
    }

    /// Create a new corpus error
    pub fn corpus(msg: impl Into<String>) -> Self {
        Self::Corpus(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error only affects a single prediction
    pub fn is_per_request(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::FeatureExtraction(_))
    }
}

/// Stages of the training pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrainingStage {
    Idle,
    LoadingCorpus,
    Preprocessing,
    Splitting,
    FittingExtractors,
    FittingScalers,
    TrainingClassifiers,
    Evaluating,
    PersistingArtifact,
    Done,
}

impl TrainingStage {
    /// The stage that follows this one; `Done` is terminal
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::LoadingCorpus,
            Self::LoadingCorpus => Self::Preprocessing,
            Self::Preprocessing => Self::Splitting,
            Self::Splitting => Self::FittingExtractors,
            Self::FittingExtractors => Self::FittingScalers,
            Self::FittingScalers => Self::TrainingClassifiers,
            Self::TrainingClassifiers => Self::Evaluating,
            Self::Evaluating => Self::PersistingArtifact,
            Self::PersistingArtifact => Self::Done,
            Self::Done => Self::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingCorpus => "loading corpus",
            Self::Preprocessing => "preprocessing",
            Self::Splitting => "splitting",
            Self::FittingExtractors => "fitting extractors",
            Self::FittingScalers => "fitting scalers",
            Self::TrainingClassifiers => "training classifiers",
            Self::Evaluating => "evaluating",
            Self::PersistingArtifact => "persisting artifact",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        let mut stage = TrainingStage::Idle;
        let mut visited = vec![stage];
        while stage != TrainingStage::Done {
            stage = stage.next();
            visited.push(stage);
        }
        assert_eq!(visited.len(), 10);
        assert!(visited.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_training_error_names_stage() {
        let err = Error::training(TrainingStage::FittingScalers, "dimension mismatch");
        assert_eq!(
            err.to_string(),
            "training failed during fitting scalers: dimension mismatch"
        );
    }

    #[test]
    fn test_per_request_errors() {
        assert!(Error::EmptyInput.is_per_request());
        assert!(Error::feature_extraction("bad").is_per_request());
        assert!(!Error::ModelsNotLoaded.is_per_request());
    }
}
