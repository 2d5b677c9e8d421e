//! ReviewLens Classifiers
//!
//! The recommendation ensemble: three classifiers, each looking at a different
//! representation of the same normalized review text.
//!
//! - Classifier A: logistic regression over bag-of-words counts
//! - Classifier B: random forest over scaled document embeddings
//! - Classifier C: RBF kernel SVM over scaled TF-IDF weighted embeddings
//!
//! Their votes are fused by majority with a mean-probability confidence. Fitted
//! extractors, scalers, and models are persisted together as a versioned
//! [`ArtifactBundle`] and served by the [`InferenceService`].

pub mod bundle;
pub mod classifier;
pub mod config;
pub mod features;
pub mod forest;
pub mod fusion;
pub mod inference;
pub mod logistic;
pub mod scaler;
pub mod svm;

pub use bundle::{ArtifactBundle, BundleManifest, BundleStore, EvaluationSummary};
pub use classifier::BinaryClassifier;
pub use config::{
    EngineConfig, ForestConfig, Gamma, LogisticConfig, PathsConfig, SvmConfig, TrainingConfig,
    VectorizerConfig,
};
pub use features::{Extractors, FeatureSet, Featurizer, RawFeatures, WordEmbeddings};
pub use forest::RandomForest;
pub use fusion::{fuse, fuse_outputs, Fusion, ModelOutput, FUSION_METHOD};
pub use inference::{BundleSelector, InferenceService, ModelInfo};
pub use logistic::LogisticRegression;
pub use scaler::StandardScaler;
pub use svm::KernelSvm;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bundle::{ArtifactBundle, BundleStore};
    pub use crate::classifier::BinaryClassifier;
    pub use crate::config::EngineConfig;
    pub use crate::inference::{BundleSelector, InferenceService};
    pub use reviewlens_core::prelude::*;
}
