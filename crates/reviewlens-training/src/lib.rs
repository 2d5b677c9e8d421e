//! ReviewLens Training
//!
//! Offline side of the ensemble: load the labeled review corpus, split it,
//! fit extractors, scalers, and the three classifiers, evaluate on held-out
//! reviews, and persist a versioned artifact bundle for the inference service.

pub mod corpus;
pub mod evaluation;
pub mod pipeline;
pub mod split;

pub use corpus::{Corpus, CorpusStats};
pub use evaluation::{
    ClassMetrics, ClassificationReport, CrossValidation, EvaluationReport, ModelEvaluation,
};
pub use pipeline::{TrainingOutcome, TrainingPipeline};
pub use split::{stratified_k_fold, stratified_split, Split};
