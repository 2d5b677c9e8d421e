//! ReviewLens Core
//!
//! Core types, traits, and utilities shared across ReviewLens components.
//!
//! This crate provides:
//! - The error taxonomy shared by training and inference
//! - Review, vote, and prediction types exchanged with the surrounding application
//! - The text normalizer every feature extractor depends on

pub mod error;
pub mod text;
pub mod types;

pub use error::{Error, Result, TrainingStage};
pub use types::{
    ModelKind, ModelVote, PredictionDetails, PredictionResponse, PredictionResult, RawReview,
    Recommendation,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result, TrainingStage};
    pub use crate::text::{combine, normalize, normalize_str};
    pub use crate::types::{ModelKind, ModelVote, PredictionResult, RawReview, Recommendation};
}
