//! Inference service over one loaded artifact bundle
//!
//! The bundle lives in a write-once cell: once loaded it is shared read-only by
//! every caller, and predictions never take a lock. A service whose bundle
//! failed to load stays "not ready" and answers every prediction with
//! [`Error::ModelsNotLoaded`] until [`InferenceService::try_load`] succeeds.

use crate::bundle::{ArtifactBundle, BundleStore, EvaluationSummary};
use crate::features::EmbeddingSource;
use crate::fusion::FUSION_METHOD;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use reviewlens_core::text::combine;
use reviewlens_core::{Error, ModelKind, PredictionResult, RawReview, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, error, info};

/// Which bundle version a service loads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BundleSelector {
    /// Most recently created version in the store
    #[default]
    Latest,
    /// A specific version directory name
    Version(String),
}

impl BundleSelector {
    /// `Version` when a name is given, `Latest` otherwise
    pub fn from_option(version: Option<String>) -> Self {
        version.map_or(Self::Latest, Self::Version)
    }
}

/// Metadata describing the loaded ensemble
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub models: Vec<&'static str>,
    pub features: Vec<&'static str>,
    pub fusion_method: &'static str,
    pub bundle_version: String,
    pub created_at: DateTime<Utc>,
    pub embedding_source: EmbeddingSource,
    pub summary: EvaluationSummary,
}

/// Serves single and batch predictions from an artifact bundle
pub struct InferenceService {
    store: Option<BundleStore>,
    selector: BundleSelector,
    embeddings_path: Option<PathBuf>,
    bundle: OnceLock<Arc<ArtifactBundle>>,
}

impl InferenceService {
    /// Create an unloaded service; call [`Self::try_load`] to load the bundle
    pub fn new(store: BundleStore, selector: BundleSelector) -> Self {
        Self {
            store: Some(store),
            selector,
            embeddings_path: None,
            bundle: OnceLock::new(),
        }
    }

    /// Read embeddings from `path` instead of the location recorded in the bundle
    pub fn with_embeddings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.embeddings_path = Some(path.into());
        self
    }

    /// Create a service and load its bundle immediately
    ///
    /// A load failure is logged once and leaves the service not ready.
    pub fn load(store: BundleStore, selector: BundleSelector) -> Self {
        Self::new(store, selector).loaded()
    }

    /// Attempt the initial load on a configured service
    pub fn loaded(self) -> Self {
        if let Err(e) = self.try_load() {
            error!("Failed to load models: {}", e);
        }
        self
    }

    /// Serve an already built bundle
    pub fn from_bundle(bundle: ArtifactBundle) -> Self {
        let selector = BundleSelector::Version(bundle.version().to_string());
        let cell = OnceLock::new();
        let _ = cell.set(Arc::new(bundle));
        Self {
            store: None,
            selector,
            embeddings_path: None,
            bundle: cell,
        }
    }

    /// Load the selected bundle unless one is already loaded
    pub fn try_load(&self) -> Result<Arc<ArtifactBundle>> {
        if let Some(bundle) = self.bundle.get() {
            return Ok(Arc::clone(bundle));
        }
        let store = self.store.as_ref().ok_or(Error::ModelsNotLoaded)?;

        let result = self.load_from(store);
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("reviewlens_bundle_loads_total", "result" => outcome).increment(1);

        let bundle = result?;
        info!(
            "Models ready: bundle {} ({} support vectors, {} trees)",
            bundle.version(),
            bundle.svm().n_support(),
            bundle.forest().n_trees()
        );
        Ok(Arc::clone(self.bundle.get_or_init(|| Arc::new(bundle))))
    }

    fn load_from(&self, store: &BundleStore) -> Result<ArtifactBundle> {
        let version = match &self.selector {
            BundleSelector::Version(version) => version.clone(),
            BundleSelector::Latest => store.latest()?.ok_or_else(|| {
                Error::artifact_load(format!("no bundles found in {}", store.root().display()))
            })?,
        };
        store.load_with_embeddings(&version, self.embeddings_path.as_deref())
    }

    pub fn is_ready(&self) -> bool {
        self.bundle.get().is_some()
    }

    pub fn bundle(&self) -> Option<&Arc<ArtifactBundle>> {
        self.bundle.get()
    }

    /// Predict one review from its text and optional title
    ///
    /// `rating` is accepted for API compatibility; no feature uses it.
    pub fn predict_single(
        &self,
        text: &str,
        title: &str,
        rating: Option<u8>,
    ) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.predict_inner(text, title, rating);

        let outcome = match &result {
            Ok(_) => "ok",
            Err(Error::ModelsNotLoaded) => "not_loaded",
            Err(Error::EmptyInput) => "empty_input",
            Err(_) => "error",
        };
        metrics::counter!("reviewlens_predictions_total", "outcome" => outcome).increment(1);
        metrics::histogram!("reviewlens_prediction_latency_us")
            .record(start.elapsed().as_micros() as f64);

        result
    }

    fn predict_inner(
        &self,
        text: &str,
        title: &str,
        rating: Option<u8>,
    ) -> Result<PredictionResult> {
        let bundle = self.bundle.get().ok_or(Error::ModelsNotLoaded)?;

        let normalized = combine(title, text);
        if normalized.is_empty() {
            return Err(Error::EmptyInput);
        }

        let result = bundle.predict(&normalized)?;
        debug!(
            ?rating,
            prediction = result.ensemble_prediction.as_u8(),
            confidence = result.ensemble_confidence,
            consensus = result.consensus,
            "prediction"
        );
        Ok(result)
    }

    /// Predict many texts in parallel
    ///
    /// Item `i` equals `predict_single(texts[i], "", None)`; failures stay
    /// confined to their own item.
    pub fn predict_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Result<PredictionResult>> {
        texts
            .par_iter()
            .map(|text| self.predict_single(text.as_ref(), "", None))
            .collect()
    }

    /// Predict full reviews (title and rating included) in parallel
    pub fn predict_reviews(&self, reviews: &[RawReview]) -> Vec<Result<PredictionResult>> {
        reviews
            .par_iter()
            .map(|review| self.predict_single(&review.text, &review.title, review.rating))
            .collect()
    }

    /// Describe the loaded ensemble
    pub fn model_info(&self) -> Result<ModelInfo> {
        let bundle = self.bundle.get().ok_or(Error::ModelsNotLoaded)?;
        let manifest = bundle.manifest();

        Ok(ModelInfo {
            models: ModelKind::ALL.iter().map(ModelKind::display_name).collect(),
            features: ModelKind::ALL.iter().map(ModelKind::feature_name).collect(),
            fusion_method: FUSION_METHOD,
            bundle_version: manifest.version.clone(),
            created_at: manifest.created_at,
            embedding_source: bundle.embedding_source().clone(),
            summary: manifest.summary.clone(),
        })
    }

    pub fn selector(&self) -> &BundleSelector {
        &self.selector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_service_rejects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::load(BundleStore::new(dir.path()), BundleSelector::Latest);

        assert!(!service.is_ready());
        assert!(matches!(
            service.predict_single("lovely dress", "", None),
            Err(Error::ModelsNotLoaded)
        ));
        assert!(matches!(service.model_info(), Err(Error::ModelsNotLoaded)));

        let batch = service.predict_batch(&["a", "b"]);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|r| matches!(r, Err(Error::ModelsNotLoaded))));

        // retry still fails on an empty store
        assert!(matches!(service.try_load(), Err(Error::ArtifactLoad(_))));
    }

    #[test]
    fn test_selector_from_option() {
        assert_eq!(BundleSelector::from_option(None), BundleSelector::Latest);
        assert_eq!(
            BundleSelector::from_option(Some("v1".into())),
            BundleSelector::Version("v1".into())
        );
    }
}
