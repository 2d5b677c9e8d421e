//! The feature path shared by training and inference
//!
//! [`Extractors`] turns normalized text into the three raw representations;
//! [`Featurizer`] adds the fitted scalers. Training fits both from the training
//! split and inference replays exactly the same calls on the loaded bundle.

use super::embedding::WordEmbeddings;
use super::sparse::SparseVector;
use super::vectorizer::{CountVectorizer, TfidfVectorizer};
use super::weighted::{WeightSource, WeightedEmbedding, WeightedEmbeddingExtractor};
use crate::config::VectorizerConfig;
use crate::scaler::StandardScaler;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use reviewlens_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Unscaled features of one document
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatures {
    pub counts: SparseVector,
    pub embedding: Array1<f64>,
    pub weighted: WeightedEmbedding,
}

/// Model-ready features of one document
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// Bag-of-words counts for classifier A
    pub counts: SparseVector,
    /// Scaled document embedding for classifier B
    pub embedding: Array1<f64>,
    /// Scaled weighted embedding for classifier C
    pub weighted: Array1<f64>,
    /// Branch taken by the weighted extractor
    pub weight_source: WeightSource,
}

/// Fitted text → feature extractors
#[derive(Debug, Clone)]
pub struct Extractors {
    pub count: CountVectorizer,
    pub tfidf: TfidfVectorizer,
    pub embeddings: Arc<WordEmbeddings>,
}

impl Extractors {
    /// Fit both vectorizers on normalized training documents
    pub fn fit<S: AsRef<str>>(
        documents: &[S],
        embeddings: Arc<WordEmbeddings>,
        config: &VectorizerConfig,
    ) -> Result<Self> {
        let count = CountVectorizer::fit(documents, config)?;
        let tfidf = TfidfVectorizer::fit(documents, config)?;

        info!(
            "Fitted vectorizers: {} count terms, {} tf-idf terms",
            count.n_features(),
            tfidf.n_features()
        );

        Ok(Self {
            count,
            tfidf,
            embeddings,
        })
    }

    pub fn extract(&self, normalized: &str) -> RawFeatures {
        let weighted = WeightedEmbeddingExtractor::new(&self.tfidf, &self.embeddings);
        RawFeatures {
            counts: self.count.transform(normalized),
            embedding: self.embeddings.document_vector(normalized),
            weighted: weighted.extract(normalized),
        }
    }

    /// Extract many documents in parallel, preserving order
    pub fn extract_all<S: AsRef<str> + Sync>(&self, documents: &[S]) -> Vec<RawFeatures> {
        documents
            .par_iter()
            .map(|doc| self.extract(doc.as_ref()))
            .collect()
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embeddings.dimension()
    }
}

/// Extractors plus the two fitted scalers
#[derive(Debug, Clone)]
pub struct Featurizer {
    extractors: Extractors,
    embedding_scaler: StandardScaler,
    weighted_scaler: StandardScaler,
}

impl Featurizer {
    /// Assemble from fitted parts, checking that dimensions line up
    pub fn new(
        extractors: Extractors,
        embedding_scaler: StandardScaler,
        weighted_scaler: StandardScaler,
    ) -> Result<Self> {
        let dim = extractors.embedding_dimension();
        for (name, scaler) in [("embedding", &embedding_scaler), ("weighted", &weighted_scaler)] {
            if scaler.dimension() != dim {
                return Err(Error::feature_extraction(format!(
                    "{name} scaler has {} dimensions but embeddings have {dim}",
                    scaler.dimension()
                )));
            }
        }

        Ok(Self {
            extractors,
            embedding_scaler,
            weighted_scaler,
        })
    }

    /// Fit both scalers on raw training features
    pub fn fit(extractors: Extractors, raw: &[RawFeatures]) -> Result<Self> {
        let dim = extractors.embedding_dimension();
        let embeddings = stack_rows(raw.iter().map(|r| &r.embedding), dim)?;
        let weighted = stack_rows(raw.iter().map(|r| &r.weighted.vector), dim)?;

        let embedding_scaler = StandardScaler::fit(&embeddings)?;
        let weighted_scaler = StandardScaler::fit(&weighted)?;
        Self::new(extractors, embedding_scaler, weighted_scaler)
    }

    /// Normalized text to model-ready features
    pub fn featurize(&self, normalized: &str) -> Result<FeatureSet> {
        self.scale(self.extractors.extract(normalized))
    }

    /// Apply the scalers to already extracted features
    pub fn scale(&self, raw: RawFeatures) -> Result<FeatureSet> {
        Ok(FeatureSet {
            counts: raw.counts,
            embedding: self.embedding_scaler.transform(raw.embedding.view())?,
            weighted: self.weighted_scaler.transform(raw.weighted.vector.view())?,
            weight_source: raw.weighted.source,
        })
    }

    pub fn extractors(&self) -> &Extractors {
        &self.extractors
    }

    pub fn embedding_scaler(&self) -> &StandardScaler {
        &self.embedding_scaler
    }

    pub fn weighted_scaler(&self) -> &StandardScaler {
        &self.weighted_scaler
    }
}

/// Stack dense rows into an `n × dim` matrix
pub fn stack_rows<'a, I>(rows: I, dim: usize) -> Result<Array2<f64>>
where
    I: IntoIterator<Item = &'a Array1<f64>>,
{
    let rows: Vec<&Array1<f64>> = rows.into_iter().collect();
    let mut matrix = Array2::<f64>::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(Error::feature_extraction(format!(
                "row {i} has {} dimensions, expected {dim}",
                row.len()
            )));
        }
        matrix.row_mut(i).assign(*row);
    }
    Ok(matrix)
}
