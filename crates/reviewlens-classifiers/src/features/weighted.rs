//! TF-IDF weighted document embeddings
//!
//! For every content token (not a stop word, present in the embedding source)
//! the token vector is weighted by the token's TF-IDF value in the document.
//! Weights are normalized to sum to one:
//!
//! ```text
//! v = Σ_t (w_t / Σ_u w_u) · e_t
//! ```
//!
//! When no content token exists, or every weight is zero, the extractor returns
//! the plain document embedding instead and reports
//! [`WeightSource::DocumentFallback`].

use super::embedding::WordEmbeddings;
use super::stop_words::is_stop_word;
use super::vectorizer::TfidfVectorizer;
use ndarray::Array1;
use reviewlens_core::text;
use serde::{Deserialize, Serialize};

/// Which branch produced a weighted embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Weighted average with normalized TF-IDF weights
    Tfidf,
    /// Degenerate weights; the document embedding was used
    DocumentFallback,
}

/// Output of [`WeightedEmbeddingExtractor::extract`]
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEmbedding {
    pub vector: Array1<f64>,
    pub source: WeightSource,
}

/// Combines a fitted TF-IDF vectorizer with an embedding source
pub struct WeightedEmbeddingExtractor<'a> {
    tfidf: &'a TfidfVectorizer,
    embeddings: &'a WordEmbeddings,
}

impl<'a> WeightedEmbeddingExtractor<'a> {
    pub fn new(tfidf: &'a TfidfVectorizer, embeddings: &'a WordEmbeddings) -> Self {
        Self { tfidf, embeddings }
    }

    pub fn extract(&self, normalized: &str) -> WeightedEmbedding {
        let document = self.tfidf.transform(normalized);

        let mut weighted = Array1::<f64>::zeros(self.embeddings.dimension());
        let mut total_weight = 0.0;

        for token in text::tokens(normalized) {
            if is_stop_word(token) {
                continue;
            }
            let Some(vector) = self.embeddings.vector(token) else {
                continue;
            };

            let weight = self.tfidf.weight_of(&document, token);
            if weight > 0.0 {
                weighted.zip_mut_with(&vector, |acc, &v| *acc += weight * f64::from(v));
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            weighted /= total_weight;
            WeightedEmbedding {
                vector: weighted,
                source: WeightSource::Tfidf,
            }
        } else {
            WeightedEmbedding {
                vector: self.embeddings.document_vector(normalized),
                source: WeightSource::DocumentFallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorizerConfig;

    fn fixtures() -> (TfidfVectorizer, WordEmbeddings) {
        let corpus = [
            "soft fabric lovely color",
            "soft fabric",
            "soft lining",
            "lovely color",
        ];
        let tfidf = TfidfVectorizer::fit(
            &corpus,
            &VectorizerConfig {
                max_features: None,
                ngram_range: (1, 1),
                min_df: 1,
                max_df: 1.0,
                stop_words: true,
            },
        )
        .unwrap();

        let embeddings = WordEmbeddings::from_pairs(
            vec![
                ("soft", vec![1.0, 0.0]),
                ("fabric", vec![0.0, 1.0]),
                ("lovely", vec![4.0, 4.0]),
                ("velvet", vec![2.0, -2.0]),
                ("the", vec![9.0, 9.0]),
            ],
            "toy",
        )
        .unwrap();

        (tfidf, embeddings)
    }

    #[test]
    fn test_weights_follow_tfidf() {
        let (tfidf, embeddings) = fixtures();
        let extractor = WeightedEmbeddingExtractor::new(&tfidf, &embeddings);

        let result = extractor.extract("soft fabric");
        assert_eq!(result.source, WeightSource::Tfidf);

        let row = tfidf.transform("soft fabric");
        let w_soft = tfidf.weight_of(&row, "soft");
        let w_fabric = tfidf.weight_of(&row, "fabric");
        let total = w_soft + w_fabric;
        let expected = [w_soft / total, w_fabric / total];

        assert!((result.vector[0] - expected[0]).abs() < 1e-12);
        assert!((result.vector[1] - expected[1]).abs() < 1e-12);
        // "fabric" is rarer than "soft", so it dominates
        assert!(result.vector[1] > result.vector[0]);
    }

    #[test]
    fn test_weighting_differs_from_plain_average() {
        let (tfidf, embeddings) = fixtures();
        let extractor = WeightedEmbeddingExtractor::new(&tfidf, &embeddings);

        let weighted = extractor.extract("soft fabric");
        let plain = embeddings.document_vector("soft fabric");
        assert_eq!(plain, Array1::from(vec![0.5, 0.5]));
        assert_ne!(weighted.vector, plain);
    }

    #[test]
    fn test_zero_weights_fall_back_to_document_embedding() {
        let (tfidf, embeddings) = fixtures();
        let extractor = WeightedEmbeddingExtractor::new(&tfidf, &embeddings);

        // "velvet" has a vector but no TF-IDF weight
        let result = extractor.extract("velvet");
        assert_eq!(result.source, WeightSource::DocumentFallback);
        assert_eq!(result.vector, embeddings.document_vector("velvet"));
        assert_eq!(result.vector, Array1::from(vec![2.0, -2.0]));
    }

    #[test]
    fn test_stop_words_only_falls_back() {
        let (tfidf, embeddings) = fixtures();
        let extractor = WeightedEmbeddingExtractor::new(&tfidf, &embeddings);

        let result = extractor.extract("the");
        assert_eq!(result.source, WeightSource::DocumentFallback);
        assert_eq!(result.vector, Array1::from(vec![9.0, 9.0]));
    }

    #[test]
    fn test_no_vectors_falls_back_to_zero_vector() {
        let (tfidf, embeddings) = fixtures();
        let extractor = WeightedEmbeddingExtractor::new(&tfidf, &embeddings);

        let result = extractor.extract("qwerty");
        assert_eq!(result.source, WeightSource::DocumentFallback);
        assert_eq!(result.vector, Array1::<f64>::zeros(2));
    }
}
