//! Feature extraction for the three ensemble representations
//!
//! - [`CountVectorizer`]: sparse bag-of-words counts (classifier A)
//! - [`WordEmbeddings`]: dense document embeddings (classifier B)
//! - [`WeightedEmbeddingExtractor`]: TF-IDF weighted token embeddings (classifier C)
//!
//! Every extractor consumes text already passed through
//! [`reviewlens_core::text::normalize_str`].

pub mod embedding;
pub mod pipeline;
pub mod sparse;
pub mod stop_words;
pub mod vectorizer;
pub mod weighted;

pub use embedding::{EmbeddingSource, WordEmbeddings};
pub use pipeline::{stack_rows, Extractors, FeatureSet, Featurizer, RawFeatures};
pub use sparse::SparseVector;
pub use vectorizer::{Analyzer, CountVectorizer, TfidfVectorizer, Vocabulary};
pub use weighted::{WeightSource, WeightedEmbedding, WeightedEmbeddingExtractor};
