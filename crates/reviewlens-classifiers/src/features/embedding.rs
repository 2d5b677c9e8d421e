//! Pretrained word embeddings and document-level embedding extraction

use ndarray::{Array1, Array2, ArrayView1};
use reviewlens_core::text;
use reviewlens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reference to the embedding source a bundle was trained with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSource {
    /// Display name (file stem)
    pub name: String,

    /// Location of the vectors file
    pub path: PathBuf,

    /// Vector dimensionality
    pub dimension: usize,

    /// Number of words with vectors
    pub vocabulary_size: usize,

    /// SHA-256 of the vectors file
    pub sha256: String,
}

/// Word → vector lookup table
///
/// Text format, one word per line: `word v1 v2 ... vD`. An optional
/// word2vec-style `"<count> <dim>"` header line is skipped.
#[derive(Debug, Clone)]
pub struct WordEmbeddings {
    index: HashMap<String, usize>,
    vectors: Array2<f32>,
    source: EmbeddingSource,
}

impl WordEmbeddings {
    /// Load vectors from a text file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "embeddings".to_string());

        let mut embeddings = Self::from_reader(BufReader::new(bytes.as_slice()), name)?;
        embeddings.source.path = path.to_path_buf();
        embeddings.source.sha256 = sha256;

        info!(
            "Loaded {} word vectors ({} dimensions) from {}",
            embeddings.len(),
            embeddings.dimension(),
            path.display()
        );
        Ok(embeddings)
    }

    /// Load a source and check it is the one a bundle references
    pub fn from_source(source: &EmbeddingSource, path: impl AsRef<Path>) -> Result<Self> {
        let embeddings = Self::from_file(path)?;
        if embeddings.source.sha256 != source.sha256 {
            return Err(Error::artifact_load(format!(
                "embedding source {} does not match the bundle (checksum {} != {})",
                embeddings.source.path.display(),
                embeddings.source.sha256,
                source.sha256
            )));
        }
        if embeddings.dimension() != source.dimension {
            return Err(Error::artifact_load(format!(
                "embedding dimension {} does not match the bundle ({})",
                embeddings.dimension(),
                source.dimension
            )));
        }
        Ok(embeddings)
    }

    /// Parse vectors from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R, name: impl Into<String>) -> Result<Self> {
        let mut words: Vec<String> = Vec::new();
        let mut values: Vec<f32> = Vec::new();
        let mut dimension: Option<usize> = None;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };

            let parsed: std::result::Result<Vec<f32>, _> = fields.map(str::parse::<f32>).collect();
            let vector = parsed.map_err(|e| {
                Error::feature_extraction(format!("embedding line {}: {}", line_no + 1, e))
            })?;

            // word2vec header: "<count> <dim>"
            if line_no == 0 && vector.len() == 1 && word.parse::<usize>().is_ok() {
                debug!("Skipping embedding header line");
                continue;
            }

            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(Error::feature_extraction(format!(
                        "embedding line {} has {} values, expected {}",
                        line_no + 1,
                        vector.len(),
                        d
                    )));
                }
                Some(_) => {}
            }

            if vector.iter().any(|v| !v.is_finite()) {
                return Err(Error::feature_extraction(format!(
                    "embedding line {} contains non-finite values",
                    line_no + 1
                )));
            }

            words.push(word.to_lowercase());
            values.extend(vector);
        }

        let dimension = match dimension {
            Some(d) if d > 0 => d,
            _ => return Err(Error::feature_extraction("embedding source contains no vectors")),
        };

        Self::from_parts(words, values, dimension, name.into())
    }

    /// Build from in-memory `(word, vector)` pairs
    pub fn from_pairs<I, S>(pairs: I, name: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let mut words = Vec::new();
        let mut values = Vec::new();
        let mut dimension = None;

        for (word, vector) in pairs {
            let word = word.into();
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(Error::feature_extraction(format!(
                        "vector for {word:?} has {} values, expected {d}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
            words.push(word.to_lowercase());
            values.extend(vector);
        }

        let dimension = dimension
            .filter(|d| *d > 0)
            .ok_or_else(|| Error::feature_extraction("embedding source contains no vectors"))?;

        Self::from_parts(words, values, dimension, name.into())
    }

    fn from_parts(words: Vec<String>, values: Vec<f32>, dimension: usize, name: String) -> Result<Self> {
        let rows = words.len();
        let vectors = Array2::from_shape_vec((rows, dimension), values)
            .map_err(|e| Error::internal(format!("embedding matrix shape: {e}")))?;

        // first occurrence wins for duplicated words
        let mut index = HashMap::with_capacity(rows);
        for (row, word) in words.into_iter().enumerate() {
            index.entry(word).or_insert(row);
        }

        let source = EmbeddingSource {
            name,
            path: PathBuf::new(),
            dimension,
            vocabulary_size: index.len(),
            sha256: String::new(),
        };

        Ok(Self {
            index,
            vectors,
            source,
        })
    }

    pub fn source(&self) -> &EmbeddingSource {
        &self.source
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Vector for a single token, if the source has one
    pub fn vector(&self, token: &str) -> Option<ArrayView1<'_, f32>> {
        self.index.get(token).map(|&row| self.vectors.row(row))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Mean of the token vectors of a normalized document
    ///
    /// Documents without any resolvable token map to the zero vector, so the
    /// output dimension never changes.
    pub fn document_vector(&self, normalized: &str) -> Array1<f64> {
        let mut sum = Array1::<f64>::zeros(self.dimension());
        let mut resolved = 0usize;

        for token in text::tokens(normalized) {
            if let Some(vector) = self.vector(token) {
                sum.zip_mut_with(&vector, |acc, &v| *acc += f64::from(v));
                resolved += 1;
            }
        }

        if resolved > 0 {
            sum /= resolved as f64;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn toy() -> WordEmbeddings {
        WordEmbeddings::from_pairs(
            vec![
                ("good", vec![1.0, 0.0, 2.0]),
                ("bad", vec![-1.0, 0.0, 0.0]),
                ("dress", vec![0.0, 3.0, 1.0]),
            ],
            "toy",
        )
        .unwrap()
    }

    #[test]
    fn test_document_vector_averages_known_tokens() {
        let embeddings = toy();
        let vector = embeddings.document_vector("good dress unknownword");
        assert_eq!(vector, Array1::from(vec![0.5, 1.5, 1.5]));
    }

    #[test]
    fn test_unresolvable_document_is_zero_with_fixed_dimension() {
        let embeddings = toy();
        let vector = embeddings.document_vector("qwerty zxcv");
        assert_eq!(vector.len(), 3);
        assert!(vector.iter().all(|v| *v == 0.0));
        assert_eq!(embeddings.document_vector("").len(), 3);
    }

    #[test]
    fn test_reader_skips_header_and_checks_dimension() {
        let text = "2 3\ngood 1 0 2\nBad -1 0 0\n";
        let embeddings = WordEmbeddings::from_reader(Cursor::new(text), "w2v").unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings.dimension(), 3);
        assert!(embeddings.contains("bad"));

        let ragged = "good 1 0 2\nbad -1 0\n";
        assert!(WordEmbeddings::from_reader(Cursor::new(ragged), "bad").is_err());

        let garbage = "good 1 x 2\n";
        assert!(WordEmbeddings::from_reader(Cursor::new(garbage), "bad").is_err());
    }

    #[test]
    fn test_from_file_fingerprints_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        std::fs::write(&path, "good 1 0\nbad -1 0\n").unwrap();

        let embeddings = WordEmbeddings::from_file(&path).unwrap();
        let source = embeddings.source().clone();
        assert_eq!(source.name, "vectors");
        assert_eq!(source.dimension, 2);
        assert_eq!(source.sha256.len(), 64);

        assert!(WordEmbeddings::from_source(&source, &path).is_ok());

        std::fs::write(&path, "good 1 0\nbad -1 1\n").unwrap();
        let err = WordEmbeddings::from_source(&source, &path).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad(_)));
    }
}
