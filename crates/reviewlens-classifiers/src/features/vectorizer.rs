//! Bag-of-words and TF-IDF vectorizers
//!
//! Both vectorizers share one vocabulary-construction discipline:
//! 1. analyze each document into n-grams ([`Analyzer`])
//! 2. prune by document frequency (`min_df`, `max_df`), at fit time only
//! 3. keep the `max_features` most frequent terms
//! 4. assign column indices in alphabetical order
//!
//! Terms unseen at fit time are dropped by `transform`.

use super::sparse::SparseVector;
use super::stop_words::is_stop_word;
use crate::config::VectorizerConfig;
use reviewlens_core::text;
use reviewlens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Splits normalized text into the n-gram terms the vocabulary is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyzer {
    ngram_range: (usize, usize),
    stop_words: bool,
}

impl Analyzer {
    pub fn new(ngram_range: (usize, usize), stop_words: bool) -> Self {
        Self {
            ngram_range,
            stop_words,
        }
    }

    pub fn from_config(config: &VectorizerConfig) -> Self {
        Self::new(config.ngram_range, config.stop_words)
    }

    /// Single-character tokens never become terms
    pub fn tokens<'a>(&self, normalized: &'a str) -> Vec<&'a str> {
        text::tokens(normalized)
            .filter(|t| t.len() >= 2)
            .filter(|t| !(self.stop_words && is_stop_word(t)))
            .collect()
    }

    /// All n-grams of the document, in order of appearance
    pub fn analyze(&self, normalized: &str) -> Vec<String> {
        let tokens = self.tokens(normalized);
        let (low, high) = self.ngram_range;

        let mut terms = Vec::new();
        for n in low..=high {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }
}

/// Fitted term → column mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: BTreeMap<String, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from analyzed documents
    ///
    /// Returns the vocabulary and the document frequency of every kept term,
    /// indexed by column.
    pub fn fit(documents: &[Vec<String>], config: &VectorizerConfig) -> Result<(Self, Vec<usize>)> {
        let n_docs = documents.len();
        if n_docs == 0 {
            return Err(Error::feature_extraction("cannot fit a vocabulary on zero documents"));
        }

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        let mut term_frequency: HashMap<&str, usize> = HashMap::new();
        for doc in documents {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in doc {
                *term_frequency.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *document_frequency.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let max_doc_count = config.max_df * n_docs as f64;
        if max_doc_count < config.min_df as f64 {
            return Err(Error::feature_extraction(format!(
                "max_df corresponds to {max_doc_count:.1} documents, fewer than min_df ({})",
                config.min_df
            )));
        }

        let mut kept: Vec<(&str, usize)> = term_frequency
            .into_iter()
            .filter(|(term, _)| {
                let df = document_frequency.get(term).copied().unwrap_or(0);
                df >= config.min_df && df as f64 <= max_doc_count
            })
            .collect();

        if let Some(limit) = config.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            kept.truncate(limit);
        }

        if kept.is_empty() {
            return Err(Error::feature_extraction(
                "empty vocabulary after pruning; documents may only contain stop words",
            ));
        }

        let mut names: Vec<&str> = kept.into_iter().map(|(term, _)| term).collect();
        names.sort_unstable();

        let dfs = names
            .iter()
            .map(|term| document_frequency.get(term).copied().unwrap_or(0))
            .collect();
        let terms = names
            .into_iter()
            .enumerate()
            .map(|(index, term)| (term.to_string(), index))
            .collect();

        Ok((Self { terms }, dfs))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.terms.get(term).copied()
    }

    /// Terms in column order
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// Raw counts of in-vocabulary terms
    fn count(&self, terms: &[String]) -> SparseVector {
        let pairs = terms
            .iter()
            .filter_map(|term| self.index_of(term))
            .map(|index| (index, 1.0))
            .collect();
        SparseVector::from_pairs(self.len(), pairs)
    }
}

/// Bag-of-words term counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountVectorizer {
    analyzer: Analyzer,
    vocabulary: Vocabulary,
}

impl CountVectorizer {
    /// Fit the vocabulary on normalized training documents
    pub fn fit<S: AsRef<str>>(documents: &[S], config: &VectorizerConfig) -> Result<Self> {
        let analyzer = Analyzer::from_config(config);
        let analyzed: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| analyzer.analyze(doc.as_ref()))
            .collect();
        let (vocabulary, _) = Vocabulary::fit(&analyzed, config)?;

        Ok(Self {
            analyzer,
            vocabulary,
        })
    }

    pub fn transform(&self, normalized: &str) -> SparseVector {
        self.vocabulary.count(&self.analyzer.analyze(normalized))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }
}

/// TF-IDF weights with smoothed IDF and L2-normalized rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    analyzer: Analyzer,
    vocabulary: Vocabulary,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fit vocabulary and IDF on normalized training documents
    pub fn fit<S: AsRef<str>>(documents: &[S], config: &VectorizerConfig) -> Result<Self> {
        let analyzer = Analyzer::from_config(config);
        let analyzed: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| analyzer.analyze(doc.as_ref()))
            .collect();
        let (vocabulary, dfs) = Vocabulary::fit(&analyzed, config)?;

        let n = analyzed.len() as f64;
        let idf = dfs
            .into_iter()
            .map(|df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Ok(Self {
            analyzer,
            vocabulary,
            idf,
        })
    }

    pub fn transform(&self, normalized: &str) -> SparseVector {
        let counts = self.vocabulary.count(&self.analyzer.analyze(normalized));
        let weighted = counts
            .iter()
            .map(|(index, tf)| (index, tf * self.idf[index]))
            .collect();

        let mut vector = SparseVector::from_pairs(self.vocabulary.len(), weighted);
        vector.l2_normalize();
        vector
    }

    /// TF-IDF value of `term` inside an already transformed document
    pub fn weight_of(&self, document: &SparseVector, term: &str) -> f64 {
        self.vocabulary
            .index_of(term)
            .map(|index| document.get(index))
            .unwrap_or(0.0)
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary.index_of(term).map(|index| self.idf[index])
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VectorizerConfig {
        VectorizerConfig {
            max_features: None,
            ngram_range: (1, 2),
            min_df: 1,
            max_df: 1.0,
            stop_words: true,
        }
    }

    #[test]
    fn test_analyzer_drops_short_and_stop_words() {
        let analyzer = Analyzer::new((1, 2), true);
        assert_eq!(
            analyzer.analyze("i love this dress"),
            vec!["love", "dress", "love dress"]
        );

        let keep_all = Analyzer::new((1, 1), false);
        assert_eq!(keep_all.analyze("i love this dress"), vec!["love", "this", "dress"]);
    }

    #[test]
    fn test_vocabulary_is_alphabetical() {
        let docs = ["zebra print apron", "apron fits"];
        let vectorizer = CountVectorizer::fit(&docs, &VectorizerConfig {
            ngram_range: (1, 1),
            ..config()
        })
        .unwrap();

        let terms: Vec<&str> = vectorizer.vocabulary().terms().collect();
        assert_eq!(terms, vec!["apron", "fits", "print", "zebra"]);
        assert_eq!(vectorizer.vocabulary().index_of("apron"), Some(0));
    }

    #[test]
    fn test_counts_drop_unseen_terms() {
        let docs = ["soft fabric", "soft soft color"];
        let vectorizer = CountVectorizer::fit(&docs, &VectorizerConfig {
            ngram_range: (1, 1),
            ..config()
        })
        .unwrap();

        let vector = vectorizer.transform("soft soft velvet");
        let soft = vectorizer.vocabulary().index_of("soft").unwrap();
        assert_eq!(vector.get(soft), 2.0);
        assert_eq!(vector.nnz(), 1);

        assert!(vectorizer.transform("velvet lining").is_empty());
    }

    #[test]
    fn test_document_frequency_pruning() {
        let docs = ["dress fits", "dress runs small", "dress lovely", "shirt fits"];
        let vectorizer = CountVectorizer::fit(&docs, &VectorizerConfig {
            ngram_range: (1, 1),
            min_df: 2,
            max_df: 0.7,
            ..config()
        })
        .unwrap();

        // "dress" is in 3/4 documents (> 0.7), singletons fall under min_df
        let terms: Vec<&str> = vectorizer.vocabulary().terms().collect();
        assert_eq!(terms, vec!["fits"]);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let docs = ["great great great fit", "great fit color", "color"];
        let vectorizer = CountVectorizer::fit(&docs, &VectorizerConfig {
            ngram_range: (1, 1),
            max_features: Some(2),
            ..config()
        })
        .unwrap();

        let terms: Vec<&str> = vectorizer.vocabulary().terms().collect();
        // great=4, color=2, fit=2: tie broken alphabetically
        assert_eq!(terms, vec!["color", "great"]);
    }

    #[test]
    fn test_empty_vocabulary_is_an_error() {
        let docs = ["the and", "this is"];
        assert!(CountVectorizer::fit(&docs, &config()).is_err());
        let none: [&str; 0] = [];
        assert!(CountVectorizer::fit(&none, &config()).is_err());
    }

    #[test]
    fn test_tfidf_smoothed_idf_and_unit_rows() {
        let docs = ["soft fabric", "soft color", "soft lining"];
        let vectorizer = TfidfVectorizer::fit(&docs, &VectorizerConfig {
            ngram_range: (1, 1),
            ..config()
        })
        .unwrap();

        // df(soft) = 3 of 3 documents: ln(4/4) + 1
        assert!((vectorizer.idf("soft").unwrap() - 1.0).abs() < 1e-12);
        // df(fabric) = 1: ln(4/2) + 1
        assert!((vectorizer.idf("fabric").unwrap() - (2.0f64.ln() + 1.0)).abs() < 1e-12);

        let row = vectorizer.transform("soft fabric");
        assert!((row.squared_norm() - 1.0).abs() < 1e-12);
        assert!(vectorizer.weight_of(&row, "fabric") > vectorizer.weight_of(&row, "soft"));
        assert_eq!(vectorizer.weight_of(&row, "velvet"), 0.0);
    }
}
