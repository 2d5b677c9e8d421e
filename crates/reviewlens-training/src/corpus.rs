//! Labeled review corpus loaded from CSV
//!
//! Expected headers (extra columns are ignored):
//! `Clothing ID, Title, Review Text, Rating, Positive Feedback Count, Age, Recommended IND`.
//! Rows without review text or without a 0/1 label are excluded and counted.

use reviewlens_core::{Error, RawReview, Recommendation, Result};
use serde::Deserialize;
use std::io;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(rename = "Clothing ID", default, deserialize_with = "csv::invalid_option")]
    #[allow(dead_code)]
    clothing_id: Option<u64>,

    #[serde(rename = "Title", default)]
    title: Option<String>,

    #[serde(rename = "Review Text", default)]
    review_text: Option<String>,

    #[serde(rename = "Rating", default, deserialize_with = "csv::invalid_option")]
    rating: Option<u8>,

    #[serde(
        rename = "Positive Feedback Count",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    #[allow(dead_code)]
    positive_feedback_count: Option<u32>,

    #[serde(rename = "Age", default, deserialize_with = "csv::invalid_option")]
    #[allow(dead_code)]
    age: Option<u32>,

    #[serde(rename = "Recommended IND", default, deserialize_with = "csv::invalid_option")]
    recommended: Option<u8>,
}

/// Row accounting from a corpus load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub total_rows: usize,
    pub missing_text: usize,
    pub missing_label: usize,
    pub invalid_label: usize,
}

impl CorpusStats {
    pub fn dropped(&self) -> usize {
        self.missing_text + self.missing_label + self.invalid_label
    }
}

/// Labeled reviews ready for preprocessing
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    reviews: Vec<RawReview>,
    stats: CorpusStats,
}

impl Corpus {
    /// Load a CSV file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::corpus(format!("cannot open {}: {}", path.display(), e))
        })?;
        let corpus = Self::from_reader(file)?;
        info!(
            "Loaded {} labeled reviews from {}",
            corpus.len(),
            path.display()
        );
        Ok(corpus)
    }

    /// Parse CSV from any reader
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let mut reviews = Vec::new();
        let mut stats = CorpusStats::default();

        for (line, row) in csv_reader.deserialize::<CorpusRow>().enumerate() {
            let row = row.map_err(|e| Error::corpus(format!("row {}: {}", line + 1, e)))?;
            stats.total_rows += 1;

            let text = match row.review_text {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    stats.missing_text += 1;
                    continue;
                }
            };
            let label = match row.recommended {
                None => {
                    stats.missing_label += 1;
                    continue;
                }
                Some(value) => match Recommendation::try_from(value) {
                    Ok(label) => label,
                    Err(_) => {
                        stats.invalid_label += 1;
                        continue;
                    }
                },
            };

            reviews.push(RawReview {
                text,
                title: row.title.unwrap_or_default(),
                rating: row.rating.filter(|r| (1..=5).contains(r)),
                label: Some(label),
            });
        }

        info!(
            "Corpus rows: {} total, missing review text: {}, missing label: {}",
            stats.total_rows, stats.missing_text, stats.missing_label
        );
        if stats.invalid_label > 0 {
            warn!("Dropped {} rows with a label other than 0/1", stats.invalid_label);
        }

        Ok(Self { reviews, stats })
    }

    /// Wrap reviews built in memory; unlabeled reviews are dropped
    pub fn from_reviews(reviews: Vec<RawReview>) -> Self {
        let total_rows = reviews.len();
        let reviews: Vec<RawReview> = reviews.into_iter().filter(|r| r.label.is_some()).collect();
        let stats = CorpusStats {
            total_rows,
            missing_label: total_rows - reviews.len(),
            ..CorpusStats::default()
        };
        Self { reviews, stats }
    }

    pub fn reviews(&self) -> &[RawReview] {
        &self.reviews
    }

    pub fn stats(&self) -> CorpusStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

/// `(not recommended, recommended)` counts
pub fn class_distribution(labels: &[Recommendation]) -> (usize, usize) {
    let positives = labels.iter().filter(|l| l.is_recommended()).count();
    (labels.len() - positives, positives)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
,Clothing ID,Age,Title,Review Text,Rating,Recommended IND,Positive Feedback Count
0,767,33,,Absolutely wonderful - silky and sexy,4,1,0
1,1080,34,Some major design flaws,\"Runs small, the zipper broke\",3,0,2
2,1077,60,Love it,,5,1,1
3,1049,50,Meh,Fabric pilled after one wash,2,,0
4,847,47,Flattering,Looks great,5,7,6
5,1080,49,Not for me,Too tight,n/a,0,x
";

    #[test]
    fn test_parses_and_counts_dropped_rows() {
        let corpus = Corpus::from_reader(CSV.as_bytes()).unwrap();
        let stats = corpus.stats();

        assert_eq!(stats.total_rows, 6);
        assert_eq!(stats.missing_text, 1);
        assert_eq!(stats.missing_label, 1);
        assert_eq!(stats.invalid_label, 1);
        assert_eq!(stats.dropped(), 3);
        assert_eq!(corpus.len(), 3);

        let first = &corpus.reviews()[0];
        assert_eq!(first.title, "");
        assert_eq!(first.rating, Some(4));
        assert_eq!(first.label, Some(Recommendation::Recommended));

        let second = &corpus.reviews()[1];
        assert_eq!(second.text, "Runs small, the zipper broke");
        assert_eq!(second.label, Some(Recommendation::NotRecommended));

        // unparsable rating is treated as missing
        assert_eq!(corpus.reviews()[2].rating, None);
    }

    #[test]
    fn test_missing_file_is_corpus_error() {
        let err = Corpus::from_path("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, Error::Corpus(_)));
    }

    #[test]
    fn test_from_reviews_drops_unlabeled() {
        let corpus = Corpus::from_reviews(vec![
            RawReview::new("great").with_label(Recommendation::Recommended),
            RawReview::new("no label"),
        ]);
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.stats().missing_label, 1);
    }

    #[test]
    fn test_class_distribution() {
        use Recommendation::{NotRecommended as N, Recommended as R};
        assert_eq!(class_distribution(&[R, N, R, R]), (1, 3));
    }
}
