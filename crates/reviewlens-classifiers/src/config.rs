//! Configuration for feature extraction, classifiers, and training

use reviewlens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete engine configuration, usually loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Vectorizer settings shared by the count and TF-IDF extractors
    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    /// Classifier A
    #[serde(default)]
    pub logistic: LogisticConfig,

    /// Classifier B
    #[serde(default)]
    pub forest: ForestConfig,

    /// Classifier C
    #[serde(default)]
    pub svm: SvmConfig,

    /// Split, seed, and evaluation settings
    #[serde(default)]
    pub training: TrainingConfig,

    /// Input and artifact locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.vectorizer.validate()?;

        if self.logistic.c <= 0.0 {
            return Err(Error::config("logistic.c must be positive"));
        }
        if self.forest.n_estimators == 0 {
            return Err(Error::config("forest.n_estimators must be at least 1"));
        }
        if self.forest.min_samples_split < 2 {
            return Err(Error::config("forest.min_samples_split must be at least 2"));
        }
        if self.forest.min_samples_leaf == 0 {
            return Err(Error::config("forest.min_samples_leaf must be at least 1"));
        }
        if self.svm.c <= 0.0 {
            return Err(Error::config("svm.c must be positive"));
        }
        if let Gamma::Value(gamma) = self.svm.gamma {
            if gamma <= 0.0 {
                return Err(Error::config("svm.gamma must be positive"));
            }
        }

        let fraction = self.training.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::config(format!(
                "training.test_fraction must be in (0, 1), got {fraction}"
            )));
        }
        if self.training.cross_validation_folds == 1 {
            return Err(Error::config(
                "training.cross_validation_folds must be 0 (disabled) or at least 2",
            ));
        }

        Ok(())
    }
}

/// Vocabulary construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Keep at most this many terms, ranked by corpus frequency
    #[serde(default = "default_max_features")]
    pub max_features: Option<usize>,

    /// Inclusive n-gram range
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),

    /// Drop terms present in fewer documents than this
    #[serde(default = "default_min_df")]
    pub min_df: usize,

    /// Drop terms present in more than this fraction of documents
    #[serde(default = "default_max_df")]
    pub max_df: f64,

    /// Remove English stop words before building n-grams
    #[serde(default = "default_true")]
    pub stop_words: bool,
}

impl VectorizerConfig {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.ngram_range;
        if low == 0 || low > high {
            return Err(Error::config(format!(
                "vectorizer.ngram_range must satisfy 1 <= min <= max, got ({low}, {high})"
            )));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(Error::config("vectorizer.max_df must be in (0, 1]"));
        }
        if self.max_features == Some(0) {
            return Err(Error::config("vectorizer.max_features must be positive"));
        }
        Ok(())
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            ngram_range: default_ngram_range(),
            min_df: default_min_df(),
            max_df: default_max_df(),
            stop_words: true,
        }
    }
}

/// Logistic regression (classifier A) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Inverse L2 regularization strength
    #[serde(default = "default_c")]
    pub c: f64,

    #[serde(default = "default_logistic_iter")]
    pub max_iter: usize,

    /// Stop once the gradient norm falls below this value
    #[serde(default = "default_logistic_tolerance")]
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: default_c(),
            max_iter: default_logistic_iter(),
            tolerance: default_logistic_tolerance(),
        }
    }
}

/// Random forest (classifier B) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// `None` grows trees until leaves are pure
    #[serde(default = "default_max_depth")]
    pub max_depth: Option<usize>,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// Features tried per split; `None` means `sqrt(n_features)`
    #[serde(default)]
    pub max_features: Option<usize>,

    /// Draw a bootstrap sample for every tree
    #[serde(default = "default_true")]
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            bootstrap: true,
        }
    }
}

/// RBF kernel width, written as `scale` or a positive number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GammaSetting", into = "GammaSetting")]
pub enum Gamma {
    /// `1 / (n_features * var(X))`
    Scale,
    Value(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GammaSetting {
    Value(f64),
    Named(String),
}

impl TryFrom<GammaSetting> for Gamma {
    type Error = String;

    fn try_from(setting: GammaSetting) -> std::result::Result<Self, Self::Error> {
        match setting {
            GammaSetting::Value(value) => Ok(Self::Value(value)),
            GammaSetting::Named(name) if name == "scale" => Ok(Self::Scale),
            GammaSetting::Named(name) => {
                Err(format!("unknown gamma {name:?}, expected \"scale\" or a number"))
            }
        }
    }
}

impl From<Gamma> for GammaSetting {
    fn from(gamma: Gamma) -> Self {
        match gamma {
            Gamma::Scale => Self::Named("scale".to_string()),
            Gamma::Value(value) => Self::Value(value),
        }
    }
}

impl Default for Gamma {
    fn default() -> Self {
        Self::Scale
    }
}

/// Kernel SVM (classifier C) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmConfig {
    /// Soft-margin penalty
    #[serde(default = "default_c")]
    pub c: f64,

    #[serde(default)]
    pub gamma: Gamma,

    /// Stopping tolerance of the dual solver
    #[serde(default = "default_svm_tolerance")]
    pub tolerance: f64,

    /// Folds for the out-of-fold Platt calibration; below 2 calibrates in-sample
    #[serde(default = "default_calibration_folds")]
    pub calibration_folds: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: default_c(),
            gamma: Gamma::Scale,
            tolerance: default_svm_tolerance(),
            calibration_folds: default_calibration_folds(),
        }
    }
}

/// Training pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Held-out fraction of the stratified split
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Seed for the split, bootstrap samples, and feature sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stratified k-fold cross-validation on the training split (0 disables)
    #[serde(default)]
    pub cross_validation_folds: usize,

    /// Reviews scored and logged after training
    #[serde(default = "default_probes")]
    pub probes: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            cross_validation_folds: 0,
            probes: default_probes(),
        }
    }
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Labeled CSV corpus
    #[serde(default = "default_corpus_path")]
    pub corpus: PathBuf,

    /// Word embedding source in text format
    #[serde(default = "default_embeddings_path")]
    pub embeddings: PathBuf,

    /// Directory holding versioned bundles
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Bundle version to load; latest when unset
    #[serde(default)]
    pub bundle_version: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus: default_corpus_path(),
            embeddings: default_embeddings_path(),
            artifacts_dir: default_artifacts_dir(),
            bundle_version: None,
        }
    }
}

fn default_max_features() -> Option<usize> {
    Some(5000)
}

fn default_ngram_range() -> (usize, usize) {
    (1, 2)
}

fn default_min_df() -> usize {
    2
}

fn default_max_df() -> f64 {
    0.95
}

fn default_true() -> bool {
    true
}

fn default_c() -> f64 {
    1.0
}

fn default_logistic_iter() -> usize {
    1000
}

fn default_logistic_tolerance() -> f64 {
    1e-5
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> Option<usize> {
    Some(10)
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_svm_tolerance() -> f64 {
    1e-3
}

fn default_calibration_folds() -> usize {
    5
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_probes() -> Vec<String> {
    vec![
        "terrible this is bad product".to_string(),
        "amazing great quality".to_string(),
        "okay decent product".to_string(),
        "awful waste of money".to_string(),
        "love it perfect".to_string(),
    ]
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("data/reviews.csv")
}

fn default_embeddings_path() -> PathBuf {
    PathBuf::from("data/embeddings.txt")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("models")
}
