//! Versioned artifact bundles
//!
//! A bundle is everything inference needs, written by training as one
//! directory per version:
//!
//! ```text
//! <artifacts_dir>/<version>/
//!   manifest.json             version, creation time, checksums, summary
//!   count_vectorizer.json
//!   tfidf_vectorizer.json
//!   embedding_source.json     reference to the external vectors file
//!   embedding_scaler.json
//!   weighted_scaler.json
//!   classifier_logistic.json
//!   classifier_forest.json
//!   classifier_svm.json
//!   evaluation.json
//! ```
//!
//! Files are written into a staging directory that is renamed into place, so a
//! version directory is either complete or absent. Loading verifies every
//! checksum and fails with [`Error::ArtifactLoad`] on anything missing,
//! mismatched, or unparsable.

use crate::classifier::BinaryClassifier;
use crate::features::{
    CountVectorizer, EmbeddingSource, Extractors, FeatureSet, Featurizer, TfidfVectorizer,
    WordEmbeddings,
};
use crate::forest::RandomForest;
use crate::fusion::{fuse_outputs, ModelOutput};
use crate::logistic::LogisticRegression;
use crate::scaler::StandardScaler;
use crate::svm::KernelSvm;
use chrono::{DateTime, Utc};
use reviewlens_core::{Error, ModelKind, PredictionResult, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// On-disk layout revision
pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const COUNT_VECTORIZER_FILE: &str = "count_vectorizer.json";
pub const TFIDF_VECTORIZER_FILE: &str = "tfidf_vectorizer.json";
pub const EMBEDDING_SOURCE_FILE: &str = "embedding_source.json";
pub const EMBEDDING_SCALER_FILE: &str = "embedding_scaler.json";
pub const WEIGHTED_SCALER_FILE: &str = "weighted_scaler.json";
pub const LOGISTIC_FILE: &str = "classifier_logistic.json";
pub const FOREST_FILE: &str = "classifier_forest.json";
pub const SVM_FILE: &str = "classifier_svm.json";
pub const EVALUATION_FILE: &str = "evaluation.json";

/// Every file a bundle must contain besides the manifest
pub const REQUIRED_FILES: [&str; 9] = [
    COUNT_VECTORIZER_FILE,
    TFIDF_VECTORIZER_FILE,
    EMBEDDING_SOURCE_FILE,
    EMBEDDING_SCALER_FILE,
    WEIGHTED_SCALER_FILE,
    LOGISTIC_FILE,
    FOREST_FILE,
    SVM_FILE,
    EVALUATION_FILE,
];

/// Headline numbers from the training run that produced a bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub train_samples: usize,
    pub test_samples: usize,

    /// Held-out accuracy per ensemble member
    #[serde(default)]
    pub model_accuracy: BTreeMap<ModelKind, f64>,

    /// Held-out accuracy of the fused decision
    #[serde(default)]
    pub ensemble_accuracy: Option<f64>,
}

/// Bundle metadata and integrity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub version: String,
    pub created_at: DateTime<Utc>,

    /// File name → SHA-256 (hex)
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    #[serde(default)]
    pub summary: EvaluationSummary,
}

/// Everything needed to serve predictions, immutable once built
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    manifest: BundleManifest,
    featurizer: Featurizer,
    logistic: LogisticRegression,
    forest: RandomForest,
    svm: KernelSvm,
    evaluation: serde_json::Value,
}

impl ArtifactBundle {
    /// Assemble a freshly trained bundle; checksums are filled in on persist
    pub fn new(
        version: impl Into<String>,
        featurizer: Featurizer,
        logistic: LogisticRegression,
        forest: RandomForest,
        svm: KernelSvm,
        summary: EvaluationSummary,
        evaluation: serde_json::Value,
    ) -> Result<Self> {
        let manifest = BundleManifest {
            format_version: FORMAT_VERSION,
            version: version.into(),
            created_at: Utc::now(),
            files: BTreeMap::new(),
            summary,
        };
        let bundle = Self {
            manifest,
            featurizer,
            logistic,
            forest,
            svm,
            evaluation,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Attach the evaluation of the run that produced this bundle
    pub fn with_evaluation(
        mut self,
        summary: EvaluationSummary,
        evaluation: serde_json::Value,
    ) -> Self {
        self.manifest.summary = summary;
        self.evaluation = evaluation;
        self
    }

    /// Check that every model matches the dimensions of its features
    pub fn validate(&self) -> Result<()> {
        let counts = self.featurizer.extractors().count.n_features();
        if self.logistic.n_features() != counts {
            return Err(Error::feature_extraction(format!(
                "logistic model expects {} features, count vectorizer produces {}",
                self.logistic.n_features(),
                counts
            )));
        }

        let dim = self.featurizer.extractors().embedding_dimension();
        if self.forest.n_features() != dim {
            return Err(Error::feature_extraction(format!(
                "forest expects {} features, embeddings have {}",
                self.forest.n_features(),
                dim
            )));
        }
        if self.svm.n_features() != dim {
            return Err(Error::feature_extraction(format!(
                "svm expects {} features, embeddings have {}",
                self.svm.n_features(),
                dim
            )));
        }
        Ok(())
    }

    /// Featurize normalized text and fuse the three votes
    pub fn predict(&self, normalized: &str) -> Result<PredictionResult> {
        let features = self.featurizer.featurize(normalized)?;
        Ok(fuse_outputs(self.votes(&features)))
    }

    /// Individual member outputs for already featurized text
    pub fn votes(&self, features: &FeatureSet) -> [ModelOutput; 3] {
        [
            ModelOutput::new(ModelKind::LogisticRegression, self.logistic.vote(&features.counts)),
            ModelOutput::new(ModelKind::RandomForest, self.forest.vote(&features.embedding)),
            ModelOutput::new(ModelKind::Svm, self.svm.vote(&features.weighted)),
        ]
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn featurizer(&self) -> &Featurizer {
        &self.featurizer
    }

    pub fn embedding_source(&self) -> &EmbeddingSource {
        self.featurizer.extractors().embeddings.source()
    }

    pub fn logistic(&self) -> &LogisticRegression {
        &self.logistic
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn svm(&self) -> &KernelSvm {
        &self.svm
    }

    /// Full evaluation report written at training time
    pub fn evaluation(&self) -> &serde_json::Value {
        &self.evaluation
    }
}

/// Directory of versioned bundles
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Timestamped version name not yet used in this store
    pub fn next_version(&self) -> String {
        let base = Utc::now().format("v%Y%m%d%H%M%S").to_string();
        if !self.bundle_dir(&base).exists() {
            return base;
        }
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.bundle_dir(candidate).exists())
            .unwrap_or(base)
    }

    /// Versions present in the store, oldest name first
    pub fn versions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().join(MANIFEST_FILE).is_file() {
                continue;
            }
            versions.push(name);
        }
        versions.sort();
        Ok(versions)
    }

    /// Most recently created version, by manifest timestamp
    pub fn latest(&self) -> Result<Option<String>> {
        let mut newest: Option<(DateTime<Utc>, String)> = None;
        for version in self.versions()? {
            let manifest = match self.read_manifest(&version) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("Skipping bundle {}: {}", version, e);
                    continue;
                }
            };
            let candidate = (manifest.created_at, version);
            if newest.as_ref().map_or(true, |current| candidate > *current) {
                newest = Some(candidate);
            }
        }
        Ok(newest.map(|(_, version)| version))
    }

    pub fn read_manifest(&self, version: &str) -> Result<BundleManifest> {
        let path = self.bundle_dir(version).join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            Error::artifact_load(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::artifact_load(format!("invalid manifest {}: {}", path.display(), e)))
    }

    /// Atomically write `bundle` as a new version directory
    ///
    /// On success the bundle's manifest carries the recorded checksums.
    pub fn persist(&self, bundle: &mut ArtifactBundle) -> Result<PathBuf> {
        let target = self.bundle_dir(&bundle.manifest.version);
        if target.exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("bundle {} already exists", target.display()),
            )));
        }

        fs::create_dir_all(&self.root)?;
        let staging = self.root.join(format!(".staging-{}", uuid::Uuid::new_v4()));
        fs::create_dir(&staging)?;

        let written = write_bundle_files(&staging, bundle)
            .and_then(|manifest| {
                fs::rename(&staging, &target)?;
                Ok(manifest)
            });

        match written {
            Ok(manifest) => {
                info!(
                    "Persisted bundle {} to {}",
                    manifest.version,
                    target.display()
                );
                bundle.manifest = manifest;
                Ok(target)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!("Failed to remove staging directory {}: {}", staging.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    /// Load and verify a version, reading embeddings from the recorded path
    pub fn load(&self, version: &str) -> Result<ArtifactBundle> {
        self.load_with_embeddings(version, None)
    }

    /// Load and verify a version, optionally reading embeddings elsewhere
    ///
    /// The embeddings file must match the checksum recorded in the bundle.
    pub fn load_with_embeddings(
        &self,
        version: &str,
        embeddings_path: Option<&Path>,
    ) -> Result<ArtifactBundle> {
        let dir = self.bundle_dir(version);
        let manifest = self.read_manifest(version)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::artifact_load(format!(
                "bundle {} has format version {}, expected {}",
                version, manifest.format_version, FORMAT_VERSION
            )));
        }

        let verified = VerifiedFiles {
            dir: &dir,
            manifest: &manifest,
        };
        let count: CountVectorizer = verified.parse(COUNT_VECTORIZER_FILE)?;
        let tfidf: TfidfVectorizer = verified.parse(TFIDF_VECTORIZER_FILE)?;
        let source: EmbeddingSource = verified.parse(EMBEDDING_SOURCE_FILE)?;
        let embedding_scaler: StandardScaler = verified.parse(EMBEDDING_SCALER_FILE)?;
        let weighted_scaler: StandardScaler = verified.parse(WEIGHTED_SCALER_FILE)?;
        let logistic: LogisticRegression = verified.parse(LOGISTIC_FILE)?;
        let forest: RandomForest = verified.parse(FOREST_FILE)?;
        let svm: KernelSvm = verified.parse(SVM_FILE)?;
        let evaluation: serde_json::Value = verified.parse(EVALUATION_FILE)?;

        let path = embeddings_path.unwrap_or(source.path.as_path());
        let embeddings = WordEmbeddings::from_source(&source, path)
            .map_err(|e| Error::artifact_load(format!("embedding source: {e}")))?;

        let extractors = Extractors {
            count,
            tfidf,
            embeddings: Arc::new(embeddings),
        };
        let featurizer = Featurizer::new(extractors, embedding_scaler, weighted_scaler)
            .map_err(|e| Error::artifact_load(e.to_string()))?;

        let bundle = ArtifactBundle {
            manifest,
            featurizer,
            logistic,
            forest,
            svm,
            evaluation,
        };
        bundle
            .validate()
            .map_err(|e| Error::artifact_load(e.to_string()))?;

        info!("Loaded bundle {} from {}", version, dir.display());
        Ok(bundle)
    }
}

fn write_bundle_files(dir: &Path, bundle: &ArtifactBundle) -> Result<BundleManifest> {
    let extractors = bundle.featurizer.extractors();
    let mut files = BTreeMap::new();

    let mut write = |name: &str, bytes: Vec<u8>| -> Result<()> {
        fs::write(dir.join(name), &bytes)?;
        debug!("Wrote {} ({} bytes)", name, bytes.len());
        files.insert(name.to_string(), sha256_hex(&bytes));
        Ok(())
    };

    write(COUNT_VECTORIZER_FILE, serde_json::to_vec(&extractors.count)?)?;
    write(TFIDF_VECTORIZER_FILE, serde_json::to_vec(&extractors.tfidf)?)?;
    write(EMBEDDING_SOURCE_FILE, serde_json::to_vec_pretty(extractors.embeddings.source())?)?;
    write(EMBEDDING_SCALER_FILE, serde_json::to_vec(bundle.featurizer.embedding_scaler())?)?;
    write(WEIGHTED_SCALER_FILE, serde_json::to_vec(bundle.featurizer.weighted_scaler())?)?;
    write(LOGISTIC_FILE, serde_json::to_vec(&bundle.logistic)?)?;
    write(FOREST_FILE, serde_json::to_vec(&bundle.forest)?)?;
    write(SVM_FILE, serde_json::to_vec(&bundle.svm)?)?;
    write(EVALUATION_FILE, serde_json::to_vec_pretty(&bundle.evaluation)?)?;

    let manifest = BundleManifest {
        files,
        ..bundle.manifest.clone()
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(manifest)
}

struct VerifiedFiles<'a> {
    dir: &'a Path,
    manifest: &'a BundleManifest,
}

impl VerifiedFiles<'_> {
    /// Read a bundle file, check its recorded checksum, and parse it
    fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let expected = self.manifest.files.get(name).ok_or_else(|| {
            Error::artifact_load(format!("manifest has no checksum for {name}"))
        })?;
        let bytes = fs::read(&path).map_err(|e| {
            Error::artifact_load(format!("cannot read {}: {}", path.display(), e))
        })?;

        let actual = sha256_hex(&bytes);
        if &actual != expected {
            return Err(Error::artifact_load(format!(
                "checksum mismatch for {name}: expected {expected}, found {actual}"
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::artifact_load(format!("cannot parse {name}: {e}")))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
