//! Training pipeline
//!
//! Runs the stages of [`TrainingStage`] in order: load the corpus, normalize,
//! split, fit extractors and scalers on the training partition only, fit the
//! three classifiers, evaluate on the held-out partition, and persist the
//! resulting [`ArtifactBundle`]. Any failure is reported as
//! [`Error::Training`] tagged with the stage that was running, and nothing
//! is written unless every earlier stage succeeded.

use crate::corpus::{class_distribution, Corpus};
use crate::evaluation::{
    accuracy, ClassificationReport, CrossValidation, EvaluationReport, ModelEvaluation,
};
use crate::split::{stratified_k_fold, stratified_split};
use ndarray::Array2;
use rayon::prelude::*;
use reviewlens_classifiers::features::{stack_rows, SparseVector, WeightSource};
use reviewlens_classifiers::{
    fuse, ArtifactBundle, BinaryClassifier, BundleStore, EngineConfig, EvaluationSummary,
    Extractors, FeatureSet, Featurizer, KernelSvm, LogisticRegression, ModelOutput,
    RandomForest, RawFeatures, WordEmbeddings,
};
use reviewlens_core::text::normalize_str;
use reviewlens_core::{Error, ModelKind, Recommendation, Result, TrainingStage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a successful run
#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ArtifactBundle,
    pub path: PathBuf,
    pub report: EvaluationReport,
}

/// Stateful training run
pub struct TrainingPipeline {
    config: EngineConfig,
    store: BundleStore,
    embeddings: Option<Arc<WordEmbeddings>>,
    version: Option<String>,
    stage: TrainingStage,
}

impl TrainingPipeline {
    /// Pipeline writing into `config.paths.artifacts_dir`
    pub fn new(config: EngineConfig) -> Self {
        let store = BundleStore::new(config.paths.artifacts_dir.clone());
        Self {
            config,
            store,
            embeddings: None,
            version: None,
            stage: TrainingStage::Idle,
        }
    }

    /// Use already loaded embeddings instead of reading `config.paths.embeddings`
    pub fn with_embeddings(mut self, embeddings: Arc<WordEmbeddings>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Persist under a fixed version instead of a timestamped one
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_store(mut self, store: BundleStore) -> Self {
        self.store = store;
        self
    }

    /// Stage reached so far; the failing stage after an error
    pub fn stage(&self) -> TrainingStage {
        self.stage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &BundleStore {
        &self.store
    }

    /// Run every stage, reading the corpus from `config.paths.corpus`
    pub fn run(&mut self) -> Result<TrainingOutcome> {
        self.config.validate()?;
        self.advance();
        let corpus = self.at(Corpus::from_path(&self.config.paths.corpus))?;
        self.train(corpus)
    }

    /// Run every stage on a corpus loaded by the caller
    pub fn run_on(&mut self, corpus: Corpus) -> Result<TrainingOutcome> {
        self.config.validate()?;
        self.advance();
        if corpus.is_empty() {
            return Err(self.fail(Error::corpus("corpus has no labeled reviews")));
        }
        self.train(corpus)
    }

    fn train(&mut self, corpus: Corpus) -> Result<TrainingOutcome> {
        let started = Instant::now();

        self.advance();
        let (documents, labels) = preprocess(&corpus);
        let emptied = corpus.len() - documents.len();
        if emptied > 0 {
            info!("Dropped {} reviews that normalized to empty text", emptied);
        }
        if documents.is_empty() {
            return Err(self.fail(Error::corpus("no reviews left after preprocessing")));
        }
        let (negatives, positives) = class_distribution(&labels);
        let n = labels.len() as f64;
        info!(
            "Class distribution: {} not recommended ({:.1}%), {} recommended ({:.1}%)",
            negatives,
            100.0 * negatives as f64 / n,
            positives,
            100.0 * positives as f64 / n
        );

        self.advance();
        let training = &self.config.training;
        let split = self.at(stratified_split(&labels, training.test_fraction, training.seed))?;
        let train_docs: Vec<&str> = split.train.iter().map(|&i| documents[i].as_str()).collect();
        let train_labels: Vec<Recommendation> = split.train.iter().map(|&i| labels[i]).collect();
        let test_docs: Vec<&str> = split.test.iter().map(|&i| documents[i].as_str()).collect();
        let test_labels: Vec<Recommendation> = split.test.iter().map(|&i| labels[i]).collect();
        info!(
            "Training set: {} reviews, test set: {} reviews",
            train_docs.len(),
            test_docs.len()
        );

        self.advance();
        let embeddings = self.at(self.load_embeddings())?;
        let extractors =
            self.at(Extractors::fit(&train_docs, embeddings, &self.config.vectorizer))?;
        let raw_train = extractors.extract_all(&train_docs);
        let raw_test = extractors.extract_all(&test_docs);
        let fallbacks = raw_train
            .iter()
            .filter(|r| r.weighted.source == WeightSource::DocumentFallback)
            .count();
        debug!(
            "{} of {} training reviews fell back to the unweighted embedding",
            fallbacks,
            raw_train.len()
        );

        self.advance();
        let featurizer = self.at(Featurizer::fit(extractors, &raw_train))?;
        let train_features = self.at(scale_all(&featurizer, raw_train))?;
        let test_features = self.at(scale_all(&featurizer, raw_test))?;
        let dim = featurizer.extractors().embedding_dimension();

        self.advance();
        let all: Vec<usize> = (0..train_features.len()).collect();
        let inputs = self.at(ModelInputs::gather(&train_features, &train_labels, &all, dim))?;
        let models = self.at(fit_models(&inputs, &self.config))?;
        for (kind, seconds) in ModelKind::ALL.iter().zip(models.fit_seconds) {
            info!(
                "Trained {} on {} in {:.2}s",
                kind.display_name(),
                kind.feature_name(),
                seconds
            );
        }
        drop(inputs);

        self.advance();
        let cross_validation = if self.config.training.cross_validation_folds > 0 {
            Some(self.at(cross_validate(&train_features, &train_labels, dim, &self.config))?)
        } else {
            None
        };

        let version = self
            .version
            .clone()
            .unwrap_or_else(|| self.store.next_version());
        let FittedModels {
            logistic,
            forest,
            svm,
            fit_seconds,
        } = models;
        let bundle = self.at(ArtifactBundle::new(
            version,
            featurizer,
            logistic,
            forest,
            svm,
            EvaluationSummary::default(),
            serde_json::Value::Null,
        ))?;

        let outputs: Vec<[ModelOutput; 3]> =
            test_features.par_iter().map(|f| bundle.votes(f)).collect();

        let mut members = Vec::with_capacity(ModelKind::ALL.len());
        for (k, kind) in ModelKind::ALL.into_iter().enumerate() {
            let predicted: Vec<Recommendation> =
                outputs.iter().map(|o| o[k].vote.prediction).collect();
            let test = ClassificationReport::from_predictions(&test_labels, &predicted);
            info!(
                "{} held-out accuracy: {:.4}\n{}",
                kind.display_name(),
                test.accuracy,
                test
            );
            let cv = cross_validation.as_ref().map(|cv| cv[k].clone());
            if let Some(cv) = &cv {
                info!(
                    "{} cross-validation accuracy: {:.4} (+/- {:.4})",
                    kind.display_name(),
                    cv.mean,
                    2.0 * cv.std
                );
            }
            members.push(ModelEvaluation {
                model: kind,
                name: kind.display_name().to_string(),
                features: kind.feature_name().to_string(),
                fit_seconds: fit_seconds[k],
                test,
                cross_validation: cv,
            });
        }

        let fused: Vec<Recommendation> = outputs.iter().map(|o| fuse(o).prediction).collect();
        let ensemble = ClassificationReport::from_predictions(&test_labels, &fused);
        info!("Ensemble held-out accuracy: {:.4}", ensemble.accuracy);

        let report = EvaluationReport {
            train_samples: train_labels.len(),
            test_samples: test_labels.len(),
            class_distribution: (negatives, positives),
            models: members,
            ensemble,
        };
        let evaluation = self.at(serde_json::to_value(&report).map_err(Error::from))?;
        let mut bundle = bundle.with_evaluation(report.summary(), evaluation);
        self.log_probes(&bundle);

        self.advance();
        let path = self.at(self.store.persist(&mut bundle))?;

        self.advance();
        info!(
            "Training complete in {:.1}s: bundle {} written to {}",
            started.elapsed().as_secs_f64(),
            bundle.version(),
            path.display()
        );

        Ok(TrainingOutcome {
            bundle,
            path,
            report,
        })
    }

    fn advance(&mut self) {
        self.stage = self.stage.next();
        debug!("Training stage: {}", self.stage);
    }

    /// Tag an error with the running stage
    fn fail(&self, error: Error) -> Error {
        match error {
            Error::Training { .. } => error,
            other => {
                warn!("Training failed during {}: {}", self.stage, other);
                Error::training(self.stage, other.to_string())
            }
        }
    }

    fn at<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    fn load_embeddings(&self) -> Result<Arc<WordEmbeddings>> {
        match &self.embeddings {
            Some(embeddings) => Ok(Arc::clone(embeddings)),
            None => WordEmbeddings::from_file(&self.config.paths.embeddings).map(Arc::new),
        }
    }

    /// Score the configured probe reviews with the finished bundle
    fn log_probes(&self, bundle: &ArtifactBundle) {
        for probe in &self.config.training.probes {
            let normalized = normalize_str(probe);
            if normalized.is_empty() {
                warn!("Probe {:?} is empty after normalization, skipped", probe);
                continue;
            }
            match bundle.predict(&normalized) {
                Ok(result) => {
                    let members: Vec<String> = result
                        .per_model
                        .iter()
                        .map(|(kind, vote)| format!("{}={:.4}", kind, vote.confidence))
                        .collect();
                    info!(
                        "Probe {:?}: {} (confidence {:.4}, consensus {}) [{}]",
                        probe,
                        result.ensemble_label(),
                        result.ensemble_confidence,
                        result.consensus,
                        members.join(", ")
                    );
                }
                Err(e) => warn!("Probe {:?} failed: {}", probe, e),
            }
        }
    }
}

/// Normalized non-empty documents with their labels, in corpus order
fn preprocess(corpus: &Corpus) -> (Vec<String>, Vec<Recommendation>) {
    let kept: Vec<(String, Recommendation)> = corpus
        .reviews()
        .par_iter()
        .filter_map(|review| {
            let label = review.label?;
            let text = review.normalized();
            (!text.is_empty()).then_some((text, label))
        })
        .collect();
    kept.into_iter().unzip()
}

fn scale_all(featurizer: &Featurizer, raw: Vec<RawFeatures>) -> Result<Vec<FeatureSet>> {
    raw.into_iter().map(|r| featurizer.scale(r)).collect()
}

/// Training matrices for the three classifiers
struct ModelInputs {
    counts: Vec<SparseVector>,
    embedding: Array2<f64>,
    weighted: Array2<f64>,
    labels: Vec<Recommendation>,
}

impl ModelInputs {
    fn gather(
        features: &[FeatureSet],
        labels: &[Recommendation],
        indices: &[usize],
        dim: usize,
    ) -> Result<Self> {
        let rows = || indices.iter().map(|&i| &features[i]);
        Ok(Self {
            counts: rows().map(|f| f.counts.clone()).collect(),
            embedding: stack_rows(rows().map(|f| &f.embedding), dim)?,
            weighted: stack_rows(rows().map(|f| &f.weighted), dim)?,
            labels: indices.iter().map(|&i| labels[i]).collect(),
        })
    }
}

struct FittedModels {
    logistic: LogisticRegression,
    forest: RandomForest,
    svm: KernelSvm,
    /// Wall time per model, in `ModelKind::ALL` order
    fit_seconds: [f64; 3],
}

fn fit_models(inputs: &ModelInputs, config: &EngineConfig) -> Result<FittedModels> {
    let timer = Instant::now();
    let logistic = LogisticRegression::fit(&inputs.counts, &inputs.labels, &config.logistic)?;
    let logistic_seconds = timer.elapsed().as_secs_f64();

    let timer = Instant::now();
    let forest = RandomForest::fit(
        &inputs.embedding,
        &inputs.labels,
        &config.forest,
        config.training.seed,
    )?;
    let forest_seconds = timer.elapsed().as_secs_f64();

    let timer = Instant::now();
    let svm = KernelSvm::fit(&inputs.weighted, &inputs.labels, &config.svm)?;
    let svm_seconds = timer.elapsed().as_secs_f64();

    Ok(FittedModels {
        logistic,
        forest,
        svm,
        fit_seconds: [logistic_seconds, forest_seconds, svm_seconds],
    })
}

/// Member decisions for the selected rows, in `ModelKind::ALL` order
fn predict_members(
    models: &FittedModels,
    features: &[FeatureSet],
    indices: &[usize],
) -> [Vec<Recommendation>; 3] {
    let rows = || indices.iter().map(|&i| &features[i]);
    [
        rows().map(|f| models.logistic.predict(&f.counts)).collect(),
        rows().map(|f| models.forest.predict(&f.embedding)).collect(),
        rows().map(|f| models.svm.predict(&f.weighted)).collect(),
    ]
}

/// Stratified k-fold accuracy of each member on the training partition
///
/// Extractors and scalers stay as fitted on the full training partition;
/// only the classifiers are refitted per fold.
fn cross_validate(
    features: &[FeatureSet],
    labels: &[Recommendation],
    dim: usize,
    config: &EngineConfig,
) -> Result<[CrossValidation; 3]> {
    let folds = stratified_k_fold(
        labels,
        config.training.cross_validation_folds,
        config.training.seed,
    )?;

    let mut scores: [Vec<f64>; 3] = Default::default();
    for (i, fold) in folds.iter().enumerate() {
        let inputs = ModelInputs::gather(features, labels, &fold.train, dim)?;
        let models = fit_models(&inputs, config)?;
        let truth: Vec<Recommendation> = fold.test.iter().map(|&j| labels[j]).collect();
        for (k, predicted) in predict_members(&models, features, &fold.test)
            .iter()
            .enumerate()
        {
            scores[k].push(accuracy(&truth, predicted));
        }
        debug!("Cross-validation fold {}/{} done", i + 1, folds.len());
    }

    Ok(scores.map(CrossValidation::from_scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewlens_core::RawReview;

    fn tiny_embeddings() -> Arc<WordEmbeddings> {
        Arc::new(
            WordEmbeddings::from_pairs(
                vec![
                    ("good", vec![1.0, 0.1]),
                    ("great", vec![0.9, 0.0]),
                    ("bad", vec![-1.0, 0.1]),
                    ("awful", vec![-0.9, 0.0]),
                    ("dress", vec![0.0, 1.0]),
                ],
                "tiny",
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_preprocess_drops_empty_and_keeps_order() {
        let corpus = Corpus::from_reviews(vec![
            RawReview::new("Good dress").with_label(Recommendation::Recommended),
            RawReview::new("!!! 42").with_label(Recommendation::Recommended),
            RawReview::new("Awful").with_title("Bad").with_label(Recommendation::NotRecommended),
        ]);
        let (documents, labels) = preprocess(&corpus);
        assert_eq!(documents, vec!["good dress", "bad awful"]);
        assert_eq!(
            labels,
            vec![Recommendation::Recommended, Recommendation::NotRecommended]
        );
    }

    #[test]
    fn test_empty_corpus_fails_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.paths.artifacts_dir = dir.path().join("models");

        let mut pipeline = TrainingPipeline::new(config).with_embeddings(tiny_embeddings());
        let err = pipeline.run_on(Corpus::default()).unwrap_err();

        assert!(matches!(
            err,
            Error::Training {
                stage: TrainingStage::LoadingCorpus,
                ..
            }
        ));
        assert_eq!(pipeline.stage(), TrainingStage::LoadingCorpus);
        assert!(!dir.path().join("models").exists());
    }

    #[test]
    fn test_errors_are_tagged_once() {
        let pipeline = TrainingPipeline::new(EngineConfig::default());
        let inner = Error::training(TrainingStage::Splitting, "boom");
        match pipeline.fail(inner) {
            Error::Training { stage, message } => {
                assert_eq!(stage, TrainingStage::Splitting);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
