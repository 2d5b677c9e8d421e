//! Subcommand implementations

use crate::cli::{BundleArgs, Cli};
use anyhow::{Context, Result};
use reviewlens_classifiers::{BundleSelector, BundleStore, EngineConfig, InferenceService};
use reviewlens_training::TrainingPipeline;
use serde_json::json;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `train` overrides on top of the loaded configuration
#[derive(Debug, Default)]
pub struct TrainOptions {
    pub corpus: Option<PathBuf>,
    pub bundle_version: Option<String>,
    pub folds: Option<usize>,
    pub seed: Option<u64>,
    pub force: bool,
}

/// Read the YAML configuration and apply global CLI overrides
pub fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = if cli.config.exists() {
        let config = EngineConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?;
        info!("Configuration loaded from {}", cli.config.display());
        config
    } else {
        info!(
            "No configuration at {}, using built-in defaults",
            cli.config.display()
        );
        EngineConfig::default()
    };

    if let Some(artifacts) = &cli.artifacts {
        config.paths.artifacts_dir = artifacts.clone();
    }
    if let Some(embeddings) = &cli.embeddings {
        config.paths.embeddings = embeddings.clone();
    }
    Ok(config)
}

pub fn train(mut config: EngineConfig, options: TrainOptions) -> Result<()> {
    if let Some(corpus) = options.corpus {
        config.paths.corpus = corpus;
    }
    if let Some(folds) = options.folds {
        config.training.cross_validation_folds = folds;
    }
    if let Some(seed) = options.seed {
        config.training.seed = seed;
    }
    config.validate()?;

    let store = BundleStore::new(&config.paths.artifacts_dir);
    if !options.force {
        if let Some(latest) = store.latest()? {
            info!(
                "Bundle {} already exists in {}; pass --force to train another",
                latest,
                store.root().display()
            );
            return Ok(());
        }
    }

    let mut pipeline = TrainingPipeline::new(config).with_store(store);
    if let Some(version) = options.bundle_version {
        pipeline = pipeline.with_version(version);
    }
    let outcome = pipeline.run()?;

    print_json(&json!({
        "version": outcome.bundle.version(),
        "path": outcome.path,
        "summary": outcome.bundle.manifest().summary,
    }))
}

pub fn predict(
    config: &EngineConfig,
    embeddings: Option<&Path>,
    bundle: &BundleArgs,
    text: &str,
    title: &str,
    rating: Option<u8>,
) -> Result<()> {
    let service = load_service(config, embeddings, bundle)?;
    let result = service.predict_single(text, title, rating)?;
    print_json(&result.to_response())
}

/// One JSON object per input line, in input order
pub fn batch(
    config: &EngineConfig,
    embeddings: Option<&Path>,
    bundle: &BundleArgs,
    input: &Path,
) -> Result<()> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file =
            File::open(input).with_context(|| format!("opening {}", input.display()))?;
        Box::new(BufReader::new(file))
    };
    let texts = reader.lines().collect::<io::Result<Vec<String>>>()?;

    let service = load_service(config, embeddings, bundle)?;
    let results = service.predict_batch(&texts);

    let failures = results.iter().filter(|r| r.is_err()).count();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (index, result) in results.into_iter().enumerate() {
        let line = match result {
            Ok(result) => json!({ "index": index, "result": result.to_response() }),
            Err(e) => json!({ "index": index, "error": e.to_string() }),
        };
        writeln!(out, "{}", line)?;
    }
    out.flush()?;

    if failures > 0 {
        warn!("{} of {} reviews could not be scored", failures, texts.len());
    }
    Ok(())
}

pub fn info(config: &EngineConfig, embeddings: Option<&Path>, bundle: &BundleArgs) -> Result<()> {
    let service = load_service(config, embeddings, bundle)?;
    print_json(&service.model_info()?)
}

pub fn versions(config: &EngineConfig) -> Result<()> {
    let store = BundleStore::new(&config.paths.artifacts_dir);
    let latest = store.latest()?;
    for version in store.versions()? {
        if latest.as_deref() == Some(version.as_str()) {
            println!("{} (latest)", version);
        } else {
            println!("{}", version);
        }
    }
    Ok(())
}

pub fn show_config(config: &EngineConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn load_service(
    config: &EngineConfig,
    embeddings: Option<&Path>,
    bundle: &BundleArgs,
) -> Result<InferenceService> {
    let selector = BundleSelector::from_option(
        bundle
            .version
            .clone()
            .or_else(|| config.paths.bundle_version.clone()),
    );
    let mut service =
        InferenceService::new(BundleStore::new(&config.paths.artifacts_dir), selector);
    if let Some(path) = embeddings {
        service = service.with_embeddings_path(path);
    }
    service.try_load().context("models not loaded")?;
    Ok(service)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_when_config_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.yaml");
        let cli = Cli::try_parse_from([
            "reviewlens",
            "--config",
            missing.to_str().unwrap(),
            "--artifacts",
            "/tmp/bundles",
            "versions",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.paths.artifacts_dir, PathBuf::from("/tmp/bundles"));
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn test_reads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "training:\n  seed: 7\nforest:\n  n_estimators: 12\n").unwrap();
        let cli =
            Cli::try_parse_from(["reviewlens", "--config", path.to_str().unwrap(), "show-config"])
                .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.forest.n_estimators, 12);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "training:\n  test_fraction: 2.0\n").unwrap();
        let cli =
            Cli::try_parse_from(["reviewlens", "--config", path.to_str().unwrap(), "versions"])
                .unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_predict_without_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.paths.artifacts_dir = dir.path().to_path_buf();

        let err = predict(&config, None, &BundleArgs::default(), "great dress", "", None)
            .unwrap_err();
        assert!(err.to_string().contains("models not loaded"));
    }
}
