//! ReviewLens CLI
//!
//! Trains the three-model recommendation ensemble and serves predictions from
//! persisted artifact bundles.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::TrainOptions;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);
    describe_metrics();

    let config = commands::load_config(&cli)?;
    let embeddings = cli.embeddings.as_deref();

    match &cli.command {
        Commands::Train {
            corpus,
            bundle_version,
            folds,
            seed,
            force,
        } => commands::train(
            config,
            TrainOptions {
                corpus: corpus.clone(),
                bundle_version: bundle_version.clone(),
                folds: *folds,
                seed: *seed,
                force: *force,
            },
        ),
        Commands::Predict {
            text,
            title,
            rating,
            bundle,
        } => commands::predict(&config, embeddings, bundle, text, title, *rating),
        Commands::Batch { input, bundle } => commands::batch(&config, embeddings, bundle, input),
        Commands::Info { bundle } => commands::info(&config, embeddings, bundle),
        Commands::Versions => commands::versions(&config),
        Commands::ShowConfig => commands::show_config(&config),
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("reviewlens=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reviewlens=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Register descriptions for the metrics recorded by the inference service
fn describe_metrics() {
    metrics::describe_counter!(
        "reviewlens_predictions_total",
        "Total number of predictions by outcome"
    );
    metrics::describe_histogram!(
        "reviewlens_prediction_latency_us",
        metrics::Unit::Microseconds,
        "Single prediction latency in microseconds"
    );
    metrics::describe_counter!(
        "reviewlens_bundle_loads_total",
        "Artifact bundle load attempts by result"
    );
    debug!("Metric descriptions registered");
}
