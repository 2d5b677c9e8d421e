use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reviewlens")]
#[command(author, version, about = "Product review recommendation ensemble")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path; built-in defaults when absent
    #[arg(short, long, env = "REVIEWLENS_CONFIG", default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// Directory holding versioned bundles
    #[arg(short, long, env = "REVIEWLENS_ARTIFACTS", global = true)]
    pub artifacts: Option<PathBuf>,

    /// Word embedding file; overrides the path recorded in the bundle
    #[arg(short, long, env = "REVIEWLENS_EMBEDDINGS", global = true)]
    pub embeddings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the ensemble and persist a new bundle
    Train {
        /// Labeled CSV corpus
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Bundle version name (timestamped when omitted)
        #[arg(long = "bundle-version")]
        bundle_version: Option<String>,

        /// Stratified k-fold cross-validation folds (0 disables)
        #[arg(long)]
        folds: Option<usize>,

        /// Seed for splitting and forest sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Train even if a bundle already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Predict a single review
    Predict {
        /// Review text
        text: String,

        /// Review title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Star rating (accepted, not used by the models)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,

        #[command(flatten)]
        bundle: BundleArgs,
    },

    /// Predict one review per line of a file ("-" for stdin), as JSON lines
    Batch {
        /// Input file
        input: PathBuf,

        #[command(flatten)]
        bundle: BundleArgs,
    },

    /// Show metadata of the loaded bundle
    Info {
        #[command(flatten)]
        bundle: BundleArgs,
    },

    /// List persisted bundle versions
    Versions,

    /// Print the effective configuration as YAML
    ShowConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BundleArgs {
    /// Bundle version to load (latest when omitted)
    #[arg(id = "bundle", short = 'b', long = "bundle")]
    pub version: Option<String>,
}
