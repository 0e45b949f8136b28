//! lorakit CLI - dataset auto-tagging and LoRA trainer config generation.
//!
//! Tags image datasets with a local WD14-style ONNX tagger, writing one
//! caption file per image, and turns training requests into the
//! `dataset.toml` / `config.toml` pair a kohya-style trainer reads.
//!
//! # Usage
//!
//! ```bash
//! # Tag a dataset directory
//! lorakit tag ./datasets/10_cat --threshold 0.35 --remove-underscore
//!
//! # Run the HTTP API
//! lorakit serve --port 8188
//!
//! # Write trainer config documents
//! lorakit train-config training.toml
//!
//! # Check installed taggers
//! lorakit models list
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// lorakit - dataset auto-tagging and LoRA trainer config generation.
#[derive(Parser, Debug)]
#[command(name = "lorakit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "LORAKIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Tag every image in a dataset directory
    Tag(cli::tag::TagArgs),

    /// Serve the tagging and training-config HTTP API
    Serve(cli::serve::ServeArgs),

    /// Write dataset.toml and config.toml for the trainer
    TrainConfig(cli::train_config::TrainConfigArgs),

    /// Inspect tagger models
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(lorakit_core::Config::default_path);
    let config = match cli::config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `lorakit config path`."
            );
            lorakit_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("lorakit v{}", lorakit_core::VERSION);

    match cli.command {
        Commands::Tag(args) => cli::tag::execute(args, config).await,
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::TrainConfig(args) => cli::train_config::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, &config_path).await,
    }
}
