//! The `lorakit models` command.
//!
//! Models are not downloaded by lorakit. Each tagger lives in
//! `<model_dir>/<vendor>_<name>/` with `model.onnx` and `selected_tags.csv`.

use clap::{Args, Subcommand};
use console::style;
use lorakit_core::tagger::catalog::installed;
use lorakit_core::tagger::model::{model_exists, model_path, MODEL_FILENAME, TAGS_FILENAME};
use lorakit_core::Config;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model inspection.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List known taggers and whether each is installed
    List,

    /// Show where a model's files are expected
    Path {
        /// Model identifier (defaults to the configured tagger)
        model: Option<String>,
    },
}

pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    let model_dir = config.model_dir();
    match args.command {
        ModelsCommand::List => {
            println!("Model directory: {}", model_dir.display());
            println!();
            for (model, present) in installed(&model_dir) {
                let mark = if present {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                let default = if model.id == config.tagging.model {
                    style(" (default)").cyan().to_string()
                } else {
                    String::new()
                };
                println!("  {} {:<42} {}{}", mark, model.id, model.label, default);
            }

            let configured = &config.tagging.model;
            if !lorakit_core::tagger::KNOWN_MODELS
                .iter()
                .any(|m| m.id == configured.as_str())
            {
                let mark = if model_exists(&model_dir, configured) {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                println!("  {} {:<42} configured", mark, configured);
            }
        }

        ModelsCommand::Path { model } => {
            let model = model.unwrap_or_else(|| config.tagging.model.clone());
            let dir = model_path(&model_dir, &model);
            println!("{}", dir.display());
            for file in [MODEL_FILENAME, TAGS_FILENAME] {
                let path = dir.join(file);
                if !path.exists() {
                    eprintln!("  missing: {}", path.display());
                }
            }
        }
    }

    Ok(())
}
