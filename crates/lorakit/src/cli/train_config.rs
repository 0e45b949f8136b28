//! The `lorakit train-config` command.
//!
//! Reads a training request from a TOML or JSON file and writes the trainer's
//! `dataset.toml` and `config.toml`.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use lorakit_core::{Config, ConfigSerializer, TrainerError, TrainingConfig};

#[derive(Args, Debug)]
pub struct TrainConfigArgs {
    /// Training request file (.toml or .json)
    pub file: PathBuf,

    /// Print the documents instead of writing them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: TrainConfigArgs, config: Config) -> anyhow::Result<()> {
    let request = read_request(&args.file)?;
    let serializer = ConfigSerializer::from_config(&config);

    let result = if args.dry_run {
        serializer.serialize(&request).and_then(|documents| {
            println!("# {}", serializer.dataset_config_path().display());
            println!("{}", documents.dataset_toml()?);
            println!("# {}", serializer.training_config_path().display());
            println!("{}", documents.training_toml()?);
            print_warnings(&documents.warnings);
            Ok(())
        })
    } else {
        serializer.generate(&request).map(|written| {
            println!("{} {}", style("✓").green(), written.dataset_config.display());
            println!("{} {}", style("✓").green(), written.training_config.display());
            println!("  script: {}", written.script);
            print_warnings(&written.warnings);
        })
    };

    match result {
        Ok(()) => Ok(()),
        Err(TrainerError::PathValidation(errors)) => {
            for issue in errors.issues() {
                eprintln!("  {} {}", style("✗").red(), issue);
            }
            anyhow::bail!("{} path issue(s); nothing written", errors.issues().len())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("  {} {}", style("!").yellow(), warning);
    }
}

fn read_request(path: &Path) -> anyhow::Result<TrainingConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let request = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reads_toml_and_json() {
        let dir = tempdir().unwrap();
        let toml_path = dir.path().join("train.toml");
        std::fs::write(
            &toml_path,
            "model_type = \"sdxl\"\ntrain_data_dir = \"data\"\nnetwork_dim = 32\n",
        )
        .unwrap();
        let request = read_request(&toml_path).unwrap();
        assert_eq!(request.train_data_dir, "data");
        assert_eq!(request.network_dim, 32);

        let json_path = dir.path().join("train.json");
        std::fs::write(&json_path, r#"{"model_type": "flux", "output_name": "cat"}"#).unwrap();
        let request = read_request(&json_path).unwrap();
        assert_eq!(request.output_name, "cat");
    }

    #[test]
    fn test_missing_file() {
        assert!(read_request(Path::new("/nonexistent/train.toml")).is_err());
    }
}
