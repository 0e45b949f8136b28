//! Training config serializer.
//!
//! Turns a [`TrainingConfig`] into the two documents the external trainer
//! reads at startup: `dataset.toml` and `config.toml`.
//!
//! ```text
//! TrainingConfig → preflight → dataset document + training document → write
//! ```
//!
//! `serialize` is pure and writes nothing; `write` puts both documents in the
//! config directory, overwriting earlier ones; `generate` does all three.

pub mod config;
pub mod dataset;
pub mod fields;
pub mod network;
pub mod paths;
pub mod validate;

pub use config::{CrossAttention, LoraType, ModelType, Resolution, TrainingConfig};
pub use paths::PathResolver;

use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::{Table, Value};

use crate::error::TrainerError;

use dataset::dataset_document;
use fields::training_fields;
use network::network_spec;
use paths::to_slash;
use validate::{preflight, vae_available};

pub const DATASET_FILENAME: &str = "dataset.toml";
pub const TRAINING_FILENAME: &str = "config.toml";

/// Trainer entry script for an architecture.
pub fn trainer_script(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::Sd15 | ModelType::Sd20 => "train_network.py",
        ModelType::Sdxl => "sdxl_train_network.py",
        ModelType::Sd3 => "sd3_train_network.py",
        ModelType::Flux => "flux_train_network.py",
        ModelType::Lumina => "lumina_train_network.py",
    }
}

/// Both documents, ready to write.
#[derive(Debug, Clone)]
pub struct TrainingDocuments {
    pub dataset: Table,
    pub training: Table,
    pub script: &'static str,
    pub warnings: Vec<String>,
}

impl TrainingDocuments {
    pub fn dataset_toml(&self) -> Result<String, TrainerError> {
        render(&self.dataset)
    }

    pub fn training_toml(&self) -> Result<String, TrainerError> {
        render(&self.training)
    }
}

/// Where the documents went.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenConfig {
    pub dataset_config: PathBuf,
    pub training_config: PathBuf,
    pub script: String,
    pub warnings: Vec<String>,
}

pub struct ConfigSerializer {
    resolver: PathResolver,
    config_dir: PathBuf,
}

impl ConfigSerializer {
    /// `config_dir` is resolved against the project root when relative.
    pub fn new(resolver: PathResolver, config_dir: impl AsRef<Path>) -> Self {
        let config_dir = resolver.resolve(&config_dir.as_ref().to_string_lossy());
        Self {
            resolver,
            config_dir,
        }
    }

    /// Serializer for the trainer set up in the app config.
    pub fn from_config(config: &crate::Config) -> Self {
        let resolver = PathResolver::new(config.project_root(), config.trainer_dir());
        Self::new(resolver, config.trainer_config_dir())
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn dataset_config_path(&self) -> PathBuf {
        self.config_dir.join(DATASET_FILENAME)
    }

    pub fn training_config_path(&self) -> PathBuf {
        self.config_dir.join(TRAINING_FILENAME)
    }

    /// Pre-flight only. Returns warnings.
    pub fn validate(&self, config: &TrainingConfig) -> Result<Vec<String>, TrainerError> {
        preflight(config, &self.resolver).map_err(TrainerError::PathValidation)
    }

    /// Validate and build both documents without touching the filesystem.
    pub fn serialize(&self, config: &TrainingConfig) -> Result<TrainingDocuments, TrainerError> {
        let warnings = self.validate(config)?;

        let effective;
        let config = if config.vae.is_some() && !vae_available(config, &self.resolver) {
            effective = TrainingConfig {
                vae: None,
                ..config.clone()
            };
            &effective
        } else {
            config
        };

        let dataset = dataset_document(config, &self.resolver);

        let mut training = training_fields(config, &self.resolver);
        let network = network_spec(config);
        training.insert("network_module".into(), Value::String(network.module));
        if !network.args.is_empty() {
            training.insert(
                "network_args".into(),
                Value::Array(network.args.into_iter().map(Value::String).collect()),
            );
        }
        training.insert(
            "dataset_config".into(),
            Value::String(to_slash(&self.dataset_config_path())),
        );

        Ok(TrainingDocuments {
            dataset,
            training,
            script: trainer_script(config.model_type),
            warnings,
        })
    }

    /// Write both documents, creating the config directory if needed.
    pub fn write(&self, documents: &TrainingDocuments) -> Result<WrittenConfig, TrainerError> {
        let dataset_text = documents.dataset_toml()?;
        let training_text = documents.training_toml()?;

        std::fs::create_dir_all(&self.config_dir).map_err(|source| TrainerError::Write {
            path: self.config_dir.clone(),
            source,
        })?;

        let dataset_config = self.dataset_config_path();
        let training_config = self.training_config_path();
        for (path, text) in [(&dataset_config, dataset_text), (&training_config, training_text)] {
            std::fs::write(path, text).map_err(|source| TrainerError::Write {
                path: path.clone(),
                source,
            })?;
        }

        tracing::info!(
            "Wrote trainer config to {:?} ({})",
            self.config_dir,
            documents.script
        );
        Ok(WrittenConfig {
            dataset_config,
            training_config,
            script: documents.script.to_string(),
            warnings: documents.warnings.clone(),
        })
    }

    /// Validate, serialize and write. A validation failure writes nothing.
    pub fn generate(&self, config: &TrainingConfig) -> Result<WrittenConfig, TrainerError> {
        let documents = self.serialize(config)?;
        self.write(&documents)
    }
}

fn render(table: &Table) -> Result<String, TrainerError> {
    toml::to_string_pretty(table).map_err(|e| TrainerError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_trainer_script() {
        assert_eq!(trainer_script(ModelType::Sd15), "train_network.py");
        assert_eq!(trainer_script(ModelType::Sd20), "train_network.py");
        assert_eq!(trainer_script(ModelType::Sdxl), "sdxl_train_network.py");
        assert_eq!(trainer_script(ModelType::Sd3), "sd3_train_network.py");
        assert_eq!(trainer_script(ModelType::Flux), "flux_train_network.py");
        assert_eq!(trainer_script(ModelType::Lumina), "lumina_train_network.py");
    }

    #[test]
    fn test_generate_writes_both_documents() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        std::fs::write(root.path().join("data/001.png"), b"x").unwrap();
        std::fs::write(root.path().join("base.safetensors"), b"x").unwrap();

        let resolver = PathResolver::new(root.path(), "sd-scripts");
        let serializer = ConfigSerializer::new(resolver, "sd-scripts/config");
        let config = TrainingConfig {
            model_type: ModelType::Sdxl,
            pretrained_model_name_or_path: "base.safetensors".into(),
            train_data_dir: "data".into(),
            output_dir: "output".into(),
            vae: Some("missing-vae.safetensors".into()),
            lora_type: LoraType::LoCon,
            ..Default::default()
        };

        let written = serializer.generate(&config).unwrap();
        assert_eq!(written.script, "sdxl_train_network.py");
        assert_eq!(written.warnings.len(), 1);

        let training: Table =
            toml::from_str(&std::fs::read_to_string(&written.training_config).unwrap()).unwrap();
        assert_eq!(training["network_module"].as_str(), Some("lycoris.kohya"));
        assert!(!training.contains_key("vae"));
        let dataset_config = training["dataset_config"].as_str().unwrap();
        assert!(dataset_config.ends_with("sd-scripts/config/dataset.toml"));
        assert!(!dataset_config.contains('\\'));

        let dataset: Table =
            toml::from_str(&std::fs::read_to_string(&written.dataset_config).unwrap()).unwrap();
        assert_eq!(
            dataset["datasets"][0]["subsets"][0]["image_dir"].as_str(),
            Some("../data")
        );

        // A second run overwrites.
        serializer.generate(&config).unwrap();
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let root = tempdir().unwrap();
        let resolver = PathResolver::new(root.path(), "sd-scripts");
        let serializer = ConfigSerializer::new(resolver, "sd-scripts/config");
        let config = TrainingConfig {
            pretrained_model_name_or_path: "base.safetensors".into(),
            train_data_dir: "does-not-exist".into(),
            output_dir: "output".into(),
            ..Default::default()
        };

        let err = serializer.generate(&config).unwrap_err();
        assert!(matches!(err, TrainerError::PathValidation(_)));
        assert!(!serializer.dataset_config_path().exists());
        assert!(!serializer.training_config_path().exists());
    }
}
