//! Pre-flight path checks. Every failing path is reported in one pass.

use std::path::Path;

use crate::error::{PathIssue, PathValidationErrors};

use super::config::{ModelType, TrainingConfig};
use super::paths::{to_slash, PathResolver};

/// Non-fatal findings; the documents can still be produced.
pub type Warnings = Vec<String>;

/// Check every path in `config`.
pub fn preflight(
    config: &TrainingConfig,
    resolver: &PathResolver,
) -> Result<Warnings, PathValidationErrors> {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut issue = |field: &str, path: &str, reason: &str| {
        issues.push(PathIssue {
            field: field.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        });
    };

    match required(&config.pretrained_model_name_or_path) {
        None => issue("pretrained_model_name_or_path", "", "is required"),
        Some(raw) => {
            let path = resolver.resolve(raw);
            if !path.exists() {
                issue("pretrained_model_name_or_path", &to_slash(&path), "does not exist");
            }
        }
    }

    match required(&config.train_data_dir) {
        None => issue("train_data_dir", "", "is required"),
        Some(raw) => {
            let path = resolver.resolve(raw);
            if !path.is_dir() {
                issue("train_data_dir", &to_slash(&path), "does not exist");
            } else if is_empty_dir(&path) {
                issue("train_data_dir", &to_slash(&path), "is empty");
            }
        }
    }

    match required(&config.output_dir) {
        None => issue("output_dir", "", "is required"),
        Some(raw) => {
            let path = resolver.resolve(raw);
            match path.parent() {
                Some(parent) if parent.is_dir() => {}
                _ => issue("output_dir", &to_slash(&path), "parent directory does not exist"),
            }
        }
    }

    if let Some(raw) = optional(&config.continue_from) {
        let path = resolver.resolve(raw);
        if !path.exists() {
            issue("continue_from", &to_slash(&path), "does not exist");
        }
    }

    if let Some(raw) = optional(&config.sample_prompts) {
        let path = resolver.resolve(raw);
        if !path.is_file() {
            issue("sample_prompts", &to_slash(&path), "does not exist");
        }
    }

    for (field, value, needed) in encoders(config) {
        match optional(value) {
            Some(raw) => {
                let path = resolver.resolve(raw);
                if !path.exists() {
                    issue(field, &to_slash(&path), "does not exist");
                }
            }
            None if needed => issue(field, "", "is required for this architecture"),
            None => {}
        }
    }

    if let Some(raw) = optional(&config.vae) {
        let path = resolver.resolve(raw);
        if !path.exists() {
            let warning = format!(
                "VAE {} does not exist; training without a separate VAE",
                to_slash(&path)
            );
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }
    }

    if issues.is_empty() {
        Ok(warnings)
    } else {
        Err(PathValidationErrors(issues))
    }
}

/// Encoder paths that apply to the architecture, and whether each is required.
fn encoders(config: &TrainingConfig) -> Vec<(&'static str, &Option<String>, bool)> {
    match config.model_type {
        ModelType::Flux => vec![
            ("ae", &config.ae, true),
            ("clip_l", &config.clip_l, true),
            ("t5xxl", &config.t5xxl, true),
        ],
        ModelType::Sd3 => vec![
            ("clip_l", &config.clip_l, false),
            ("clip_g", &config.clip_g, false),
            ("t5xxl", &config.t5xxl, false),
        ],
        ModelType::Lumina => vec![
            ("ae", &config.ae, false),
            ("gemma2", &config.gemma2, false),
        ],
        ModelType::Sd15 | ModelType::Sd20 | ModelType::Sdxl => Vec::new(),
    }
}

/// Whether the VAE path is usable; a missing VAE is omitted from the document.
pub fn vae_available(config: &TrainingConfig, resolver: &PathResolver) -> bool {
    optional(&config.vae).is_some_and(|raw| resolver.resolve(raw).exists())
}

fn required(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().and_then(required)
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempdir().unwrap();
            std::fs::create_dir_all(root.path().join("data")).unwrap();
            std::fs::write(root.path().join("data/001.png"), b"x").unwrap();
            std::fs::write(root.path().join("base.safetensors"), b"x").unwrap();
            std::fs::create_dir_all(root.path().join("out")).unwrap();
            Self { root }
        }

        fn resolver(&self) -> PathResolver {
            PathResolver::new(self.root.path(), "sd-scripts")
        }

        fn config(&self) -> TrainingConfig {
            TrainingConfig {
                pretrained_model_name_or_path: "base.safetensors".into(),
                train_data_dir: "data".into(),
                output_dir: "out/lora".into(),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let fx = Fixture::new();
        let warnings = preflight(&fx.config(), &fx.resolver()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_reports_every_issue() {
        let fx = Fixture::new();
        let config = TrainingConfig {
            pretrained_model_name_or_path: "missing.safetensors".into(),
            train_data_dir: "nope".into(),
            output_dir: "missing/parent/out".into(),
            continue_from: Some("old.safetensors".into()),
            ..Default::default()
        };
        let err = preflight(&config, &fx.resolver()).unwrap_err();
        let fields: Vec<_> = err.issues().iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "pretrained_model_name_or_path",
                "train_data_dir",
                "output_dir",
                "continue_from"
            ]
        );
    }

    #[test]
    fn test_empty_dataset_dir() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.root.path().join("empty")).unwrap();
        let config = TrainingConfig {
            train_data_dir: "empty".into(),
            ..fx.config()
        };
        let err = preflight(&config, &fx.resolver()).unwrap_err();
        assert_eq!(err.issues()[0].reason, "is empty");
    }

    #[test]
    fn test_missing_vae_is_warning() {
        let fx = Fixture::new();
        let config = TrainingConfig {
            vae: Some("vae.safetensors".into()),
            ..fx.config()
        };
        let warnings = preflight(&config, &fx.resolver()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(!vae_available(&config, &fx.resolver()));
    }

    #[test]
    fn test_flux_requires_encoders() {
        let fx = Fixture::new();
        std::fs::write(fx.root.path().join("ae.safetensors"), b"x").unwrap();
        let config = TrainingConfig {
            model_type: ModelType::Flux,
            ae: Some("ae.safetensors".into()),
            t5xxl: Some("t5.safetensors".into()),
            ..fx.config()
        };
        let err = preflight(&config, &fx.resolver()).unwrap_err();
        let issues: Vec<_> = err
            .issues()
            .iter()
            .map(|i| (i.field.as_str(), i.reason.as_str()))
            .collect();
        assert_eq!(
            issues,
            vec![
                ("clip_l", "is required for this architecture"),
                ("t5xxl", "does not exist")
            ]
        );
    }
}
