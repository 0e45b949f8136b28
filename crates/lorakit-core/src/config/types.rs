//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where tagger models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.lorakit/models"),
        }
    }
}

/// Defaults applied to tagging requests that leave a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingDefaults {
    /// Tagger model identifier (vendor/name)
    pub model: String,

    /// Overall confidence threshold
    pub threshold: f32,

    /// Square input size of the classifier, in pixels
    pub image_size: u32,

    /// Images per inference call
    pub batch_size: usize,

    /// Concurrent preprocessing workers
    pub worker_count: usize,

    /// Caption file extension, including the dot
    pub caption_extension: String,

    /// Separator used to join tags in caption files
    pub caption_separator: String,

    /// Image extensions picked up when scanning a dataset
    pub supported_formats: Vec<String>,
}

impl Default for TaggingDefaults {
    fn default() -> Self {
        Self {
            model: "SmilingWolf/wd-vit-large-tagger-v3".to_string(),
            threshold: 0.35,
            image_size: 448,
            batch_size: 1,
            worker_count: 4,
            caption_extension: ".txt".to_string(),
            caption_separator: ", ".to_string(),
            supported_formats: [
                "jpg", "jpeg", "png", "webp", "bmp", "gif", "tiff", "tif",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Where the external trainer lives and where its config documents go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Trainer checkout; also the trainer's working directory
    pub sd_scripts_dir: PathBuf,

    /// Output directory for `dataset.toml` / `config.toml`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Base for relative paths in training requests (defaults to cwd)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            sd_scripts_dir: PathBuf::from("~/.lorakit/sd-scripts"),
            config_dir: None,
            project_root: None,
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8188,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
