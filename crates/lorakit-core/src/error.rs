//! Error types for lorakit.
//!
//! Errors are split by how far they reach: engine-level tagger errors end a
//! job before any image is touched, per-image errors are recorded and the
//! batch moves on, and trainer errors gate config generation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for lorakit operations.
#[derive(Error, Debug)]
pub enum LorakitError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tagging engine errors (model loading, job setup)
    #[error("Tagger error: {0}")]
    Tagger(#[from] TaggerError),

    /// Per-image processing errors
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// Training config generation errors
    #[error("Trainer config error: {0}")]
    Trainer(#[from] TrainerError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Engine-level tagging errors. Any of these ends the job it occurs in.
#[derive(Error, Debug)]
pub enum TaggerError {
    /// Model artifacts are missing on disk
    #[error("Model {model} not found: missing {path}. Download the model first (see `lorakit models path`).")]
    ModelNotFound { model: String, path: PathBuf },

    /// Vocabulary does not line up with the classifier output
    #[error("Model {model} is inconsistent: vocabulary has {vocabulary_len} labels but the classifier outputs {output_len} scores")]
    ModelIntegrity {
        model: String,
        vocabulary_len: usize,
        output_len: usize,
    },

    /// The model files exist but could not be loaded
    #[error("Failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },

    /// `selected_tags.csv` is malformed
    #[error("Invalid tag list: {0}")]
    TagList(String),

    /// Dataset directory does not exist
    #[error("Dataset directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// The tagging request is malformed
    #[error("Invalid tagging request: {0}")]
    InvalidRequest(String),

    /// No job with this id
    #[error("Job not found: {0}")]
    JobNotFound(String),
}

/// Per-image errors. Recorded in the job's error list; the batch continues.
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    /// Image could not be read or decoded
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Classifier failed on this image
    #[error("Inference failed for {path}: {message}")]
    Inference { path: PathBuf, message: String },

    /// Caption file could not be written
    #[error("Caption write failed for {path}: {message}")]
    CaptionWrite { path: PathBuf, message: String },
}

impl ImageError {
    /// Path of the image (or caption file) the error belongs to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Decode { path, .. }
            | Self::Inference { path, .. }
            | Self::CaptionWrite { path, .. } => path,
        }
    }

    /// Short stage name used in job error entries.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Inference { .. } => "inference",
            Self::CaptionWrite { .. } => "caption",
        }
    }
}

/// One failing path found during training config pre-flight.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PathIssue {
    /// Config field the path came from
    pub field: String,
    /// The resolved path that failed
    pub path: String,
    /// What is wrong with it
    pub reason: String,
}

impl fmt::Display for PathIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.path, self.reason)
    }
}

/// Every path issue found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PathValidationErrors(pub Vec<PathIssue>);

impl PathValidationErrors {
    pub fn issues(&self) -> &[PathIssue] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PathValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

/// Training config generation errors.
#[derive(Error, Debug)]
pub enum TrainerError {
    /// One or more required paths are missing
    #[error("Path validation failed: {0}")]
    PathValidation(PathValidationErrors),

    /// The config could not be rendered
    #[error("Failed to serialize trainer config: {0}")]
    Serialize(String),

    /// A document could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for lorakit results.
pub type Result<T> = std::result::Result<T, LorakitError>;

/// Convenience type alias for tagger results.
pub type TaggerResult<T> = std::result::Result<T, TaggerError>;
