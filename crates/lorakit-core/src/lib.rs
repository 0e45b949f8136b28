//! lorakit core - dataset auto-tagging and trainer config generation.
//!
//! Two independent engines:
//!
//! ```text
//! Tagging:  discover → preprocess → infer (ONNX) → select tags → write captions
//! Trainer:  TrainingConfig → preflight → dataset.toml + config.toml
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lorakit_core::{Config, JobManager, Orchestrator, TaggingJobConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let manager = JobManager::new(Orchestrator::from_config(&config));
//!
//!     let mut request = TaggingJobConfig::from_defaults(&config.tagging);
//!     request.dataset_dir = "./dataset/10_cat".into();
//!     let id = manager.start(request).await?;
//!
//!     let outcome = manager.wait(&id).await?;
//!     println!("{} captions, {} errors", outcome.captions_written, outcome.errors.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod tagger;
pub mod trainer;
pub mod types;

pub use config::Config;
pub use error::{
    ConfigError, ImageError, LorakitError, PathIssue, PathValidationErrors, Result, TaggerError,
    TaggerResult, TrainerError,
};
pub use pipeline::{
    JobEvent, JobManager, JobOutcome, JobStatus, JobStatusReport, Orchestrator, TaggingJob,
};
pub use tagger::{ModelRegistry, TagSelector};
pub use trainer::{ConfigSerializer, TrainingConfig, TrainingDocuments, WrittenConfig};
pub use types::{RatingMode, TagCategory, TagScore, TaggingJobConfig, ThresholdSet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
