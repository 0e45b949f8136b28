//! Live job events.
//!
//! Each job broadcasts these to any number of subscribers. `Display` renders
//! the human-readable log line streamed to clients.

use std::fmt;

use serde::Serialize;

use super::job::JobStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        model: String,
        total_images: usize,
    },
    ModelLoaded {
        model: String,
    },
    ImageTagged {
        index: usize,
        total: usize,
        file: String,
        tags: usize,
        written: bool,
    },
    ImageSkipped {
        index: usize,
        total: usize,
        file: String,
        stage: String,
        message: String,
    },
    Finished {
        status: JobStatus,
        processed: usize,
        errors: usize,
        message: Option<String>,
    },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                model,
                total_images,
            } => write!(f, "Tagging {total_images} images with {model}"),
            Self::ModelLoaded { model } => write!(f, "Model {model} ready"),
            Self::ImageTagged {
                index,
                total,
                file,
                tags,
                written,
            } => {
                let note = if *written { "" } else { " (unchanged)" };
                write!(f, "[{index}/{total}] {file}: {tags} tags{note}")
            }
            Self::ImageSkipped {
                index,
                total,
                file,
                stage,
                message,
            } => write!(f, "[{index}/{total}] {file}: skipped at {stage}: {message}"),
            Self::Finished {
                status,
                processed,
                errors,
                message,
            } => {
                write!(f, "Job {status}: {processed} processed, {errors} errors")?;
                if let Some(message) = message {
                    write!(f, " ({message})")?;
                }
                Ok(())
            }
        }
    }
}
