//! Tagging job state.
//!
//! A job is created when a request is accepted and is mutated only by the
//! orchestrator. Readers take snapshots (`report`, `outcome`) at any time;
//! `wait` resolves once the job reaches a terminal status.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::error::ImageError;
use crate::types::TaggingJobConfig;

use super::cancel::CancelToken;
use super::events::JobEvent;

/// Buffered events per job; slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 256;

/// Job lifecycle: `queued → running → completed | failed | stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-image failure, keyed by file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub file: String,
    pub path: PathBuf,
    pub stage: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn from_image_error(file: impl Into<String>, error: &ImageError) -> Self {
        Self {
            file: file.into(),
            path: error.path().clone(),
            stage: error.stage().to_string(),
            message: error.to_string(),
        }
    }
}

/// Snapshot answered by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: JobStatus,
    /// Percent of images processed, 0-100
    pub progress: u8,
    pub current_image: Option<String>,
    pub total_images: usize,
    pub processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub errors: Vec<ErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Final result of a job.
///
/// `success` only says the job completed; per-image failures are in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub status: JobStatus,
    pub total_images: usize,
    pub captions_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub errors: Vec<ErrorEntry>,
    pub tag_frequency: HashMap<String, usize>,
}

impl JobOutcome {
    /// Most frequent written tags, ties broken alphabetically.
    pub fn top_tags(&self, n: usize) -> Vec<(String, usize)> {
        let mut tags: Vec<(String, usize)> = self
            .tag_frequency
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tags.truncate(n);
        tags
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    total_images: usize,
    processed: usize,
    current_image: Option<String>,
    error: Option<String>,
    errors: Vec<ErrorEntry>,
    captions_written: usize,
    tag_frequency: HashMap<String, usize>,
    updated_at: DateTime<Utc>,
}

/// One accepted tagging request.
pub struct TaggingJob {
    id: String,
    config: TaggingJobConfig,
    created_at: DateTime<Utc>,
    state: Mutex<JobState>,
    status_tx: watch::Sender<JobStatus>,
    events: broadcast::Sender<JobEvent>,
    cancel: CancelToken,
}

impl TaggingJob {
    pub fn new(id: impl Into<String>, config: TaggingJobConfig) -> Self {
        let now = Utc::now();
        let (status_tx, _) = watch::channel(JobStatus::Queued);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: id.into(),
            config,
            created_at: now,
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                total_images: 0,
                processed: 0,
                current_image: None,
                error: None,
                errors: Vec::new(),
                captions_written: 0,
                tag_frequency: HashMap::new(),
                updated_at: now,
            }),
            status_tx,
            events,
            cancel: CancelToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TaggingJobConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Request a cooperative stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn report(&self) -> JobStatusReport {
        let state = self.lock();
        let progress = if state.total_images == 0 {
            if state.status == JobStatus::Completed {
                100
            } else {
                0
            }
        } else {
            ((state.processed * 100) / state.total_images).min(100) as u8
        };
        JobStatusReport {
            job_id: self.id.clone(),
            status: state.status,
            progress,
            current_image: state.current_image.clone(),
            total_images: state.total_images,
            processed: state.processed,
            error: state.error.clone(),
            errors: state.errors.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }

    pub fn outcome(&self) -> JobOutcome {
        let state = self.lock();
        JobOutcome {
            success: state.status == JobStatus::Completed,
            status: state.status,
            total_images: state.total_images,
            captions_written: state.captions_written,
            error: state.error.clone(),
            errors: state.errors.clone(),
            tag_frequency: state.tag_frequency.clone(),
        }
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.status_tx.subscribe();
        // The sender lives as long as the job, so this only ends on a terminal status.
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.outcome()
    }

    pub(crate) fn set_running(&self, total_images: usize) {
        {
            let mut state = self.lock();
            state.status = JobStatus::Running;
            state.total_images = total_images;
            state.updated_at = Utc::now();
        }
        self.status_tx.send_replace(JobStatus::Running);
        self.emit(JobEvent::Started {
            model: self.config.model.clone(),
            total_images,
        });
    }

    pub(crate) fn emit_model_loaded(&self, model: &str) {
        self.emit(JobEvent::ModelLoaded {
            model: model.to_string(),
        });
    }

    pub(crate) fn begin_image(&self, file: &str) {
        let mut state = self.lock();
        state.current_image = Some(file.to_string());
        state.updated_at = Utc::now();
    }

    /// Record a successfully tagged image and advance progress.
    pub(crate) fn record_success(&self, file: &str, tags: &[String], written: usize) {
        let (index, total) = {
            let mut state = self.lock();
            state.processed += 1;
            state.captions_written += written;
            for tag in tags {
                *state.tag_frequency.entry(tag.clone()).or_insert(0) += 1;
            }
            state.updated_at = Utc::now();
            (state.processed, state.total_images)
        };
        self.emit(JobEvent::ImageTagged {
            index,
            total,
            file: file.to_string(),
            tags: tags.len(),
            written: written > 0,
        });
    }

    /// Record a skipped image and advance progress.
    pub(crate) fn record_failure(&self, file: &str, error: &ImageError) {
        let entry = ErrorEntry::from_image_error(file, error);
        let (index, total) = {
            let mut state = self.lock();
            state.processed += 1;
            state.errors.push(entry.clone());
            state.updated_at = Utc::now();
            (state.processed, state.total_images)
        };
        self.emit(JobEvent::ImageSkipped {
            index,
            total,
            file: entry.file,
            stage: entry.stage,
            message: entry.message,
        });
    }

    /// Move to a terminal status. Later calls are ignored.
    pub(crate) fn finish(&self, status: JobStatus, error: Option<String>) {
        let (processed, errors) = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = status;
            state.error = error.clone();
            state.current_image = None;
            state.updated_at = Utc::now();
            (state.processed, state.errors.len())
        };
        self.emit(JobEvent::Finished {
            status,
            processed,
            errors,
            message: error,
        });
        self.status_tx.send_replace(status);
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine; the stream is best-effort.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TaggingJob {
        TaggingJob::new("job-1", TaggingJobConfig::default())
    }

    #[test]
    fn test_progress_tracking() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        job.set_running(4);

        job.begin_image("a.png");
        job.record_success("a.png", &["1girl".into(), "smile".into()], 1);
        job.begin_image("b.png");
        job.record_failure(
            "b.png",
            &ImageError::Decode {
                path: PathBuf::from("b.png"),
                message: "bad header".into(),
            },
        );

        let report = job.report();
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.progress, 50);
        assert_eq!(report.processed, 2);
        assert_eq!(report.current_image.as_deref(), Some("b.png"));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].stage, "decode");
    }

    #[test]
    fn test_finish_is_final() {
        let job = job();
        job.set_running(0);
        job.finish(JobStatus::Stopped, None);
        job.finish(JobStatus::Completed, None);
        let outcome = job.outcome();
        assert_eq!(outcome.status, JobStatus::Stopped);
        assert!(!outcome.success);
    }

    #[test]
    fn test_top_tags() {
        let job = job();
        job.set_running(2);
        job.record_success("a", &["smile".into(), "1girl".into()], 1);
        job.record_success("b", &["1girl".into(), "solo".into()], 1);
        let top = job.outcome().top_tags(2);
        assert_eq!(top, vec![("1girl".to_string(), 2), ("smile".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_wait_and_events() {
        let job = std::sync::Arc::new(job());
        let mut events = job.subscribe();
        let waiter = {
            let job = job.clone();
            tokio::spawn(async move { job.wait().await })
        };
        job.set_running(1);
        job.record_success("a.png", &["a".into()], 1);
        job.finish(JobStatus::Completed, None);

        let outcome = waiter.await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.captions_written, 1);

        assert!(matches!(events.recv().await.unwrap(), JobEvent::Started { .. }));
        assert!(matches!(events.recv().await.unwrap(), JobEvent::ImageTagged { .. }));
        assert!(events.recv().await.unwrap().is_terminal());
    }
}
