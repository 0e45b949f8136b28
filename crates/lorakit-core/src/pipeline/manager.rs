//! Job table and the operations exposed to the CLI and HTTP server.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::ModelRegistry;
use crate::types::TaggingJobConfig;

use super::events::JobEvent;
use super::job::{JobOutcome, JobStatus, JobStatusReport, TaggingJob};
use super::orchestrator::Orchestrator;

/// Finished jobs kept for status queries before the oldest are dropped.
pub const DEFAULT_FINISHED_JOB_LIMIT: usize = 256;

/// Accepts tagging requests and runs each as a background task.
///
/// Jobs share the orchestrator's model registry and nothing else.
pub struct JobManager {
    orchestrator: Arc<Orchestrator>,
    jobs: RwLock<HashMap<String, Arc<TaggingJob>>>,
    finished_limit: usize,
}

impl JobManager {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            jobs: RwLock::new(HashMap::new()),
            finished_limit: DEFAULT_FINISHED_JOB_LIMIT,
        }
    }

    /// Keep at most `limit` finished jobs; running jobs are never dropped.
    pub fn with_finished_limit(mut self, limit: usize) -> Self {
        self.finished_limit = limit;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.orchestrator.registry()
    }

    /// Validate a request and start it. Returns the new job id.
    pub async fn start(&self, config: TaggingJobConfig) -> TaggerResult<String> {
        config.validate()?;

        let id = Uuid::new_v4().to_string();
        let job = Arc::new(TaggingJob::new(id.clone(), config));
        {
            let mut jobs = self.jobs.write().await;
            prune_finished(&mut jobs, self.finished_limit);
            jobs.insert(id.clone(), job.clone());
        }

        tracing::info!(
            "Accepted tagging job {} for {:?}",
            id,
            job.config().dataset_dir
        );
        let orchestrator = self.orchestrator.clone();
        let runner = job.clone();
        let task = tokio::spawn(async move {
            orchestrator.run(runner).await;
        });
        // A panic inside the run must still end the job.
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!("Job {} task aborted: {}", job.id(), e);
                job.finish(JobStatus::Failed, Some(format!("Job task aborted: {e}")));
            }
        });
        Ok(id)
    }

    pub async fn get(&self, job_id: &str) -> TaggerResult<Arc<TaggingJob>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| TaggerError::JobNotFound(job_id.to_string()))
    }

    pub async fn status(&self, job_id: &str) -> TaggerResult<JobStatusReport> {
        Ok(self.get(job_id).await?.report())
    }

    /// Request a stop; the job ends after its in-flight image.
    pub async fn stop(&self, job_id: &str) -> TaggerResult<()> {
        let job = self.get(job_id).await?;
        tracing::info!("Stop requested for job {}", job_id);
        job.stop();
        Ok(())
    }

    pub async fn subscribe(&self, job_id: &str) -> TaggerResult<broadcast::Receiver<JobEvent>> {
        Ok(self.get(job_id).await?.subscribe())
    }

    /// Wait for a job to reach a terminal status.
    pub async fn wait(&self, job_id: &str) -> TaggerResult<JobOutcome> {
        let job = self.get(job_id).await?;
        Ok(job.wait().await)
    }

    /// Every known job, oldest first.
    pub async fn list(&self) -> Vec<JobStatusReport> {
        let mut reports: Vec<JobStatusReport> = self
            .jobs
            .read()
            .await
            .values()
            .map(|job| job.report())
            .collect();
        reports.sort_by_key(|r| r.created_at);
        reports
    }
}

/// Drop the oldest finished jobs until at most `limit` remain.
fn prune_finished(jobs: &mut HashMap<String, Arc<TaggingJob>>, limit: usize) {
    let mut finished: Vec<(chrono::DateTime<chrono::Utc>, String)> = jobs
        .values()
        .map(|job| job.report())
        .filter(|report| report.status.is_terminal())
        .map(|report| (report.updated_at, report.job_id))
        .collect();
    if finished.len() <= limit {
        return;
    }
    finished.sort();
    let excess = finished.len() - limit;
    for (_, id) in finished.into_iter().take(excess) {
        tracing::debug!("Dropping finished job {}", id);
        jobs.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::model::testing::FixedClassifier;
    use crate::tagger::{ModelLoader, RatingStrategy, TaggerModel, Vocabulary};
    use crate::types::{RatingMode, TagScore};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    struct MissingModel;

    impl ModelLoader for MissingModel {
        fn load(&self, model: &str) -> TaggerResult<TaggerModel> {
            Err(TaggerError::ModelNotFound {
                model: model.to_string(),
                path: PathBuf::from("models/model.onnx"),
            })
        }
    }

    fn manager() -> JobManager {
        let registry = Arc::new(ModelRegistry::new(Arc::new(MissingModel)));
        JobManager::new(Orchestrator::new(registry, vec!["png".into()]))
    }

    #[tokio::test]
    async fn test_empty_dataset_path_rejected() {
        let err = manager().start(TaggingJobConfig::default()).await.unwrap_err();
        assert!(matches!(err, TaggerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let manager = manager();
        assert!(matches!(
            manager.status("nope").await,
            Err(TaggerError::JobNotFound(_))
        ));
        assert!(manager.stop("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_model_missing_fails_with_zero_processed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let id = manager
            .start(TaggingJobConfig {
                dataset_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = manager.wait(&id).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.error.unwrap().contains("Download the model first"));

        let report = manager.status(&id).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(manager.list().await.len(), 1);
    }

    struct OneLabel;

    impl ModelLoader for OneLabel {
        fn load(&self, model: &str) -> TaggerResult<TaggerModel> {
            TaggerModel::new(
                model,
                Box::new(FixedClassifier::new(vec![0.9])),
                Vocabulary::from_labels(["1girl"]),
                16,
            )
        }
    }

    struct PanickingRating;

    impl RatingStrategy for PanickingRating {
        fn rating(&self, _scores: &[TagScore]) -> Option<String> {
            panic!("rating blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_run_still_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let registry = Arc::new(ModelRegistry::new(Arc::new(OneLabel)));
        let orchestrator = Orchestrator::new(registry, vec!["png".into()])
            .with_rating_strategy(Arc::new(PanickingRating));
        let manager = JobManager::new(orchestrator);
        let id = manager
            .start(TaggingJobConfig {
                dataset_dir: dir.path().to_path_buf(),
                rating_mode: RatingMode::First,
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), manager.wait(&id))
            .await
            .expect("job never reached a terminal status")
            .unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.error.unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager().with_finished_limit(1);
        let request = || TaggingJobConfig {
            dataset_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let first = manager.start(request()).await.unwrap();
        manager.wait(&first).await.unwrap();
        let second = manager.start(request()).await.unwrap();
        manager.wait(&second).await.unwrap();
        let third = manager.start(request()).await.unwrap();

        assert!(matches!(
            manager.status(&first).await,
            Err(TaggerError::JobNotFound(_))
        ));
        assert!(manager.status(&second).await.is_ok());
        assert!(manager.status(&third).await.is_ok());
        assert_eq!(manager.list().await.len(), 2);
    }
}
