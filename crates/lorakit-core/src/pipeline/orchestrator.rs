//! Runs a tagging job over a dataset directory.
//!
//! Per batch: preprocess images on blocking threads (bounded by the job's
//! worker count), score the batch on a blocking thread, then select tags and
//! write each caption before advancing progress for that image. Per-image
//! failures are recorded and the job moves on; only engine-level errors
//! (missing directory, model load) fail the job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use ndarray::Array4;

use crate::config::Config;
use crate::error::{ImageError, TaggerError, TaggerResult};
use crate::tagger::preprocess::{load_and_preprocess, stack};
use crate::tagger::{
    CaptionWriter, ModelRatingStrategy, ModelRegistry, RatingStrategy, TagSelector, TaggerModel,
};
use crate::types::TagScore;

use super::discovery::{file_name, DiscoveredFile, FileDiscovery};
use super::job::{JobOutcome, JobStatus, TaggingJob};

type Prepared = (PathBuf, Result<Array4<f32>, ImageError>);
type Scored = (PathBuf, Result<Vec<TagScore>, ImageError>);

/// Drives jobs against a shared model registry.
pub struct Orchestrator {
    registry: Arc<ModelRegistry>,
    formats: Vec<String>,
    rating: Arc<dyn RatingStrategy>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ModelRegistry>, formats: Vec<String>) -> Self {
        Self {
            registry,
            formats,
            rating: Arc::new(ModelRatingStrategy),
        }
    }

    /// Orchestrator over ONNX models from the app config.
    pub fn from_config(config: &Config) -> Self {
        let registry = ModelRegistry::onnx(config.model_dir(), config.tagging.image_size);
        Self::new(Arc::new(registry), config.tagging.supported_formats.clone())
    }

    pub fn with_rating_strategy(mut self, rating: Arc<dyn RatingStrategy>) -> Self {
        self.rating = rating;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run `job` to a terminal status.
    pub async fn run(&self, job: Arc<TaggingJob>) -> JobOutcome {
        let start = Instant::now();
        match self.execute(&job).await {
            Ok(status) => {
                tracing::info!(
                    "Job {} {} in {:.1}s",
                    job.id(),
                    status,
                    start.elapsed().as_secs_f32()
                );
                job.finish(status, None);
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job.id(), e);
                job.finish(JobStatus::Failed, Some(e.to_string()));
            }
        }
        job.outcome()
    }

    async fn execute(&self, job: &TaggingJob) -> TaggerResult<JobStatus> {
        let config = job.config();
        let dir = &config.dataset_dir;
        if !dir.is_dir() {
            return Err(TaggerError::DirectoryNotFound(dir.clone()));
        }

        let discovery = FileDiscovery::new(self.formats.clone(), config.recursive);
        let images = discovery.discover(dir);
        tracing::info!("Found {} images in {:?}", images.len(), dir);
        job.set_running(images.len());

        let model = self.registry.get_or_load(&config.model).await?;
        job.emit_model_loaded(model.id());

        let selector = TagSelector::new(config, self.rating.clone());
        let writer = CaptionWriter::from_job(config);
        let cancel = job.cancel_token();

        for chunk in images.chunks(config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Stopped);
            }

            let prepared = preprocess_chunk(chunk, model.image_size(), config.worker_count).await;
            let scored = score_chunk(model.clone(), prepared).await;

            for (path, scores) in scored {
                if cancel.is_cancelled() {
                    return Ok(JobStatus::Stopped);
                }
                let file = file_name(&path);
                job.begin_image(&file);

                let result = scores.and_then(|scores| {
                    let outcome = selector.tag(&scores);
                    if config.debug {
                        let detail: Vec<String> = outcome
                            .selected
                            .iter()
                            .map(|s| format!("{}:{:.3}", s.label, s.confidence))
                            .collect();
                        tracing::info!("{}: {} | {}", file, outcome.tags.join(", "), detail.join(" "));
                    }
                    writer.write(&path, &outcome.tags).map(|n| (outcome.tags, n))
                });

                match result {
                    Ok((tags, written)) => job.record_success(&file, &tags, written),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", file, e);
                        job.record_failure(&file, &e);
                    }
                }
            }
        }

        Ok(JobStatus::Completed)
    }
}

/// Decode and preprocess a chunk, at most `workers` images at a time.
async fn preprocess_chunk(chunk: &[DiscoveredFile], size: u32, workers: usize) -> Vec<Prepared> {
    stream::iter(chunk.iter().map(|f| f.path.clone()).collect::<Vec<PathBuf>>())
        .map(|path| async move {
            let task_path = path.clone();
            let result = tokio::task::spawn_blocking(move || load_and_preprocess(&task_path, size))
                .await
                .unwrap_or_else(|e| {
                    Err(ImageError::Decode {
                        path: path.clone(),
                        message: format!("Preprocess task failed: {e}"),
                    })
                });
            (path, result)
        })
        .buffered(workers.max(1))
        .collect()
        .await
}

/// Run inference for a chunk on a blocking thread.
async fn score_chunk(model: Arc<TaggerModel>, prepared: Vec<Prepared>) -> Vec<Scored> {
    let paths: Vec<PathBuf> = prepared.iter().map(|(p, _)| p.clone()).collect();
    match tokio::task::spawn_blocking(move || score_prepared(&model, prepared)).await {
        Ok(scored) => scored,
        Err(e) => paths
            .into_iter()
            .map(|path| {
                let err = ImageError::Inference {
                    path: path.clone(),
                    message: format!("Inference task failed: {e}"),
                };
                (path, Err(err))
            })
            .collect(),
    }
}

/// Score every prepared image, batched when possible.
///
/// A failed batch is retried image by image so the error lands on the image
/// that caused it.
fn score_prepared(model: &TaggerModel, prepared: Vec<Prepared>) -> Vec<Scored> {
    let batched = {
        let ready: Vec<(&PathBuf, &Array4<f32>)> = prepared
            .iter()
            .filter_map(|(path, tensor)| tensor.as_ref().ok().map(|t| (path, t)))
            .collect();
        if ready.len() > 1 {
            let tensors: Vec<Array4<f32>> = ready.iter().map(|(_, t)| (*t).clone()).collect();
            let paths: Vec<PathBuf> = ready.iter().map(|(p, _)| (*p).clone()).collect();
            let start = Instant::now();
            let result = stack(&tensors)
                .ok_or_else(|| "Could not stack batch".to_string())
                .and_then(|batch| model.score_batch(&batch, &paths).map_err(|e| e.to_string()));
            tracing::trace!("Batch of {} scored in {:?}", paths.len(), start.elapsed());
            match result {
                Ok(scores) => Some(scores),
                Err(e) => {
                    tracing::warn!("Batched inference failed ({}), retrying one at a time", e);
                    None
                }
            }
        } else {
            None
        }
    };

    let mut batched = batched.map(Vec::into_iter);
    prepared
        .into_iter()
        .map(|(path, tensor)| {
            let result = tensor.and_then(|tensor| {
                match batched.as_mut().and_then(Iterator::next) {
                    Some(scores) => Ok(scores),
                    None => model.score(&tensor, &path),
                }
            });
            (path, result)
        })
        .collect()
}
