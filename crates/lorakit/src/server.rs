//! HTTP API using Axum.
//!
//! ```text
//! POST /api/tagging/start           start a tagging job
//! GET  /api/tagging/status/:job_id  status snapshot
//! POST /api/tagging/stop/:job_id    request a stop
//! GET  /api/tagging/logs/:job_id    live log stream (SSE)
//! GET  /api/tagging/jobs            every known job
//! POST /api/training/config         write dataset.toml + config.toml
//! GET  /health
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use lorakit_core::config::TaggingDefaults;
use lorakit_core::{
    Config, ConfigSerializer, JobEvent, JobManager, Orchestrator, TaggerError, TaggingJobConfig,
    TrainerError, TrainingConfig,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    pub manager: JobManager,
    pub serializer: ConfigSerializer,
    /// Applied to tagging requests before the body
    pub defaults: TaggingDefaults,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            manager: JobManager::new(Orchestrator::from_config(config)),
            serializer: ConfigSerializer::from_config(config),
            defaults: config.tagging.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/tagging/start", post(handle_start))
        .route("/api/tagging/status/:job_id", get(handle_status))
        .route("/api/tagging/stop/:job_id", post(handle_stop))
        .route("/api/tagging/logs/:job_id", get(handle_logs))
        .route("/api/tagging/jobs", get(handle_jobs))
        .route("/api/training/config", post(handle_training_config))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is interrupted.
pub async fn run(config: &Config, host: &str, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(config));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": lorakit_core::VERSION }))
}

async fn handle_start(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let request = match merge_request(&state.defaults, body) {
        Ok(request) => request,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };

    match state.manager.start(request).await {
        Ok(job_id) => Json(json!({ "success": true, "job_id": job_id })).into_response(),
        Err(e) => tagger_failure(e),
    }
}

async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.manager.status(&job_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => tagger_failure(e),
    }
}

async fn handle_stop(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.manager.stop(&job_id).await {
        Ok(()) => Json(json!({ "success": true, "job_id": job_id })).into_response(),
        Err(e) => tagger_failure(e),
    }
}

async fn handle_jobs(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({ "jobs": state.manager.list().await })).into_response()
}

/// Log lines as server-sent events. The stream closes after the job ends.
async fn handle_logs(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    let job = match state.manager.get(&job_id).await {
        Ok(job) => job,
        Err(e) => return tagger_failure(e),
    };

    // Subscribe before checking the status so the final event cannot slip by.
    let receiver = job.subscribe();
    let events: BoxStream<'static, Result<Event, Infallible>> = if job.status().is_terminal() {
        let report = job.report();
        let summary = JobEvent::Finished {
            status: report.status,
            processed: report.processed,
            errors: report.errors.len(),
            message: report.error,
        };
        stream::once(async move { Ok(sse_event(&summary)) }).boxed()
    } else {
        event_stream(receiver).boxed()
    };

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn event_stream(
    receiver: broadcast::Receiver<JobEvent>,
) -> impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(Some(receiver), |state| async move {
        let mut receiver = state?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let next = if event.is_terminal() {
                        None
                    } else {
                        Some(receiver)
                    };
                    return Some((Ok(sse_event(&event)), next));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Log subscriber lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

fn sse_event(event: &JobEvent) -> Event {
    let data = serde_json::to_value(event).unwrap_or(Value::Null);
    Event::default()
        .event("log")
        .data(json!({ "message": event.to_string(), "event": data }).to_string())
}

async fn handle_training_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<TrainingConfig>,
) -> Response {
    match state.serializer.generate(&config) {
        Ok(written) => Json(json!({
            "success": true,
            "dataset_config": written.dataset_config,
            "training_config": written.training_config,
            "script": written.script,
            "warnings": written.warnings,
        }))
        .into_response(),
        Err(TrainerError::PathValidation(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Path validation failed",
                "issues": errors.issues(),
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Training config generation failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Overlay a JSON request body on the configured tagging defaults.
fn merge_request(defaults: &TaggingDefaults, body: Value) -> Result<TaggingJobConfig, String> {
    let Value::Object(fields) = body else {
        return Err("request body must be a JSON object".to_string());
    };
    let mut merged = serde_json::to_value(TaggingJobConfig::from_defaults(defaults))
        .map_err(|e| e.to_string())?;
    if let Value::Object(base) = &mut merged {
        for (key, value) in fields {
            if !value.is_null() {
                base.insert(key, value);
            }
        }
    }
    serde_json::from_value(merged).map_err(|e| format!("invalid tagging request: {e}"))
}

fn tagger_failure(error: TaggerError) -> Response {
    let status = match &error {
        TaggerError::JobNotFound(_) => StatusCode::NOT_FOUND,
        TaggerError::InvalidRequest(_) | TaggerError::DirectoryNotFound(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, error.to_string())
}

fn failure(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use lorakit_core::trainer::PathResolver;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn app(root: &TempDir) -> Router {
        let config = Config::default();
        let resolver = PathResolver::new(root.path(), "sd-scripts");
        let state = Arc::new(AppState {
            manager: JobManager::new(Orchestrator::from_config(&config)),
            serializer: ConfigSerializer::new(resolver, "configs"),
            defaults: config.tagging.clone(),
        });
        router(state)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempdir().unwrap();
        let (status, body) = send(app(&root), "GET", "/health", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_start_rejects_empty_path() {
        let root = tempdir().unwrap();
        let (status, body) = send(
            app(&root),
            "POST",
            "/api/tagging/start",
            json!({ "dataset_dir": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let root = tempdir().unwrap();
        let (status, body) =
            send(app(&root), "GET", "/api/tagging/status/nope", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(app(&root), "POST", "/api/tagging/stop/nope", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_merge_request_keeps_defaults() {
        let defaults = TaggingDefaults::default();
        let request = merge_request(
            &defaults,
            json!({ "dataset_dir": "/data/10_cat", "threshold": 0.5, "rating_mode": "first" }),
        )
        .unwrap();
        assert_eq!(request.threshold, 0.5);
        assert_eq!(request.model, defaults.model);
        assert_eq!(request.caption_extension, ".txt");
        assert_eq!(request.rating_mode, lorakit_core::RatingMode::First);
        assert!(merge_request(&defaults, json!(["not", "an", "object"])).is_err());
    }

    #[tokio::test]
    async fn test_training_config_reports_issues() {
        let root = tempdir().unwrap();
        let (status, body) = send(
            app(&root),
            "POST",
            "/api/training/config",
            json!({
                "pretrained_model_name_or_path": "missing.safetensors",
                "train_data_dir": "data",
                "output_dir": "out/lora",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = body["issues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["field"].as_str().unwrap())
            .collect();
        assert_eq!(
            fields,
            vec!["pretrained_model_name_or_path", "train_data_dir", "output_dir"]
        );
        assert!(!root.path().join("configs").exists());
    }

    #[tokio::test]
    async fn test_training_config_writes_documents() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("data/10_cat")).unwrap();
        std::fs::write(root.path().join("data/10_cat/001.png"), b"x").unwrap();
        std::fs::write(root.path().join("base.safetensors"), b"x").unwrap();
        std::fs::create_dir_all(root.path().join("out")).unwrap();

        let (status, body) = send(
            app(&root),
            "POST",
            "/api/training/config",
            json!({
                "pretrained_model_name_or_path": "base.safetensors",
                "train_data_dir": "data",
                "output_dir": "out/lora",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["script"], "train_network.py");
        assert!(root.path().join("configs/dataset.toml").exists());
        assert!(root.path().join("configs/config.toml").exists());
    }
}
