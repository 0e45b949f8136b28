//! Dataset tagging jobs.
//!
//! - **discovery**: find images in a dataset directory
//! - **job**: job state, status reports and outcomes
//! - **events**: live per-job event stream
//! - **cancel**: cooperative stop flag
//! - **orchestrator**: runs one job through the tagging engine
//! - **manager**: job table behind the CLI and HTTP API

pub mod cancel;
pub mod discovery;
pub mod events;
pub mod job;
pub mod manager;
pub mod orchestrator;

pub use cancel::CancelToken;
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use events::JobEvent;
pub use job::{ErrorEntry, JobOutcome, JobStatus, JobStatusReport, TaggingJob};
pub use manager::JobManager;
pub use orchestrator::Orchestrator;
