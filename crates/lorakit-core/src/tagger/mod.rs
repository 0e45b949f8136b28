//! Local auto-tagging engine.
//!
//! A WD14-style ONNX classifier scores every label of its vocabulary for an
//! image; the selector turns those scores into caption tags and the caption
//! writer persists them next to the image.
//!
//! - **preprocess**: decode, letterbox onto white, BGR tensor
//! - **vocabulary**: `selected_tags.csv` parsing
//! - **classifier**: inference seam and the ONNX Runtime implementation
//! - **model**: a loaded tagger with its integrity check
//! - **registry**: lazy load-once cache of models
//! - **selector** / **rating**: thresholds and post-processing
//! - **caption**: sidecar caption files
//! - **catalog**: known tagger models

pub mod caption;
pub mod catalog;
pub mod classifier;
pub mod model;
pub mod preprocess;
pub mod rating;
pub mod registry;
pub mod selector;
pub mod vocabulary;

pub use caption::CaptionWriter;
pub use catalog::{KnownModel, KNOWN_MODELS};
pub use classifier::{Classifier, OnnxClassifier};
pub use model::{model_exists, model_path, TaggerModel};
pub use rating::{ModelRatingStrategy, NoRating, RatingStrategy};
pub use registry::{LoadState, ModelLoader, ModelRegistry, OnnxModelLoader};
pub use selector::{select_tags, TagOutcome, TagSelector};
pub use vocabulary::Vocabulary;
