//! Classifier abstraction and the ONNX Runtime implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::{ImageError, TaggerError};

/// Something that turns a preprocessed batch into per-label scores.
///
/// Input is an NHWC `[N, size, size, 3]` tensor; output is one score vector
/// per image, each positionally aligned with the model vocabulary.
pub trait Classifier: Send + Sync {
    fn infer(&self, batch: &Array4<f32>, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, ImageError>;
}

/// Wraps an ONNX Runtime session for a tagger model.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
    /// Square input size declared by the model, if fixed.
    input_size: Option<u32>,
}

impl OnnxClassifier {
    /// Load a tagger model from an ONNX file.
    pub fn load(model_path: &Path, model: &str) -> Result<Self, TaggerError> {
        let session = Session::builder()
            .map_err(|e| TaggerError::ModelLoad {
                model: model.to_string(),
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| TaggerError::ModelLoad {
                model: model.to_string(),
                message: format!("Failed to load ONNX model: {e}"),
            })?;

        let input = session.inputs().first();
        let input_name = input
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "input".to_string());
        let input_size = input
            .and_then(|i| i.dtype().tensor_shape())
            .and_then(|shape| square_input_size(shape));

        tracing::debug!(
            "Loaded tagger from {:?} (input: {:?} {:?}, outputs: {:?})",
            model_path,
            input_name,
            input_size,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_size,
        })
    }

    /// Side length the model expects, when its input shape fixes one.
    pub fn input_size(&self) -> Option<u32> {
        self.input_size
    }
}

/// Side length of an NHWC `[N, size, size, 3]` input with fixed, equal sides.
fn square_input_size(dims: &[i64]) -> Option<u32> {
    match dims {
        [_, h, w, 3] if h == w && *h > 0 => u32::try_from(*h).ok(),
        _ => None,
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&self, batch: &Array4<f32>, paths: &[PathBuf]) -> Result<Vec<Vec<f32>>, ImageError> {
        let first_path = || paths.first().cloned().unwrap_or_default();
        let batch_size = batch.shape()[0];
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let shape: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = batch.iter().copied().collect();

        let input_value =
            Value::from_array((shape, flat_data)).map_err(|e| ImageError::Inference {
                path: first_path(),
                message: format!("Failed to create input tensor: {e}"),
            })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self.session.lock().map_err(|e| ImageError::Inference {
            path: first_path(),
            message: format!("Session lock poisoned: {e}"),
        })?;

        let outputs = session.run(inputs).map_err(|e| ImageError::Inference {
            path: first_path(),
            message: format!("ONNX inference failed: {e}"),
        })?;

        // Tagger exports have a single output: per-label sigmoid scores.
        let (_, predictions) = outputs.iter().next().ok_or_else(|| ImageError::Inference {
            path: first_path(),
            message: "Model produced no outputs".to_string(),
        })?;

        let (out_shape, data) =
            predictions
                .try_extract_tensor::<f32>()
                .map_err(|e| ImageError::Inference {
                    path: first_path(),
                    message: format!("Failed to extract prediction tensor: {e}"),
                })?;

        let labels = match out_shape.len() {
            1 => data.len() / batch_size,
            2 => out_shape[1] as usize,
            _ => {
                return Err(ImageError::Inference {
                    path: first_path(),
                    message: format!("Unexpected prediction shape: {:?}", out_shape),
                });
            }
        };
        if labels == 0 || data.len() < labels * batch_size {
            return Err(ImageError::Inference {
                path: first_path(),
                message: format!(
                    "Prediction tensor too small: {} values for {} images",
                    data.len(),
                    batch_size
                ),
            });
        }

        Ok(data
            .chunks(labels)
            .take(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_input_size() {
        assert_eq!(square_input_size(&[-1, 448, 448, 3]), Some(448));
        assert_eq!(square_input_size(&[1, 384, 384, 3]), Some(384));
        assert_eq!(square_input_size(&[-1, -1, -1, 3]), None);
        assert_eq!(square_input_size(&[1, 3, 448, 448]), None);
        assert_eq!(square_input_size(&[1, 448, 320, 3]), None);
    }
}
