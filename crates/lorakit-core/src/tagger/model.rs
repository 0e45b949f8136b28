//! A loaded tagger: classifier, vocabulary and input size.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use ndarray::Array4;

use crate::error::{ImageError, TaggerError};
use crate::types::TagScore;

use super::classifier::{Classifier, OnnxClassifier};
use super::preprocess::preprocess;
use super::vocabulary::Vocabulary;

/// Serialized classifier inside a model directory.
pub const MODEL_FILENAME: &str = "model.onnx";

/// Tag list inside a model directory.
pub const TAGS_FILENAME: &str = "selected_tags.csv";

/// Directory of a model: `vendor/name` becomes `<model_dir>/vendor_name`.
pub fn model_path(model_dir: &Path, model: &str) -> PathBuf {
    model_dir.join(model.replace(['/', '\\'], "_"))
}

/// Whether both artifacts of `model` are on disk.
pub fn model_exists(model_dir: &Path, model: &str) -> bool {
    let dir = model_path(model_dir, model);
    dir.join(MODEL_FILENAME).exists() && dir.join(TAGS_FILENAME).exists()
}

/// A tagger ready for inference. Never mutated after construction.
pub struct TaggerModel {
    id: String,
    classifier: Box<dyn Classifier>,
    vocabulary: Vocabulary,
    image_size: u32,
}

impl std::fmt::Debug for TaggerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggerModel")
            .field("id", &self.id)
            .field("labels", &self.vocabulary.len())
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl TaggerModel {
    /// Assemble a model and check that the vocabulary fits the classifier.
    ///
    /// Runs one blank image through the classifier and compares the output
    /// length against the vocabulary length.
    pub fn new(
        id: impl Into<String>,
        classifier: Box<dyn Classifier>,
        vocabulary: Vocabulary,
        image_size: u32,
    ) -> Result<Self, TaggerError> {
        let id = id.into();
        let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            image_size,
            image_size,
            image::Rgb([255, 255, 255]),
        ));
        let check = preprocess(&blank, image_size);
        let output = classifier
            .infer(&check, &[PathBuf::from("<integrity check>")])
            .map_err(|e| TaggerError::ModelLoad {
                model: id.clone(),
                message: format!("Integrity check inference failed: {e}"),
            })?;
        let output_len = output.first().map(Vec::len).unwrap_or(0);
        if output_len != vocabulary.len() {
            return Err(TaggerError::ModelIntegrity {
                model: id,
                vocabulary_len: vocabulary.len(),
                output_len,
            });
        }

        Ok(Self {
            id,
            classifier,
            vocabulary,
            image_size,
        })
    }

    /// Load a model from `<model_dir>/<vendor_name>/`.
    ///
    /// `image_size` is used only when the model's input shape doesn't fix one.
    pub fn load(model_dir: &Path, id: &str, image_size: u32) -> Result<Self, TaggerError> {
        let dir = model_path(model_dir, id);
        let onnx_path = dir.join(MODEL_FILENAME);
        let tags_path = dir.join(TAGS_FILENAME);
        for path in [&onnx_path, &tags_path] {
            if !path.exists() {
                return Err(TaggerError::ModelNotFound {
                    model: id.to_string(),
                    path: path.clone(),
                });
            }
        }

        tracing::info!("Loading tagger {} from {:?}", id, dir);
        let vocabulary = Vocabulary::load(&tags_path, id)?;
        let classifier = OnnxClassifier::load(&onnx_path, id)?;
        let image_size = match classifier.input_size() {
            Some(size) if size != image_size => {
                tracing::info!(
                    "Tagger {} declares a {}px input; using it instead of {}px",
                    id,
                    size,
                    image_size
                );
                size
            }
            Some(size) => size,
            None => image_size,
        };
        let model = Self::new(id, Box::new(classifier), vocabulary, image_size)?;
        tracing::info!("Tagger {} loaded successfully", id);
        Ok(model)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Square input size expected by the classifier.
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Score a stacked batch; one `TagScore` list per image.
    pub fn score_batch(
        &self,
        batch: &Array4<f32>,
        paths: &[PathBuf],
    ) -> Result<Vec<Vec<TagScore>>, ImageError> {
        let first_path = || paths.first().cloned().unwrap_or_default();
        let expected = [paths.len(), self.image_size as usize, self.image_size as usize, 3];
        if batch.shape() != expected {
            return Err(ImageError::Inference {
                path: first_path(),
                message: format!(
                    "Tensor shape {:?} does not match model input {:?}",
                    batch.shape(),
                    expected
                ),
            });
        }

        let raw = self.classifier.infer(batch, paths)?;
        if raw.len() != paths.len() {
            return Err(ImageError::Inference {
                path: first_path(),
                message: format!("Expected {} score vectors, got {}", paths.len(), raw.len()),
            });
        }

        raw.iter()
            .zip(paths)
            .map(|(scores, path)| {
                if scores.len() != self.vocabulary.len() {
                    return Err(ImageError::Inference {
                        path: path.clone(),
                        message: format!(
                            "Expected {} scores, got {}",
                            self.vocabulary.len(),
                            scores.len()
                        ),
                    });
                }
                Ok(self.vocabulary.scores(scores))
            })
            .collect()
    }

    /// Score a single preprocessed image.
    pub fn score(&self, tensor: &Array4<f32>, path: &Path) -> Result<Vec<TagScore>, ImageError> {
        let mut scores = self.score_batch(tensor, &[path.to_path_buf()])?;
        scores.pop().ok_or_else(|| ImageError::Inference {
            path: path.to_path_buf(),
            message: "Classifier returned no scores".to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedClassifier;
    use super::*;

    #[test]
    fn test_integrity_mismatch_is_fatal() {
        let vocab = Vocabulary::from_labels(["1girl", "smile", "solo"]);
        let err = TaggerModel::new(
            "test/model",
            Box::new(FixedClassifier::new(vec![0.5, 0.5])),
            vocab,
            16,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TaggerError::ModelIntegrity {
                vocabulary_len: 3,
                output_len: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_score_rejects_wrong_tensor_shape() {
        let vocab = Vocabulary::from_labels(["1girl"]);
        let model =
            TaggerModel::new("test/model", Box::new(FixedClassifier::new(vec![0.9])), vocab, 16)
                .unwrap();
        let wrong = Array4::<f32>::zeros((1, 8, 8, 3));
        let err = model.score(&wrong, Path::new("x.png")).unwrap_err();
        assert!(matches!(err, ImageError::Inference { .. }));

        let right = Array4::<f32>::zeros((1, 16, 16, 3));
        let scores = model.score(&right, Path::new("x.png")).unwrap();
        assert_eq!(scores[0].label, "1girl");
        assert_eq!(scores[0].confidence, 0.9);
    }

    #[test]
    fn test_load_missing_artifacts_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TaggerModel::load(dir.path(), "SmilingWolf/wd-vit-tagger-v3", 448).unwrap_err();
        match err {
            TaggerError::ModelNotFound { path, .. } => {
                assert!(path.ends_with("SmilingWolf_wd-vit-tagger-v3/model.onnx"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }
}
