//! Image preprocessing for WD-style tagger models.
//!
//! The taggers expect:
//! - Input size: a fixed square (448×448 for the v3 family)
//! - Letterboxing: aspect ratio preserved, padded with white, never cropped
//! - Channel order: BGR
//! - Value range: raw 0–255 floats, no normalization
//! - Tensor layout: NHWC [batch, height, width, channels]

use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

use crate::error::ImageError;

/// Number of color channels (BGR).
pub const CHANNELS: usize = 3;

/// Padding color for the letterbox.
const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Decode an image file and preprocess it for inference.
pub fn load_and_preprocess(path: &Path, image_size: u32) -> Result<Array4<f32>, ImageError> {
    let image = decode(path)?;
    Ok(preprocess(&image, image_size))
}

/// Decode an image, detecting the format from its content.
pub fn decode(path: &Path) -> Result<DynamicImage, ImageError> {
    let reader = image::ImageReader::open(path)
        .map_err(|e| ImageError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot open file: {e}"),
        })?
        .with_guessed_format()
        .map_err(|e| ImageError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {e}"),
        })?;

    reader.decode().map_err(|e| ImageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Letterbox `image` into a white `image_size` square.
///
/// Alpha is dropped, not composited.
pub fn letterbox(image: &DynamicImage, image_size: u32) -> RgbImage {
    let resized = DynamicImage::ImageRgb8(image.to_rgb8())
        .resize(
            image_size,
            image_size,
            image::imageops::FilterType::Lanczos3,
        )
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(image_size, image_size, PAD_COLOR);
    let x = (image_size - resized.width()) / 2;
    let y = (image_size - resized.height()) / 2;
    image::imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));
    canvas
}

/// Preprocess a decoded image into a `[1, size, size, 3]` BGR tensor.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let canvas = letterbox(image, image_size);
    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, CHANNELS));

    // NHWC with a single image is exactly the RGB byte order with each
    // triple reversed, so walk the raw buffer instead of indexing per pixel.
    if let Some(data) = tensor.as_slice_mut() {
        for (dst, src) in data
            .chunks_exact_mut(CHANNELS)
            .zip(canvas.as_raw().chunks_exact(CHANNELS))
        {
            dst[0] = f32::from(src[2]);
            dst[1] = f32::from(src[1]);
            dst[2] = f32::from(src[0]);
        }
    }

    tensor
}

/// Stack single-image tensors into one `[N, size, size, 3]` batch.
///
/// Returns `None` when the tensors disagree on shape.
pub fn stack(tensors: &[Array4<f32>]) -> Option<Array4<f32>> {
    let first = tensors.first()?;
    let shape = first.shape();
    if tensors.iter().any(|t| t.shape() != shape) {
        return None;
    }
    let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
    ndarray::concatenate(ndarray::Axis(0), &views).ok()
}
