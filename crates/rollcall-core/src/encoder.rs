//! Face detection + encoding backend seam.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("encoder backend: {0}")]
    Backend(String),
}

/// Finds faces in an image and turns each into an embedding.
///
/// `detect` order is whatever the backend produces; callers that care pick a
/// face explicitly (see [`crate::FaceSelector`]).
pub trait FaceEncoder {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError>;

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError>;
}

/// SCRFD detection + ArcFace recognition on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        Ok(self.detector.detect(image)?)
    }

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}

/// Decode JPEG/PNG (or any format `image` recognizes) into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, EncoderError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn test_decode_png_roundtrip() {
        let source = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        source.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EncoderError::Decode(_)));
    }

    #[test]
    fn test_load_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxFaceEncoder::load(dir.path()).err().unwrap();
        assert!(matches!(err, EncoderError::Detector(DetectorError::ModelNotFound(_))));
    }
}
