//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB image to 640×640, decodes the three anchor-free stride
//! heads and applies NMS. Detections are returned most confident first.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting the image into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - new_w) / 2.0).floor(),
            pad_y: ((target as f32 - new_h) / 2.0).floor(),
        }
    }

    /// Letterboxed input coordinates → original image coordinates.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadIndices {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw tensors for one stride head.
struct HeadOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [HeadIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let heads = head_indices(&output_names);
        tracing::debug!(?heads, "SCRFD output tensor mapping");

        Ok(Self { session, heads })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in self.heads.iter().zip(SCRFD_STRIDES.iter()) {
            let tensor = |idx: usize, what: &'static str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };
            let head_outputs = HeadOutputs {
                scores: tensor(head.score, "scores")?,
                bboxes: tensor(head.bbox, "bboxes")?,
                kps: tensor(head.kps, "kps")?,
            };
            candidates.extend(decode_head(
                &head_outputs,
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces = non_max_suppression(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection complete");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a normalized NCHW tensor.
///
/// Padding uses the mean value so it normalizes to 0.0.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let size = SCRFD_INPUT_SIZE;
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, size);
    let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    let (ox, oy) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + ox) as usize, (y + oy) as usize);
        if tx >= side || ty >= side {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Locate the score/bbox/kps tensors for each stride.
///
/// Exports either name them `score_8`, `bbox_16`, `kps_32`, ... or use opaque
/// numeric names, in which case the standard positional layout applies:
/// [0-2] scores, [3-5] bboxes, [6-8] keypoints.
fn head_indices(names: &[String]) -> [HeadIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<HeadIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(HeadIndices {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(heads) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [heads[0], heads[1], heads[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            std::array::from_fn(|i| HeadIndices { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Decode candidate faces from one stride head.
fn decode_head(
    outputs: &HeadOutputs<'_>,
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    (0..anchors)
        .filter_map(|idx| {
            let score = *outputs.scores.get(idx)?;
            if score <= threshold {
                return None;
            }

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let d = outputs.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

            let landmarks = outputs.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step)
                })
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy NMS. Output is sorted by descending confidence.
fn non_max_suppression(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = non_max_suppression(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let detections = vec![
            make_bbox(0.0, 0.0, 10.0, 10.0, 0.8),
            make_bbox(50.0, 50.0, 10.0, 10.0, 0.9),
        ];
        let result = non_max_suppression(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(non_max_suppression(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let lb = Letterbox::fit(320, 240, SCRFD_INPUT_SIZE);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);

        let (x, y) = lb.unmap(100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y);
        assert!((x - 100.0).abs() < 0.1, "x: {x}");
        assert!((y - 50.0).abs() < 0.1, "y: {y}");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let image = RgbImage::from_pixel(320, 240, Rgb([255, 0, 128]));
        let (tensor, lb) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

        // Top padding row normalizes to 0.0.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);

        // Inside the letterboxed region channels keep their own values.
        let y = lb.pad_y as usize + 10;
        assert!((tensor[[0, 0, y, 10]] - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-2);
        assert!((tensor[[0, 1, y, 10]] - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-2);
    }

    #[test]
    fn test_decode_head_single_anchor() {
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE as usize / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];
        // Cell (x=2, y=1), first anchor.
        let idx = (grid + 2) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.95;

        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let outputs = HeadOutputs { scores: &scores, bboxes: &bboxes, kps: &kps };
        let faces = decode_head(&outputs, stride, &lb, SCRFD_CONFIDENCE_THRESHOLD);

        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_eq!((face.x, face.y), (64.0 - 32.0, 32.0 - 32.0));
        assert_eq!((face.width, face.height), (64.0, 64.0));
        assert_eq!(face.landmarks.unwrap()[0], (64.0, 32.0));
    }

    #[test]
    fn test_head_indices_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let heads = head_indices(&names);
        assert_eq!(heads[0], HeadIndices { score: 2, bbox: 0, kps: 1 });
        assert_eq!(heads[2], HeadIndices { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_head_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        let heads = head_indices(&names);
        assert_eq!(heads[1], HeadIndices { score: 1, bbox: 4, kps: 7 });
    }
}
