use serde::{Deserialize, Serialize};
use std::fmt;

/// Label reported for a detected face that matches no enrolled record.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when they do not overlap.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Face embedding vector (128-d for dlib-style encoders, 512-d for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different length are never comparable and yield
    /// `f32::INFINITY`, so they can never fall inside a tolerance.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled reference face. Several records may share a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub name: String,
    pub embedding: Embedding,
}

impl FaceRecord {
    pub fn new(name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            name: name.into(),
            embedding,
        }
    }
}

/// Which detected face Enrollment keeps when an image holds several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceSelector {
    /// Whatever the detector returned first.
    #[default]
    First,
    /// Largest bounding-box area; ties go to the earlier face.
    Largest,
}

impl FaceSelector {
    /// Index of the selected face, or `None` for an empty slice.
    pub fn select(self, faces: &[BoundingBox]) -> Option<usize> {
        match self {
            FaceSelector::First => (!faces.is_empty()).then_some(0),
            FaceSelector::Largest => faces
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (i, face)| match best {
                    Some((_, area)) if area >= face.area() => best,
                    _ => Some((i, face.area())),
                })
                .map(|(i, _)| i),
        }
    }
}

impl std::str::FromStr for FaceSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(FaceSelector::First),
            "largest" => Ok(FaceSelector::Largest),
            other => Err(format!("unknown face selector {other:?} (expected first or largest)")),
        }
    }
}

/// Recognition label for one detected face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum FaceLabel {
    Known(String),
    Unknown,
}

impl FaceLabel {
    pub fn name(&self) -> Option<&str> {
        match self {
            FaceLabel::Known(name) => Some(name),
            FaceLabel::Unknown => None,
        }
    }
}

impl fmt::Display for FaceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceLabel::Known(name) => f.write_str(name),
            FaceLabel::Unknown => f.write_str(UNKNOWN_LABEL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_distance_identical() {
        let a = Embedding::new(vec![0.25, -0.5, 1.0]);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_length_mismatch_is_infinite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(a.distance(&b).is_infinite());
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_selector_first() {
        let faces = vec![make_bbox(0.0, 0.0, 10.0, 10.0), make_bbox(0.0, 0.0, 50.0, 50.0)];
        assert_eq!(FaceSelector::First.select(&faces), Some(0));
        assert_eq!(FaceSelector::First.select(&[]), None);
    }

    #[test]
    fn test_selector_largest() {
        let faces = vec![
            make_bbox(0.0, 0.0, 10.0, 10.0),
            make_bbox(0.0, 0.0, 50.0, 50.0),
            make_bbox(0.0, 0.0, 50.0, 50.0),
        ];
        // Ties keep the earlier face.
        assert_eq!(FaceSelector::Largest.select(&faces), Some(1));
        assert_eq!(FaceSelector::Largest.select(&[]), None);
    }

    #[test]
    fn test_selector_from_str() {
        assert_eq!("first".parse::<FaceSelector>(), Ok(FaceSelector::First));
        assert_eq!(" Largest ".parse::<FaceSelector>(), Ok(FaceSelector::Largest));
        assert!("biggest".parse::<FaceSelector>().is_err());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(FaceLabel::Known("Carol".into()).to_string(), "Carol");
        assert_eq!(FaceLabel::Unknown.to_string(), "Unknown");
    }
}
