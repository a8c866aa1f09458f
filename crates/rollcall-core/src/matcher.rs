//! Probe-vs-gallery comparison policies.

use crate::types::{Embedding, FaceRecord};
use serde::{Deserialize, Serialize};

/// Default Euclidean tolerance, matching the classic dlib face encoder.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Index into the gallery of the accepted record (if any).
    pub index: Option<usize>,
    /// Name of the accepted record (if any).
    pub name: Option<String>,
    /// Distance to the accepted record, or to the closest record when nothing
    /// was accepted. `None` for an empty gallery.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.index.is_some()
    }

    fn accepted(gallery: &[FaceRecord], index: usize, distance: f32) -> Self {
        Self {
            index: Some(index),
            name: Some(gallery[index].name.clone()),
            distance: Some(distance),
        }
    }

    fn rejected(closest: Option<f32>) -> Self {
        Self { index: None, name: None, distance: closest }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], tolerance: f32) -> MatchResult;
}

/// Accepts the first record in insertion order whose distance is within
/// tolerance, even when a later record is closer.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], tolerance: f32) -> MatchResult {
        let mut closest: Option<f32> = None;

        for (i, record) in gallery.iter().enumerate() {
            let distance = probe.distance(&record.embedding);
            if distance <= tolerance {
                return MatchResult::accepted(gallery, i, distance);
            }
            closest = Some(closest.map_or(distance, |c| c.min(distance)));
        }

        MatchResult::rejected(closest)
    }
}

/// Accepts the closest record if it is within tolerance.
pub struct NearestNeighbor;

impl Matcher for NearestNeighbor {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, record) in gallery.iter().enumerate() {
            let distance = probe.distance(&record.embedding);
            // Strict comparison keeps the earliest record on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance <= tolerance => {
                MatchResult::accepted(gallery, idx, distance)
            }
            other => MatchResult::rejected(other.map(|(_, d)| d)),
        }
    }
}

/// Configurable choice of [`Matcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    #[default]
    FirstMatch,
    NearestNeighbor,
}

impl MatchPolicy {
    pub fn matcher(self) -> &'static dyn Matcher {
        match self {
            MatchPolicy::FirstMatch => &FirstMatch,
            MatchPolicy::NearestNeighbor => &NearestNeighbor,
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-match" | "first" => Ok(MatchPolicy::FirstMatch),
            "nearest-neighbor" | "nearest" => Ok(MatchPolicy::NearestNeighbor),
            other => Err(format!(
                "unknown match policy {other:?} (expected first-match or nearest-neighbor)"
            )),
        }
    }
}

/// Matching knobs shared by enrollment and recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum Euclidean distance for two embeddings to count as the same person.
    pub tolerance: f32,
    pub policy: MatchPolicy,
    pub selector: crate::types::FaceSelector,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            policy: MatchPolicy::default(),
            selector: crate::types::FaceSelector::default(),
        }
    }
}
