//! Assignment of face encodings to a trip's identity groups.

use crate::types::{Embedding, FaceGroup};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STRICT_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAYBE_THRESHOLD: f32 = 0.65;
pub const DEFAULT_MIN_FACE_HEIGHT: u32 = 40;

/// Distance thresholds and the small-face filter used while clustering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Maximum distance for an automatic match.
    pub strict: f32,
    /// Upper bound of the band that raises a merge suggestion.
    pub maybe: f32,
    /// Faces shorter than this (in pixels) are ignored.
    pub min_face_height: u32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            strict: DEFAULT_STRICT_THRESHOLD,
            maybe: DEFAULT_MAYBE_THRESHOLD,
            min_face_height: DEFAULT_MIN_FACE_HEIGHT,
        }
    }
}

/// Outcome of classifying one encoding against a group list.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Index into the group list of the accepted group.
    Matched { index: usize, distance: f32 },
    /// No confident match. `maybe` holds indices of groups in the suggestion
    /// band, in list order.
    New { maybe: Vec<usize> },
}

/// Strategy for placing a probe encoding among existing groups.
pub trait Matcher {
    fn classify(&self, probe: &Embedding, groups: &[FaceGroup]) -> Classification;
}

/// First-match policy: the earliest group within the strict threshold wins,
/// even when a later group is closer.
pub struct FirstMatch {
    pub thresholds: MatchThresholds,
}

impl FirstMatch {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }
}

impl Matcher for FirstMatch {
    fn classify(&self, probe: &Embedding, groups: &[FaceGroup]) -> Classification {
        let mut maybe = Vec::new();

        for (index, group) in groups.iter().enumerate() {
            let distance = probe.euclidean_distance(&group.representative);
            if distance <= self.thresholds.strict {
                return Classification::Matched { index, distance };
            }
            if distance <= self.thresholds.maybe {
                maybe.push(index);
            }
        }

        Classification::New { maybe }
    }
}
