use crate::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type TripId = i64;
pub type PhotoId = i64;
pub type GroupId = i64;
pub type RelationId = i64;
pub type SuggestionId = i64;
pub type MemberId = i64;
pub type ExpenseId = i64;

/// Display name given to a face group until someone renames it.
pub const UNNAMED_GROUP: &str = "Unknown";

/// Pixel bounds of a detected face, in the image's (top, right, bottom, left) convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceBox {
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }
}

/// Face encoding vector produced by the encoding source (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
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

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension are never comparable and are
    /// infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
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

/// One face reported by the encoding source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(flatten)]
    pub bounds: FaceBox,
    pub encoding: Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    /// Contact string of the owning account.
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripPhoto {
    pub id: PhotoId,
    pub trip_id: TripId,
    pub path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
}

/// A per-trip identity cluster.
///
/// The representative encoding is the first encoding ever assigned to the
/// group and anchors every later distance comparison; nothing updates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceGroup {
    pub id: GroupId,
    pub trip_id: TripId,
    pub name: String,
    pub thumbnail: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub representative: Embedding,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoFaceRelation {
    pub id: RelationId,
    pub photo_id: PhotoId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionState {
    Active,
    Dismissed,
}

/// An unordered pair of groups the matcher could not confidently separate.
///
/// Pairs are stored canonically with the lower group id first. Group ids
/// grow with creation, so `group_b` is always the group that was created
/// later and is the one folded away by a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub id: SuggestionId,
    pub trip_id: TripId,
    pub group_a: GroupId,
    pub group_b: GroupId,
    pub state: SuggestionState,
}

impl MergeSuggestion {
    pub fn is_active(&self) -> bool {
        self.state == SuggestionState::Active
    }

    /// Group that survives a merge.
    pub fn destination(&self) -> GroupId {
        self.group_a
    }

    /// Group whose photos are moved and which is then deleted.
    pub fn source(&self) -> GroupId {
        self.group_b
    }
}

/// Order a pair of group ids canonically (lower id first).
pub fn canonical_pair(a: GroupId, b: GroupId) -> (GroupId, GroupId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: MemberId,
    pub trip_id: TripId,
    pub name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub trip_id: TripId,
    pub amount: Money,
    pub category: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    /// `None` once the paying member has been removed from the trip.
    pub payer: Option<MemberId>,
}
