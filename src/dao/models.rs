use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::{
    room::{CancelReason, RoomStatus},
    scenario::ModerationState,
};

/// Narrative submitted by one member, stored together with its publication flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionEntity {
    /// Member who wrote the narrative.
    pub member_id: String,
    /// Narrative text, immutable once stored.
    pub narrative: String,
    /// Whether the member opted the narrative into the public feed.
    pub public: bool,
}

/// Per-member sketch produced by the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonalSketchEntity {
    pub member_id: String,
    pub sketch: String,
}

/// Pairwise compatibility entry produced by the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairCompatibilityEntity {
    pub member_a: String,
    pub member_b: String,
    pub score: u8,
    pub reason: String,
}

/// Submission that its author agreed to publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicSubmissionEntity {
    pub member_id: String,
    pub content: String,
}

/// Terminal report attached to a completed room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntity {
    pub scenario_id: String,
    pub personal: Vec<PersonalSketchEntity>,
    pub pairs: Vec<PairCompatibilityEntity>,
    pub public_submissions: Vec<PublicSubmissionEntity>,
}

/// Aggregate room entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Primary key: the short join code.
    pub code: String,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Member who created the room.
    pub owner_id: String,
    /// Scenario chosen at start, absent while waiting.
    pub scenario_id: Option<String>,
    /// Member identifiers in join order.
    pub members: Vec<String>,
    /// Maximum number of members accepted by this room.
    pub capacity: usize,
    /// Submissions in submission order.
    pub submissions: Vec<SubmissionEntity>,
    /// Members who voted to cancel, in vote order.
    pub cancel_votes: Vec<String>,
    /// Why the room was cancelled, when it was.
    pub cancel_reason: Option<CancelReason>,
    /// Report attached by the analysis pipeline.
    pub report: Option<ReportEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the room was written.
    pub updated_at: SystemTime,
    /// Optimistic concurrency token; 0 means never persisted.
    pub version: u64,
}

/// Scenario template persisted by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioEntity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub submitter_id: String,
    pub state: ModerationState,
    pub reject_reason: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Optimistic concurrency token; 0 means never persisted.
    pub version: u64,
}

/// Chat line posted inside a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMessageEntity {
    pub id: String,
    pub room_code: String,
    pub sender_id: String,
    /// Display name resolved when the message was sent.
    pub sender_name: String,
    pub content: String,
    pub created_at: SystemTime,
}
