use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    dto::{scenario::ScenarioView, validation::validate_not_blank},
    state::room::{CancelReason, RoomStatus},
};

/// Payload used to open a new room.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomRequest {
    /// Requested capacity; the configured maximum when omitted.
    #[serde(default)]
    pub max_members: Option<usize>,
}

/// Payload used by the owner to start a waiting room.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartRoomRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub scenario_id: String,
}

/// A member's narrative for the current scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitNarrativeRequest {
    pub narrative: String,
    /// Opt the narrative into the public feed once the report is published.
    #[serde(default)]
    pub public: bool,
}

/// Member identifier with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub id: String,
    pub name: String,
}

/// Room as seen by one viewer: other members' narratives are blanked.
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    pub code: String,
    pub status: RoomStatus,
    pub owner_id: String,
    pub capacity: usize,
    pub members: Vec<MemberView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioView>,
    /// Narrative per member who submitted; empty for everyone but the viewer.
    pub submissions: IndexMap<String, String>,
    pub submission_visibility: IndexMap<String, bool>,
    pub cancel_votes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    pub has_report: bool,
    pub created_at: String,
    pub updated_at: String,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_defaults_to_private() {
        let request: SubmitNarrativeRequest =
            serde_json::from_str(r#"{ "narrative": "I would wait." }"#).unwrap();
        assert!(!request.public);
    }

    #[test]
    fn blank_scenario_id_is_rejected() {
        let request = StartRoomRequest {
            scenario_id: "  ".into(),
        };
        assert!(request.validate().is_err());
    }
}
