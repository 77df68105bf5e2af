use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::ScenarioEntity;

/// Number of characters kept by [`Scenario::summary`] before truncation.
pub const SUMMARY_CHARS: usize = 80;

/// Moderation status of a scenario template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationState {
    /// Waiting for a reviewer.
    Pending,
    /// Usable by rooms.
    Approved,
    /// Turned down; the submitter may resubmit.
    Rejected,
    /// Removed by its submitter; hidden from listings and review.
    Withdrawn,
}

impl ModerationState {
    /// Stable label, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationState::Pending => "pending",
            ModerationState::Approved => "approved",
            ModerationState::Rejected => "rejected",
            ModerationState::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for ModerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome chosen by a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    /// Reject, optionally telling the submitter why.
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Narrative prompt consumed when a room starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Random hex identifier assigned at submission.
    pub id: String,
    pub title: String,
    /// Prompt shown to every member once the room starts.
    pub description: String,
    pub submitter_id: String,
    pub state: ModerationState,
    /// Only set while the scenario is rejected.
    pub reject_reason: Option<String>,
    pub created_at: SystemTime,
    /// Last moderation or edit.
    pub updated_at: SystemTime,
    /// Version the scenario was loaded with; 0 until first stored.
    pub version: u64,
}

impl Scenario {
    /// New pending scenario with a random identifier.
    pub fn new(title: String, description: String, submitter_id: String) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            title,
            description,
            submitter_id,
            state: ModerationState::Pending,
            reject_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.state == ModerationState::Approved
    }

    /// Only pending scenarios can be reviewed.
    pub fn is_reviewable(&self) -> bool {
        self.state == ModerationState::Pending
    }

    /// Approved scenarios are frozen; pending and rejected ones may still be edited.
    pub fn is_editable(&self) -> bool {
        matches!(
            self.state,
            ModerationState::Pending | ModerationState::Rejected
        )
    }

    pub fn apply_review(&mut self, decision: ReviewDecision) {
        match decision {
            ReviewDecision::Approve => {
                self.state = ModerationState::Approved;
                self.reject_reason = None;
            }
            ReviewDecision::Reject { reason } => {
                self.state = ModerationState::Rejected;
                self.reject_reason = reason.filter(|reason| !reason.trim().is_empty());
            }
        }
        self.updated_at = SystemTime::now();
    }

    /// Replace the content and send the scenario back to the moderation queue.
    pub fn resubmit(&mut self, title: String, description: String) {
        self.title = title;
        self.description = description;
        self.state = ModerationState::Pending;
        self.reject_reason = None;
        self.updated_at = SystemTime::now();
    }

    pub fn withdraw(&mut self) {
        self.state = ModerationState::Withdrawn;
        self.updated_at = SystemTime::now();
    }

    /// Description shortened to [`SUMMARY_CHARS`] characters, cut at the last whitespace.
    pub fn summary(&self) -> String {
        summarize(&self.description, SUMMARY_CHARS)
    }
}

fn summarize(text: &str, limit: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(limit) else {
        return text.to_string();
    };

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };
    format!("{}...", head.trim_end())
}

impl From<ScenarioEntity> for Scenario {
    fn from(value: ScenarioEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            submitter_id: value.submitter_id,
            state: value.state,
            reject_reason: value.reject_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}

impl From<Scenario> for ScenarioEntity {
    fn from(value: Scenario) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            submitter_id: value.submitter_id,
            state: value.state,
            reject_reason: value.reject_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_is_kept() {
        assert_eq!(summarize("a short prompt", 80), "a short prompt");
    }

    #[test]
    fn long_description_is_cut_at_whitespace() {
        let text = "word ".repeat(30);
        let summary = summarize(&text, 12);
        assert_eq!(summary, "word word...");
    }

    #[test]
    fn unbroken_description_is_cut_hard() {
        let text = "x".repeat(100);
        let summary = summarize(&text, 80);
        assert_eq!(summary.chars().count(), 83);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let text = "é".repeat(100);
        let summary = summarize(&text, 80);
        assert_eq!(summary, format!("{}...", "é".repeat(80)));
    }

    #[test]
    fn rejection_reason_is_cleared_on_resubmit() {
        let mut scenario = Scenario::new("t".into(), "d".into(), "u1".into());
        scenario.apply_review(ReviewDecision::Reject {
            reason: Some("too vague".into()),
        });
        assert_eq!(scenario.state, ModerationState::Rejected);
        assert_eq!(scenario.reject_reason.as_deref(), Some("too vague"));

        scenario.resubmit("t2".into(), "d2".into());
        assert_eq!(scenario.state, ModerationState::Pending);
        assert!(scenario.reject_reason.is_none());
    }
}
