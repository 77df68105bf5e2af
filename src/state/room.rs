use std::{fmt, time::SystemTime};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    dao::{
        models::{RoomEntity, SubmissionEntity},
        storage::StorageError,
    },
    state::report::{PublicSubmission, Report},
};

/// Identifier of a user as issued by the (external) user directory.
pub type UserId = String;

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    /// Accepting members; no scenario chosen yet.
    Waiting,
    /// Scenario chosen; members are writing their narratives.
    InProgress,
    /// Every member submitted. Terminal.
    Completed,
    /// Cancelled by the owner, a majority vote or expiry. Terminal.
    Cancelled,
}

impl RoomStatus {
    /// Terminal rooms never change again, except for report attachment.
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Completed | RoomStatus::Cancelled)
    }

    /// Stable label, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "WAITING",
            RoomStatus::InProgress => "IN_PROGRESS",
            RoomStatus::Completed => "COMPLETED",
            RoomStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a room ended up cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The owner dissolved the room.
    Owner,
    /// A strict majority of members voted to cancel.
    Vote,
    /// The room stayed in the waiting state for too long.
    Expired,
}

/// A member's narrative together with their publication choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub narrative: String,
    pub public: bool,
}

/// Aggregate root of a situation-room session.
///
/// Fields are only mutated by the state machine; everything else reads through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub(crate) code: String,
    pub(crate) status: RoomStatus,
    pub(crate) owner_id: UserId,
    pub(crate) scenario_id: Option<String>,
    pub(crate) members: IndexSet<UserId>,
    pub(crate) capacity: usize,
    pub(crate) submissions: IndexMap<UserId, Submission>,
    pub(crate) cancel_votes: IndexSet<UserId>,
    pub(crate) cancel_reason: Option<CancelReason>,
    pub(crate) report: Option<Report>,
    pub(crate) created_at: SystemTime,
    pub(crate) updated_at: SystemTime,
    pub(crate) version: u64,
}

impl Room {
    /// A fresh waiting room whose only member is its owner.
    pub fn new(code: String, owner_id: UserId, capacity: usize) -> Self {
        let now = SystemTime::now();
        let mut members = IndexSet::new();
        members.insert(owner_id.clone());
        Self {
            code,
            status: RoomStatus::Waiting,
            owner_id,
            scenario_id: None,
            members,
            capacity,
            submissions: IndexMap::new(),
            cancel_votes: IndexSet::new(),
            cancel_reason: None,
            report: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Join code, also the storage key.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current lifecycle phase.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Member who created the room; always a member.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Set once the room starts.
    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }

    /// Members in join order.
    pub fn members(&self) -> &IndexSet<UserId> {
        &self.members
    }

    /// Seats fixed at creation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Submissions in submission order, keyed by author.
    pub fn submissions(&self) -> &IndexMap<UserId, Submission> {
        &self.submissions
    }

    /// Members who voted to cancel, in vote order.
    pub fn cancel_votes(&self) -> &IndexSet<UserId> {
        &self.cancel_votes
    }

    /// Present only on cancelled rooms.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    /// Report attached after completion, if the pipeline has delivered.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Time of the last persisted change.
    pub fn updated_at(&self) -> SystemTime {
        self.updated_at
    }

    /// Version of the stored record this snapshot was loaded from (0 when never stored).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }

    /// Whether `user_id` already handed in a narrative.
    pub fn has_submitted(&self, user_id: &str) -> bool {
        self.submissions.contains_key(user_id)
    }

    /// Submissions whose authors opted into publication, in submission order.
    pub fn public_submissions(&self) -> Vec<PublicSubmission> {
        self.submissions
            .iter()
            .filter(|(_, submission)| submission.public)
            .map(|(member_id, submission)| PublicSubmission {
                member_id: member_id.clone(),
                content: submission.narrative.clone(),
            })
            .collect()
    }

    /// Check every aggregate invariant, describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.members.is_empty() {
            return Err("room has no members".into());
        }
        if self.members.len() > self.capacity {
            return Err(format!(
                "room holds {} members but its capacity is {}",
                self.members.len(),
                self.capacity
            ));
        }
        if !self.members.contains(&self.owner_id) {
            return Err(format!("owner `{}` is not a member", self.owner_id));
        }
        let needs_scenario = matches!(self.status, RoomStatus::InProgress | RoomStatus::Completed);
        let has_scenario = self.scenario_id.as_deref().is_some_and(|id| !id.is_empty());
        if needs_scenario != has_scenario {
            return Err(format!(
                "room in status {} must {}have a scenario",
                self.status,
                if needs_scenario { "" } else { "not " }
            ));
        }
        if let Some(voter) = self.cancel_votes.iter().find(|id| !self.members.contains(*id)) {
            return Err(format!("cancel vote from non-member `{voter}`"));
        }
        if let Some(author) = self.submissions.keys().find(|id| !self.members.contains(*id)) {
            return Err(format!("submission from non-member `{author}`"));
        }
        if self.report.is_some() && self.status != RoomStatus::Completed {
            return Err(format!("report attached to a room in status {}", self.status));
        }
        Ok(())
    }
}

impl TryFrom<RoomEntity> for Room {
    type Error = StorageError;

    fn try_from(value: RoomEntity) -> Result<Self, Self::Error> {
        let key = value.code.clone();

        let members_len = value.members.len();
        let members: IndexSet<UserId> = value.members.into_iter().collect();
        if members.len() != members_len {
            return Err(StorageError::corrupt(key, "duplicate member entries"));
        }

        let submissions_len = value.submissions.len();
        let submissions: IndexMap<UserId, Submission> = value
            .submissions
            .into_iter()
            .map(|entry| {
                (
                    entry.member_id,
                    Submission {
                        narrative: entry.narrative,
                        public: entry.public,
                    },
                )
            })
            .collect();
        if submissions.len() != submissions_len {
            return Err(StorageError::corrupt(key, "duplicate submission entries"));
        }

        let room = Self {
            code: value.code,
            status: value.status,
            owner_id: value.owner_id,
            scenario_id: value.scenario_id,
            members,
            capacity: value.capacity,
            submissions,
            cancel_votes: value.cancel_votes.into_iter().collect(),
            cancel_reason: value.cancel_reason,
            report: value.report.map(Into::into),
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        };

        room.check_invariants()
            .map_err(|reason| StorageError::corrupt(key, reason))?;
        Ok(room)
    }
}

impl From<Room> for RoomEntity {
    fn from(value: Room) -> Self {
        Self {
            code: value.code,
            status: value.status,
            owner_id: value.owner_id,
            scenario_id: value.scenario_id,
            members: value.members.into_iter().collect(),
            capacity: value.capacity,
            submissions: value
                .submissions
                .into_iter()
                .map(|(member_id, submission)| SubmissionEntity {
                    member_id,
                    narrative: submission.narrative,
                    public: submission.public,
                })
                .collect(),
            cancel_votes: value.cancel_votes.into_iter().collect(),
            cancel_reason: value.cancel_reason,
            report: value.report.map(Into::into),
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}
