use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{ReportEntity, RoomEntity, RoomMessageEntity, ScenarioEntity, SubmissionEntity},
    state::{
        room::{CancelReason, RoomStatus},
        scenario::ModerationState,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    code: String,
    status: RoomStatus,
    owner_id: String,
    scenario_id: Option<String>,
    members: Vec<String>,
    capacity: u32,
    #[serde(default)]
    submissions: Vec<SubmissionEntity>,
    #[serde(default)]
    cancel_votes: Vec<String>,
    #[serde(default)]
    cancel_reason: Option<CancelReason>,
    #[serde(default)]
    report: Option<ReportEntity>,
    created_at: DateTime,
    updated_at: DateTime,
    version: i64,
}

impl MongoRoomDocument {
    /// Store the document under the version that follows `entity.version`.
    pub fn next_version_of(entity: RoomEntity) -> Self {
        let mut document: Self = entity.into();
        document.version += 1;
        document
    }
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            status: value.status,
            owner_id: value.owner_id,
            scenario_id: value.scenario_id,
            members: value.members,
            capacity: value.capacity as u32,
            submissions: value.submissions,
            cancel_votes: value.cancel_votes,
            cancel_reason: value.cancel_reason,
            report: value.report,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            version: value.version as i64,
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            code: value.code,
            status: value.status,
            owner_id: value.owner_id,
            scenario_id: value.scenario_id,
            members: value.members,
            capacity: value.capacity as usize,
            submissions: value.submissions,
            cancel_votes: value.cancel_votes,
            cancel_reason: value.cancel_reason,
            report: value.report,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            version: value.version.max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScenarioDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    description: String,
    submitter_id: String,
    state: ModerationState,
    #[serde(default)]
    reject_reason: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
    #[serde(default)]
    version: i64,
}

impl MongoScenarioDocument {
    pub fn next_version_of(entity: ScenarioEntity) -> Self {
        let mut document: Self = entity.into();
        document.version += 1;
        document
    }
}

impl From<ScenarioEntity> for MongoScenarioDocument {
    fn from(value: ScenarioEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            submitter_id: value.submitter_id,
            state: value.state,
            reject_reason: value.reject_reason,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            version: value.version as i64,
        }
    }
}

impl From<MongoScenarioDocument> for ScenarioEntity {
    fn from(value: MongoScenarioDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            submitter_id: value.submitter_id,
            state: value.state,
            reject_reason: value.reject_reason,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            version: value.version.max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomMessageDocument {
    #[serde(rename = "_id")]
    id: String,
    room_code: String,
    sender_id: String,
    sender_name: String,
    content: String,
    created_at: DateTime,
}

impl From<RoomMessageEntity> for MongoRoomMessageDocument {
    fn from(value: RoomMessageEntity) -> Self {
        Self {
            id: value.id,
            room_code: value.room_code,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            content: value.content,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoRoomMessageDocument> for RoomMessageEntity {
    fn from(value: MongoRoomMessageDocument) -> Self {
        Self {
            id: value.id,
            room_code: value.room_code,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            content: value.content,
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// Subset of the user record needed to resolve display names.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoUserDocument {
    pub user_name: String,
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

pub fn versioned_doc_id(id: &str, version: u64) -> Document {
    doc! {"_id": id, "version": version as i64}
}
