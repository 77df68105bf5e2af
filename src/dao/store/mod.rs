pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::dao::models::{RoomEntity, RoomMessageEntity, ScenarioEntity};
use crate::dao::storage::StorageResult;
use crate::state::{room::RoomStatus, scenario::ModerationState};

/// Display name returned when a user identifier cannot be resolved.
pub const UNKNOWN_MEMBER_NAME: &str = "unknown user";

/// Durable storage of room records with optimistic concurrency.
pub trait RoomStore: Send + Sync {
    /// Load a room by its code.
    fn load(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Compare-and-swap save.
    ///
    /// Succeeds only when the stored version equals `room.version` (0 meaning "absent") and
    /// returns the new version; otherwise fails with [`StorageError::Conflict`].
    ///
    /// [`StorageError::Conflict`]: crate::dao::storage::StorageError::Conflict
    fn save(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<u64>>;
    /// Whether a room with this code has ever been stored.
    fn exists(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Rooms the user is a member of, newest first.
    fn find_by_member(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Rooms currently in the given status, oldest first.
    fn find_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Completed rooms still waiting for a report, oldest first.
    fn find_pending_reports(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
}

/// Persistence for scenario templates and their moderation state.
pub trait ScenarioStore: Send + Sync {
    /// Compare-and-swap save with the same version contract as [`RoomStore::save`].
    fn save(&self, scenario: ScenarioEntity) -> BoxFuture<'static, StorageResult<u64>>;
    fn find(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ScenarioEntity>>>;
    /// Scenarios in the given moderation state, oldest first.
    fn list_by_state(
        &self,
        state: ModerationState,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>>;
    /// Non-withdrawn scenarios authored by `submitter_id`, oldest first.
    fn list_by_submitter(
        &self,
        submitter_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>>;
    fn count_by_state(&self, state: ModerationState) -> BoxFuture<'static, StorageResult<u64>>;
}

/// Append-only log of room chat messages.
pub trait RoomMessageStore: Send + Sync {
    fn append(&self, message: RoomMessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Every message of the room, oldest first.
    fn history(&self, room_code: String)
    -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>>;
    /// The `limit` most recent messages, returned oldest first.
    fn recent(
        &self,
        room_code: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>>;
    /// Messages created strictly after `after`, oldest first.
    fn after(
        &self,
        room_code: String,
        after: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>>;
}

/// Resolves user identifiers to display names.
pub trait MemberDirectory: Send + Sync {
    /// Never fails: misses and backend errors resolve to [`UNKNOWN_MEMBER_NAME`].
    fn resolve_name(&self, user_id: String) -> BoxFuture<'static, String>;
}
