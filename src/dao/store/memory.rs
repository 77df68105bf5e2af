//! In-process implementations of the collaborator stores, used by single-process deployments
//! and by the test suites.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use super::{MemberDirectory, RoomMessageStore, RoomStore, ScenarioStore, UNKNOWN_MEMBER_NAME};
use crate::{
    dao::{
        models::{RoomEntity, RoomMessageEntity, ScenarioEntity},
        storage::{StorageError, StorageResult},
    },
    state::{room::RoomStatus, scenario::ModerationState},
};

/// Record stored under a string key with an optimistic version.
trait Versioned {
    fn key(&self) -> &str;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Versioned for RoomEntity {
    fn key(&self) -> &str {
        &self.code
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Versioned for ScenarioEntity {
    fn key(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// Store `record` only if the current version matches its own (absent counts as 0).
fn compare_and_swap<T: Versioned>(map: &DashMap<String, T>, mut record: T) -> StorageResult<u64> {
    let expected_version = record.version();
    let conflict = |record: &T| StorageError::Conflict {
        key: record.key().to_string(),
        expected_version,
    };
    match map.entry(record.key().to_string()) {
        Entry::Occupied(mut slot) => {
            if slot.get().version() != expected_version {
                return Err(conflict(&record));
            }
            record.set_version(expected_version + 1);
            slot.insert(record);
        }
        Entry::Vacant(slot) => {
            if expected_version != 0 {
                return Err(conflict(&record));
            }
            record.set_version(1);
            slot.insert(record);
        }
    }
    Ok(expected_version + 1)
}

/// Room store keeping every record in a concurrent map.
#[derive(Clone, Default)]
pub struct InMemoryRoomStore {
    rooms: Arc<DashMap<String, RoomEntity>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn collect<F>(&self, keep: F) -> Vec<RoomEntity>
    where
        F: Fn(&RoomEntity) -> bool,
    {
        self.rooms
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl RoomStore for InMemoryRoomStore {
    fn load(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let room = self.rooms.get(&code).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(room) })
    }

    fn save(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let result = compare_and_swap(&self.rooms, room);
        Box::pin(async move { result })
    }

    fn exists(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let exists = self.rooms.contains_key(&code);
        Box::pin(async move { Ok(exists) })
    }

    fn find_by_member(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let mut rooms = self.collect(|room| room.members.contains(&user_id));
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Box::pin(async move { Ok(rooms) })
    }

    fn find_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let mut rooms = self.collect(|room| room.status == status);
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Box::pin(async move { Ok(rooms) })
    }

    fn find_pending_reports(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let mut rooms =
            self.collect(|room| room.status == RoomStatus::Completed && room.report.is_none());
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Box::pin(async move { Ok(rooms) })
    }
}

/// Scenario catalog storage kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryScenarioStore {
    scenarios: Arc<DashMap<String, ScenarioEntity>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, keep: F) -> Vec<ScenarioEntity>
    where
        F: Fn(&ScenarioEntity) -> bool,
    {
        let mut scenarios: Vec<ScenarioEntity> = self
            .scenarios
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        scenarios.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        scenarios
    }
}

impl ScenarioStore for InMemoryScenarioStore {
    fn save(&self, scenario: ScenarioEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let result = compare_and_swap(&self.scenarios, scenario);
        Box::pin(async move { result })
    }

    fn find(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ScenarioEntity>>> {
        let scenario = self.scenarios.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(scenario) })
    }

    fn list_by_state(
        &self,
        state: ModerationState,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>> {
        let scenarios = self.collect(|scenario| scenario.state == state);
        Box::pin(async move { Ok(scenarios) })
    }

    fn list_by_submitter(
        &self,
        submitter_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ScenarioEntity>>> {
        let scenarios = self.collect(|scenario| {
            scenario.submitter_id == submitter_id && scenario.state != ModerationState::Withdrawn
        });
        Box::pin(async move { Ok(scenarios) })
    }

    fn count_by_state(&self, state: ModerationState) -> BoxFuture<'static, StorageResult<u64>> {
        let count = self
            .scenarios
            .iter()
            .filter(|entry| entry.value().state == state)
            .count() as u64;
        Box::pin(async move { Ok(count) })
    }
}

/// Chat log kept per room in append order.
#[derive(Clone, Default)]
pub struct InMemoryRoomMessageStore {
    messages: Arc<DashMap<String, Vec<RoomMessageEntity>>>,
}

impl InMemoryRoomMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted<F>(&self, room_code: &str, keep: F) -> Vec<RoomMessageEntity>
    where
        F: Fn(&RoomMessageEntity) -> bool,
    {
        let mut messages: Vec<RoomMessageEntity> = self
            .messages
            .get(room_code)
            .map(|entry| entry.value().iter().filter(|m| keep(m)).cloned().collect())
            .unwrap_or_default();
        // Stable, so equal timestamps keep append order.
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        messages
    }
}

impl RoomMessageStore for InMemoryRoomMessageStore {
    fn append(&self, message: RoomMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.messages
            .entry(message.room_code.clone())
            .or_default()
            .push(message);
        Box::pin(async { Ok(()) })
    }

    fn history(
        &self,
        room_code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let messages = self.sorted(&room_code, |_| true);
        Box::pin(async move { Ok(messages) })
    }

    fn recent(
        &self,
        room_code: String,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let mut messages = self.sorted(&room_code, |_| true);
        let skip = messages.len().saturating_sub(limit);
        messages.drain(..skip);
        Box::pin(async move { Ok(messages) })
    }

    fn after(
        &self,
        room_code: String,
        after: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomMessageEntity>>> {
        let messages = self.sorted(&room_code, |message| message.created_at > after);
        Box::pin(async move { Ok(messages) })
    }
}

/// Member directory backed by a fixed map of display names.
#[derive(Clone, Default)]
pub struct StaticMemberDirectory {
    names: Arc<DashMap<String, String>>,
}

impl StaticMemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or rename a user.
    pub fn insert(&self, user_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(user_id.into(), name.into());
    }
}

impl MemberDirectory for StaticMemberDirectory {
    fn resolve_name(&self, user_id: String) -> BoxFuture<'static, String> {
        let name = self
            .names
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| UNKNOWN_MEMBER_NAME.to_string());
        Box::pin(async move { name })
    }
}
