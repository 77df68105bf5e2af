/// Broadcast hub for room changes.
pub mod events;
/// Per-room critical sections.
pub mod gate;
/// Cohort size rules.
pub mod quorum;
/// Terminal analysis report.
pub mod report;
/// Room aggregate and its invariants.
pub mod room;
/// Scenario templates and moderation.
pub mod scenario;
/// Pure room transition function.
pub mod state_machine;
/// Transition execution with notifications.
pub mod transitions;

use std::{future::Future, sync::Arc};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        storage::{StorageError, StorageResult},
        store::{
            MemberDirectory, RoomMessageStore, RoomStore, ScenarioStore,
            memory::{
                InMemoryRoomMessageStore, InMemoryRoomStore, InMemoryScenarioStore,
                StaticMemberDirectory,
            },
        },
    },
    error::ServiceError,
    services::{
        analysis::{AnalysisDispatcher, AnalysisQueue},
        review_policy::{AllowListPolicy, ReviewPolicy},
    },
    state::scenario::Scenario,
};

pub use self::events::RoomEventHub;
use self::{
    gate::RoomGates,
    room::Room,
    state_machine::{Plan, RoomEvent, RoomStateMachine},
};

pub type SharedState = Arc<AppState>;

/// External collaborators the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub rooms: Arc<dyn RoomStore>,
    pub scenarios: Arc<dyn ScenarioStore>,
    /// Room chat log.
    pub messages: Arc<dyn RoomMessageStore>,
    pub directory: Arc<dyn MemberDirectory>,
    pub review_policy: Arc<dyn ReviewPolicy>,
}

impl Collaborators {
    /// In-process stores for single-process deployments; reviewers come from the configuration.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            rooms: Arc::new(InMemoryRoomStore::new()),
            scenarios: Arc::new(InMemoryScenarioStore::new()),
            messages: Arc::new(InMemoryRoomMessageStore::new()),
            directory: Arc::new(StaticMemberDirectory::new()),
            review_policy: Arc::new(AllowListPolicy::new(config.reviewers.clone())),
        }
    }
}

/// Central application state: configuration, collaborators and per-room coordination.
pub struct AppState {
    config: AppConfig,
    machine: RoomStateMachine,
    rooms: Arc<dyn RoomStore>,
    scenarios: Arc<dyn ScenarioStore>,
    messages: Arc<dyn RoomMessageStore>,
    directory: Arc<dyn MemberDirectory>,
    review_policy: Arc<dyn ReviewPolicy>,
    events: RoomEventHub,
    analysis: AnalysisDispatcher,
    gates: RoomGates,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The returned queue carries completed room codes and must be handed to the analysis worker.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> (SharedState, AnalysisQueue) {
        let (analysis, queue) = AnalysisDispatcher::channel();
        let state = Arc::new(Self {
            machine: RoomStateMachine::new(config.quorum),
            events: RoomEventHub::new(config.event_capacity),
            rooms: collaborators.rooms,
            scenarios: collaborators.scenarios,
            messages: collaborators.messages,
            directory: collaborators.directory,
            review_policy: collaborators.review_policy,
            analysis,
            gates: RoomGates::new(),
            config,
        });
        (state, queue)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn machine(&self) -> &RoomStateMachine {
        &self.machine
    }

    pub fn rooms(&self) -> &Arc<dyn RoomStore> {
        &self.rooms
    }

    pub fn scenarios(&self) -> &Arc<dyn ScenarioStore> {
        &self.scenarios
    }

    pub fn messages(&self) -> &Arc<dyn RoomMessageStore> {
        &self.messages
    }

    pub fn directory(&self) -> &Arc<dyn MemberDirectory> {
        &self.directory
    }

    pub fn review_policy(&self) -> &Arc<dyn ReviewPolicy> {
        &self.review_policy
    }

    /// Broadcast hub for room change notifications.
    pub fn events(&self) -> &RoomEventHub {
        &self.events
    }

    pub fn analysis(&self) -> &AnalysisDispatcher {
        &self.analysis
    }

    pub fn gates(&self) -> &RoomGates {
        &self.gates
    }

    /// Bound a repository call by the configured storage timeout.
    pub async fn storage<T, Fut>(&self, operation: &'static str, call: Fut) -> StorageResult<T>
    where
        Fut: Future<Output = StorageResult<T>>,
    {
        let limit = self.config.storage_timeout;
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, after_ms = limit.as_millis() as u64, "storage call timed out");
                Err(StorageError::Timeout {
                    operation,
                    after: limit,
                })
            }
        }
    }

    /// Load the latest committed snapshot of a room.
    pub async fn load_room(&self, code: &str) -> Result<Room, ServiceError> {
        let entity = self
            .storage("load room", self.rooms.load(code.to_string()))
            .await?
            .ok_or_else(|| ServiceError::RoomNotFound(format!("room `{code}` not found")))?;
        Ok(Room::try_from(entity)?)
    }

    pub async fn find_scenario(&self, id: &str) -> Result<Option<Scenario>, ServiceError> {
        let entity = self
            .storage("load scenario", self.scenarios.find(id.to_string()))
            .await?;
        Ok(entity.map(Into::into))
    }

    /// Persist a brand-new room; fails with a conflict when the code is already taken.
    pub async fn insert_room(&self, mut room: Room) -> Result<Room, ServiceError> {
        let version = self.storage("save room", self.rooms.save(room.clone().into())).await?;
        room.set_version(version);
        Ok(room)
    }

    /// Apply `event` to the room as one atomic load-transition-save unit.
    ///
    /// Callers for the same code queue on its gate; a compare-and-swap conflict with another
    /// process reruns the whole transition against a fresh snapshot.
    pub async fn run_transition(&self, code: &str, event: RoomEvent) -> Result<Plan, ServiceError> {
        let _gate = self.gates.acquire(code).await;
        let attempts = self.config.conflict_retries + 1;

        for attempt in 1..=attempts {
            let room = self.load_room(code).await?;
            let mut plan = self.machine.plan(&room, event.clone())?;

            if plan.is_noop() {
                debug!(code, event = plan.event, "transition left room unchanged");
                return Ok(plan);
            }

            let saved = self
                .storage("save room", self.rooms.save(plan.room.clone().into()))
                .await;
            match saved {
                Ok(version) => {
                    plan.room.set_version(version);
                    info!(
                        code,
                        event = plan.event,
                        from = %plan.from,
                        to = %plan.to(),
                        effect = plan.effect.as_str(),
                        version,
                        "room transition applied"
                    );
                    return Ok(plan);
                }
                Err(err) if err.is_conflict() => {
                    debug!(code, event = plan.event, attempt, "room changed concurrently; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(code, event = event.name(), attempts, "giving up after repeated conflicts");
        Err(ServiceError::Conflict {
            code: code.to_string(),
            attempts,
        })
    }
}
