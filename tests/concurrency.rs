mod common;

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use situation_room::{
    config::AppConfig,
    dao::{
        models::RoomEntity,
        storage::{StorageError, StorageResult},
        store::{
            RoomStore,
            memory::{InMemoryRoomStore, InMemoryScenarioStore},
        },
    },
    dto::room::{CreateRoomRequest, SubmitNarrativeRequest},
    error::ServiceError,
    services::{analysis::AnalysisQueue, room_service},
    state::{
        AppState, Collaborators, SharedState,
        room::{Room, RoomStatus},
    },
};

use common::{harness, started_room};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_exceed_capacity() {
    let harness = harness().await;
    let state = harness.state.clone();
    let created = room_service::create_room(&state, "owner", CreateRoomRequest { max_members: Some(4) })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for index in 0..12 {
        let state = state.clone();
        let code = created.code.clone();
        handles.push(tokio::spawn(async move {
            room_service::join_room(&state, &code, &format!("user-{index}")).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(ServiceError::RoomFull(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(joined, 3);

    let room = state.load_room(&created.code).await.unwrap();
    assert_eq!(room.members().len(), 4);
    assert!(state.gates().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_final_submissions_complete_exactly_once() {
    let mut harness = harness().await;
    let members = ["U2", "U3", "U4", "U5"];
    let code = started_room(&harness.state, &harness.scenario_id, "U1", &members).await;
    let mut events = harness.state.events().subscribe();

    let mut handles = Vec::new();
    for member in std::iter::once("U1").chain(members) {
        let state = harness.state.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            room_service::submit_narrative(
                &state,
                &code,
                member,
                SubmitNarrativeRequest {
                    narrative: format!("{member} keeps everyone calm"),
                    public: false,
                },
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let room = harness.state.load_room(&code).await.unwrap();
    assert_eq!(room.status(), RoomStatus::Completed);
    assert_eq!(room.submissions().len(), 5);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(kinds.iter().filter(|kind| **kind == "completed").count(), 1);
    assert_eq!(kinds.len(), 5);

    assert_eq!(harness.queue.try_recv().as_deref(), Some(code.as_str()));
    assert_eq!(harness.queue.try_recv(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_distinct_codes() {
    let harness = harness().await;

    let mut handles = Vec::new();
    for index in 0..16 {
        let state = harness.state.clone();
        handles.push(tokio::spawn(async move {
            room_service::create_room(&state, &format!("owner-{index}"), CreateRoomRequest::default())
                .await
        }));
    }

    let mut codes = HashSet::new();
    for handle in handles {
        let view = handle.await.unwrap().unwrap();
        assert_eq!(view.code.len(), harness.state.config().room_code.length);
        codes.insert(view.code);
    }
    assert_eq!(codes.len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_below_capacity_are_all_kept() {
    let harness = harness().await;
    let state = harness.state.clone();
    let created = room_service::create_room(&state, "owner", CreateRoomRequest::default())
        .await
        .unwrap();

    let users: Vec<String> = (0..6).map(|index| format!("user-{index}")).collect();
    let mut handles = Vec::new();
    for user in users.clone() {
        let state = state.clone();
        let code = created.code.clone();
        handles.push(tokio::spawn(async move {
            room_service::join_room(&state, &code, &user).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let room = state.load_room(&created.code).await.unwrap();
    assert_eq!(room.members().len(), 7);
    assert!(users.iter().all(|user| room.is_member(user)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_pair_submissions_are_both_recorded() {
    for _ in 0..20 {
        let mut harness = harness().await;
        let code = started_room(&harness.state, &harness.scenario_id, "U1", &["U2"]).await;
        let mut events = harness.state.events().subscribe();

        let submit = |member: &'static str| {
            let state = harness.state.clone();
            let code = code.clone();
            tokio::spawn(async move {
                room_service::submit_narrative(
                    &state,
                    &code,
                    member,
                    SubmitNarrativeRequest {
                        narrative: format!("{member} stays on the ship"),
                        public: true,
                    },
                )
                .await
            })
        };
        let (first, second) = tokio::join!(submit("U1"), submit("U2"));
        first.unwrap().unwrap();
        second.unwrap().unwrap();

        let room = harness.state.load_room(&code).await.unwrap();
        assert_eq!(room.status(), RoomStatus::Completed);
        assert!(room.has_submitted("U1") && room.has_submitted("U2"));

        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if event.kind == "completed" {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(harness.queue.try_recv().as_deref(), Some(code.as_str()));
        assert_eq!(harness.queue.try_recv(), None);
    }
}

/// Two engines over the same stores, as two worker processes would be. They share no gates,
/// so only the compare-and-swap keeps them apart.
fn twin_states(config: AppConfig) -> [(SharedState, AnalysisQueue); 2] {
    let rooms = InMemoryRoomStore::new();
    let scenarios = InMemoryScenarioStore::new();
    [(), ()].map(|_| {
        let collaborators = Collaborators {
            rooms: Arc::new(rooms.clone()),
            scenarios: Arc::new(scenarios.clone()),
            ..Collaborators::in_memory(&config)
        };
        AppState::new(config.clone(), collaborators)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn joins_from_two_processes_respect_capacity() {
    let [(first, _), (second, _)] = twin_states(common::config());
    common::approved_scenario(&first, "Lifeboat").await;
    let created = room_service::create_room(&first, "owner", CreateRoomRequest { max_members: Some(4) })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for index in 0..12 {
        let state = if index % 2 == 0 { first.clone() } else { second.clone() };
        let code = created.code.clone();
        handles.push(tokio::spawn(async move {
            room_service::join_room(&state, &code, &format!("user-{index}")).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(ServiceError::RoomFull(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(joined, 3);

    let room = second.load_room(&created.code).await.unwrap();
    assert_eq!(room.members().len(), 4);
    assert_eq!(room.version(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submissions_from_two_processes_complete_once() {
    let [(first, mut first_queue), (second, mut second_queue)] = twin_states(common::config());
    let scenario_id = common::approved_scenario(&first, "Lifeboat").await;
    let members = ["U2", "U3", "U4", "U5"];
    let code = started_room(&first, &scenario_id, "U1", &members).await;

    let mut handles = Vec::new();
    for (index, member) in std::iter::once("U1").chain(members).enumerate() {
        let state = if index % 2 == 0 { first.clone() } else { second.clone() };
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            room_service::submit_narrative(
                &state,
                &code,
                member,
                SubmitNarrativeRequest {
                    narrative: format!("{member} rations the water"),
                    public: false,
                },
            )
            .await
        }));
    }

    let mut completed_by = 0;
    for handle in handles {
        let view = handle.await.unwrap().unwrap();
        if view.status == RoomStatus::Completed {
            completed_by += 1;
        }
    }
    assert_eq!(completed_by, 1);

    let room = first.load_room(&code).await.unwrap();
    assert_eq!(room.status(), RoomStatus::Completed);
    assert_eq!(room.submissions().len(), 5);

    let mut queued = Vec::new();
    while let Some(code) = first_queue.try_recv() {
        queued.push(code);
    }
    while let Some(code) = second_queue.try_recv() {
        queued.push(code);
    }
    assert_eq!(queued, vec![code]);
}

/// Store where some other writer always wins the race.
struct AlwaysOutraced {
    saves: AtomicUsize,
}

impl RoomStore for AlwaysOutraced {
    fn load(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let mut entity: RoomEntity = Room::new(code, "owner".into(), 8).into();
        entity.version = 1;
        Box::pin(async move { Ok(Some(entity)) })
    }

    fn save(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<u64>> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Err(StorageError::Conflict {
                key: room.code,
                expected_version: room.version,
            })
        })
    }

    fn exists(&self, _code: String) -> BoxFuture<'static, StorageResult<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn find_by_member(&self, _user_id: String) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn find_by_status(
        &self,
        _status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn find_pending_reports(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_conflicts_surface_after_bounded_reruns() {
    let config = AppConfig {
        conflict_retries: 2,
        ..common::config()
    };
    let store = Arc::new(AlwaysOutraced {
        saves: AtomicUsize::new(0),
    });
    let collaborators = Collaborators {
        rooms: store.clone(),
        ..Collaborators::in_memory(&config)
    };
    let (state, _queue) = AppState::new(config, collaborators);

    let err = room_service::join_room(&state, "STUCK1", "u2").await.unwrap_err();
    assert!(err.is_retryable());
    match err {
        ServiceError::Conflict { code, attempts } => {
            assert_eq!(code, "STUCK1");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    assert!(state.gates().is_empty());
}
