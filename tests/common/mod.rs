#![allow(dead_code)]

use situation_room::{
    config::AppConfig,
    dto::{
        room::{CreateRoomRequest, StartRoomRequest},
        scenario::{ReviewScenarioRequest, SubmitScenarioRequest},
    },
    services::{analysis::AnalysisQueue, room_service, scenario_service},
    state::{AppState, Collaborators, SharedState, scenario::ReviewDecision},
};

pub const REVIEWER: &str = "moderator";

pub struct Harness {
    pub state: SharedState,
    pub queue: AnalysisQueue,
    pub scenario_id: String,
}

pub fn config() -> AppConfig {
    AppConfig {
        reviewers: vec![REVIEWER.to_string()],
        ..AppConfig::default()
    }
}

/// Fresh in-memory engine with one approved scenario in the catalog.
pub async fn harness() -> Harness {
    harness_with(config()).await
}

pub async fn harness_with(config: AppConfig) -> Harness {
    let collaborators = Collaborators::in_memory(&config);
    let (state, queue) = AppState::new(config, collaborators);
    let scenario_id = approved_scenario(&state, "Lifeboat").await;
    Harness {
        state,
        queue,
        scenario_id,
    }
}

pub async fn approved_scenario(state: &SharedState, title: &str) -> String {
    let submitted = scenario_service::submit_scenario(
        state,
        "author",
        SubmitScenarioRequest {
            title: title.to_string(),
            description: "The ship is sinking and the lifeboat holds four people.".to_string(),
        },
    )
    .await
    .unwrap();
    scenario_service::review_scenario(
        state,
        REVIEWER,
        &submitted.id,
        ReviewScenarioRequest {
            decision: ReviewDecision::Approve,
        },
    )
    .await
    .unwrap();
    submitted.id
}

/// Create a room owned by `owner` and join every other member.
pub async fn room_with(state: &SharedState, owner: &str, others: &[&str]) -> String {
    let view = room_service::create_room(state, owner, CreateRoomRequest::default())
        .await
        .unwrap();
    for member in others {
        room_service::join_room(state, &view.code, member)
            .await
            .unwrap();
    }
    view.code
}

/// Create, fill and start a room.
pub async fn started_room(
    state: &SharedState,
    scenario_id: &str,
    owner: &str,
    others: &[&str],
) -> String {
    let code = room_with(state, owner, others).await;
    room_service::start_room(
        state,
        &code,
        owner,
        StartRoomRequest {
            scenario_id: scenario_id.to_string(),
        },
    )
    .await
    .unwrap();
    code
}
