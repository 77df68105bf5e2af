use futures::future::join_all;
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        room::{CreateRoomRequest, RoomView, StartRoomRequest, SubmitNarrativeRequest},
        validation::{normalize_room_code, validate_room_code},
    },
    error::ServiceError,
    services::{code_generator, projection::project_for_viewer, room_events::publish_room_changed},
    state::{
        SharedState,
        room::Room,
        scenario::ModerationState,
        state_machine::{RoomEvent, TransitionEffect},
        transitions::run_transition_with_broadcast,
    },
};

/// Open a new waiting room owned by `owner_id`.
pub async fn create_room(
    state: &SharedState,
    owner_id: &str,
    request: CreateRoomRequest,
) -> Result<RoomView, ServiceError> {
    ensure_user_id(owner_id)?;

    let quorum = state.config().quorum;
    let capacity = request.max_members.unwrap_or(quorum.max_members);
    if !quorum.accepts_capacity(capacity) {
        return Err(ServiceError::InvalidInput(format!(
            "room capacity must be between {} and {} (got {capacity})",
            quorum.min_members, quorum.max_members
        )));
    }

    let approved = state
        .storage(
            "count scenarios",
            state.scenarios().count_by_state(ModerationState::Approved),
        )
        .await?;
    if approved == 0 {
        return Err(ServiceError::NoScenariosAvailable);
    }

    let room = code_generator::allocate_room(state, owner_id, capacity).await?;
    info!(code = room.code(), owner_id, capacity, "room created");
    publish_room_changed(state, &room, TransitionEffect::Created);

    Ok(project_for_viewer(state, &room, owner_id).await)
}

/// Add `user_id` to a waiting room. Joining twice returns the room unchanged.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<RoomView, ServiceError> {
    ensure_user_id(user_id)?;
    let code = parse_room_code(code)?;

    let event = RoomEvent::Join {
        user_id: user_id.to_string(),
    };
    let plan = run_transition_with_broadcast(state, &code, event).await?;
    Ok(project_for_viewer(state, &plan.room, user_id).await)
}

/// Move a waiting room into progress with an approved scenario.
pub async fn start_room(
    state: &SharedState,
    code: &str,
    caller_id: &str,
    request: StartRoomRequest,
) -> Result<RoomView, ServiceError> {
    request.validate()?;
    let code = parse_room_code(code)?;
    let scenario_id = request.scenario_id.trim().to_string();

    match state.find_scenario(&scenario_id).await? {
        Some(scenario) if scenario.is_approved() => {}
        _ => {
            return Err(ServiceError::ScenarioNotFound(format!(
                "no approved scenario `{scenario_id}`"
            )));
        }
    }

    let event = RoomEvent::Start {
        caller_id: caller_id.to_string(),
        scenario_id,
    };
    let plan = run_transition_with_broadcast(state, &code, event).await?;
    Ok(project_for_viewer(state, &plan.room, caller_id).await)
}

/// Record a member's narrative; the last one completes the room.
pub async fn submit_narrative(
    state: &SharedState,
    code: &str,
    user_id: &str,
    request: SubmitNarrativeRequest,
) -> Result<RoomView, ServiceError> {
    // Any text is accepted, including an empty one; only the length is bounded.
    let max = state.config().max_narrative_chars;
    let length = request.narrative.chars().count();
    if length > max {
        return Err(ServiceError::NarrativeTooLong { length, max });
    }
    let code = parse_room_code(code)?;

    let event = RoomEvent::Submit {
        user_id: user_id.to_string(),
        narrative: request.narrative,
        public: request.public,
    };
    let plan = run_transition_with_broadcast(state, &code, event).await?;
    Ok(project_for_viewer(state, &plan.room, user_id).await)
}

/// Owner dissolves a room that has not completed.
pub async fn cancel_room(
    state: &SharedState,
    code: &str,
    caller_id: &str,
) -> Result<RoomView, ServiceError> {
    let code = parse_room_code(code)?;
    let event = RoomEvent::CancelByOwner {
        caller_id: caller_id.to_string(),
    };
    let plan = run_transition_with_broadcast(state, &code, event).await?;
    Ok(project_for_viewer(state, &plan.room, caller_id).await)
}

/// Register a member's vote to cancel; a strict majority cancels the room.
pub async fn vote_cancel(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<RoomView, ServiceError> {
    let code = parse_room_code(code)?;
    let event = RoomEvent::VoteCancel {
        user_id: user_id.to_string(),
    };
    let plan = run_transition_with_broadcast(state, &code, event).await?;
    Ok(project_for_viewer(state, &plan.room, user_id).await)
}

/// Latest committed snapshot of a room as seen by `viewer_id`.
pub async fn get_room(
    state: &SharedState,
    code: &str,
    viewer_id: &str,
) -> Result<RoomView, ServiceError> {
    let code = parse_room_code(code)?;
    let room = state.load_room(&code).await?;
    Ok(project_for_viewer(state, &room, viewer_id).await)
}

/// Every room `user_id` belongs to, newest first, masked for that user.
pub async fn get_history(state: &SharedState, user_id: &str) -> Result<Vec<RoomView>, ServiceError> {
    ensure_user_id(user_id)?;
    let entities = state
        .storage(
            "find rooms by member",
            state.rooms().find_by_member(user_id.to_string()),
        )
        .await?;
    let rooms = entities
        .into_iter()
        .map(Room::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(join_all(
        rooms
            .iter()
            .map(|room| project_for_viewer(state, room, user_id)),
    )
    .await)
}

/// Normalize a caller-supplied code and reject shapes no room can have.
pub(crate) fn parse_room_code(code: &str) -> Result<String, ServiceError> {
    let code = normalize_room_code(code);
    if let Err(err) = validate_room_code(&code) {
        let mut errors = ValidationErrors::new();
        errors.add("code", err);
        return Err(errors.into());
    }
    Ok(code)
}

fn ensure_user_id(user_id: &str) -> Result<(), ServiceError> {
    if user_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "user id must not be empty".into(),
        ));
    }
    Ok(())
}
