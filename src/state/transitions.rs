use crate::{
    error::ServiceError,
    services::room_events::{publish_room_changed, request_analysis},
    state::{
        SharedState,
        state_machine::{Plan, RoomEvent, TransitionEffect},
    },
};

/// Execute a room transition, then publish the change and trigger analysis on completion.
pub async fn run_transition_with_broadcast(
    state: &SharedState,
    code: &str,
    event: RoomEvent,
) -> Result<Plan, ServiceError> {
    let plan = state.run_transition(code, event).await?;
    if plan.is_noop() {
        return Ok(plan);
    }

    publish_room_changed(state, &plan.room, plan.effect);
    if plan.effect == TransitionEffect::Completed {
        request_analysis(state, plan.room.code());
    }
    Ok(plan)
}
