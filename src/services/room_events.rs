use tracing::{debug, info, warn};

use crate::{
    dto::events::RoomChangedEvent,
    services::analysis::EnqueueOutcome,
    state::{SharedState, room::Room, state_machine::TransitionEffect},
};

/// Notify subscribers that a room was written.
pub fn publish_room_changed(state: &SharedState, room: &Room, effect: TransitionEffect) {
    let event = RoomChangedEvent::new(room, effect);
    let delivered = state.events().publish(event);
    debug!(
        code = room.code(),
        kind = effect.as_str(),
        version = room.version(),
        delivered,
        "room change published"
    );
}

/// Hand a completed room to the analysis worker without waiting for it.
pub fn request_analysis(state: &SharedState, code: &str) {
    match state.analysis().enqueue(code) {
        EnqueueOutcome::Queued => info!(code, "room queued for analysis"),
        EnqueueOutcome::AlreadyQueued => debug!(code, "room already queued for analysis"),
        EnqueueOutcome::WorkerGone => {
            warn!(code, "analysis worker not running; room left for redelivery")
        }
    }
}
