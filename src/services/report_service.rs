use tracing::debug;

use crate::{
    error::ServiceError,
    services::room_service::parse_room_code,
    state::{
        SharedState,
        report::Report,
        room::RoomStatus,
        state_machine::{RoomEvent, TransitionEffect},
        transitions::run_transition_with_broadcast,
    },
};

/// Report of a completed room, exactly as the pipeline delivered it.
pub async fn get_report(state: &SharedState, code: &str) -> Result<Report, ServiceError> {
    let code = parse_room_code(code)?;
    let room = state.load_room(&code).await?;

    if room.status() != RoomStatus::Completed {
        return Err(ServiceError::RoomNotCompleted(format!(
            "room `{code}` is {}",
            room.status()
        )));
    }

    room.report()
        .cloned()
        .ok_or_else(|| ServiceError::ReportPending(format!("room `{code}` has no report yet")))
}

/// Attach the pipeline's report to a completed room.
///
/// Returns `false` when a report was already attached; the first one wins.
pub async fn attach_report(
    state: &SharedState,
    code: &str,
    report: Report,
) -> Result<bool, ServiceError> {
    let code = parse_room_code(code)?;
    let plan = run_transition_with_broadcast(state, &code, RoomEvent::AttachReport(report)).await?;
    let attached = plan.effect == TransitionEffect::ReportAttached;
    if !attached {
        debug!(code, "report already attached; keeping the first one");
    }
    Ok(attached)
}
