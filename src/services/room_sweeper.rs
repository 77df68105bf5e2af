use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::models::RoomEntity,
    error::ServiceError,
    services::room_events::request_analysis,
    state::{
        SharedState,
        room::{Room, RoomStatus},
        state_machine::RoomEvent,
        transitions::run_transition_with_broadcast,
    },
};

/// What one sweep pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Waiting rooms cancelled because nobody started them in time.
    pub expired: usize,
    /// Completed rooms handed to the analysis pipeline again.
    pub redelivered: usize,
}

/// Periodically expire abandoned rooms and redeliver missing reports.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match sweep_once(&state).await {
            Ok(report) if report != SweepReport::default() => {
                info!(
                    expired = report.expired,
                    redelivered = report.redelivered,
                    "room sweep finished"
                );
            }
            Ok(_) => debug!("room sweep found nothing to do"),
            Err(err) => warn!(error = %err, "room sweep failed"),
        }
    }
}

/// Run a single sweep pass.
pub async fn sweep_once(state: &SharedState) -> Result<SweepReport, ServiceError> {
    let now = SystemTime::now();
    let expired = expire_waiting_rooms(state, now).await?;
    let redelivered = redeliver_missing_reports(state, now).await?;
    Ok(SweepReport {
        expired,
        redelivered,
    })
}

async fn expire_waiting_rooms(state: &SharedState, now: SystemTime) -> Result<usize, ServiceError> {
    let ttl = state.config().waiting_room_ttl;
    let waiting = state
        .storage(
            "find waiting rooms",
            state.rooms().find_by_status(RoomStatus::Waiting),
        )
        .await?;
    let stale = older_than(waiting, now, ttl, Room::created_at);

    let mut expired = 0;
    for code in stale {
        match run_transition_with_broadcast(state, &code, RoomEvent::Expire).await {
            Ok(plan) if !plan.is_noop() => {
                info!(code, "waiting room expired");
                expired += 1;
            }
            Ok(_) => {}
            // Started or cancelled between the scan and the transition.
            Err(ServiceError::InvalidState(_)) => {
                debug!(code, "room left waiting before it could expire");
            }
            Err(err) => warn!(code, error = %err, "failed to expire waiting room"),
        }
    }
    Ok(expired)
}

async fn redeliver_missing_reports(
    state: &SharedState,
    now: SystemTime,
) -> Result<usize, ServiceError> {
    let grace = state.config().report_redelivery;
    let unreported = state
        .storage(
            "find rooms awaiting reports",
            state.rooms().find_pending_reports(),
        )
        .await?;
    let pending = older_than(unreported, now, grace, Room::updated_at);

    let mut redelivered = 0;
    for code in pending {
        debug!(code, "completed room still has no report; redelivering");
        request_analysis(state, &code);
        redelivered += 1;
    }
    Ok(redelivered)
}

/// Codes of the rooms whose reference timestamp is at least `age` old.
fn older_than(
    entities: Vec<RoomEntity>,
    now: SystemTime,
    age: Duration,
    since: fn(&Room) -> SystemTime,
) -> Vec<String> {
    let mut codes = Vec::new();
    for entity in entities {
        let room = match Room::try_from(entity) {
            Ok(room) => room,
            Err(err) => {
                warn!(error = %err, "skipping unreadable room during sweep");
                continue;
            }
        };
        let elapsed = now.duration_since(since(&room)).unwrap_or_default();
        if elapsed >= age {
            codes.push(room.code().to_string());
        }
    }
    codes
}
