//! Per-viewer, read-only views of rooms.

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::time::timeout;
use tracing::warn;

use crate::{
    dao::store::UNKNOWN_MEMBER_NAME,
    dto::{
        format_system_time,
        room::{MemberView, RoomView},
        scenario::ScenarioView,
    },
    state::{SharedState, room::Room},
};

/// Submissions keyed by author, with every narrative but the viewer's blanked.
pub fn masked_submissions(room: &Room, viewer_id: &str) -> IndexMap<String, String> {
    room.submissions()
        .iter()
        .map(|(member_id, submission)| {
            let text = if member_id == viewer_id {
                submission.narrative.clone()
            } else {
                String::new()
            };
            (member_id.clone(), text)
        })
        .collect()
}

/// Build the view of `room` that `viewer_id` is allowed to see.
///
/// Never writes anything back; the stored room keeps every narrative. Directory and catalog
/// failures degrade the view instead of failing it, since callers get here after a commit.
pub async fn project_for_viewer(state: &SharedState, room: &Room, viewer_id: &str) -> RoomView {
    let members = resolve_members(state, room).await;
    let scenario = match room.scenario_id() {
        Some(id) => match state.find_scenario(id).await {
            Ok(scenario) => scenario.map(ScenarioView::from),
            Err(err) => {
                warn!(
                    code = room.code(),
                    scenario_id = id,
                    error = %err,
                    "scenario lookup failed; returning view without it"
                );
                None
            }
        },
        None => None,
    };

    RoomView {
        code: room.code().to_string(),
        status: room.status(),
        owner_id: room.owner_id().to_string(),
        capacity: room.capacity(),
        members,
        scenario_id: room.scenario_id().map(str::to_string),
        scenario,
        submissions: masked_submissions(room, viewer_id),
        submission_visibility: room
            .submissions()
            .iter()
            .map(|(member_id, submission)| (member_id.clone(), submission.public))
            .collect(),
        cancel_votes: room.cancel_votes().iter().cloned().collect(),
        cancel_reason: room.cancel_reason(),
        has_report: room.report().is_some(),
        created_at: format_system_time(room.created_at()),
        updated_at: format_system_time(room.updated_at()),
        version: room.version(),
    }
}

async fn resolve_members(state: &SharedState, room: &Room) -> Vec<MemberView> {
    let lookups = room.members().iter().map(|member_id| async move {
        MemberView {
            id: member_id.clone(),
            name: display_name(state, member_id).await,
        }
    });
    join_all(lookups).await
}

/// Directory name of `user_id`, or [`UNKNOWN_MEMBER_NAME`] when the lookup is too slow.
pub(crate) async fn display_name(state: &SharedState, user_id: &str) -> String {
    let limit = state.config().storage_timeout;
    match timeout(limit, state.directory().resolve_name(user_id.to_string())).await {
        Ok(name) => name,
        Err(_) => {
            warn!(user_id, "member name lookup timed out");
            UNKNOWN_MEMBER_NAME.to_string()
        }
    }
}
