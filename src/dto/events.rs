use serde::Serialize;

use crate::{
    dto::format_system_time,
    state::{room::{Room, RoomStatus}, state_machine::TransitionEffect},
};

/// Published after every persisted room transition so connected clients can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomChangedEvent {
    pub code: String,
    pub status: RoomStatus,
    /// Stored version after the write.
    pub version: u64,
    /// What happened: `created`, `updated`, `started`, `completed`, `cancelled` or `report_attached`.
    pub kind: &'static str,
    pub at: String,
}

impl RoomChangedEvent {
    pub fn new(room: &Room, effect: TransitionEffect) -> Self {
        Self {
            code: room.code().to_string(),
            status: room.status(),
            version: room.version(),
            kind: effect.as_str(),
            at: format_system_time(room.updated_at()),
        }
    }
}
