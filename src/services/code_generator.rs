use rand::{Rng, rng};
use tracing::{debug, warn};

use crate::{
    config::RoomCodeConfig,
    error::ServiceError,
    state::{SharedState, room::Room},
};

/// Characters used in room codes; `0/O` and `1/I` are left out.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Draw a random code of `length` characters from [`CODE_ALPHABET`].
pub fn random_code(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Store a new waiting room under a code nobody uses yet.
///
/// The existence check only filters obvious collisions; the insert itself is a
/// compare-and-swap against an absent record, so two creators racing for the same code
/// cannot both win.
pub async fn allocate_room(
    state: &SharedState,
    owner_id: &str,
    capacity: usize,
) -> Result<Room, ServiceError> {
    let RoomCodeConfig {
        length,
        max_attempts,
    } = state.config().room_code.clone();

    for attempt in 1..=max_attempts {
        let code = random_code(length);
        let taken = state
            .storage("check room code", state.rooms().exists(code.clone()))
            .await?;
        if taken {
            debug!(attempt, code, "room code already taken");
            continue;
        }

        let room = Room::new(code.clone(), owner_id.to_string(), capacity);
        match state.insert_room(room).await {
            Ok(room) => return Ok(room),
            Err(ServiceError::Conflict { .. }) => {
                debug!(attempt, code, "room code claimed concurrently");
            }
            Err(err) => return Err(err),
        }
    }

    warn!(max_attempts, "no free room code found");
    Err(ServiceError::CodeSpaceExhausted {
        attempts: max_attempts,
    })
}
