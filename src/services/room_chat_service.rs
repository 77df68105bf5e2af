use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::RoomMessageEntity,
    dto::{
        chat::{RoomMessageView, SendMessageRequest},
        parse_system_time,
    },
    error::ServiceError,
    services::{projection::display_name, room_service::parse_room_code},
    state::{SharedState, room::Room},
};

/// Post a message to a room the sender belongs to. Chat closes once the room is terminal.
pub async fn send_message(
    state: &SharedState,
    code: &str,
    sender_id: &str,
    request: SendMessageRequest,
) -> Result<RoomMessageView, ServiceError> {
    request.validate()?;
    let content = request.content.trim();
    let max = state.config().chat.max_message_chars;
    let length = content.chars().count();
    if length > max {
        return Err(ServiceError::InvalidInput(format!(
            "message too long: {length} characters (max {max})"
        )));
    }
    let code = parse_room_code(code)?;

    let room = load_for_member(state, &code, sender_id).await?;
    if room.status().is_terminal() {
        return Err(ServiceError::InvalidState(format!(
            "room `{code}` is {} and its chat is closed",
            room.status()
        )));
    }

    let message = RoomMessageEntity {
        id: Uuid::new_v4().simple().to_string(),
        room_code: code.clone(),
        sender_id: sender_id.to_string(),
        sender_name: display_name(state, sender_id).await,
        content: content.to_string(),
        created_at: SystemTime::now(),
    };
    state
        .storage("append message", state.messages().append(message.clone()))
        .await?;
    debug!(code, sender_id, message_id = %message.id, "chat message sent");
    Ok(message.into())
}

/// Full chat history, oldest first. Members only, in any room status.
pub async fn get_messages(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<Vec<RoomMessageView>, ServiceError> {
    let code = parse_room_code(code)?;
    load_for_member(state, &code, user_id).await?;

    let messages = state
        .storage("load messages", state.messages().history(code))
        .await?;
    Ok(messages.into_iter().map(Into::into).collect())
}

/// Messages newer than the `after` cursor (an RFC 3339 `created_at` from a previous view).
///
/// Without a cursor the latest window of messages is returned, oldest first.
pub async fn poll_messages(
    state: &SharedState,
    code: &str,
    user_id: &str,
    after: Option<&str>,
) -> Result<Vec<RoomMessageView>, ServiceError> {
    let after = after
        .filter(|cursor| !cursor.trim().is_empty())
        .map(|cursor| {
            parse_system_time(cursor).map_err(|err| {
                ServiceError::InvalidInput(format!("invalid poll cursor `{cursor}`: {err}"))
            })
        })
        .transpose()?;
    let code = parse_room_code(code)?;
    load_for_member(state, &code, user_id).await?;

    let messages = match after {
        Some(after) => {
            state
                .storage("poll messages", state.messages().after(code, after))
                .await?
        }
        None => {
            let window = state.config().chat.poll_window;
            state
                .storage("load recent messages", state.messages().recent(code, window))
                .await?
        }
    };
    Ok(messages.into_iter().map(Into::into).collect())
}

async fn load_for_member(
    state: &SharedState,
    code: &str,
    user_id: &str,
) -> Result<Room, ServiceError> {
    let room = state.load_room(code).await?;
    if !room.is_member(user_id) {
        return Err(ServiceError::NotMember(format!(
            "user `{user_id}` is not a member of room `{code}`"
        )));
    }
    Ok(room)
}
