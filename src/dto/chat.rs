use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    dao::models::RoomMessageEntity,
    dto::{format_system_time, validation::validate_not_blank},
};

/// A chat line sent to the room.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub content: String,
}

/// Chat line as returned to members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomMessageView {
    pub id: String,
    pub room_code: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// RFC 3339; pass it back as the poll cursor.
    pub created_at: String,
}

impl From<RoomMessageEntity> for RoomMessageView {
    fn from(value: RoomMessageEntity) -> Self {
        Self {
            id: value.id,
            room_code: value.room_code,
            sender_id: value.sender_id,
            sender_name: value.sender_name,
            content: value.content,
            created_at: format_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_message_is_rejected() {
        let request = SendMessageRequest {
            content: "\t \n".into(),
        };
        assert!(request.validate().is_err());

        let request: SendMessageRequest =
            serde_json::from_str(r#"{ "content": "anyone awake?" }"#).unwrap();
        assert!(request.validate().is_ok());
    }
}
