use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No room is stored under the code.
    #[error("room not found: {0}")]
    RoomNotFound(String),
    /// The room has left the waiting phase.
    #[error("room not joinable: {0}")]
    RoomNotJoinable(String),
    /// Every seat is taken.
    #[error("room full: {0}")]
    RoomFull(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Only the room owner may do this.
    #[error("not owner: {0}")]
    NotOwner(String),
    #[error("not a member: {0}")]
    NotMember(String),
    /// Narratives are write-once.
    #[error("already submitted: {0}")]
    AlreadySubmitted(String),
    /// Starting needs at least the quorum minimum.
    #[error("insufficient members: {0}")]
    InsufficientMembers(String),
    /// Counted in characters, not bytes.
    #[error("narrative too long: {length} characters (max {max})")]
    NarrativeTooLong { length: usize, max: usize },
    /// The catalog holds no approved scenario, so no room can be created.
    #[error("no approved scenarios available")]
    NoScenariosAvailable,
    /// Unknown, withdrawn, or (when starting a room) not approved.
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),
    /// Caller lacks the capability required by the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Reports only exist for completed rooms.
    #[error("room not completed: {0}")]
    RoomNotCompleted(String),
    /// The room is completed but the analysis pipeline has not delivered yet.
    #[error("report pending: {0}")]
    ReportPending(String),
    /// Every generated room code was already taken.
    #[error("no free room code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },
    /// Concurrent writers kept winning the compare-and-swap.
    ///
    /// `code` is the room code, or the scenario id for catalog writes.
    #[error("`{code}` changed concurrently; gave up after {attempts} attempts")]
    Conflict { code: String, attempts: usize },
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    StorageUnavailable(#[source] StorageError),
}

/// Coarse taxonomy of [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, rejected before any storage access.
    Validation,
    /// Deterministic business-rule rejection. Never retried.
    StateConflict,
    /// Raised at the repository boundary.
    Storage,
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::NarrativeTooLong { .. } | ServiceError::InvalidInput(_) => {
                ErrorClass::Validation
            }
            ServiceError::RoomNotFound(_)
            | ServiceError::ScenarioNotFound(_)
            | ServiceError::CodeSpaceExhausted { .. }
            | ServiceError::Conflict { .. }
            | ServiceError::StorageUnavailable(_) => ErrorClass::Storage,
            ServiceError::RoomNotJoinable(_)
            | ServiceError::RoomFull(_)
            | ServiceError::InvalidState(_)
            | ServiceError::NotOwner(_)
            | ServiceError::NotMember(_)
            | ServiceError::AlreadySubmitted(_)
            | ServiceError::InsufficientMembers(_)
            | ServiceError::NoScenariosAvailable
            | ServiceError::Unauthorized(_)
            | ServiceError::RoomNotCompleted(_)
            | ServiceError::ReportPending(_) => ErrorClass::StateConflict,
        }
    }

    /// Whether the caller may reasonably try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::StorageUnavailable(_)
                | ServiceError::Conflict { .. }
                | ServiceError::CodeSpaceExhausted { .. }
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { key, .. } => ServiceError::Conflict {
                code: key,
                attempts: 1,
            },
            other => ServiceError::StorageUnavailable(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        let message = err.to_string();
        match err {
            InvalidTransition::NotJoinable { .. } => ServiceError::RoomNotJoinable(message),
            InvalidTransition::Full { .. } => ServiceError::RoomFull(message),
            InvalidTransition::InvalidState { .. } => ServiceError::InvalidState(message),
            InvalidTransition::NotOwner { .. } => ServiceError::NotOwner(message),
            InvalidTransition::NotMember { .. } => ServiceError::NotMember(message),
            InvalidTransition::AlreadySubmitted { .. } => ServiceError::AlreadySubmitted(message),
            InvalidTransition::InsufficientMembers { .. } => {
                ServiceError::InsufficientMembers(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::room::RoomStatus;

    #[test]
    fn storage_conflict_maps_to_conflict() {
        let err: ServiceError = StorageError::Conflict {
            key: "ABCDEF".into(),
            expected_version: 3,
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict { ref code, .. } if code == "ABCDEF"));
        assert_eq!(err.class(), ErrorClass::Storage);
    }

    #[test]
    fn timeout_maps_to_unavailable() {
        let err: ServiceError = StorageError::Timeout {
            operation: "load room",
            after: Duration::from_millis(10),
        }
        .into();
        assert!(matches!(err, ServiceError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn business_rules_are_state_conflicts() {
        let err: ServiceError = InvalidTransition::InvalidState {
            code: "ABCDEF".into(),
            status: RoomStatus::Completed,
            event: "submit",
        }
        .into();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(err.class(), ErrorClass::StateConflict);
        assert!(!err.is_retryable());
    }
}
