use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{format_system_time, validation::validate_not_blank},
    state::scenario::{ModerationState, ReviewDecision, Scenario},
};

/// Longest rejection reason a reviewer may attach.
const MAX_REJECT_REASON_CHARS: usize = 500;

/// Payload used to propose a new scenario or rework an existing one.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitScenarioRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(length(min = 1, max = 4000), custom(function = "validate_not_blank"))]
    pub description: String,
}

/// Reviewer verdict on a pending scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewScenarioRequest {
    #[serde(flatten)]
    pub decision: ReviewDecision,
}

impl Validate for ReviewScenarioRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let ReviewDecision::Reject {
            reason: Some(reason),
        } = &self.decision
            && reason.chars().count() > MAX_REJECT_REASON_CHARS
        {
            let mut err = ValidationError::new("reject_reason_length");
            err.message = Some(
                format!("Reject reason must be at most {MAX_REJECT_REASON_CHARS} characters")
                    .into(),
            );
            errors.add("reason", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Read-only projection of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioView {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Description shortened for list displays.
    pub summary: String,
    pub submitter_id: String,
    pub state: ModerationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: u64,
}

impl From<Scenario> for ScenarioView {
    fn from(value: Scenario) -> Self {
        Self {
            summary: value.summary(),
            id: value.id,
            title: value.title,
            description: value.description,
            submitter_id: value.submitter_id,
            state: value.state,
            reject_reason: value.reject_reason,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
            version: value.version,
        }
    }
}
