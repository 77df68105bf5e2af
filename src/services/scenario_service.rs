use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dto::scenario::{ReviewScenarioRequest, ScenarioView, SubmitScenarioRequest},
    error::ServiceError,
    state::{
        SharedState,
        scenario::{ModerationState, Scenario},
    },
};

/// Scenarios a room owner may pick from when starting.
pub async fn list_approved(state: &SharedState) -> Result<Vec<ScenarioView>, ServiceError> {
    list_by_state(state, ModerationState::Approved).await
}

/// Moderation queue; restricted to reviewers.
pub async fn list_pending(
    state: &SharedState,
    reviewer_id: &str,
) -> Result<Vec<ScenarioView>, ServiceError> {
    ensure_reviewer(state, reviewer_id)?;
    list_by_state(state, ModerationState::Pending).await
}

/// Scenarios authored by `submitter_id`, withdrawn ones excluded.
pub async fn list_mine(
    state: &SharedState,
    submitter_id: &str,
) -> Result<Vec<ScenarioView>, ServiceError> {
    let entities = state
        .storage(
            "list scenarios by submitter",
            state.scenarios().list_by_submitter(submitter_id.to_string()),
        )
        .await?;
    Ok(entities
        .into_iter()
        .map(|entity| ScenarioView::from(Scenario::from(entity)))
        .collect())
}

/// Propose a new scenario; it waits for review before it can be used.
pub async fn submit_scenario(
    state: &SharedState,
    submitter_id: &str,
    request: SubmitScenarioRequest,
) -> Result<ScenarioView, ServiceError> {
    request.validate()?;
    if submitter_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "submitter id must not be empty".into(),
        ));
    }

    let mut scenario = Scenario::new(
        request.title.trim().to_string(),
        request.description.trim().to_string(),
        submitter_id.to_string(),
    );
    scenario.version = state
        .storage("save scenario", state.scenarios().save(scenario.clone().into()))
        .await?;
    info!(scenario_id = %scenario.id, submitter_id, "scenario submitted for review");
    Ok(scenario.into())
}

/// Approve or reject a pending scenario.
pub async fn review_scenario(
    state: &SharedState,
    reviewer_id: &str,
    scenario_id: &str,
    request: ReviewScenarioRequest,
) -> Result<ScenarioView, ServiceError> {
    ensure_reviewer(state, reviewer_id)?;
    request.validate()?;

    let scenario = update_scenario(state, scenario_id, |scenario| {
        if !scenario.is_reviewable() {
            return Err(ServiceError::InvalidState(format!(
                "scenario `{scenario_id}` is {} and cannot be reviewed",
                scenario.state
            )));
        }
        scenario.apply_review(request.decision.clone());
        Ok(())
    })
    .await?;
    info!(
        scenario_id,
        reviewer_id,
        state = scenario.state.as_str(),
        "scenario reviewed"
    );
    Ok(scenario.into())
}

/// Rework a pending or rejected scenario; it goes back to the moderation queue.
pub async fn resubmit_scenario(
    state: &SharedState,
    submitter_id: &str,
    scenario_id: &str,
    request: SubmitScenarioRequest,
) -> Result<ScenarioView, ServiceError> {
    request.validate()?;
    let title = request.title.trim();
    let description = request.description.trim();

    let scenario = update_scenario(state, scenario_id, |scenario| {
        ensure_owner(scenario, submitter_id)?;
        if !scenario.is_editable() {
            return Err(ServiceError::InvalidState(format!(
                "scenario `{scenario_id}` is {} and can no longer be edited",
                scenario.state
            )));
        }
        scenario.resubmit(title.to_string(), description.to_string());
        Ok(())
    })
    .await?;
    info!(scenario_id, submitter_id, "scenario resubmitted");
    Ok(scenario.into())
}

/// Remove a scenario from the catalog. Rooms already started with it keep their reference.
pub async fn withdraw_scenario(
    state: &SharedState,
    submitter_id: &str,
    scenario_id: &str,
) -> Result<ScenarioView, ServiceError> {
    let scenario = update_scenario(state, scenario_id, |scenario| {
        ensure_owner(scenario, submitter_id)?;
        scenario.withdraw();
        Ok(())
    })
    .await?;
    info!(scenario_id, submitter_id, "scenario withdrawn");
    Ok(scenario.into())
}

async fn list_by_state(
    state: &SharedState,
    moderation: ModerationState,
) -> Result<Vec<ScenarioView>, ServiceError> {
    let entities = state
        .storage(
            "list scenarios by state",
            state.scenarios().list_by_state(moderation),
        )
        .await?;
    Ok(entities
        .into_iter()
        .map(|entity| ScenarioView::from(Scenario::from(entity)))
        .collect())
}

fn ensure_reviewer(state: &SharedState, user_id: &str) -> Result<(), ServiceError> {
    if state.review_policy().can_review(user_id) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "user `{user_id}` may not review scenarios"
        )))
    }
}

/// Withdrawn scenarios behave as if they never existed.
async fn load_visible(state: &SharedState, scenario_id: &str) -> Result<Scenario, ServiceError> {
    state
        .find_scenario(scenario_id)
        .await?
        .filter(|scenario| scenario.state != ModerationState::Withdrawn)
        .ok_or_else(|| ServiceError::ScenarioNotFound(format!("scenario `{scenario_id}` not found")))
}

fn ensure_owner(scenario: &Scenario, submitter_id: &str) -> Result<(), ServiceError> {
    if scenario.submitter_id != submitter_id {
        return Err(ServiceError::Unauthorized(format!(
            "scenario `{}` belongs to another user",
            scenario.id
        )));
    }
    Ok(())
}

/// Load, mutate and compare-and-swap a scenario, rerunning `apply` on a fresh copy whenever
/// another writer got there first.
async fn update_scenario<F>(
    state: &SharedState,
    scenario_id: &str,
    mut apply: F,
) -> Result<Scenario, ServiceError>
where
    F: FnMut(&mut Scenario) -> Result<(), ServiceError>,
{
    let attempts = state.config().conflict_retries + 1;

    for attempt in 1..=attempts {
        let mut scenario = load_visible(state, scenario_id).await?;
        apply(&mut scenario)?;

        let saved = state
            .storage("save scenario", state.scenarios().save(scenario.clone().into()))
            .await;
        match saved {
            Ok(version) => {
                scenario.version = version;
                return Ok(scenario);
            }
            Err(err) if err.is_conflict() => {
                debug!(scenario_id, attempt, "scenario changed concurrently; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(scenario_id, attempts, "giving up after repeated scenario conflicts");
    Err(ServiceError::Conflict {
        code: scenario_id.to_string(),
        attempts,
    })
}
