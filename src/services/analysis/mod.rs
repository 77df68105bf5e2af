//! Hand-off of completed rooms to the report-producing pipeline.
//!
//! Completion only enqueues the room code; the worker reloads the room, calls the pipeline with
//! bounded exponential backoff and attaches the result. Rooms whose delivery failed are picked
//! up again by the sweeper, giving at-least-once delivery.

pub mod heuristic;
#[cfg(feature = "http-pipeline")]
pub mod http;

use std::{sync::Arc, time::Duration};

use dashmap::DashSet;
use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    services::report_service,
    state::{
        SharedState,
        report::Report,
        room::{Room, RoomStatus},
        scenario::Scenario,
    },
};

pub use self::heuristic::HeuristicAnalyzer;
#[cfg(feature = "http-pipeline")]
pub use self::http::HttpPipeline;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Failures reported by an [`AnalysisPipeline`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[cfg(feature = "http-pipeline")]
    #[error("failed to build analysis client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[cfg(feature = "http-pipeline")]
    #[error("failed to reach analysis pipeline at `{endpoint}`")]
    RequestSend {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("analysis pipeline answered with status {status}")]
    RequestStatus { status: u16 },
    #[cfg(feature = "http-pipeline")]
    #[error("failed to decode analysis report")]
    DecodeResponse {
        #[source]
        source: reqwest::Error,
    },
    /// The pipeline could not produce anything for this input.
    #[error("analysis rejected: {0}")]
    Rejected(String),
}

/// One member's narrative as handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberNarrative {
    pub member_id: String,
    pub narrative: String,
    pub public: bool,
}

/// Scenario context sent along with the narratives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioBrief {
    pub title: String,
    pub description: String,
}

/// Everything the pipeline needs to write a report for one completed room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub room_code: String,
    pub scenario_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioBrief>,
    /// Members in join order.
    pub members: Vec<String>,
    pub submissions: Vec<MemberNarrative>,
}

impl AnalysisRequest {
    pub fn from_room(room: &Room, scenario: Option<&Scenario>) -> Self {
        Self {
            room_code: room.code().to_string(),
            scenario_id: room.scenario_id().unwrap_or_default().to_string(),
            scenario: scenario.map(|scenario| ScenarioBrief {
                title: scenario.title.clone(),
                description: scenario.description.clone(),
            }),
            members: room.members().iter().cloned().collect(),
            submissions: room
                .submissions()
                .iter()
                .map(|(member_id, submission)| MemberNarrative {
                    member_id: member_id.clone(),
                    narrative: submission.narrative.clone(),
                    public: submission.public,
                })
                .collect(),
        }
    }

    /// Narrative of `member_id`, empty when they never submitted.
    pub fn narrative_of(&self, member_id: &str) -> &str {
        self.submissions
            .iter()
            .find(|entry| entry.member_id == member_id)
            .map(|entry| entry.narrative.as_str())
            .unwrap_or_default()
    }
}

/// Producer of room reports.
pub trait AnalysisPipeline: Send + Sync {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<Report, AnalysisError>>;
}

/// Result of [`AnalysisDispatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The room is already waiting for or undergoing analysis.
    AlreadyQueued,
    /// No worker is consuming the queue anymore.
    WorkerGone,
}

/// Sending side of the analysis queue, deduplicating codes that are in flight.
pub struct AnalysisDispatcher {
    sender: mpsc::UnboundedSender<String>,
    in_flight: DashSet<String>,
}

impl AnalysisDispatcher {
    pub fn channel() -> (Self, AnalysisQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                in_flight: DashSet::new(),
            },
            AnalysisQueue { receiver },
        )
    }

    /// Queue a completed room without waiting for the pipeline.
    pub fn enqueue(&self, code: &str) -> EnqueueOutcome {
        if !self.in_flight.insert(code.to_string()) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if self.sender.send(code.to_string()).is_err() {
            self.in_flight.remove(code);
            return EnqueueOutcome::WorkerGone;
        }
        EnqueueOutcome::Queued
    }

    /// Mark a room as no longer in flight so it can be queued again.
    pub fn finish(&self, code: &str) {
        self.in_flight.remove(code);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Receiving side of the analysis queue, owned by the worker.
pub struct AnalysisQueue {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl AnalysisQueue {
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Next queued code if one is immediately available.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

/// How a single delivery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Attached,
    /// Nothing to do: the room is gone, not completed or already reported.
    Skipped,
    /// Every pipeline attempt failed; the sweeper will retry later.
    Failed,
}

/// Consume the queue until it closes, delivering each room on its own task.
pub async fn run_worker(
    state: SharedState,
    mut queue: AnalysisQueue,
    pipeline: Arc<dyn AnalysisPipeline>,
) {
    while let Some(code) = queue.recv().await {
        let state = state.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            deliver(&state, pipeline.as_ref(), &code).await;
            state.analysis().finish(&code);
        });
    }
    info!("analysis queue closed; worker stopping");
}

/// Produce and attach the report of one completed room.
pub async fn deliver(
    state: &SharedState,
    pipeline: &dyn AnalysisPipeline,
    code: &str,
) -> DeliveryOutcome {
    let room = match state.load_room(code).await {
        Ok(room) => room,
        Err(err) => {
            warn!(code, error = %err, "failed to load room for analysis");
            return DeliveryOutcome::Failed;
        }
    };
    if room.status() != RoomStatus::Completed || room.report().is_some() {
        debug!(code, status = %room.status(), "room needs no analysis");
        return DeliveryOutcome::Skipped;
    }

    let scenario = match room.scenario_id() {
        Some(id) => state.find_scenario(id).await.unwrap_or_else(|err| {
            warn!(code, error = %err, "scenario lookup failed; analysing without it");
            None
        }),
        None => None,
    };
    let request = AnalysisRequest::from_room(&room, scenario.as_ref());

    let analysis = &state.config().analysis;
    let mut delay = analysis.initial_backoff;
    for attempt in 1..=analysis.max_attempts {
        match pipeline.analyze(request.clone()).await {
            Ok(report) => {
                return match report_service::attach_report(state, code, report).await {
                    Ok(true) => {
                        info!(code, attempt, "analysis report attached");
                        DeliveryOutcome::Attached
                    }
                    Ok(false) => DeliveryOutcome::Skipped,
                    Err(err) => {
                        warn!(code, error = %err, "failed to attach analysis report");
                        DeliveryOutcome::Failed
                    }
                };
            }
            Err(err) => {
                warn!(code, attempt, error = %err, "analysis attempt failed");
                if attempt < analysis.max_attempts {
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    warn!(
        code,
        attempts = analysis.max_attempts,
        "analysis failed permanently; leaving room for redelivery"
    );
    DeliveryOutcome::Failed
}
