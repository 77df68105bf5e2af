use serde::{Deserialize, Serialize};

use crate::dao::models::{
    PairCompatibilityEntity, PersonalSketchEntity, PublicSubmissionEntity, ReportEntity,
};

/// Short personality sketch for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalSketch {
    pub member_id: String,
    pub sketch: String,
}

/// Compatibility estimate between two members, scored 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCompatibility {
    pub member_a: String,
    pub member_b: String,
    pub score: u8,
    pub reason: String,
}

/// Narrative its author agreed to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSubmission {
    pub member_id: String,
    pub content: String,
}

/// Terminal report produced by the analysis pipeline for a completed room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub scenario_id: String,
    pub personal: Vec<PersonalSketch>,
    pub pairs: Vec<PairCompatibility>,
    #[serde(default)]
    pub public_submissions: Vec<PublicSubmission>,
}

impl From<ReportEntity> for Report {
    fn from(value: ReportEntity) -> Self {
        Self {
            scenario_id: value.scenario_id,
            personal: value
                .personal
                .into_iter()
                .map(|entry| PersonalSketch {
                    member_id: entry.member_id,
                    sketch: entry.sketch,
                })
                .collect(),
            pairs: value
                .pairs
                .into_iter()
                .map(|entry| PairCompatibility {
                    member_a: entry.member_a,
                    member_b: entry.member_b,
                    score: entry.score,
                    reason: entry.reason,
                })
                .collect(),
            public_submissions: value
                .public_submissions
                .into_iter()
                .map(|entry| PublicSubmission {
                    member_id: entry.member_id,
                    content: entry.content,
                })
                .collect(),
        }
    }
}

impl From<Report> for ReportEntity {
    fn from(value: Report) -> Self {
        Self {
            scenario_id: value.scenario_id,
            personal: value
                .personal
                .into_iter()
                .map(|entry| PersonalSketchEntity {
                    member_id: entry.member_id,
                    sketch: entry.sketch,
                })
                .collect(),
            pairs: value
                .pairs
                .into_iter()
                .map(|entry| PairCompatibilityEntity {
                    member_a: entry.member_a,
                    member_b: entry.member_b,
                    score: entry.score,
                    reason: entry.reason,
                })
                .collect(),
            public_submissions: value
                .public_submissions
                .into_iter()
                .map(|entry| PublicSubmissionEntity {
                    member_id: entry.member_id,
                    content: entry.content,
                })
                .collect(),
        }
    }
}
