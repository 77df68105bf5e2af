use std::collections::BTreeSet;

use futures::future::BoxFuture;

use super::{AnalysisError, AnalysisPipeline, AnalysisRequest};
use crate::state::report::{PairCompatibility, PersonalSketch, Report};

/// Topics whose shared mention raises a pair's compatibility, with the fragments that reveal them.
const TOPICS: &[(&str, &[&str])] = &[
    ("responsibility", &["responsib", "duty"]),
    ("fairness", &["fair", "just"]),
    ("efficiency", &["efficien", "fast", "quick"]),
    ("emotion", &["emotion", "feel"]),
    ("long-term", &["long-term", "long term", "future"]),
    ("short-term", &["short-term", "short term", "now"]),
    ("rules", &["rule", "law"]),
    ("risk", &["risk", "danger"]),
    ("group", &["group", "everyone", "together"]),
    ("individual", &["individual", "myself", "personal"]),
];

/// Traits used for personal sketches.
const TRAITS: &[(&str, &[&str])] = &[
    ("disciplined", &["plan", "rule", "responsib"]),
    ("fairness-minded", &["fair", "balance", "just"]),
    ("empathetic", &["empath", "understand", "feel"]),
];

const BASE_SCORE: i32 = 50;
const SCORE_PER_SHARED_TOPIC: i32 = 10;

/// Keyword-based analyzer used when no remote pipeline is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Build the report synchronously.
    pub fn report(&self, request: &AnalysisRequest) -> Report {
        let personal = request
            .submissions
            .iter()
            .map(|entry| PersonalSketch {
                member_id: entry.member_id.clone(),
                sketch: sketch(&entry.narrative),
            })
            .collect();

        let mut pairs = Vec::new();
        for (index, member_a) in request.members.iter().enumerate() {
            for member_b in &request.members[index + 1..] {
                let topics_a = topics(request.narrative_of(member_a));
                let topics_b = topics(request.narrative_of(member_b));
                let shared: Vec<&str> = topics_a.intersection(&topics_b).copied().collect();
                pairs.push(PairCompatibility {
                    member_a: member_a.clone(),
                    member_b: member_b.clone(),
                    score: score(shared.len()),
                    reason: reason(&shared),
                });
            }
        }

        Report {
            scenario_id: request.scenario_id.clone(),
            personal,
            pairs,
            public_submissions: Vec::new(),
        }
    }
}

impl AnalysisPipeline for HeuristicAnalyzer {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<Report, AnalysisError>> {
        let report = self.report(&request);
        Box::pin(async move { Ok(report) })
    }
}

fn matches_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn topics(narrative: &str) -> BTreeSet<&'static str> {
    let lower = narrative.to_lowercase();
    TOPICS
        .iter()
        .filter(|(_, needles)| matches_any(&lower, needles))
        .map(|(topic, _)| *topic)
        .collect()
}

fn sketch(narrative: &str) -> String {
    let lower = narrative.to_lowercase();
    let traits: Vec<&str> = TRAITS
        .iter()
        .filter(|(_, needles)| matches_any(&lower, needles))
        .map(|(name, _)| *name)
        .collect();
    if traits.is_empty() {
        "Comes across as pragmatic".to_string()
    } else {
        format!("Comes across as {}", traits.join(", "))
    }
}

fn score(shared_topics: usize) -> u8 {
    let shared = i32::try_from(shared_topics).unwrap_or(i32::MAX / SCORE_PER_SHARED_TOPIC);
    (BASE_SCORE + shared * SCORE_PER_SHARED_TOPIC).clamp(0, 100) as u8
}

fn reason(shared: &[&str]) -> String {
    if shared.is_empty() {
        "Your narratives focus on different things; the contrast may offer each of you a new perspective."
            .to_string()
    } else {
        format!(
            "You both paid attention to {}, which suggests aligned values.",
            shared.join(", ")
        )
    }
}
