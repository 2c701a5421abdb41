use thiserror::Error;

use crate::models::ChannelKind;

/// Conditions the ranking core recovers from locally.
///
/// None of these reach an end user as a failure: each has a degraded but
/// valid outcome (default weights, empty channel, empty result, skipped row,
/// unchanged weights).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RankingError {
    #[error("Invalid weight map: {0}")]
    InvalidWeightMap(String),

    #[error("Retrieval channel {channel} timed out after {timeout_ms}ms")]
    ChannelTimeout { channel: ChannelKind, timeout_ms: u64 },

    #[error("No candidates to rank")]
    EmptyCandidateSet,

    #[error("Malformed feedback event {id}: {reason}")]
    MalformedFeedbackEvent { id: String, reason: String },

    #[error("No feedback events in learner window")]
    LearnerNoData,
}
