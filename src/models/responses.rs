use serde::{Deserialize, Serialize};

use crate::models::domain::{ChannelKind, RankedResult};

/// Response for the search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    /// True if any retrieval channel timed out or failed
    pub degraded: bool,
    #[serde(rename = "timedOutChannels")]
    pub timed_out_channels: Vec<ChannelKind>,
    #[serde(rename = "failedChannels")]
    pub failed_channels: Vec<ChannelKind>,
    #[serde(rename = "weightsVersion")]
    pub weights_version: i64,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

/// Response for the rank endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankResponse {
    pub results: Vec<RankedResult>,
    #[serde(rename = "weightsVersion")]
    pub weights_version: i64,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "weightsVersion")]
    pub weights_version: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

/// Record feedback response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    #[serde(rename = "eventId")]
    pub event_id: String,
}
