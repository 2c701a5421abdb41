use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::models::domain::{Component, FeedbackKind, Listing, UserPreferences};

/// Retrieve, fuse and rank listings for a user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchListingsRequest {
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Free text for the keyword and semantic channels
    #[validate(length(max = 500))]
    #[serde(default)]
    pub query: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Rank a caller-supplied candidate set without retrieval
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RankRequest {
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub candidates: Vec<Listing>,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[validate(range(min = 1, max = 1000))]
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A user's reaction to a ranked result
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "listing_id", rename = "listingId")]
    pub listing_id: String,
    #[serde(default)]
    pub kind: Option<FeedbackKind>,
    /// Explicit signal; overrides the one implied by `kind`
    #[validate(range(min = -1.0, max = 1.0))]
    #[serde(default)]
    pub signal: Option<f64>,
    /// Per-component contributions from the result's breakdown
    #[serde(default)]
    pub contributions: BTreeMap<Component, f64>,
}

impl FeedbackRequest {
    pub fn resolved_signal(&self) -> Option<f64> {
        self.signal.or_else(|| self.kind.map(|k| k.signal()))
    }
}
