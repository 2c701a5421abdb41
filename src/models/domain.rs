use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::RankingError;
use crate::core::explain::ReasonCode;

/// Apartment listing as handed over by the storage layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Monthly rent
    pub price: f64,
    #[serde(default)]
    pub bedrooms: Option<u8>,
    #[serde(rename = "sizeSqm", default)]
    pub size_sqm: Option<f64>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(rename = "commuteMinutes", default)]
    pub commute_minutes: Option<f64>,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(rename = "characterTags", default)]
    pub character_tags: BTreeSet<String>,
    #[serde(rename = "isVerified", default)]
    pub is_verified: Option<bool>,
    #[serde(rename = "photoCount", default)]
    pub photo_count: Option<u32>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub saves: u64,
    #[serde(default)]
    pub messages: u64,
}

impl Listing {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Commute tolerance relative to an anchor (usually the workplace)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommutePreference {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "preferredMinutes")]
    pub preferred_minutes: f64,
    #[serde(rename = "maxMinutes")]
    pub max_minutes: f64,
}

/// Relative importance of the four things users say they care about
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityWeights {
    #[serde(default = "default_priority")]
    pub price: f64,
    #[serde(default = "default_priority")]
    pub location: f64,
    #[serde(default = "default_priority")]
    pub amenities: f64,
    #[serde(default = "default_priority")]
    pub quality: f64,
}

fn default_priority() -> f64 { 0.25 }

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            price: default_priority(),
            location: default_priority(),
            amenities: default_priority(),
            quality: default_priority(),
        }
    }
}

/// Per-request user preferences, never persisted by the ranking core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(rename = "budgetMin", default)]
    pub budget_min: Option<f64>,
    #[serde(rename = "budgetMax", default)]
    pub budget_max: Option<f64>,
    #[serde(rename = "minBedrooms", default)]
    pub min_bedrooms: Option<u8>,
    #[serde(rename = "requiredAmenities", default)]
    pub required_amenities: BTreeSet<String>,
    #[serde(default)]
    pub commute: Option<CommutePreference>,
    #[serde(default)]
    pub priorities: PriorityWeights,
    /// Trait name -> affinity in [0, 1]
    #[serde(default)]
    pub personality: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub district: Option<String>,
}

/// The six scoring dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    ConstraintFit,
    PersonalFit,
    Accessibility,
    TrustQuality,
    MarketValue,
    Engagement,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::ConstraintFit,
        Component::PersonalFit,
        Component::Accessibility,
        Component::TrustQuality,
        Component::MarketValue,
        Component::Engagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::ConstraintFit => "constraintFit",
            Component::PersonalFit => "personalFit",
            Component::Accessibility => "accessibility",
            Component::TrustQuality => "trustQuality",
            Component::MarketValue => "marketValue",
            Component::Engagement => "engagement",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized [0, 1] sub-scores for one listing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    #[serde(rename = "constraintFit")]
    pub constraint_fit: f64,
    #[serde(rename = "personalFit")]
    pub personal_fit: f64,
    pub accessibility: f64,
    #[serde(rename = "trustQuality")]
    pub trust_quality: f64,
    #[serde(rename = "marketValue")]
    pub market_value: f64,
    pub engagement: f64,
}

impl ComponentScores {
    pub fn get(&self, component: Component) -> f64 {
        match component {
            Component::ConstraintFit => self.constraint_fit,
            Component::PersonalFit => self.personal_fit,
            Component::Accessibility => self.accessibility,
            Component::TrustQuality => self.trust_quality,
            Component::MarketValue => self.market_value,
            Component::Engagement => self.engagement,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::ALL.iter().map(move |c| (*c, self.get(*c)))
    }
}

/// Tolerance on the weight sum, both for validation and for learner output
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Blending coefficient per component; valid maps hold all six keys and sum to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BanditWeightMap(pub BTreeMap<Component, f64>);

impl BanditWeightMap {
    /// Fixed prior served before any feedback has been learned
    pub fn default_prior() -> Self {
        Self(BTreeMap::from([
            (Component::ConstraintFit, 0.30),
            (Component::PersonalFit, 0.15),
            (Component::Accessibility, 0.20),
            (Component::TrustQuality, 0.15),
            (Component::MarketValue, 0.12),
            (Component::Engagement, 0.08),
        ]))
    }

    /// Missing keys read as zero; callers validate first
    pub fn get(&self, component: Component) -> f64 {
        self.0.get(&component).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn validate(&self) -> Result<(), RankingError> {
        for component in Component::ALL {
            match self.0.get(&component) {
                None => {
                    return Err(RankingError::InvalidWeightMap(format!("missing {}", component)))
                }
                Some(w) if !w.is_finite() || *w < 0.0 || *w > 1.0 => {
                    return Err(RankingError::InvalidWeightMap(format!(
                        "{} has weight {}",
                        component, w
                    )))
                }
                Some(_) => {}
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RankingError::InvalidWeightMap(format!("weights sum to {}", sum)));
        }

        Ok(())
    }
}

impl Default for BanditWeightMap {
    fn default() -> Self {
        Self::default_prior()
    }
}

/// Beta posterior counters for one component
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub trials: f64,
    pub successes: f64,
}

impl ArmStats {
    /// Laplace-smoothed Beta(1, 1) posterior mean
    pub fn posterior_mean(&self) -> f64 {
        (self.successes + 1.0) / (self.trials + 2.0)
    }
}

/// Versioned, published weights; readers hold an `Arc` to one of these
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub version: i64,
    pub weights: BanditWeightMap,
    #[serde(default)]
    pub stats: BTreeMap<Component, ArmStats>,
    #[serde(rename = "windowStart")]
    pub window_start: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "windowEnd")]
    pub window_end: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "eventsUsed")]
    pub events_used: u64,
    #[serde(rename = "eventsSkipped")]
    pub events_skipped: u64,
    #[serde(rename = "publishedAt")]
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl WeightSnapshot {
    /// Version 0: the built-in prior
    pub fn initial() -> Self {
        Self {
            version: 0,
            weights: BanditWeightMap::default_prior(),
            stats: BTreeMap::new(),
            window_start: None,
            window_end: None,
            events_used: 0,
            events_skipped: 0,
            published_at: chrono::DateTime::<chrono::Utc>::default(),
        }
    }
}

/// User reaction to a shown result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackKind {
    Helpful,
    NotHelpful,
    Click,
    Save,
    Contact,
    Dismiss,
}

impl FeedbackKind {
    pub fn signal(&self) -> f64 {
        match self {
            FeedbackKind::Helpful => 1.0,
            FeedbackKind::NotHelpful => -1.0,
            FeedbackKind::Click => 0.3,
            FeedbackKind::Save => 0.8,
            FeedbackKind::Contact => 1.0,
            FeedbackKind::Dismiss => -0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Helpful => "helpful",
            FeedbackKind::NotHelpful => "notHelpful",
            FeedbackKind::Click => "click",
            FeedbackKind::Save => "save",
            FeedbackKind::Contact => "contact",
            FeedbackKind::Dismiss => "dismiss",
        }
    }
}

/// Feedback row as stored; may be corrupt, so the learner validates it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: uuid::Uuid,
    #[serde(rename = "listingId")]
    pub listing_id: String,
    pub kind: Option<String>,
    pub signal: f64,
    pub contributions: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Validated feedback event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: uuid::Uuid,
    #[serde(rename = "listingId")]
    pub listing_id: String,
    pub signal: f64,
    /// weight x component score at ranking time
    pub contributions: BTreeMap<Component, f64>,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<&FeedbackRecord> for FeedbackEvent {
    type Error = RankingError;

    fn try_from(record: &FeedbackRecord) -> Result<Self, Self::Error> {
        let malformed = |reason: String| RankingError::MalformedFeedbackEvent {
            id: record.id.to_string(),
            reason,
        };

        if !record.signal.is_finite() {
            return Err(malformed(format!("signal is {}", record.signal)));
        }

        let contributions: BTreeMap<Component, f64> =
            serde_json::from_value(record.contributions.clone())
                .map_err(|e| malformed(format!("contributions: {}", e)))?;

        if let Some((component, value)) = contributions
            .iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(malformed(format!("{} contribution is {}", component, value)));
        }

        Ok(Self {
            id: record.id,
            listing_id: record.listing_id.clone(),
            // "Roughly" -1..1 upstream
            signal: record.signal.clamp(-1.0, 1.0),
            contributions,
            created_at: record.created_at,
        })
    }
}

/// One component's share of a final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentContribution {
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Ranked, explained listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    /// 0-100, two decimals
    pub score: f64,
    pub reasons: Vec<String>,
    #[serde(rename = "reasonCodes")]
    pub reason_codes: Vec<ReasonCode>,
    pub breakdown: BTreeMap<Component, ComponentContribution>,
    #[serde(rename = "retrievalCodes", default)]
    pub retrieval_codes: Vec<ReasonCode>,
}

impl RankedResult {
    pub fn component_scores(&self) -> ComponentScores {
        let score = |c: Component| self.breakdown.get(&c).map(|b| b.score).unwrap_or(0.5);
        ComponentScores {
            constraint_fit: score(Component::ConstraintFit),
            personal_fit: score(Component::PersonalFit),
            accessibility: score(Component::Accessibility),
            trust_quality: score(Component::TrustQuality),
            market_value: score(Component::MarketValue),
            engagement: score(Component::Engagement),
        }
    }

    /// Contributions in the shape a feedback event records them
    pub fn contributions(&self) -> BTreeMap<Component, f64> {
        self.breakdown
            .iter()
            .map(|(c, b)| (*c, b.contribution))
            .collect()
    }
}

/// Retrieval method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Structured,
    Keyword,
    Semantic,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Structured => "structured",
            ChannelKind::Keyword => "keyword",
            ChannelKind::Semantic => "semantic",
        }
    }

    /// Provenance code attached to candidates this channel returns
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            ChannelKind::Structured => ReasonCode::MatchedFilters,
            ChannelKind::Keyword => ReasonCode::MatchedKeywords,
            ChannelKind::Semantic => ReasonCode::SimilarToSearch,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a retrieval channel is asked for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[serde(default)]
    pub limit: usize,
}

impl SearchQuery {
    /// Trimmed, non-empty query text
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// One hit from a single channel, scored 0-1 by that channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    pub score: f64,
    #[serde(rename = "reasonCodes", default)]
    pub reason_codes: Vec<ReasonCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelStatus {
    Ok,
    TimedOut,
    Failed,
}

/// Everything one channel returned for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub kind: ChannelKind,
    pub status: ChannelStatus,
    pub candidates: Vec<ScoredCandidate>,
}

impl ChannelResult {
    pub fn ok(kind: ChannelKind, candidates: Vec<ScoredCandidate>) -> Self {
        Self { kind, status: ChannelStatus::Ok, candidates }
    }

    pub fn timed_out(kind: ChannelKind) -> Self {
        Self { kind, status: ChannelStatus::TimedOut, candidates: Vec::new() }
    }

    pub fn failed(kind: ChannelKind) -> Self {
        Self { kind, status: ChannelStatus::Failed, candidates: Vec::new() }
    }
}

/// Deduplicated cross-channel candidate. `fused_score` is an intermediate signal only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    #[serde(skip_serializing, default)]
    pub fused_score: f64,
    pub channels: Vec<ChannelKind>,
    #[serde(rename = "reasonCodes")]
    pub reason_codes: BTreeSet<ReasonCode>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prior_is_valid() {
        let weights = BanditWeightMap::default_prior();
        assert!(weights.validate().is_ok());
        assert!((weights.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_weight_map_missing_key_rejected() {
        let mut weights = BanditWeightMap::default_prior();
        weights.0.remove(&Component::Engagement);
        assert!(matches!(weights.validate(), Err(RankingError::InvalidWeightMap(_))));
    }

    #[test]
    fn test_weight_map_negative_rejected() {
        let mut weights = BanditWeightMap::default_prior();
        weights.0.insert(Component::Engagement, -0.08);
        weights.0.insert(Component::ConstraintFit, 0.46);
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weight_map_deserializes_from_component_names() {
        let json = r#"{"constraintFit":0.3,"personalFit":0.15,"accessibility":0.2,
            "trustQuality":0.15,"marketValue":0.12,"engagement":0.08}"#;
        let weights: BanditWeightMap = serde_json::from_str(json).unwrap();
        assert_eq!(weights, BanditWeightMap::default_prior());
    }

    #[test]
    fn test_feedback_record_with_unknown_component_is_malformed() {
        let record = FeedbackRecord {
            id: uuid::Uuid::new_v4(),
            listing_id: "l1".to_string(),
            kind: None,
            signal: 1.0,
            contributions: serde_json::json!({"vibes": 0.2}),
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(
            FeedbackEvent::try_from(&record),
            Err(RankingError::MalformedFeedbackEvent { .. })
        ));
    }

    #[test]
    fn test_feedback_signal_is_clamped() {
        let record = FeedbackRecord {
            id: uuid::Uuid::new_v4(),
            listing_id: "l1".to_string(),
            kind: Some("helpful".to_string()),
            signal: 1.2,
            contributions: serde_json::json!({"accessibility": 0.1}),
            created_at: chrono::Utc::now(),
        };
        let event = FeedbackEvent::try_from(&record).unwrap();
        assert_eq!(event.signal, 1.0);
        assert_eq!(event.contributions[&Component::Accessibility], 0.1);
    }

    #[test]
    fn test_search_query_text_trims() {
        let query = SearchQuery { text: Some("   ".to_string()), ..Default::default() };
        assert!(query.text().is_none());
    }
}
