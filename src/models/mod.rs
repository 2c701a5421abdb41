// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    ArmStats, BanditWeightMap, BoundingBox, Candidate, ChannelKind, ChannelResult, ChannelStatus,
    CommutePreference, Component, ComponentContribution, ComponentScores, FeedbackEvent,
    FeedbackKind, FeedbackRecord, Listing, PriorityWeights, RankedResult, ScoredCandidate,
    SearchQuery, UserPreferences, WeightSnapshot, WEIGHT_SUM_TOLERANCE,
};
pub use requests::{FeedbackRequest, RankRequest, SearchListingsRequest};
pub use responses::{ErrorResponse, FeedbackResponse, HealthResponse, RankResponse, SearchResponse};
