// Core algorithm exports
pub mod bandit;
pub mod components;
pub mod distance;
pub mod engine;
pub mod error;
pub mod explain;
pub mod merger;
pub mod snapshot;

pub use bandit::{BanditWeightLearner, LearnerConfig, LearnerOutcome, LearnerStatus};
pub use components::{score_listing, ScoringContext, NEUTRAL_SCORE};
pub use distance::{calculate_bounding_box, estimate_commute_minutes, haversine_distance};
pub use engine::RankingEngine;
pub use error::RankingError;
pub use explain::{Explanation, ExplanationBuilder, ReasonCode};
pub use merger::{merge, MergeOutcome};
pub use snapshot::WeightStore;
