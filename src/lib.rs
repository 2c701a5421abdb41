//! Rentrank - explainable ranking service for rental listings
//!
//! Candidates come from three retrieval channels (structured filters,
//! full-text, embedding similarity), are fused into one list, and scored on
//! six components blended with weights that an offline Beta-Bernoulli
//! learner keeps adjusting from user feedback.

pub mod config;
pub mod core;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{merge, BanditWeightLearner, ExplanationBuilder, RankingEngine, WeightStore};
pub use models::{BanditWeightMap, Component, Listing, RankedResult, UserPreferences};
