use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{FeedbackRecord, Listing, WeightSnapshot};
use crate::services::postgres::PostgresError;

/// Errors from the feedback and snapshot stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Postgres(#[from] PostgresError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Listing lookup for the candidates retrieval produced
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Listings with the given ids; unknown ids are absent from the result
    async fn listings_by_id(&self, ids: &[String]) -> Result<Vec<Listing>, StoreError>;

    async fn is_healthy(&self) -> bool;
}

/// Append-only feedback log
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<(), StoreError>;

    /// Records with `start <= created_at < end`
    async fn feedback_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, StoreError>;
}

/// Append-only history of published weight snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn latest_snapshot(&self) -> Result<Option<WeightSnapshot>, StoreError>;

    /// Fails with `Conflict` if the version already exists
    async fn insert_snapshot(&self, snapshot: &WeightSnapshot) -> Result<(), StoreError>;
}
