use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::core::distance::commute_search_box;
use crate::models::{FeedbackRecord, Listing, UserPreferences, WeightSnapshot};
use crate::services::embeddings::to_vector_literal;
use crate::services::store::{FeedbackStore, ListingSource, SnapshotStore, StoreError};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Could not decode {column}: {reason}")]
    Decode { column: &'static str, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Structured retrieval lets prices through up to this factor over budget;
/// constraintFit decides how much the overage costs.
pub const BUDGET_SLACK: f64 = 1.2;

/// `ts_rank_cd` normalization flag: rank / (rank + 1), always in [0, 1)
const RANK_NORMALIZATION: i32 = 32;

const LISTING_COLUMNS: &str = r#"
    id, title, description, price, bedrooms, size_sqm, district,
    latitude, longitude, commute_minutes, amenities, character_tags,
    is_verified, photo_count, views, saves, messages
"#;

/// PostgreSQL client for listings, feedback events and weight snapshots
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        settings: &crate::config::DatabaseSettings,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections.unwrap_or(10),
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Fetch listings by id. Unknown ids are silently absent from the result.
    pub async fn fetch_listings(&self, ids: &[String]) -> Result<Vec<Listing>, PostgresError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {} FROM listings WHERE id = ANY($1)", LISTING_COLUMNS);
        let rows = sqlx::query(&query).bind(ids).fetch_all(&self.pool).await?;

        let listings = rows.iter().map(listing_from_row).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Fetched {} of {} listings", listings.len(), ids.len());
        Ok(listings)
    }

    /// Listings passing the hard-ish preference filters: budget (with slack),
    /// minimum bedrooms, district and the commute search area. Rows missing a
    /// filtered field are kept.
    pub async fn filter_listings(
        &self,
        preferences: &UserPreferences,
        limit: usize,
    ) -> Result<Vec<Listing>, PostgresError> {
        let query = format!(
            r#"
            SELECT {}
            FROM listings
            WHERE ($1::float8 IS NULL OR price <= $1)
              AND ($2::float8 IS NULL OR price >= $2)
              AND ($3::int4 IS NULL OR bedrooms IS NULL OR bedrooms >= $3)
              AND ($4::text IS NULL OR district IS NULL OR lower(district) = lower($4))
              AND ($5::float8 IS NULL OR latitude IS NULL OR longitude IS NULL
                   OR (latitude BETWEEN $5 AND $6 AND longitude BETWEEN $7 AND $8))
            ORDER BY price ASC, id ASC
            LIMIT $9
            "#,
            LISTING_COLUMNS
        );

        let price_ceiling = preferences.budget_max.map(|max| max * BUDGET_SLACK);
        let area = preferences.commute.as_ref().and_then(commute_search_box);
        let rows = sqlx::query(&query)
            .bind(price_ceiling)
            .bind(preferences.budget_min)
            .bind(preferences.min_bedrooms.map(i32::from))
            .bind(preferences.district.as_deref())
            .bind(area.map(|b| b.min_lat))
            .bind(area.map(|b| b.max_lat))
            .bind(area.map(|b| b.min_lon))
            .bind(area.map(|b| b.max_lon))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(listing_from_row).collect()
    }

    /// Full-text search; scores are normalized `ts_rank_cd` values in [0, 1)
    pub async fn keyword_search(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, PostgresError> {
        let query = r#"
            SELECT id, ts_rank_cd(search_vector, query, $2)::float8 AS rank
            FROM listings, websearch_to_tsquery('simple', $1) AS query
            WHERE search_vector @@ query
            ORDER BY rank DESC, id ASC
            LIMIT $3
        "#;

        let rows = sqlx::query(query)
            .bind(text)
            .bind(RANK_NORMALIZATION)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, f64), PostgresError> {
                Ok((row.try_get("id")?, row.try_get("rank")?))
            })
            .collect()
    }

    /// Cosine similarity search over listing embeddings
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f64)>, PostgresError> {
        if embedding.is_empty() {
            return Err(PostgresError::InvalidInput("empty query embedding".into()));
        }

        let query = r#"
            SELECT id, (1 - (embedding <=> $1::text::vector))::float8 AS similarity
            FROM listings
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1::text::vector, id ASC
            LIMIT $2
        "#;

        let rows = sqlx::query(query)
            .bind(to_vector_literal(embedding))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, f64), PostgresError> {
                Ok((row.try_get("id")?, row.try_get("similarity")?))
            })
            .collect()
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl ListingSource for PostgresClient {
    async fn listings_by_id(&self, ids: &[String]) -> Result<Vec<Listing>, StoreError> {
        Ok(self.fetch_listings(ids).await?)
    }

    async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }
}

#[async_trait]
impl FeedbackStore for PostgresClient {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO feedback_events (id, listing_id, kind, signal, contributions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        sqlx::query(query)
            .bind(record.id)
            .bind(&record.listing_id)
            .bind(record.kind.as_deref())
            .bind(record.signal)
            .bind(&record.contributions)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        tracing::debug!("Recorded feedback {} for listing {}", record.id, record.listing_id);
        Ok(())
    }

    async fn feedback_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FeedbackRecord>, StoreError> {
        let query = r#"
            SELECT id, listing_id, kind, signal, contributions, created_at
            FROM feedback_events
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at ASC, id ASC
        "#;

        let rows = sqlx::query(query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        let records = rows
            .iter()
            .map(|row| {
                Ok(FeedbackRecord {
                    id: row.try_get("id")?,
                    listing_id: row.try_get("listing_id")?,
                    kind: row.try_get("kind")?,
                    // NULL reaches the learner as NaN and is skipped there
                    signal: row.try_get::<Option<f64>, _>("signal")?.unwrap_or(f64::NAN),
                    contributions: row
                        .try_get::<Option<serde_json::Value>, _>("contributions")?
                        .unwrap_or(serde_json::Value::Null),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(PostgresError::from)?;

        Ok(records)
    }
}

#[async_trait]
impl SnapshotStore for PostgresClient {
    async fn latest_snapshot(&self) -> Result<Option<WeightSnapshot>, StoreError> {
        let query = r#"
            SELECT version, weights, stats, window_start, window_end,
                   events_used, events_skipped, published_at
            FROM weight_snapshots
            ORDER BY version DESC
            LIMIT 1
        "#;

        let row = sqlx::query(query)
            .fetch_optional(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        match row {
            Some(row) => Ok(Some(snapshot_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_snapshot(&self, snapshot: &WeightSnapshot) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO weight_snapshots
                (version, weights, stats, window_start, window_end,
                 events_used, events_skipped, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;

        let weights = serde_json::to_value(&snapshot.weights).map_err(|e| {
            PostgresError::InvalidInput(format!("weights: {}", e))
        })?;
        let stats = serde_json::to_value(&snapshot.stats)
            .map_err(|e| PostgresError::InvalidInput(format!("stats: {}", e)))?;

        let result = sqlx::query(query)
            .bind(snapshot.version)
            .bind(weights)
            .bind(stats)
            .bind(snapshot.window_start)
            .bind(snapshot.window_end)
            .bind(snapshot.events_used as i64)
            .bind(snapshot.events_skipped as i64)
            .bind(snapshot.published_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict(
                format!("weight snapshot v{} already exists", snapshot.version),
            )),
            Err(e) => Err(PostgresError::from(e).into()),
        }
    }
}

fn listing_from_row(row: &PgRow) -> Result<Listing, PostgresError> {
    let amenities: Option<Vec<String>> = row.try_get("amenities")?;
    let character_tags: Option<Vec<String>> = row.try_get("character_tags")?;

    Ok(Listing {
        id: row.try_get("id")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        bedrooms: row
            .try_get::<Option<i32>, _>("bedrooms")?
            .and_then(|b| u8::try_from(b).ok()),
        size_sqm: row.try_get("size_sqm")?,
        district: row.try_get("district")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        commute_minutes: row.try_get("commute_minutes")?,
        amenities: amenities.unwrap_or_default().into_iter().collect(),
        character_tags: character_tags.unwrap_or_default().into_iter().collect(),
        is_verified: row.try_get("is_verified")?,
        photo_count: row
            .try_get::<Option<i32>, _>("photo_count")?
            .and_then(|p| u32::try_from(p).ok()),
        views: counter(row, "views")?,
        saves: counter(row, "saves")?,
        messages: counter(row, "messages")?,
    })
}

fn counter(row: &PgRow, column: &str) -> Result<u64, PostgresError> {
    let value: Option<i64> = row.try_get(column)?;
    Ok(value.unwrap_or(0).max(0) as u64)
}

fn snapshot_from_row(row: &PgRow) -> Result<WeightSnapshot, PostgresError> {
    let weights: serde_json::Value = row.try_get("weights")?;
    let stats: Option<serde_json::Value> = row.try_get("stats")?;

    Ok(WeightSnapshot {
        version: row.try_get("version")?,
        weights: serde_json::from_value(weights).map_err(|e| PostgresError::Decode {
            column: "weights",
            reason: e.to_string(),
        })?,
        stats: match stats {
            Some(stats) => serde_json::from_value(stats).map_err(|e| PostgresError::Decode {
                column: "stats",
                reason: e.to_string(),
            })?,
            None => Default::default(),
        },
        window_start: row.try_get("window_start")?,
        window_end: row.try_get("window_end")?,
        events_used: row.try_get::<i64, _>("events_used")?.max(0) as u64,
        events_skipped: row.try_get::<i64, _>("events_skipped")?.max(0) as u64,
        published_at: row.try_get("published_at")?,
    })
}
