use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::components::constraint_fit;
use crate::core::error::RankingError;
use crate::core::merger::{merge, MergeOutcome};
use crate::models::{ChannelKind, ChannelResult, ScoredCandidate, SearchQuery};
use crate::services::cache::{CacheError, CacheKey, CacheManager};
use crate::services::embeddings::{EmbeddingClient, EmbeddingError};
use crate::services::postgres::{PostgresClient, PostgresError};

/// Errors a retrieval channel can fail with
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Database error: {0}")]
    Postgres(#[from] PostgresError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

/// One independent way of finding candidate listings
#[async_trait]
pub trait RetrievalChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Hits scored 0-1 by this channel, best first
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError>;
}

/// SQL filter over listings, scored by how well each fits the hard constraints
pub struct StructuredChannel {
    db: Arc<PostgresClient>,
    limit: usize,
}

impl StructuredChannel {
    pub fn new(db: Arc<PostgresClient>, limit: usize) -> Self {
        Self { db, limit }
    }
}

#[async_trait]
impl RetrievalChannel for StructuredChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Structured
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
        let preferences = &query.preferences;
        // Commute area is applied in SQL, before the limit
        let listings = self.db.filter_listings(preferences, self.limit).await?;

        let mut hits: Vec<ScoredCandidate> = listings
            .iter()
            .map(|listing| ScoredCandidate {
                listing_id: listing.id.clone(),
                score: constraint_fit(listing, preferences),
                reason_codes: Vec::new(),
            })
            .collect();

        sort_hits(&mut hits);
        Ok(hits)
    }
}

/// PostgreSQL full-text search over title, description and district
pub struct KeywordChannel {
    db: Arc<PostgresClient>,
    limit: usize,
}

impl KeywordChannel {
    pub fn new(db: Arc<PostgresClient>, limit: usize) -> Self {
        Self { db, limit }
    }
}

#[async_trait]
impl RetrievalChannel for KeywordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Keyword
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
        let Some(text) = query.text() else {
            return Ok(Vec::new());
        };

        let rows = self.db.keyword_search(text, self.limit).await?;
        Ok(to_hits(rows))
    }
}

/// Embedding similarity search backed by pgvector
pub struct SemanticChannel {
    db: Arc<PostgresClient>,
    embedder: Arc<EmbeddingClient>,
    cache: Option<Arc<CacheManager>>,
    limit: usize,
}

impl SemanticChannel {
    pub fn new(
        db: Arc<PostgresClient>,
        embedder: Arc<EmbeddingClient>,
        cache: Option<Arc<CacheManager>>,
        limit: usize,
    ) -> Self {
        Self { db, embedder, cache, limit }
    }

    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>, ChannelError> {
        let key = CacheKey::embedding(self.embedder.model(), text);

        if let Some(cache) = &self.cache {
            match cache.get::<Vec<f32>>(&key).await {
                Ok(embedding) if usable_embedding(&embedding) => return Ok(embedding),
                Ok(_) => {
                    tracing::warn!("Evicting unusable cached embedding {}", key);
                    if let Err(e) = cache.delete(&key).await {
                        tracing::warn!("Embedding cache delete failed: {}", e);
                    }
                }
                Err(CacheError::CacheMiss(_)) => {}
                Err(e) => tracing::warn!("Embedding cache read failed: {}", e),
            }
        }

        let embedding = self.embedder.embed(text).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &embedding).await {
                tracing::warn!("Embedding cache write failed: {}", e);
            }
        }

        Ok(embedding)
    }
}

#[async_trait]
impl RetrievalChannel for SemanticChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Semantic
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
        let Some(text) = query.text() else {
            return Ok(Vec::new());
        };

        let embedding = self.query_embedding(text).await?;
        let rows = self.db.vector_search(&embedding, self.limit).await?;
        Ok(to_hits(rows))
    }
}

fn usable_embedding(embedding: &[f32]) -> bool {
    !embedding.is_empty() && embedding.iter().all(|v| v.is_finite())
}

fn to_hits(rows: Vec<(String, f64)>) -> Vec<ScoredCandidate> {
    let mut hits: Vec<ScoredCandidate> = rows
        .into_iter()
        .map(|(listing_id, score)| ScoredCandidate {
            listing_id,
            score: if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 },
            reason_codes: Vec::new(),
        })
        .collect();
    sort_hits(&mut hits);
    hits
}

fn sort_hits(hits: &mut [ScoredCandidate]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.listing_id.cmp(&b.listing_id))
    });
}

/// Query every channel concurrently, each bounded by `timeout`.
///
/// Results come back in channel order. A channel that times out or errors
/// contributes an empty result with the matching status instead of failing
/// the whole retrieval.
pub async fn retrieve_all(
    channels: &[Arc<dyn RetrievalChannel>],
    query: &SearchQuery,
    timeout: Duration,
) -> Vec<ChannelResult> {
    let searches = channels.iter().map(|channel| async move {
        let kind = channel.kind();
        match tokio::time::timeout(timeout, channel.search(query)).await {
            Ok(Ok(hits)) => {
                tracing::debug!("Channel {} returned {} hits", kind, hits.len());
                ChannelResult::ok(kind, hits)
            }
            Ok(Err(e)) => {
                tracing::error!("Retrieval channel {} failed: {}", kind, e);
                ChannelResult::failed(kind)
            }
            Err(_) => {
                let timed_out = RankingError::ChannelTimeout {
                    channel: kind,
                    timeout_ms: timeout.as_millis() as u64,
                };
                tracing::warn!("{}; treating as empty", timed_out);
                ChannelResult::timed_out(kind)
            }
        }
    });

    join_all(searches).await
}

/// The configured channels with their blend weights
pub struct Retriever {
    channels: Vec<Arc<dyn RetrievalChannel>>,
    weights: Vec<f64>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            weights: Vec::new(),
            timeout,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn RetrievalChannel>, weight: f64) -> Self {
        self.channels.push(channel);
        self.weights.push(weight);
        self
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// Retrieve from every channel and fuse the results
    pub async fn retrieve(&self, query: &SearchQuery) -> MergeOutcome {
        let results = retrieve_all(&self.channels, query, self.timeout).await;
        merge(&results, &self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelStatus;

    struct FixedChannel {
        kind: ChannelKind,
        hits: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl RetrievalChannel for FixedChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
            Ok(to_hits(self.hits.iter().map(|(id, s)| (id.to_string(), *s)).collect()))
        }
    }

    struct SlowChannel;

    #[async_trait]
    impl RetrievalChannel for SlowChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Semantic
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    struct BrokenChannel;

    #[async_trait]
    impl RetrievalChannel for BrokenChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Keyword
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<ScoredCandidate>, ChannelError> {
            Err(ChannelError::Unavailable("index offline".into()))
        }
    }

    #[test]
    fn test_to_hits_clamps_and_sorts() {
        let hits = to_hits(vec![
            ("b".to_string(), 0.4),
            ("a".to_string(), -0.2),
            ("c".to_string(), f64::NAN),
            ("d".to_string(), 0.4),
        ]);
        let ids: Vec<&str> = hits.iter().map(|h| h.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[test]
    fn test_unusable_embeddings_are_rejected() {
        assert!(usable_embedding(&[0.1, -0.4]));
        assert!(!usable_embedding(&[]));
        assert!(!usable_embedding(&[0.1, f32::NAN]));
    }

    #[tokio::test]
    async fn test_timed_out_channel_is_empty_not_fatal() {
        let channels: Vec<Arc<dyn RetrievalChannel>> = vec![
            Arc::new(FixedChannel { kind: ChannelKind::Structured, hits: vec![("a", 0.9)] }),
            Arc::new(SlowChannel),
        ];

        let results =
            retrieve_all(&channels, &SearchQuery::default(), Duration::from_millis(50)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ChannelStatus::Ok);
        assert_eq!(results[1].status, ChannelStatus::TimedOut);
        assert!(results[1].candidates.is_empty());
    }

    #[tokio::test]
    async fn test_failed_channel_marks_degraded() {
        let retriever = Retriever::new(Duration::from_millis(200))
            .with_channel(
                Arc::new(FixedChannel { kind: ChannelKind::Structured, hits: vec![("a", 0.8)] }),
                0.6,
            )
            .with_channel(Arc::new(BrokenChannel), 0.4);

        let outcome = retriever.retrieve(&SearchQuery::default()).await;

        assert!(outcome.degraded);
        assert_eq!(outcome.failed, vec![ChannelKind::Keyword]);
        assert_eq!(outcome.listing_ids(), vec!["a"]);
        assert_eq!(
            retriever.channel_kinds(),
            vec![ChannelKind::Structured, ChannelKind::Keyword]
        );
    }
}
