// Service exports
pub mod cache;
pub mod channels;
pub mod embeddings;
pub mod postgres;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager};
pub use channels::{
    retrieve_all, ChannelError, KeywordChannel, RetrievalChannel, Retriever, SemanticChannel,
    StructuredChannel,
};
pub use embeddings::{EmbeddingClient, EmbeddingError};
pub use postgres::{PostgresClient, PostgresError};
pub use store::{FeedbackStore, ListingSource, SnapshotStore, StoreError};
