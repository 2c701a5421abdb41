use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use rentrank::config::Settings;
use rentrank::core::{BanditWeightLearner, ExplanationBuilder, RankingEngine, WeightStore};
use rentrank::jobs::{self, WeightRefreshJob};
use rentrank::routes::{self, AppState};
use rentrank::services::{
    CacheManager, EmbeddingClient, KeywordChannel, PostgresClient, Retriever, SemanticChannel,
    StructuredChannel,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str, format: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        io_error("Configuration error", e)
    })?;

    init_logging(&settings.logging.level, &settings.logging.format);
    info!("Starting rentrank ranking service...");

    let postgres = Arc::new(
        PostgresClient::from_settings(&settings.database)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                io_error("PostgreSQL connection error", e)
            })?,
    );
    info!("PostgreSQL client initialized");

    // Cache is optional - without it query embeddings are just not reused
    let cache = match &settings.cache.redis_url {
        Some(url) => {
            let ttl = settings.cache.ttl_secs.unwrap_or(3600);
            let l1_size = settings.cache.l1_cache_size.unwrap_or(1000);
            match CacheManager::new(url, l1_size, ttl).await {
                Ok(c) => {
                    info!("Cache manager initialized (L1: {} entries, TTL: {}s)", l1_size, ttl);
                    Some(Arc::new(c))
                }
                Err(e) => {
                    warn!("Failed to connect to Redis ({}), running without cache", e);
                    None
                }
            }
        }
        None => None,
    };

    let limit = settings.retrieval.channel_limit;
    let blend = &settings.retrieval.weights;
    let timeout = Duration::from_millis(settings.retrieval.channel_timeout_ms);

    let retriever = match &settings.embedding.endpoint {
        Some(endpoint) => {
            let embedder = EmbeddingClient::new(
                endpoint.clone(),
                settings.embedding.api_key.clone(),
                settings.embedding.model.clone(),
                settings.embedding.dimensions,
                Duration::from_millis(settings.embedding.timeout_ms),
            )
            .map_err(|e| io_error("Embedding client error", e))?;

            Retriever::new(timeout)
                .with_channel(Arc::new(StructuredChannel::new(postgres.clone(), limit)), blend.structured)
                .with_channel(Arc::new(KeywordChannel::new(postgres.clone(), limit)), blend.keyword)
                .with_channel(
                    Arc::new(SemanticChannel::new(postgres.clone(), Arc::new(embedder), cache, limit)),
                    blend.semantic,
                )
        }
        None => {
            warn!("No embedding endpoint configured; semantic retrieval disabled");
            // Rescale the remaining two blend weights to sum to 1
            let total = blend.structured + blend.keyword;
            let (structured, keyword) = if total > 0.0 {
                (blend.structured / total, blend.keyword / total)
            } else {
                (0.5, 0.5)
            };
            Retriever::new(timeout)
                .with_channel(Arc::new(StructuredChannel::new(postgres.clone(), limit)), structured)
                .with_channel(Arc::new(KeywordChannel::new(postgres.clone(), limit)), keyword)
        }
    };

    info!("Retrieval channels: {:?}", retriever.channel_kinds());

    let weights = Arc::new(WeightStore::new(
        jobs::load_initial_snapshot(postgres.as_ref()).await,
    ));

    if settings.learner.enabled {
        let job = Arc::new(WeightRefreshJob::new(
            postgres.clone(),
            postgres.clone(),
            weights.clone(),
            BanditWeightLearner::new(settings.learner.learner_config()),
            settings.learner.window_days,
        ));
        jobs::spawn(
            job,
            Duration::from_secs(settings.learner.interval_secs),
            Duration::from_secs(settings.learner.poll_secs),
        );
    } else {
        info!("Weight learner disabled; serving snapshot v{}", weights.version());
    }

    let engine = RankingEngine::new(ExplanationBuilder::new(
        settings.ranking.strength_threshold,
        settings.ranking.concern_threshold,
    ));

    let app_state = AppState {
        engine: Arc::new(engine),
        weights,
        retriever: Arc::new(retriever),
        listings: postgres.clone(),
        feedback: postgres,
        ranking: settings.ranking.clone(),
        max_candidates: settings.retrieval.max_candidates,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(routes::handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(routes::handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
