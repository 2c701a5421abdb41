use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::config::RankingSettings;
use crate::core::{RankingEngine, WeightStore};
use crate::models::{
    ErrorResponse, FeedbackEvent, FeedbackRecord, FeedbackRequest, FeedbackResponse,
    HealthResponse, RankRequest, RankResponse, SearchListingsRequest, SearchQuery, SearchResponse,
};
use crate::services::{FeedbackStore, ListingSource, Retriever};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RankingEngine>,
    pub weights: Arc<WeightStore>,
    pub retriever: Arc<Retriever>,
    pub listings: Arc<dyn ListingSource>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub ranking: RankingSettings,
    pub max_candidates: usize,
}

impl AppState {
    fn result_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.ranking.default_limit)
            .min(self.ranking.max_limit)
    }
}

/// Configure all ranking-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/listings/search", web::post().to(search_listings))
        .route("/rank", web::post().to(rank_candidates))
        .route("/feedback", web::post().to(record_feedback))
        .route("/weights", web::get().to(current_weights));
}

fn validation_error(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = state.listings.is_healthy().await;
    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        weights_version: state.weights.version(),
        timestamp: chrono::Utc::now(),
    })
}

/// Search endpoint
///
/// POST /api/v1/listings/search
///
/// Request body:
/// ```json
/// {
///   "preferences": { "budgetMax": 1500, "requiredAmenities": ["balcony"] },
///   "query": "quiet flat near a park",
///   "limit": 20
/// }
/// ```
async fn search_listings(
    state: web::Data<AppState>,
    req: web::Json<SearchListingsRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for search request: {:?}", errors);
        return validation_error(errors);
    }

    let limit = state.result_limit(req.limit);
    let req = req.into_inner();
    let query = SearchQuery {
        text: req.query,
        preferences: req.preferences,
        limit: state.max_candidates,
    };

    let outcome = state.retriever.retrieve(&query).await;

    let mut ids = outcome.listing_ids();
    ids.truncate(state.max_candidates);

    // A failed listing fetch leaves nothing to rank: genuine failure
    let listings = match state.listings.listings_by_id(&ids).await {
        Ok(listings) => listings,
        Err(e) => {
            tracing::error!("Failed to fetch {} candidate listings: {}", ids.len(), e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch listings".to_string(),
                message: e.to_string(),
                status_code: 500,
            });
        }
    };

    let snapshot = state.weights.load();
    let mut results = state.engine.rank_with_provenance(
        &listings,
        &query.preferences,
        &snapshot.weights,
        &outcome.provenance(),
    );
    let total_candidates = results.len();
    results.truncate(limit);

    tracing::info!(
        "Returning {} of {} ranked listings (weights v{}, degraded: {})",
        results.len(),
        total_candidates,
        snapshot.version,
        outcome.degraded
    );

    HttpResponse::Ok().json(SearchResponse {
        results,
        degraded: outcome.degraded,
        timed_out_channels: outcome.timed_out,
        failed_channels: outcome.failed,
        weights_version: snapshot.version,
        total_candidates,
    })
}

/// Rank endpoint
///
/// POST /api/v1/rank
///
/// Ranks the given candidates against the current weights; no retrieval.
async fn rank_candidates(
    state: web::Data<AppState>,
    req: web::Json<RankRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }

    let limit = state.result_limit(req.limit);
    let snapshot = state.weights.load();

    let mut results = state
        .engine
        .rank(&req.candidates, &req.preferences, &snapshot.weights);
    let total_candidates = results.len();
    results.truncate(limit);

    tracing::debug!(
        "Ranked {} candidates with weights v{}",
        total_candidates,
        snapshot.version
    );

    HttpResponse::Ok().json(RankResponse {
        results,
        weights_version: snapshot.version,
        total_candidates,
    })
}

/// Record feedback endpoint
///
/// POST /api/v1/feedback
///
/// Request body:
/// ```json
/// {
///   "listingId": "string",
///   "kind": "helpful|notHelpful|click|save|contact|dismiss",
///   "signal": 0.5,
///   "contributions": { "constraintFit": 0.3, "engagement": 0.04 }
/// }
/// ```
async fn record_feedback(
    state: web::Data<AppState>,
    req: web::Json<FeedbackRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }

    let Some(signal) = req.resolved_signal() else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Missing signal".to_string(),
            message: "Either kind or signal is required".to_string(),
            status_code: 400,
        });
    };

    let contributions = match serde_json::to_value(&req.contributions) {
        Ok(value) => value,
        Err(e) => {
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: "Invalid contributions".to_string(),
                message: e.to_string(),
                status_code: 400,
            });
        }
    };

    let record = FeedbackRecord {
        id: uuid::Uuid::new_v4(),
        listing_id: req.listing_id.clone(),
        kind: req.kind.map(|k| k.as_str().to_string()),
        signal,
        contributions,
        created_at: chrono::Utc::now(),
    };

    // Reject now what the learner would skip later
    if let Err(e) = FeedbackEvent::try_from(&record) {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Invalid feedback".to_string(),
            message: e.to_string(),
            status_code: 400,
        });
    }

    match state.feedback.append_feedback(&record).await {
        Ok(()) => {
            tracing::debug!("Recorded feedback {} (signal {})", record.id, signal);
            HttpResponse::Ok().json(FeedbackResponse {
                success: true,
                event_id: record.id.to_string(),
            })
        }
        Err(e) => {
            tracing::error!("Failed to record feedback: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to record feedback".to_string(),
                message: e.to_string(),
                status_code: 500,
            })
        }
    }
}

/// Current weights endpoint
///
/// GET /api/v1/weights
async fn current_weights(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.weights.load();
    HttpResponse::Ok().json(snapshot.as_ref())
}
