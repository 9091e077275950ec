use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use priceguard_core::error::CoreError;
use priceguard_core::models::{CompetitorTracker, JobOrigin, PricePoint, ScrapeJob};
use priceguard_core::queue::DlqEntry;

use super::dto::{
    EnqueueScrapeRequest, EnqueueScrapeResponse, FetchNowRequest, FetchNowResponse, HistoryPoint, HistoryQuery,
    RecommendationRequest, RecommendationResponse, TrackCompetitorRequest, TrackCompetitorResponse,
};
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trackers", post(track_competitor))
        .route("/trackers/dead", get(list_dead_trackers))
        .route("/scrape/now", post(fetch_now))
        .route("/scrape/enqueue", post(enqueue_scrape))
        .route("/recommendation", post(get_recommendation))
        .route("/history", get(get_history))
        .route("/dlq", get(list_dlq))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

fn check_allowlist(state: &AppState, url: &str) -> Result<(), CoreError> {
    let Some(allowlist) = &state.config.domain_allowlist else {
        return Ok(());
    };
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| CoreError::InvalidInput(format!("could not parse host from {url}")))?;

    if allowlist.iter().any(|h| h == &host) {
        Ok(())
    } else {
        Err(CoreError::DomainBlocked(format!("{host} is not in the domain allowlist")))
    }
}

async fn track_competitor(
    State(state): State<AppState>,
    Json(req): Json<TrackCompetitorRequest>,
) -> Result<Json<TrackCompetitorResponse>, CoreError> {
    if req.raw_url.trim().is_empty() || req.product_id.trim().is_empty() {
        return Err(CoreError::InvalidInput("product_id and raw_url are required".into()));
    }

    let canonical_url = priceguard_core::canonical::canonicalize(&req.raw_url)
        .map_err(|_| CoreError::InvalidInput(format!("could not canonicalize {}", req.raw_url)))?;
    check_allowlist(&state, &canonical_url)?;

    let tracker = CompetitorTracker::new(
        Uuid::new_v4().to_string(),
        req.product_id.clone(),
        req.competitor_name.clone(),
        req.raw_url.clone(),
        canonical_url,
    );
    let (tracker, created) = state.trackers.create_or_get(tracker).map_err(CoreError::Internal)?;

    if created {
        metrics::counter!("priceguard_trackers_created_total").increment(1);
    }

    let job_id = if req.enqueue_scrape.unwrap_or(false) {
        let job = manual_job(&tracker.id, &tracker.product_id, &tracker.canonical_url);
        state.queue.enqueue(&job).map_err(CoreError::Internal)?;
        Some(job.id)
    } else {
        None
    };

    Ok(Json(TrackCompetitorResponse { tracker, created, job_id }))
}

async fn fetch_now(
    State(state): State<AppState>,
    Json(req): Json<FetchNowRequest>,
) -> Result<Json<FetchNowResponse>, CoreError> {
    let canonical_url = priceguard_core::canonical::canonicalize(&req.url)
        .map_err(|_| CoreError::InvalidInput(format!("could not canonicalize {}", req.url)))?;
    check_allowlist(&state, &canonical_url)?;

    let job = ScrapeJob {
        id: Uuid::new_v4().to_string(),
        tracker_id: req.tracker_id.clone().unwrap_or_else(|| "adhoc".into()),
        product_id: req.product_id.clone(),
        url: canonical_url,
        allow_browser_fallback: req.allow_browser_fallback.unwrap_or(true),
        attempt: 1,
        max_attempts: 1,
        enqueued_at: Utc::now(),
        not_before: None,
        origin: JobOrigin::Manual,
    };

    let outcome = state.executor.run(&job, state.config.scrape_deadline()).await;
    match outcome {
        priceguard_core::models::ScrapeOutcome::Success(signal) => {
            let point = PricePoint {
                id: 0,
                product_id: job.product_id.clone(),
                tracker_id: job.tracker_id.clone(),
                competitor_name: String::new(),
                price: signal.price,
                currency: signal.currency.clone(),
                captured_at: Utc::now(),
                source: signal.extracted_from,
                adapter_id: signal.adapter_id.clone(),
            };
            state.price_history.append(&point).map_err(CoreError::Internal)?;

            if let Some(tracker_id) = &req.tracker_id {
                if let Ok(Some(tracker)) = state.trackers.get(tracker_id) {
                    let _ = state.trackers.update_after_scrape(
                        &tracker.id,
                        tracker.version,
                        priceguard_core::store::ScrapeUpdate::Success { price: signal.price, currency: signal.currency.clone() },
                    );
                }
            }

            Ok(Json(FetchNowResponse { signal }))
        }
        priceguard_core::models::ScrapeOutcome::SoftFail { kind, detail } | priceguard_core::models::ScrapeOutcome::HardFail { kind, detail } => {
            Err(CoreError::ScrapeFailed { kind, detail })
        }
    }
}

async fn enqueue_scrape(
    State(state): State<AppState>,
    Json(req): Json<EnqueueScrapeRequest>,
) -> Result<Json<EnqueueScrapeResponse>, CoreError> {
    let tracker = state
        .trackers
        .get(&req.tracker_id)
        .map_err(CoreError::Internal)?
        .ok_or_else(|| CoreError::NotFound(format!("tracker {} not found", req.tracker_id)))?;

    let job = manual_job(&tracker.id, &tracker.product_id, &tracker.canonical_url);
    state.queue.enqueue(&job).map_err(CoreError::Internal)?;
    info!(job = %job.id, tracker = %tracker.id, "manual scrape enqueued");

    Ok(Json(EnqueueScrapeResponse { job_id: job.id }))
}

async fn get_recommendation(
    State(state): State<AppState>,
    Json(req): Json<RecommendationRequest>,
) -> Result<Json<RecommendationResponse>, CoreError> {
    let recent_prices = recent_competitor_prices(&state, &req.product.id)?;
    let recommendation = state.rule_engine.recommend(&req.product, &req.rules, &recent_prices);
    Ok(Json(RecommendationResponse { recommendation }))
}

/// Latest `PricePoint` per tracker for `product_id` within the Rule Engine's
/// configured recency window (spec §4.11 "recent_history_window").
fn recent_competitor_prices(state: &AppState, product_id: &str) -> Result<Vec<PricePoint>, CoreError> {
    let window_days = state.rule_engine.recency_window_days();
    let points = state.price_history.history_for_product(product_id, window_days).map_err(CoreError::Internal)?;

    let mut latest_per_tracker: std::collections::HashMap<String, PricePoint> = std::collections::HashMap::new();
    for point in points {
        latest_per_tracker
            .entry(point.tracker_id.clone())
            .and_modify(|existing| {
                if point.captured_at > existing.captured_at {
                    *existing = point.clone();
                }
            })
            .or_insert(point);
    }
    Ok(latest_per_tracker.into_values().collect())
}

async fn get_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, CoreError> {
    let days = q.days.unwrap_or(30);

    let points = if let Some(tracker_id) = &q.tracker_id {
        let to = Utc::now();
        let from = to - chrono::Duration::days(days.max(0));
        state.price_history.range(tracker_id, from, to).map_err(CoreError::Internal)?
    } else if let Some(product_id) = &q.product_id {
        state.price_history.history_for_product(product_id, days).map_err(CoreError::Internal)?
    } else {
        return Err(CoreError::InvalidInput("product_id or tracker_id is required".into()));
    };

    Ok(Json(
        points
            .into_iter()
            .map(|p| HistoryPoint { price: p.price, currency: p.currency, captured_at: p.captured_at, source: p.source.as_str().to_string() })
            .collect(),
    ))
}

async fn list_dead_trackers(State(state): State<AppState>) -> Result<Json<Vec<CompetitorTracker>>, CoreError> {
    Ok(Json(state.trackers.list_dead().map_err(CoreError::Internal)?))
}

async fn list_dlq(State(state): State<AppState>) -> Result<Json<Vec<DlqEntry>>, CoreError> {
    Ok(Json(state.queue.list_dlq().map_err(CoreError::Internal)?))
}

fn manual_job(tracker_id: &str, product_id: &str, url: &str) -> ScrapeJob {
    ScrapeJob {
        id: Uuid::new_v4().to_string(),
        tracker_id: tracker_id.to_string(),
        product_id: product_id.to_string(),
        url: url.to_string(),
        allow_browser_fallback: true,
        attempt: 1,
        max_attempts: 3,
        enqueued_at: Utc::now(),
        not_before: None,
        origin: JobOrigin::Manual,
    }
}
