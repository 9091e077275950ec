use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use priceguard_core::models::{CompetitorTracker, PriceSignal, PricingRule, Product, Recommendation};

#[derive(Debug, Deserialize)]
pub struct TrackCompetitorRequest {
    pub product_id: String,
    pub competitor_name: String,
    pub raw_url: String,
    pub active: Option<bool>,
    pub enqueue_scrape: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TrackCompetitorResponse {
    pub tracker: CompetitorTracker,
    pub created: bool,
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FetchNowRequest {
    pub url: String,
    pub product_id: String,
    pub tracker_id: Option<String>,
    pub allow_browser_fallback: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FetchNowResponse {
    pub signal: PriceSignal,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueScrapeRequest {
    pub tracker_id: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueScrapeResponse {
    pub job_id: String,
}

/// The product catalog is external to this core; callers hand in the
/// product snapshot and the rules to evaluate against it (spec §6).
#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub product: Product,
    pub rules: Vec<PricingRule>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub recommendation: Recommendation,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub product_id: Option<String>,
    pub tracker_id: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPoint {
    pub price: Decimal,
    pub currency: String,
    pub captured_at: DateTime<Utc>,
    pub source: String,
}
