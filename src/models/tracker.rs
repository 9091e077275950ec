use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a `CompetitorTracker` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerStatus {
    New,
    Ok,
    ExtractionFailed,
    NetworkError,
    Blocked,
    Dead,
}

impl TrackerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackerStatus::New => "NEW",
            TrackerStatus::Ok => "OK",
            TrackerStatus::ExtractionFailed => "EXTRACTION_FAILED",
            TrackerStatus::NetworkError => "NETWORK_ERROR",
            TrackerStatus::Blocked => "BLOCKED",
            TrackerStatus::Dead => "DEAD",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "OK" => TrackerStatus::Ok,
            "EXTRACTION_FAILED" => TrackerStatus::ExtractionFailed,
            "NETWORK_ERROR" => TrackerStatus::NetworkError,
            "BLOCKED" => TrackerStatus::Blocked,
            "DEAD" => TrackerStatus::Dead,
            _ => TrackerStatus::New,
        }
    }
}

/// Mutable per-tracker state (spec §3, §4.10).
///
/// Uniqueness invariant: `(product_id, canonical_url)` is unique across
/// active trackers. Enforced at the store boundary, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorTracker {
    pub id: String,
    pub product_id: String,
    pub competitor_name: String,
    pub raw_url: String,
    pub canonical_url: String,
    pub active: bool,
    pub last_price: Option<Decimal>,
    pub last_currency: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_status: TrackerStatus,
    pub failure_streak: u32,
    /// Per-tracker override of the deployment-wide scrape interval
    /// (spec §9 Open Question — per-tracker wins over the global default).
    pub interval_override_secs: Option<i64>,
    /// Monotonic version used for compare-and-set updates (spec §5: tracker
    /// updates must be serialized per tracker).
    pub version: i64,
}

impl CompetitorTracker {
    pub fn new(id: String, product_id: String, competitor_name: String, raw_url: String, canonical_url: String) -> Self {
        Self {
            id,
            product_id,
            competitor_name,
            raw_url,
            canonical_url,
            active: true,
            last_price: None,
            last_currency: None,
            last_checked_at: None,
            last_status: TrackerStatus::New,
            failure_streak: 0,
            interval_override_secs: None,
            version: 0,
        }
    }
}
