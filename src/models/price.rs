use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which fetch tier produced a signal (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSource {
    Http,
    Browser,
}

impl PriceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceSource::Http => "HTTP",
            PriceSource::Browser => "BROWSER",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "BROWSER" => PriceSource::Browser,
            _ => PriceSource::Http,
        }
    }
}

/// Transient extraction result produced by an adapter (spec §3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSignal {
    pub price: Decimal,
    pub currency: String,
    pub title: Option<String>,
    pub in_stock: Option<bool>,
    pub extracted_from: PriceSource,
    pub adapter_id: String,
    pub confidence: f32,
}

/// An immutable, persistent price observation (spec §3, §4.9).
///
/// Never updated or deleted once written — the store's write path only
/// appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: i64,
    pub product_id: String,
    pub tracker_id: String,
    pub competitor_name: String,
    pub price: Decimal,
    pub currency: String,
    pub captured_at: DateTime<Utc>,
    pub source: PriceSource,
    pub adapter_id: String,
}
