use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Fixed,
    Competitive,
    Dynamic,
    Clearance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Active,
    Inactive,
}

/// A pricing rule (spec §3, §4.11). Rules are applied in descending
/// `priority`, ties broken by ascending `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: i64,
    pub name: String,
    pub rule_type: RuleType,
    pub category: Option<String>,
    pub product_id: Option<String>,
    pub adjustment_pct: Decimal,
    pub status: RuleStatus,
    pub priority: i32,
}

impl PricingRule {
    /// Whether this rule matches a product: by `product_id` if present, else
    /// by `category`, else match-all.
    pub fn matches(&self, product_id: &str, category: Option<&str>) -> bool {
        if let Some(pid) = &self.product_id {
            return pid == product_id;
        }
        if let Some(cat) = &self.category {
            return category == Some(cat.as_str());
        }
        true
    }
}

/// Deterministic recommendation emitted by the Rule Engine (spec §3, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: String,
    pub current_price: Decimal,
    pub suggested_price: Decimal,
    pub reason: String,
    pub rule_id: Option<i64>,
    pub computed_at: DateTime<Utc>,
}
