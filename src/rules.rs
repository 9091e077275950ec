//! Rule Engine (spec §4.11): deterministic, side-effect-free recommendation
//! computation over a product snapshot, its pricing rules, and a
//! caller-supplied window of recent competitor price points.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{PricePoint, PricingRule, Product, Recommendation, RuleStatus, RuleType};

/// Deployment-wide defaults a rule's clamp falls back to when a product has
/// no known cost (spec §4.11 Clamping).
#[derive(Debug, Clone, Copy)]
pub struct RuleEngineConfig {
    pub min_margin_pct: Decimal,
    pub max_change_pct: Decimal,
    pub competitive_weight: Decimal,
    pub margin_weight: Decimal,
    /// Width, in days, of the recent-history window the caller draws
    /// competitor `PricePoint`s from before calling `recommend` (spec §4.11
    /// "recent_history_window").
    pub recency_window_days: i64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            min_margin_pct: Decimal::ZERO,
            max_change_pct: dec!(20),
            competitive_weight: dec!(0.6),
            margin_weight: dec!(0.4),
            recency_window_days: 14,
        }
    }
}

pub struct RuleEngine {
    config: RuleEngineConfig,
}

impl RuleEngine {
    pub fn new(config: RuleEngineConfig) -> Self {
        Self { config }
    }

    pub fn recency_window_days(&self) -> i64 {
        self.config.recency_window_days
    }

    /// Compute a `Recommendation` for `product`. `recent_prices` must already
    /// be windowed by the caller to the latest `PricePoint` per tracker
    /// within `recency_window_days` (spec §4.11) — this function does no
    /// further time filtering.
    pub fn recommend(&self, product: &Product, rules: &[PricingRule], recent_prices: &[PricePoint]) -> Recommendation {
        let rule = select_rule(rules, &product.id, product.category.as_deref());

        let Some(rule) = rule else {
            return Recommendation {
                product_id: product.id.clone(),
                current_price: product.current_price,
                suggested_price: product.current_price,
                reason: "no matching rule".into(),
                rule_id: None,
                computed_at: Utc::now(),
            };
        };

        let competitors: Vec<Decimal> = recent_prices.iter().map(|p| p.price).collect();
        let avg_comp = average(&competitors);

        let (raw_suggested, reason) = match rule.rule_type {
            RuleType::Fixed => (
                product.current_price * (Decimal::ONE + rule.adjustment_pct / dec!(100)),
                format!("fixed rule: current_price adjusted {}%", rule.adjustment_pct),
            ),
            RuleType::Clearance => (
                product.current_price * (Decimal::ONE + rule.adjustment_pct / dec!(100)),
                format!("clearance rule: current_price adjusted {}%", rule.adjustment_pct),
            ),
            RuleType::Competitive => match avg_comp {
                None => {
                    return Recommendation {
                        product_id: product.id.clone(),
                        current_price: product.current_price,
                        suggested_price: product.current_price,
                        reason: "no competitor data".into(),
                        rule_id: Some(rule.id),
                        computed_at: Utc::now(),
                    };
                }
                Some(avg) => (
                    avg * (Decimal::ONE + rule.adjustment_pct / dec!(100)),
                    format!(
                        "competitive rule: {} competitors, avg={:.2}, adjusted {}%",
                        competitors.len(),
                        avg,
                        rule.adjustment_pct
                    ),
                ),
            },
            RuleType::Dynamic => match avg_comp {
                None => {
                    return Recommendation {
                        product_id: product.id.clone(),
                        current_price: product.current_price,
                        suggested_price: product.current_price,
                        reason: "no competitor data".into(),
                        rule_id: Some(rule.id),
                        computed_at: Utc::now(),
                    };
                }
                Some(avg) => (
                    self.config.competitive_weight * avg + self.config.margin_weight * product.current_price,
                    format!(
                        "dynamic rule: {} competitors, avg={:.2}, blend {}/{}",
                        competitors.len(),
                        avg,
                        self.config.competitive_weight,
                        self.config.margin_weight
                    ),
                ),
            },
        };

        let (clamped, clamp_note) = self.clamp(raw_suggested, product);
        let suggested_price = clamped.round_dp(2);

        let reason = match clamp_note {
            Some(note) => format!("{reason}; {note}"),
            None => reason,
        };

        Recommendation {
            product_id: product.id.clone(),
            current_price: product.current_price,
            suggested_price,
            reason,
            rule_id: Some(rule.id),
            computed_at: Utc::now(),
        }
    }

    fn clamp(&self, suggested: Decimal, product: &Product) -> (Decimal, Option<String>) {
        let cost_floor = product
            .cost
            .map(|cost| cost * (Decimal::ONE + self.config.min_margin_pct / dec!(100)))
            .unwrap_or(dec!(0.01))
            .max(dec!(0.01));

        let downside_limit = product.current_price * (Decimal::ONE - self.config.max_change_pct / dec!(100));
        let upside_limit = product.current_price * (Decimal::ONE + self.config.max_change_pct / dec!(100));

        let lower_bound = cost_floor.max(downside_limit);
        let upper_bound = upside_limit.max(lower_bound);

        if suggested < lower_bound {
            (lower_bound, Some(format!("clamped up to {lower_bound:.2}")))
        } else if suggested > upper_bound {
            (upper_bound, Some(format!("clamped down to {upper_bound:.2}")))
        } else {
            (suggested, None)
        }
    }
}

fn select_rule<'a>(rules: &'a [PricingRule], product_id: &str, category: Option<&str>) -> Option<&'a PricingRule> {
    rules
        .iter()
        .filter(|r| r.status == RuleStatus::Active && r.matches(product_id, category))
        .min_by_key(|r| (std::cmp::Reverse(r.priority), r.id))
}

fn average(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let sum: Decimal = prices.iter().sum();
    Some(sum / Decimal::from(prices.len()))
}
