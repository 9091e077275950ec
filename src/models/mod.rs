//! Core data model (spec §3).

mod job;
mod outcome;
mod price;
mod product;
mod rule;
mod tracker;

pub use job::{JobOrigin, ScrapeJob};
pub use outcome::ScrapeOutcome;
pub use price::{PricePoint, PriceSignal, PriceSource};
pub use product::Product;
pub use rule::{PricingRule, Recommendation, RuleStatus, RuleType};
pub use tracker::{CompetitorTracker, TrackerStatus};
