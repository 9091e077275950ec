use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use priceguard_core::config::AppConfig;
use priceguard_core::executor::ScrapeExecutor;
use priceguard_core::queue::JobQueue;
use priceguard_core::rules::RuleEngine;
use priceguard_core::store::{CompetitorTrackerStore, PriceHistoryStore};

/// Shared, constructed-once composition state handed to every route handler.
/// No global singleton exists anywhere else in the binary.
#[derive(Clone)]
pub struct AppState {
    pub trackers: Arc<CompetitorTrackerStore>,
    pub price_history: Arc<PriceHistoryStore>,
    pub queue: Arc<JobQueue>,
    pub executor: Arc<ScrapeExecutor>,
    pub rule_engine: Arc<RuleEngine>,
    pub config: Arc<AppConfig>,
    pub metrics_handle: PrometheusHandle,
}
