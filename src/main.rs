//! Competitor price-tracking ingestion pipeline: composition root.
//!
//! Constructs every shared component once, spawns the scheduler and worker
//! pool as background tasks, and serves the REST surface until shutdown.

mod api;
mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use priceguard_core::config::{AppConfig, Args};
use priceguard_core::executor::ScrapeExecutor;
use priceguard_core::extract::ExtractorRegistry;
use priceguard_core::fetch::{BrowserFetcher, HttpFetcher};
use priceguard_core::governor::RateGovernor;
use priceguard_core::queue::JobQueue;
use priceguard_core::rules::{RuleEngine, RuleEngineConfig};
use priceguard_core::scheduler::{Scheduler, SchedulerConfig};
use priceguard_core::store::{CompetitorTrackerStore, PriceHistoryStore};
use priceguard_core::worker::{WorkerConfig, WorkerPool};

use crate::api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::from_args(args)?;
    init_tracing(&config.log_level);

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install prometheus recorder")?;

    info!(port = config.port, db_path = %config.db_path, "starting priceguard");

    let trackers = Arc::new(CompetitorTrackerStore::open(&config.db_path)?);
    let price_history = Arc::new(PriceHistoryStore::open(&format!("{}-history", config.db_path))?);
    let queue = Arc::new(JobQueue::open(&format!("{}-queue", config.db_path))?);

    let http_fetcher = Arc::new(HttpFetcher::new(config.http_max_redirects)?);
    let browser_fetcher = Arc::new(BrowserFetcher::launch().await?);
    let executor = Arc::new(ScrapeExecutor::new(
        http_fetcher,
        browser_fetcher,
        ExtractorRegistry::new(),
        config.domain_allowlist.clone(),
    ));

    let governor = Arc::new(RateGovernor::new(
        config.rate_limit_capacity,
        config.rate_limit_refill_per_sec,
        config.rate_limit_global_concurrency,
        config.rate_limit_wait_bound(),
    ));

    let rule_engine = Arc::new(RuleEngine::new(RuleEngineConfig {
        recency_window_days: config.recommendation_window_days,
        ..RuleEngineConfig::default()
    }));
    let config = Arc::new(config);

    let scheduler = Arc::new(Scheduler::new(
        trackers.clone(),
        queue.clone(),
        SchedulerConfig {
            tick_interval: std::time::Duration::from_secs(config.scheduler_tick_secs),
            default_scrape_interval_secs: config.default_scrape_interval_secs,
            in_flight_ttl: config.in_flight_ttl(),
            max_attempts: config.max_attempts,
            allow_browser_fallback: config.allow_browser_fallback,
        },
    ));

    let worker_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        governor,
        executor.clone(),
        price_history.clone(),
        trackers.clone(),
        WorkerConfig {
            worker_count: config.worker_count,
            poll_interval: std::time::Duration::from_millis(500),
            visibility_timeout: config.visibility_timeout(),
            scrape_deadline: config.scrape_deadline(),
            base_backoff_ms: config.base_backoff_ms,
            soft_fail_max_backoff_ms: config.soft_fail_max_backoff_ms,
            hard_fail_max_backoff_ms: config.hard_fail_max_backoff_ms,
            failure_streak_limit: config.failure_streak_limit,
        },
    ));

    let state = AppState {
        trackers,
        price_history,
        queue,
        executor,
        rule_engine,
        config: config.clone(),
        metrics_handle,
    };

    let rate_limiter = middleware::RateLimitLayer::new(middleware::RateLimitConfig::default());
    let app = api::routes::router(state)
        .layer(axum::middleware::from_fn_with_state(rate_limiter, middleware::rate_limit::rate_limit_middleware))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });
    let worker_handles = worker_pool.clone().spawn();

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    scheduler_task.abort();
    worker_pool.shutdown();
    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    let level: Level = log_level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
