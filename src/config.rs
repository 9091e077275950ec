//! Application configuration: environment variables (via `dotenv`), with
//! `clap` CLI flags overriding the binary's subset of them.

use std::time::Duration;

use clap::Parser;

/// `PRICEGUARD_`-prefixed environment configuration plus CLI overrides for
/// the handful of knobs an operator tunes most often.
#[derive(Parser, Debug, Clone)]
#[command(name = "priceguard")]
#[command(about = "Competitor price tracking and recommendation service")]
pub struct Args {
    #[arg(long, env = "PRICEGUARD_PORT", default_value = "8080")]
    pub port: u16,

    #[arg(long, env = "PRICEGUARD_DB_PATH", default_value = "./priceguard.db")]
    pub db_path: String,

    #[arg(long, env = "PRICEGUARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "PRICEGUARD_WORKER_COUNT", default_value = "4")]
    pub worker_count: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    pub log_level: String,

    pub worker_count: usize,
    pub scheduler_tick_secs: u64,
    pub default_scrape_interval_secs: i64,
    pub in_flight_ttl_secs: u64,
    pub max_attempts: u32,
    pub allow_browser_fallback: bool,

    pub scrape_deadline_secs: u64,
    pub visibility_timeout_secs: u64,
    pub base_backoff_ms: u64,
    pub soft_fail_max_backoff_ms: u64,
    pub hard_fail_max_backoff_ms: u64,
    pub failure_streak_limit: u32,

    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_sec: u32,
    pub rate_limit_global_concurrency: usize,
    pub rate_limit_wait_bound_secs: u64,

    pub http_max_redirects: usize,

    pub domain_allowlist: Option<Vec<String>>,

    pub recommendation_window_days: i64,
}

impl AppConfig {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let domain_allowlist = std::env::var("PRICEGUARD_DOMAIN_ALLOWLIST")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());

        Ok(Self {
            port: args.port,
            db_path: args.db_path,
            log_level: args.log_level,

            worker_count: args.worker_count,
            scheduler_tick_secs: env_or("PRICEGUARD_SCHEDULER_TICK_SECS", 30),
            default_scrape_interval_secs: env_or("PRICEGUARD_DEFAULT_SCRAPE_INTERVAL_SECS", 3_600),
            in_flight_ttl_secs: env_or("PRICEGUARD_IN_FLIGHT_TTL_SECS", 300),
            max_attempts: env_or("PRICEGUARD_MAX_ATTEMPTS", 3),
            allow_browser_fallback: env_or("PRICEGUARD_ALLOW_BROWSER_FALLBACK", 1) != 0,

            scrape_deadline_secs: env_or("PRICEGUARD_SCRAPE_DEADLINE_SECS", 15),
            visibility_timeout_secs: env_or("PRICEGUARD_VISIBILITY_TIMEOUT_SECS", 60),
            base_backoff_ms: env_or("PRICEGUARD_BASE_BACKOFF_MS", 1_000),
            soft_fail_max_backoff_ms: env_or("PRICEGUARD_SOFT_FAIL_MAX_BACKOFF_MS", 300_000),
            hard_fail_max_backoff_ms: env_or("PRICEGUARD_HARD_FAIL_MAX_BACKOFF_MS", 30_000),
            failure_streak_limit: env_or("PRICEGUARD_FAILURE_STREAK_LIMIT", 5),

            rate_limit_capacity: env_or("PRICEGUARD_RATE_LIMIT_CAPACITY", 2),
            rate_limit_refill_per_sec: env_or("PRICEGUARD_RATE_LIMIT_REFILL_PER_SEC", 1),
            rate_limit_global_concurrency: env_or("PRICEGUARD_RATE_LIMIT_GLOBAL_CONCURRENCY", 16),
            rate_limit_wait_bound_secs: env_or("PRICEGUARD_RATE_LIMIT_WAIT_BOUND_SECS", 5),

            http_max_redirects: env_or("PRICEGUARD_HTTP_MAX_REDIRECTS", 5),

            domain_allowlist,

            recommendation_window_days: env_or("PRICEGUARD_RECOMMENDATION_WINDOW_DAYS", 14),
        })
    }

    pub fn scrape_deadline(&self) -> Duration {
        Duration::from_secs(self.scrape_deadline_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn rate_limit_wait_bound(&self) -> Duration {
        Duration::from_secs(self.rate_limit_wait_bound_secs)
    }

    pub fn in_flight_ttl(&self) -> Duration {
        Duration::from_secs(self.in_flight_ttl_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
