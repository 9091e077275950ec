//! Worker Pool (spec §4.6/§4.8): a fixed number of tasks pulling jobs off
//! the queue, running them through the Rate Governor and Scrape Executor,
//! and folding the outcome back into the stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::FailureKind;
use crate::executor::ScrapeExecutor;
use crate::governor::RateGovernor;
use crate::models::{PricePoint, ScrapeJob, ScrapeOutcome, TrackerStatus};
use crate::queue::JobQueue;
use crate::store::{CompetitorTrackerStore, PriceHistoryStore, ScrapeUpdate};

pub struct WorkerConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub scrape_deadline: Duration,
    pub base_backoff_ms: u64,
    pub soft_fail_max_backoff_ms: u64,
    pub hard_fail_max_backoff_ms: u64,
    pub failure_streak_limit: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(60),
            scrape_deadline: Duration::from_secs(15),
            base_backoff_ms: 1_000,
            soft_fail_max_backoff_ms: 300_000,
            hard_fail_max_backoff_ms: 30_000,
            failure_streak_limit: 5,
        }
    }
}

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    governor: Arc<RateGovernor>,
    executor: Arc<ScrapeExecutor>,
    price_history: Arc<PriceHistoryStore>,
    trackers: Arc<CompetitorTrackerStore>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        governor: Arc<RateGovernor>,
        executor: Arc<ScrapeExecutor>,
        price_history: Arc<PriceHistoryStore>,
        trackers: Arc<CompetitorTrackerStore>,
        config: WorkerConfig,
    ) -> Self {
        Self { queue, governor, executor, price_history, trackers, config, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Spawn `config.worker_count` tasks. Dropping or stopping the returned
    /// handles does not stop the workers; call `shutdown()` for a
    /// cooperative stop.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count.max(1))
            .map(|id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_loop(id).await })
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn run_loop(&self, worker_id: usize) {
        let worker_name = format!("worker-{worker_id}");
        info!(worker = %worker_name, "worker started");

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.queue.reserve(&worker_name, self.config.visibility_timeout) {
                Ok(Some(job)) => self.process_job(&worker_name, job).await,
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker = %worker_name, error = %e, "failed to reserve job");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(worker = %worker_name, "worker stopped");
    }

    async fn process_job(&self, worker_name: &str, job: ScrapeJob) {
        let host = url::Url::parse(&job.url).ok().and_then(|u| u.host_str().map(str::to_string));

        let Some(host) = host else {
            self.finish(&job, ScrapeOutcome::HardFail { kind: FailureKind::InvalidUrl, detail: job.url.clone() }).await;
            return;
        };

        match self.governor.acquire(&host).await {
            Ok(_permit) => {
                let outcome = self.executor.run(&job, self.config.scrape_deadline).await;
                self.finish(&job, outcome).await;
            }
            Err(kind) => {
                warn!(worker = %worker_name, host = %host, job = %job.id, "rate limit wait bound exceeded");
                self.finish(&job, ScrapeOutcome::SoftFail { kind, detail: "rate governor wait bound exceeded".into() }).await;
            }
        }
    }

    async fn finish(&self, job: &ScrapeJob, outcome: ScrapeOutcome) {
        match outcome {
            ScrapeOutcome::Success(signal) => {
                let competitor_name = self
                    .trackers
                    .get(&job.tracker_id)
                    .ok()
                    .flatten()
                    .map(|t| t.competitor_name)
                    .unwrap_or_default();
                let point = PricePoint {
                    id: 0,
                    product_id: job.product_id.clone(),
                    tracker_id: job.tracker_id.clone(),
                    competitor_name,
                    price: signal.price,
                    currency: signal.currency.clone(),
                    captured_at: chrono::Utc::now(),
                    source: signal.extracted_from,
                    adapter_id: signal.adapter_id.clone(),
                };
                if let Err(e) = self.price_history.append(&point) {
                    error!(job = %job.id, error = %e, "failed to append price point");
                }
                self.apply_tracker_update(job, ScrapeUpdate::Success { price: signal.price, currency: signal.currency });
                if let Err(e) = self.queue.ack(&job.id) {
                    error!(job = %job.id, error = %e, "failed to ack job");
                }
            }
            ScrapeOutcome::SoftFail { kind, detail } => {
                self.apply_tracker_update(job, ScrapeUpdate::Failure { status: tracker_status_for(kind) });
                self.requeue_or_dlq(job, kind, &detail, self.config.soft_fail_max_backoff_ms);
            }
            ScrapeOutcome::HardFail { kind, detail } => {
                self.apply_tracker_update(job, ScrapeUpdate::Failure { status: tracker_status_for(kind) });
                if kind.is_never_retried() {
                    self.move_to_dlq(job, kind, &detail);
                } else {
                    self.requeue_or_dlq(job, kind, &detail, self.config.hard_fail_max_backoff_ms);
                }
            }
        }
    }

    fn requeue_or_dlq(&self, job: &ScrapeJob, kind: FailureKind, detail: &str, max_backoff_ms: u64) {
        if job.attempt >= job.max_attempts {
            self.move_to_dlq(job, kind, detail);
            return;
        }
        let delay = self.queue.compute_backoff(job.attempt, self.config.base_backoff_ms, max_backoff_ms);
        if let Err(e) = self.queue.nack(&job.id, delay) {
            error!(job = %job.id, error = %e, "failed to nack job");
        }
    }

    fn move_to_dlq(&self, job: &ScrapeJob, kind: FailureKind, detail: &str) {
        warn!(job = %job.id, kind = %kind, "moving job to dead-letter queue");
        if let Err(e) = self.queue.move_to_dlq(&job.id, kind, detail) {
            error!(job = %job.id, error = %e, "failed to move job to dlq");
        }
    }

    fn apply_tracker_update(&self, job: &ScrapeJob, update: ScrapeUpdate) {
        let Ok(Some(tracker)) = self.trackers.get(&job.tracker_id) else {
            warn!(job = %job.id, tracker = %job.tracker_id, "tracker missing, skipping update");
            return;
        };

        match self.trackers.update_after_scrape(&tracker.id, tracker.version, update) {
            Ok(true) => {
                if let Ok(Some(reloaded)) = self.trackers.get(&tracker.id) {
                    if reloaded.failure_streak >= self.config.failure_streak_limit {
                        if let Err(e) = self.trackers.mark_dead(&tracker.id) {
                            error!(tracker = %tracker.id, error = %e, "failed to mark tracker dead");
                        } else {
                            warn!(tracker = %tracker.id, streak = reloaded.failure_streak, "tracker marked dead");
                        }
                    }
                }
            }
            Ok(false) => warn!(tracker = %tracker.id, "tracker update lost a concurrent CAS race"),
            Err(e) => error!(tracker = %tracker.id, error = %e, "failed to update tracker"),
        }

        if let Err(e) = self.trackers.clear_in_flight(&tracker.id) {
            error!(tracker = %tracker.id, error = %e, "failed to clear in-flight marker");
        }
    }
}

fn tracker_status_for(kind: FailureKind) -> TrackerStatus {
    match kind {
        FailureKind::ParseMiss => TrackerStatus::ExtractionFailed,
        FailureKind::Blocked | FailureKind::RobotsDeny | FailureKind::DomainBlocked | FailureKind::InvalidUrl => {
            TrackerStatus::Blocked
        }
        FailureKind::Timeout | FailureKind::NetworkError | FailureKind::RateLimited | FailureKind::HttpStatus | FailureKind::BrowserError => {
            TrackerStatus::NetworkError
        }
    }
}
