//! Scheduler (spec §4.6): on a fixed tick, finds trackers due for a scrape
//! and enqueues a job for each, marking the tracker in-flight so the next
//! tick does not double-enqueue it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{JobOrigin, ScrapeJob};
use crate::queue::JobQueue;
use crate::store::CompetitorTrackerStore;

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub default_scrape_interval_secs: i64,
    pub in_flight_ttl: Duration,
    pub max_attempts: u32,
    pub allow_browser_fallback: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            default_scrape_interval_secs: 3_600,
            in_flight_ttl: Duration::from_secs(300),
            max_attempts: 3,
            allow_browser_fallback: true,
        }
    }
}

pub struct Scheduler {
    trackers: Arc<CompetitorTrackerStore>,
    queue: Arc<JobQueue>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(trackers: Arc<CompetitorTrackerStore>, queue: Arc<JobQueue>, config: SchedulerConfig) -> Self {
        Self { trackers, queue, config }
    }

    /// Run forever, enqueuing due trackers on every tick. Intended to be
    /// driven by `tokio::spawn` from the composition root.
    pub async fn run(&self) {
        let mut ticker = interval(self.config.tick_interval);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    fn tick(&self) {
        let due = match self.trackers.list_due(self.config.default_scrape_interval_secs) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to list due trackers");
                return;
            }
        };

        if due.is_empty() {
            return;
        }
        info!(count = due.len(), "scheduler tick enqueuing due trackers");

        for tracker in due {
            if let Err(e) = self.trackers.mark_in_flight(&tracker.id, self.config.in_flight_ttl) {
                warn!(tracker = %tracker.id, error = %e, "failed to mark tracker in-flight");
                continue;
            }

            let job = ScrapeJob {
                id: Uuid::new_v4().to_string(),
                tracker_id: tracker.id.clone(),
                product_id: tracker.product_id.clone(),
                url: tracker.canonical_url.clone(),
                allow_browser_fallback: self.config.allow_browser_fallback,
                attempt: 1,
                max_attempts: self.config.max_attempts,
                enqueued_at: Utc::now(),
                not_before: None,
                origin: JobOrigin::Scheduled,
            };

            if let Err(e) = self.queue.enqueue(&job) {
                warn!(tracker = %tracker.id, error = %e, "failed to enqueue scheduled job");
                let _ = self.trackers.clear_in_flight(&tracker.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompetitorTracker;

    fn make_tracker(id: &str) -> CompetitorTracker {
        CompetitorTracker::new(id.into(), "p1".into(), "Acme".into(), "https://shop.test/p/1".into(), "https://shop.test/p/1".into())
    }

    #[test]
    fn tick_enqueues_due_trackers_and_marks_in_flight() {
        let trackers = Arc::new(CompetitorTrackerStore::open(":memory:").unwrap());
        let queue = Arc::new(JobQueue::open(":memory:").unwrap());
        trackers.create_or_get(make_tracker("t1")).unwrap();

        let scheduler = Scheduler::new(trackers.clone(), queue.clone(), SchedulerConfig::default());
        scheduler.tick();

        let job = queue.reserve("worker-1", Duration::from_secs(30)).unwrap();
        assert!(job.is_some());
        assert!(trackers.list_due(3600).unwrap().is_empty());
    }

    #[test]
    fn tick_skips_trackers_already_in_flight() {
        let trackers = Arc::new(CompetitorTrackerStore::open(":memory:").unwrap());
        let queue = Arc::new(JobQueue::open(":memory:").unwrap());
        let (tracker, _) = trackers.create_or_get(make_tracker("t1")).unwrap();
        trackers.mark_in_flight(&tracker.id, Duration::from_secs(300)).unwrap();

        let scheduler = Scheduler::new(trackers.clone(), queue.clone(), SchedulerConfig::default());
        scheduler.tick();

        assert!(queue.reserve("worker-1", Duration::from_secs(30)).unwrap().is_none());
    }
}
