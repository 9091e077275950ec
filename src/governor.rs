//! Rate Governor (spec §4.7): per-host token bucket plus a global
//! concurrency cap. The Worker Pool acquires both before every fetch.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::FailureKind;

type HostLimiter = RateLimiter<
    String,
    governor::state::keyed::DefaultKeyedStateStore<String>,
    governor::clock::DefaultClock,
>;

/// Held by a worker for the duration of one fetch; dropping it frees the
/// global concurrency slot. The per-host token itself is not held — once
/// granted it is spent, matching a token-bucket's semantics.
pub struct GovernorPermit {
    _global_slot: OwnedSemaphorePermit,
}

pub struct RateGovernor {
    per_host: Arc<HostLimiter>,
    global: Arc<Semaphore>,
    wait_bound: Duration,
}

impl RateGovernor {
    /// `capacity`/`refill_per_sec` configure each host's token bucket;
    /// `global_concurrency` bounds total in-flight fetches across all hosts;
    /// `wait_bound` is the max time a fetch waits for a per-host token before
    /// giving up with a synthetic `RATE_LIMITED` failure.
    pub fn new(
        capacity: u32,
        refill_per_sec: u32,
        global_concurrency: usize,
        wait_bound: Duration,
    ) -> Self {
        let refill = NonZeroU32::new(refill_per_sec.max(1)).expect("refill_per_sec > 0");
        let burst = NonZeroU32::new(capacity.max(1)).expect("capacity > 0");
        let quota = Quota::per_second(refill).allow_burst(burst);

        Self {
            per_host: Arc::new(RateLimiter::keyed(quota)),
            global: Arc::new(Semaphore::new(global_concurrency)),
            wait_bound,
        }
    }

    /// Acquire a per-host token (waiting up to `wait_bound`) and a global
    /// concurrency slot. `Err(RATE_LIMITED)` when the per-host wait bound is
    /// exceeded; the caller should `nack` the job so it is retried later.
    pub async fn acquire(&self, host: &str) -> Result<GovernorPermit, FailureKind> {
        let host_key = host.to_string();
        let wait = self.per_host.until_key_ready(&host_key);
        if tokio::time::timeout(self.wait_bound, wait).await.is_err() {
            return Err(FailureKind::RateLimited);
        }

        let global_slot = self
            .global
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        Ok(GovernorPermit { _global_slot: global_slot })
    }
}
