use crate::error::FailureKind;
use crate::models::PriceSignal;

/// Result of running the Scrape Executor on one job (spec §3, §4.4).
///
/// Outcomes pass between components as this tagged variant — the scrape
/// pipeline never signals failure with an exception.
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    Success(PriceSignal),
    /// Transient failure; retryable per the job's remaining attempt budget.
    SoftFail { kind: FailureKind, detail: String },
    /// Likely-permanent failure; retried at most once (or never, for
    /// `DOMAIN_BLOCKED`/`INVALID_URL`) before moving to the DLQ.
    HardFail { kind: FailureKind, detail: String },
}

impl ScrapeOutcome {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ScrapeOutcome::Success(_) => None,
            ScrapeOutcome::SoftFail { kind, .. } | ScrapeOutcome::HardFail { kind, .. } => {
                Some(*kind)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success(_))
    }
}
