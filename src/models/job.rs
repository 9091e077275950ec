use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a job was enqueued (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOrigin {
    Scheduled,
    Manual,
    Retry,
}

impl JobOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            JobOrigin::Scheduled => "SCHEDULED",
            JobOrigin::Manual => "MANUAL",
            JobOrigin::Retry => "RETRY",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "MANUAL" => JobOrigin::Manual,
            "RETRY" => JobOrigin::Retry,
            _ => JobOrigin::Scheduled,
        }
    }
}

/// A unit of scrape work (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: String,
    pub tracker_id: String,
    pub product_id: String,
    pub url: String,
    pub allow_browser_fallback: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub origin: JobOrigin,
}
