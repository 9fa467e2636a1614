pub mod executor;
pub mod ingest;
pub mod queue;
pub mod retry;

pub use executor::*;
pub use ingest::*;
pub use queue::*;
pub use retry::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Arguments of every job: the call it works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub call_id: i64,
}

/// What a successful job produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub call_id: i64,
    pub agent_talk_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
}

/// Result of one job attempt, inspected by the queue to decide on retries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job finished; nothing more to do
    Completed(JobSummary),
    /// The attempt failed in a way worth trying again
    Retry { reason: String },
    /// The job cannot succeed (or retries ran out)
    Abandoned { reason: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

/// Work performed for one job name
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: JobPayload) -> JobOutcome;
}

/// Final account of a job once it stops being scheduled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub job: JobName,
    pub call_id: i64,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Backoff applied before each retry
    pub retry_delays: Vec<Duration>,
    pub outcome: JobOutcome,
}
