use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{JobHandler, JobOutcome, JobPayload, JobSummary};
use crate::error::{InsightError, Result};
use crate::models::{truncate_reason, InsightUpdate, ProcessingStatus};
use crate::pipeline::InsightOrchestrator;
use crate::store::{run_blocking, CallStore};

/// Runs the insight pipeline for one call and drives its status
///
/// `pending → processing → completed | failed(reason)`. The `processing`
/// marker is written before any work and is not atomic with the result: a
/// crash in between leaves the record in `processing`.
pub struct JobExecutor {
    store: Arc<dyn CallStore>,
    orchestrator: InsightOrchestrator,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn CallStore>, orchestrator: InsightOrchestrator) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// One attempt at generating insights for `call_id`
    pub async fn execute(&self, call_id: i64) -> JobOutcome {
        info!(call_id, "Starting insights generation");

        match self.run(call_id).await {
            Ok(summary) => {
                info!(call_id, "Successfully processed call");
                JobOutcome::Completed(summary)
            }
            Err(e) => self.fail(call_id, e).await,
        }
    }

    async fn run(&self, call_id: i64) -> Result<JobSummary> {
        run_blocking(&self.store, move |store| {
            store.update_insights(
                call_id,
                &InsightUpdate::status_only(),
                &ProcessingStatus::Processing,
            )
        })
        .await?;

        let record = run_blocking(&self.store, move |store| store.get(call_id))
            .await?
            .ok_or(InsightError::NotFound { call_id })?;

        let insights = self.orchestrator.process(&record.transcript).await?;

        let update = InsightUpdate::from(&insights);
        let stored = run_blocking(&self.store, move |store| {
            store.update_insights(call_id, &update, &ProcessingStatus::Completed)
        })
        .await?;

        Ok(JobSummary {
            call_id,
            agent_talk_ratio: stored.agent_talk_ratio,
            sentiment_score: stored.sentiment_score,
        })
    }

    async fn fail(&self, call_id: i64, e: InsightError) -> JobOutcome {
        error!(call_id, error = %e, "Error processing call");

        // A missing call has no row to mark.
        if let InsightError::NotFound { .. } = e {
            return JobOutcome::Abandoned {
                reason: e.to_string(),
            };
        }

        let reason = truncate_reason(&e.to_string());
        let status = ProcessingStatus::Failed(reason.clone());
        if let Err(write_error) = run_blocking(&self.store, move |store| {
            store.update_insights(call_id, &InsightUpdate::status_only(), &status)
        })
        .await
        {
            warn!(call_id, error = %write_error, "Could not record failed status");
        }

        if e.is_retryable() {
            JobOutcome::Retry { reason }
        } else {
            JobOutcome::Abandoned { reason }
        }
    }
}

#[async_trait]
impl JobHandler for JobExecutor {
    async fn handle(&self, payload: JobPayload) -> JobOutcome {
        self.execute(payload.call_id).await
    }
}
