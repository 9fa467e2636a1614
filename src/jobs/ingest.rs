use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::{JobHandler, JobOutcome, JobPayload, JobSummary};
use crate::models::{CallRecord, NewCall};
use crate::store::{run_blocking, CallStore};

/// Where raw calls come from before they are stored
pub trait CallSource: Send + Sync {
    fn fetch(&self, call_id: i64) -> Option<NewCall>;
}

/// In-memory set of raw calls, keyed by call_id
#[derive(Debug, Clone, Default)]
pub struct CallCatalog {
    calls: HashMap<i64, NewCall>,
}

impl CallCatalog {
    pub fn new(calls: impl IntoIterator<Item = NewCall>) -> Self {
        Self {
            calls: calls.into_iter().map(|c| (c.call_id, c)).collect(),
        }
    }

    /// Known call ids in ascending order
    pub fn call_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.calls.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl CallSource for CallCatalog {
    fn fetch(&self, call_id: i64) -> Option<NewCall> {
        self.calls.get(&call_id).cloned()
    }
}

/// Handler for `ingest_call`: stores a raw call as a fresh `pending` record
///
/// Re-ingesting an existing call replaces the whole record, resetting its
/// insights and status.
pub struct CallIngestor {
    source: Arc<dyn CallSource>,
    store: Arc<dyn CallStore>,
}

impl CallIngestor {
    pub fn new(source: Arc<dyn CallSource>, store: Arc<dyn CallStore>) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl JobHandler for CallIngestor {
    async fn handle(&self, payload: JobPayload) -> JobOutcome {
        let call_id = payload.call_id;

        let Some(call) = self.source.fetch(call_id) else {
            error!(call_id, "Call not available from source");
            return JobOutcome::Abandoned {
                reason: format!("call {} not available from source", call_id),
            };
        };

        let record = CallRecord::new(call);
        match run_blocking(&self.store, move |store| store.upsert(&record)).await {
            Ok(record) => {
                info!(call_id, id = ?record.id, "Ingested call");
                JobOutcome::Completed(JobSummary {
                    call_id,
                    agent_talk_ratio: None,
                    sentiment_score: None,
                })
            }
            Err(e) if e.is_retryable() => {
                error!(call_id, error = %e, "Error ingesting call");
                JobOutcome::Retry {
                    reason: e.to_string(),
                }
            }
            Err(e) => JobOutcome::Abandoned {
                reason: e.to_string(),
            },
        }
    }
}
