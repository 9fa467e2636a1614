pub mod sqlite;

pub use sqlite::*;

use std::sync::Arc;

use crate::error::{InsightError, Result};
use crate::models::{CallRecord, InsightUpdate, ProcessingStatus};

/// Persistence boundary for call records
///
/// Every operation runs in its own transaction and either commits or rolls
/// back and returns the error. No lock outlives a single call.
pub trait CallStore: Send + Sync {
    /// Look up a call by business key
    fn get(&self, call_id: i64) -> Result<Option<CallRecord>>;

    /// Insert the record, or overwrite every mutable field of the existing one
    fn upsert(&self, record: &CallRecord) -> Result<CallRecord>;

    /// Write the supplied insight fields plus status and `processed_at`
    ///
    /// Fields left as `None` keep their stored value. Fails with
    /// [`InsightError::NotFound`](crate::InsightError::NotFound) when the call
    /// does not exist.
    fn update_insights(
        &self,
        call_id: i64,
        update: &InsightUpdate,
        status: &ProcessingStatus,
    ) -> Result<CallRecord>;

    /// Records ordered by call_id, optionally restricted to one status kind
    /// (`pending`, `processing`, `completed`, `failed`)
    fn list(&self, status_kind: Option<&str>) -> Result<Vec<CallRecord>>;

    /// Number of records per status kind
    fn status_counts(&self) -> Result<Vec<(String, usize)>>;
}

/// Run one store operation on the blocking pool
///
/// Store calls may wait on SQLite locks, so async callers go through here
/// rather than calling the store on a runtime worker.
pub async fn run_blocking<T, F>(store: &Arc<dyn CallStore>, op: F) -> Result<T>
where
    F: FnOnce(&dyn CallStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| InsightError::Transient(format!("store task failed: {}", e)))?
}
