use thiserror::Error;

/// Result type alias for insight pipeline operations
pub type Result<T> = std::result::Result<T, InsightError>;

/// Errors raised above the capability boundary
///
/// Capability failures never show up here directly: sentiment and embedding
/// backends degrade to a structurally valid result instead. What does surface
/// is a capability that hangs past its deadline or panics.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("call {call_id} not found")]
    NotFound { call_id: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{capability} capability timed out after {seconds}s")]
    Timeout {
        capability: &'static str,
        seconds: u64,
    },

    #[error("{capability} capability failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    #[error("queue error: {0}")]
    Queue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Transient(String),
}

impl InsightError {
    /// Whether the scheduler should try the job again
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            InsightError::NotFound { .. } | InsightError::Config(_) | InsightError::Queue(_)
        )
    }
}
