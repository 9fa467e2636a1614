pub mod capabilities;
pub mod config;
pub mod error;
pub mod io;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod store;

pub use capabilities::{CapabilityProvider, EmbeddingCapability, SentimentCapability};
pub use config::Settings;
pub use error::{InsightError, Result};
pub use io::{format_status_counts, parse_calls_file, parse_calls_json, InsightReport};
pub use jobs::{
    CallCatalog, CallIngestor, JobExecutor, JobHandle, JobName, JobOutcome, JobPayload, JobQueue,
    JobReport, QueueName, RetryPolicy,
};
pub use models::{CallRecord, InsightUpdate, Insights, NewCall, ProcessingStatus, SentimentResult};
pub use pipeline::{agent_talk_ratio, clean_transcript, InsightOrchestrator};
pub use store::{CallStore, SqliteCallStore};
