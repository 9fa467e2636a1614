use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::capabilities::DEFAULT_EMBEDDING_DIM;
use crate::error::{InsightError, Result};
use crate::jobs::RetryPolicy;

/// Runtime settings for the insight workers
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database file (DATABASE_PATH)
    pub database_path: PathBuf,
    /// Base URL of a text-inference server (INFERENCE_URL); local capabilities when unset
    pub inference_url: Option<String>,
    /// Deadline for a single sentiment or embedding call (CAPABILITY_TIMEOUT_SECS)
    pub capability_timeout: Duration,
    /// Retry schedule for failed insight jobs (RETRY_BASE_DELAY_SECS, MAX_RETRIES)
    pub retry: RetryPolicy,
    /// Worker tasks consuming the `insights` queue (INSIGHTS_WORKERS)
    pub insights_workers: usize,
    /// Worker tasks consuming the `ingestion` queue (INGESTION_WORKERS)
    pub ingestion_workers: usize,
    /// Embedding width (EMBEDDING_DIM)
    pub embedding_dim: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("calls.sqlite"),
            inference_url: None,
            capability_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            insights_workers: 4,
            ingestion_workers: 2,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl Settings {
    /// Load settings from the environment, reading a `.env` file first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let database_path = lookup("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);
        let inference_url = lookup("INFERENCE_URL").filter(|url| !url.trim().is_empty());

        let capability_timeout = parse_var(&lookup, "CAPABILITY_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.capability_timeout);

        let retry = RetryPolicy {
            max_retries: parse_var(&lookup, "MAX_RETRIES")?.unwrap_or(defaults.retry.max_retries),
            base_delay: parse_var(&lookup, "RETRY_BASE_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.base_delay),
        };

        let insights_workers =
            parse_var(&lookup, "INSIGHTS_WORKERS")?.unwrap_or(defaults.insights_workers);
        let ingestion_workers =
            parse_var(&lookup, "INGESTION_WORKERS")?.unwrap_or(defaults.ingestion_workers);
        let embedding_dim = parse_var(&lookup, "EMBEDDING_DIM")?.unwrap_or(defaults.embedding_dim);

        if insights_workers == 0 || ingestion_workers == 0 {
            return Err(InsightError::Config(
                "worker counts must be at least 1".to_string(),
            ));
        }
        if embedding_dim == 0 {
            return Err(InsightError::Config("EMBEDDING_DIM must be positive".to_string()));
        }

        Ok(Self {
            database_path,
            inference_url,
            capability_timeout,
            retry,
            insights_workers,
            ingestion_workers,
            embedding_dim,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| InsightError::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
