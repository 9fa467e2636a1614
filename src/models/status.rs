use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum number of characters kept from a failure reason
pub const MAX_REASON_CHARS: usize = 200;

/// Keep the first [`MAX_REASON_CHARS`] characters of a failure reason
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

/// Processing lifecycle of a call record
///
/// Stored and serialized as text: `pending`, `processing`, `completed`,
/// or `failed: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProcessingStatus {
    /// Created, no insight run has started yet
    #[default]
    Pending,
    /// A worker has claimed the call (best-effort marker)
    Processing,
    /// Insights were written successfully
    Completed,
    /// The last attempt failed with the given reason
    Failed(String),
}

impl ProcessingStatus {
    /// Build a failed status, truncating the reason to [`MAX_REASON_CHARS`]
    pub fn failed(reason: impl AsRef<str>) -> Self {
        ProcessingStatus::Failed(truncate_reason(reason.as_ref()))
    }

    /// Whether no further transition is expected without a new job
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed(_))
    }

    /// The status name without any failure reason
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.kind()),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed(String::new())),
            other => match other.strip_prefix("failed:") {
                Some(reason) => Ok(ProcessingStatus::Failed(reason.trim_start().to_string())),
                None => Err(format!("unknown processing status: {}", other)),
            },
        }
    }
}

impl Serialize for ProcessingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProcessingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
