use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProcessingStatus, SentimentScores};

/// Raw call as supplied by the ingestion side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCall {
    /// Business key of the call
    pub call_id: i64,
    /// Agent who handled the call
    #[serde(default)]
    pub agent_id: Option<i64>,
    /// Customer on the other end
    #[serde(default)]
    pub customer_id: Option<i64>,
    /// Language code (e.g. "en")
    #[serde(default)]
    pub language: Option<String>,
    /// When the call started
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Call length in seconds
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    /// Speaker-tagged transcript, one `Speaker: text` utterance per line
    #[serde(default)]
    pub transcript: String,
}

/// One transcribed call and its derived insights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Surrogate key, assigned by the store
    pub id: Option<i64>,
    pub call_id: i64,
    pub agent_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub language: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub transcript: String,
    pub agent_talk_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub sentiment_scores: Option<SentimentScores>,
    pub embedding: Option<Vec<f32>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_status: ProcessingStatus,
}

impl CallRecord {
    /// A fresh record with no insights and an explicit `pending` status
    pub fn new(call: NewCall) -> Self {
        Self {
            id: None,
            call_id: call.call_id,
            agent_id: call.agent_id,
            customer_id: call.customer_id,
            language: call.language,
            start_time: call.start_time,
            duration_seconds: call.duration_seconds,
            transcript: call.transcript,
            agent_talk_ratio: None,
            sentiment_score: None,
            sentiment_scores: None,
            embedding: None,
            processed_at: None,
            processing_status: ProcessingStatus::Pending,
        }
    }

    /// Whether insight columns have been populated
    pub fn has_insights(&self) -> bool {
        self.agent_talk_ratio.is_some()
            || self.sentiment_score.is_some()
            || self.sentiment_scores.is_some()
            || self.embedding.is_some()
    }
}

impl From<NewCall> for CallRecord {
    fn from(call: NewCall) -> Self {
        CallRecord::new(call)
    }
}

/// Agent referenced by call records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: i64,
    pub name: Option<String>,
}
