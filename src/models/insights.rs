use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key under which the whole-call sentiment is stored
pub const OVERALL_SENTIMENT_KEY: &str = "overall";

/// Output of a sentiment capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// Model label (e.g. POSITIVE, NEGATIVE, NEUTRAL, ERROR)
    pub label: String,
    /// Signed score in [-1, 1]; the sign encodes polarity
    pub score: f64,
    /// Unsigned model confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Description of an internal failure, when the result is degraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SentimentResult {
    /// Result for empty or whitespace-only input
    pub fn neutral() -> Self {
        Self {
            label: "NEUTRAL".to_string(),
            score: 0.0,
            confidence: None,
            error: None,
        }
    }

    /// Degraded result returned when the backend fails
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            label: "ERROR".to_string(),
            score: 0.0,
            confidence: None,
            error: Some(message.into()),
        }
    }

    /// Build from a raw model label and its unsigned probability
    ///
    /// A `NEGATIVE` label flips the sign of the score.
    pub fn from_label(label: impl Into<String>, probability: f64) -> Self {
        let label = label.into();
        let probability = probability.clamp(0.0, 1.0);
        let score = if label.eq_ignore_ascii_case("NEGATIVE") {
            -probability
        } else {
            probability
        };
        Self {
            label,
            score,
            confidence: Some(probability),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Sentiment results keyed by scope (at least `overall` once computed)
pub type SentimentScores = BTreeMap<String, SentimentResult>;

/// Everything the orchestrator derives from one transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    /// Share of attributed words spoken by the agent, in [0, 1]
    pub agent_talk_ratio: f64,
    /// Overall sentiment score in [-1, 1]
    pub sentiment_score: f64,
    /// Structured sentiment results
    pub sentiment_scores: SentimentScores,
    /// Semantic embedding of the cleaned transcript
    pub embedding: Vec<f32>,
    /// Transcript after filler removal
    pub cleaned_transcript: String,
}

impl Insights {
    /// Defaults for an empty transcript
    pub fn empty() -> Self {
        Self {
            agent_talk_ratio: 0.0,
            sentiment_score: 0.0,
            sentiment_scores: SentimentScores::new(),
            embedding: Vec::new(),
            cleaned_transcript: String::new(),
        }
    }
}

/// Partial update of the insight columns of a call record
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightUpdate {
    pub agent_talk_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub sentiment_scores: Option<SentimentScores>,
    pub embedding: Option<Vec<f32>>,
}

impl InsightUpdate {
    /// An update that only touches status and `processed_at`
    pub fn status_only() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.agent_talk_ratio.is_none()
            && self.sentiment_score.is_none()
            && self.sentiment_scores.is_none()
            && self.embedding.is_none()
    }
}

impl From<&Insights> for InsightUpdate {
    fn from(insights: &Insights) -> Self {
        Self {
            agent_talk_ratio: Some(insights.agent_talk_ratio),
            sentiment_score: Some(insights.sentiment_score),
            sentiment_scores: Some(insights.sentiment_scores.clone()),
            embedding: Some(insights.embedding.clone()),
        }
    }
}
