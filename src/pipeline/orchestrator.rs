use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::{agent_talk_ratio, clean_transcript};
use crate::capabilities::CapabilityProvider;
use crate::error::{InsightError, Result};
use crate::models::{Insights, SentimentScores, OVERALL_SENTIMENT_KEY};

/// Composes normalization, talk ratio, sentiment and embedding for one call
#[derive(Debug, Clone)]
pub struct InsightOrchestrator {
    capabilities: CapabilityProvider,
    capability_timeout: Duration,
}

impl InsightOrchestrator {
    pub fn new(capabilities: CapabilityProvider, capability_timeout: Duration) -> Self {
        Self {
            capabilities,
            capability_timeout,
        }
    }

    pub fn capability_timeout(&self) -> Duration {
        self.capability_timeout
    }

    /// Derive insights from a raw transcript
    ///
    /// An empty or whitespace-only transcript returns [`Insights::empty`]
    /// without calling any capability. Capability calls are bounded by the
    /// configured deadline; a timeout or a panic inside a capability is
    /// returned as an error so the job can be retried.
    pub async fn process(&self, transcript: &str) -> Result<Insights> {
        if transcript.trim().is_empty() {
            return Ok(Insights::empty());
        }

        let cleaned = clean_transcript(transcript);
        let talk_ratio = agent_talk_ratio(&cleaned);

        let sentiment = {
            let capability = self.capabilities.sentiment();
            let text = cleaned.clone();
            self.bounded("sentiment", async move { capability.analyze(&text).await })
                .await?
        };

        let embedding = {
            let capability = self.capabilities.embedding();
            let text = cleaned.clone();
            self.bounded("embedding", async move { capability.embed(&text).await })
                .await?
        };

        debug!(
            talk_ratio,
            sentiment_label = %sentiment.label,
            embedding_len = embedding.len(),
            "Computed insights"
        );

        let sentiment_score = sentiment.score;
        let mut sentiment_scores = SentimentScores::new();
        sentiment_scores.insert(OVERALL_SENTIMENT_KEY.to_string(), sentiment);

        Ok(Insights {
            agent_talk_ratio: talk_ratio,
            sentiment_score,
            sentiment_scores,
            embedding,
            cleaned_transcript: cleaned,
        })
    }

    /// Run a capability call on its own task under the deadline
    async fn bounded<F, T>(&self, capability: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(call);
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.capability_timeout, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_error)) => Err(InsightError::Capability {
                capability,
                message: panic_message(join_error),
            }),
            Err(_) => {
                abort.abort();
                Err(InsightError::Timeout {
                    capability,
                    seconds: self.capability_timeout.as_secs(),
                })
            }
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "capability panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{EmbeddingCapability, HashingEmbedder, SentimentCapability};
    use crate::models::SentimentResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSentiment {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SentimentCapability for CountingSentiment {
        async fn analyze(&self, _text: &str) -> SentimentResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SentimentResult::from_label("POSITIVE", 0.8)
        }
    }

    struct PanickingSentiment;

    #[async_trait]
    impl SentimentCapability for PanickingSentiment {
        async fn analyze(&self, _text: &str) -> SentimentResult {
            panic!("model weights missing")
        }
    }

    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingCapability for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Vec<f32> {
            std::future::pending::<()>().await;
            Vec::new()
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    fn orchestrator(
        sentiment: Arc<dyn SentimentCapability>,
        embedding: Arc<dyn EmbeddingCapability>,
    ) -> InsightOrchestrator {
        InsightOrchestrator::new(
            CapabilityProvider::new(sentiment, embedding),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_empty_transcript_short_circuits() {
        let sentiment = Arc::new(CountingSentiment::default());
        let orch = orchestrator(sentiment.clone(), Arc::new(HashingEmbedder::new(8)));

        for transcript in ["", "   \n\t "] {
            let insights = orch.process(transcript).await.unwrap();
            assert_eq!(insights.agent_talk_ratio, 0.0);
            assert_eq!(insights.sentiment_score, 0.0);
            assert!(insights.sentiment_scores.is_empty());
            assert!(insights.embedding.is_empty());
        }
        assert_eq!(sentiment.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let sentiment = Arc::new(CountingSentiment::default());
        let orch = orchestrator(sentiment.clone(), Arc::new(HashingEmbedder::new(8)));

        let insights = orch
            .process("Agent: um hi there\nCustomer: uh hello\nAgent: like")
            .await
            .unwrap();

        assert_eq!(insights.cleaned_transcript, "Agent: hi there\nCustomer: hello");
        assert!((insights.agent_talk_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(insights.sentiment_score, 0.8);
        assert_eq!(insights.sentiment_scores["overall"].label, "POSITIVE");
        assert_eq!(insights.embedding.len(), 8);
        assert_eq!(sentiment.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_capability_is_error() {
        let orch = orchestrator(Arc::new(PanickingSentiment), Arc::new(HashingEmbedder::new(8)));
        let err = orch.process("Agent: hello").await.unwrap_err();
        match err {
            InsightError::Capability {
                capability,
                message,
            } => {
                assert_eq!(capability, "sentiment");
                assert!(message.contains("model weights missing"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_capability_times_out() {
        let orch = orchestrator(
            Arc::new(CountingSentiment::default()),
            Arc::new(StalledEmbedder),
        );
        let err = orch.process("Customer: hello").await.unwrap_err();
        assert!(matches!(
            err,
            InsightError::Timeout {
                capability: "embedding",
                seconds: 5
            }
        ));
        assert!(err.is_retryable());
    }
}
