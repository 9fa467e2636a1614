pub mod hashing;
pub mod http;
pub mod lexicon;

pub use hashing::*;
pub use http::*;
pub use lexicon::*;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;
use crate::models::SentimentResult;

/// Maximum number of characters handed to a sentiment model
pub const SENTIMENT_MAX_CHARS: usize = 512;

/// Sentiment scoring backend
///
/// Implementations never fail: empty input yields
/// [`SentimentResult::neutral`] and internal errors yield
/// [`SentimentResult::error`].
#[async_trait]
pub trait SentimentCapability: Send + Sync {
    async fn analyze(&self, text: &str) -> SentimentResult;
}

/// Embedding backend
///
/// Returns a fixed-length vector, or an empty one on empty input or internal
/// failure. Failures are logged by the implementation.
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    async fn embed(&self, text: &str) -> Vec<f32>;

    /// Length of the vectors this backend produces
    fn dimension(&self) -> usize;
}

/// Capability instances shared read-only by every job of a worker process
///
/// Built once at startup and handed to the orchestrator.
#[derive(Clone)]
pub struct CapabilityProvider {
    sentiment: Arc<dyn SentimentCapability>,
    embedding: Arc<dyn EmbeddingCapability>,
}

impl CapabilityProvider {
    pub fn new(
        sentiment: Arc<dyn SentimentCapability>,
        embedding: Arc<dyn EmbeddingCapability>,
    ) -> Self {
        Self {
            sentiment,
            embedding,
        }
    }

    /// In-process capabilities that need no model server
    pub fn local(embedding_dim: usize) -> Self {
        Self::new(
            Arc::new(LexiconSentiment::default()),
            Arc::new(HashingEmbedder::new(embedding_dim)),
        )
    }

    /// HTTP-backed capabilities when an inference URL is configured, local otherwise
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match &settings.inference_url {
            Some(url) => {
                info!("Using inference server at {}", url);
                let client = InferenceClient::new(url, settings.capability_timeout)?;
                Ok(Self::new(
                    Arc::new(HttpSentiment::new(client.clone())),
                    Arc::new(HttpEmbedder::new(client, settings.embedding_dim)),
                ))
            }
            None => {
                info!(
                    "No inference server configured, using local capabilities (dim={})",
                    settings.embedding_dim
                );
                Ok(Self::local(settings.embedding_dim))
            }
        }
    }

    pub fn sentiment(&self) -> Arc<dyn SentimentCapability> {
        Arc::clone(&self.sentiment)
    }

    pub fn embedding(&self) -> Arc<dyn EmbeddingCapability> {
        Arc::clone(&self.embedding)
    }
}

impl std::fmt::Debug for CapabilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProvider")
            .field("embedding_dim", &self.embedding.dimension())
            .finish_non_exhaustive()
    }
}

/// Keep at most `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Lowercased word with edge punctuation removed
pub(crate) fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word("Great!"), "great");
        assert_eq!(normalize_word("(don't)"), "don't");
        assert_eq!(normalize_word("..."), "");
    }

    #[tokio::test]
    async fn test_local_provider() {
        let provider = CapabilityProvider::local(16);
        assert_eq!(provider.embedding().dimension(), 16);
        let result = provider.sentiment().analyze("   ").await;
        assert_eq!(result, SentimentResult::neutral());
    }
}
