use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::{truncate_chars, EmbeddingCapability, SentimentCapability, SENTIMENT_MAX_CHARS};
use crate::error::InsightError;
use crate::models::SentimentResult;

/// Client for a text-inference server exposing `/predict` and `/embed`
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InsightError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::from_client(base_url, client))
    }

    /// Wrap an already configured HTTP client
    pub fn from_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Classify `text`, returning the highest-scoring label
    pub async fn predict(&self, text: &str) -> Result<Prediction> {
        let predictions: Vec<Prediction> = self.post("predict", text).await?;
        predictions
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .context("Inference server returned no predictions")
    }

    /// Embed `text` into a single vector
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors: Vec<Vec<f32>> = self.post("embed", text).await?;
        vectors
            .into_iter()
            .next()
            .context("Inference server returned no embeddings")
    }

    async fn post<T: DeserializeOwned>(&self, route: &str, text: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, route);
        let request = InferenceRequest {
            inputs: text.to_string(),
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Inference server error: {} - {}", status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    inputs: String,
    truncate: bool,
}

/// One label/probability pair from a classification model
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// Sentiment backed by a remote classification model
#[derive(Debug, Clone)]
pub struct HttpSentiment {
    client: InferenceClient,
}

impl HttpSentiment {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SentimentCapability for HttpSentiment {
    async fn analyze(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::neutral();
        }

        match self
            .client
            .predict(truncate_chars(text, SENTIMENT_MAX_CHARS))
            .await
        {
            Ok(prediction) => SentimentResult::from_label(prediction.label, prediction.score),
            Err(e) => {
                error!(url = %self.client.base_url(), "Error in sentiment analysis: {:#}", e);
                SentimentResult::error(format!("{:#}", e))
            }
        }
    }
}

/// Embeddings backed by a remote sentence-embedding model
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: InferenceClient,
    dim: usize,
}

impl HttpEmbedder {
    pub fn new(client: InferenceClient, dim: usize) -> Self {
        Self { client, dim }
    }
}

#[async_trait]
impl EmbeddingCapability for HttpEmbedder {
    async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        match self.client.embed(text).await {
            Ok(vector) if vector.len() == self.dim => vector,
            Ok(vector) => {
                warn!(
                    expected = self.dim,
                    actual = vector.len(),
                    "Embedding dimension mismatch, discarding vector"
                );
                Vec::new()
            }
            Err(e) => {
                error!(url = %self.client.base_url(), "Error generating embeddings: {:#}", e);
                Vec::new()
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    // Port 9 (discard) is closed on test hosts, so requests fail fast.
    const UNREACHABLE: &str = "http://127.0.0.1:9/";

    fn client() -> InferenceClient {
        InferenceClient::new(UNREACHABLE, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(client().base_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_sentiment_failure_degrades() {
        let sentiment = HttpSentiment::new(client());
        let result = sentiment.analyze("Customer: hello").await;
        assert_eq!(result.label, "ERROR");
        assert_eq!(result.score, 0.0);
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_sentiment_empty_skips_request() {
        let sentiment = HttpSentiment::new(client());
        assert_eq!(sentiment.analyze("  ").await, SentimentResult::neutral());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let embedder = HttpEmbedder::new(client(), 384);
        assert!(embedder.embed("Agent: hello").await.is_empty());
        assert_eq!(embedder.dimension(), 384);
    }

    /// Serve `body` as a JSON 200 response to every request
    async fn serve_json(body: &'static str) -> InferenceClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        InferenceClient::from_client(&format!("http://{}/", addr), client)
    }

    /// Consume request headers and body
    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..read]);

            let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= header_end + 4 + body_len {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_sentiment_picks_top_prediction() {
        let client =
            serve_json(r#"[{"label": "POSITIVE", "score": 0.15}, {"label": "NEGATIVE", "score": 0.85}]"#)
                .await;
        let result = HttpSentiment::new(client).analyze("Customer: this is broken").await;

        assert_eq!(result.label, "NEGATIVE");
        assert!((result.score + 0.85).abs() < 1e-9);
        assert_eq!(result.confidence, Some(0.85));
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_embedding_returns_first_vector() {
        let client = serve_json("[[0.5, -0.25, 0.125]]").await;
        let embedder = HttpEmbedder::new(client, 3);
        assert_eq!(embedder.embed("Agent: hello").await, vec![0.5, -0.25, 0.125]);
    }

    #[tokio::test]
    async fn test_embedding_wrong_dimension_discarded() {
        let client = serve_json("[[0.5, -0.25, 0.125]]").await;
        let embedder = HttpEmbedder::new(client, 4);
        assert!(embedder.embed("Agent: hello").await.is_empty());
    }
}
