//! HTTP client for OpenAI-compatible services (OpenAI, vLLM, etc.)

use super::retry::RetryPolicy;
use crate::config::{LLMServiceConfig, RetryConfig};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for LLM service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate chat completion with the given model
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String>;

    /// Generate embeddings for multiple texts, one vector per input, in order
    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Provider name for logs
    fn provider_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct APIMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub rate_limited: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of API metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub rate_limited: u64,
    pub avg_latency_ms: f64,
}

/// OpenAI-compatible client with retries at the call boundary
pub struct HttpLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    retry: RetryPolicy,
    metrics: Arc<APIMetrics>,
}

impl HttpLLMClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig, retry: &RetryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
            retry: RetryPolicy::from_config(retry),
            metrics: Arc::new(APIMetrics::default()),
        })
    }

    /// Get current API metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: total,
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            rate_limited: self.metrics.rate_limited.load(Ordering::Relaxed),
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => req.header("Authorization", format!("Bearer {}", api_key)),
            None => req,
        }
    }

    /// One POST attempt; maps every failure onto the error taxonomy
    async fn post_json<Req, Resp>(&self, url: &str, body: &Req, what: &str) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let result: Result<Resp> = async {
            let response = self
                .authorize(self.http_client.post(url).json(body))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                let body = response.text().await.unwrap_or_default();
                return Err(classify_failure(status, retry_after, &body, what));
            }

            response.json::<Resp>().await.map_err(|e| {
                RagError::UpstreamUnavailable(format!("{} returned malformed payload: {}", what, e))
            })
        }
        .await;

        let elapsed = start.elapsed().as_millis() as u64;
        self.metrics
            .total_latency_ms
            .fetch_add(elapsed, Ordering::Relaxed);

        if let Err(ref e) = result {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
            if matches!(e, RagError::RateLimited { .. }) {
                self.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn classify_failure(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
    what: &str,
) -> RagError {
    let detail = format!("{} (HTTP {}): {}", what, status.as_u16(), truncate(body, 300));
    match status {
        StatusCode::TOO_MANY_REQUESTS => RagError::RateLimited { retry_after_secs },
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            RagError::InvalidInput(detail)
        }
        // Not retried
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RagError::Config(format!("{}; check OPENAI_API_KEY", detail))
        }
        _ => RagError::UpstreamUnavailable(detail),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl LLMClient for HttpLLMClient {
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        let request = ChatRequest {
            model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let url = format!("{}/v1/chat/completions", self.config.url);

        tracing::debug!(model, messages = messages.len(), "Chat completion request");

        let response: ChatResponse = self
            .retry
            .run("chat_completion", || {
                self.post_json(&url, &request, "Chat completion")
            })
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                RagError::UpstreamUnavailable("Chat completion returned no choices".to_string())
            })?
            .message
            .content;

        Ok(content.trim().to_string())
    }

    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }

        #[derive(Deserialize)]
        struct EmbedData {
            #[serde(default)]
            index: Option<usize>,
            embedding: Vec<f32>,
        }

        let request = EmbedRequest { model, input: texts };
        let url = format!("{}/v1/embeddings", self.config.embeddings_url());

        tracing::debug!(model, inputs = texts.len(), "Embedding request");

        let response: EmbedResponse = self
            .retry
            .run("embed_batch", || self.post_json(&url, &request, "Embedding"))
            .await?;

        if response.data.len() != texts.len() {
            return Err(RagError::UpstreamUnavailable(format!(
                "Embedding service returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        // Providers may reorder; `index` restores input order when present.
        let mut data = response.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn provider_name(&self) -> &str {
        &self.config.url
    }
}
