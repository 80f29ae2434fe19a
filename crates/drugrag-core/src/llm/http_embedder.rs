//! Embedder backed by an external HTTP LLM service

use super::{Embedder, LLMClient};
use crate::config::LLMServiceConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Rough characters-per-token ratio used to reject oversized input before
/// it reaches the provider.
const CHARS_PER_TOKEN: usize = 4;

/// Embedder that uses an external HTTP service (OpenAI, vLLM, etc.)
pub struct HttpEmbedder {
    client: Arc<dyn LLMClient>,
    model: String,
    dimensions: usize,
    max_input_tokens: usize,
}

impl HttpEmbedder {
    /// Create from LLM client
    pub fn new(
        client: Arc<dyn LLMClient>,
        model: impl Into<String>,
        dimensions: usize,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
            max_input_tokens,
        }
    }

    /// Create from configuration
    pub fn from_config(client: Arc<dyn LLMClient>, config: &LLMServiceConfig) -> Result<Self> {
        let dimensions = config.resolved_dimensions().ok_or_else(|| {
            RagError::Config(format!(
                "embedding_dimensions must be set for model {}",
                config.embedding_model
            ))
        })?;
        Ok(Self::new(
            client,
            config.embedding_model.clone(),
            dimensions,
            config.max_input_tokens,
        ))
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        let estimated = estimate_tokens(text);
        if estimated > self.max_input_tokens {
            return Err(RagError::InvalidInput(format!(
                "text of ~{} tokens exceeds the {} token limit of {}",
                estimated, self.max_input_tokens, self.model
            )));
        }
        Ok(())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Token estimate for limit checks
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::UpstreamUnavailable("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            self.validate(text)?;
        }
        let vectors = self.client.embed_batch(&self.model, texts).await?;
        for vector in &vectors {
            self.check_dimensions(vector)?;
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLMClient;

    fn embedder(dims: usize, mock_dims: usize) -> HttpEmbedder {
        HttpEmbedder::new(Arc::new(MockLLMClient::new(mock_dims)), "mock-embed", dims, 16)
    }

    #[tokio::test]
    async fn test_embed_returns_configured_dimensions() {
        let e = embedder(8, 8);
        let v = e.embed("warfarin dosing").await.unwrap();
        assert_eq!(v.len(), 8);
    }

    #[tokio::test]
    async fn test_embed_is_deterministic() {
        let e = embedder(8, 8);
        let a = e.embed("ibuprofen").await.unwrap();
        let b = e.embed("ibuprofen").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_rejects_empty_text() {
        let e = embedder(8, 8);
        assert!(matches!(e.embed("  ").await, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_rejects_text_over_token_limit() {
        let e = embedder(8, 8);
        let long = "x".repeat(16 * CHARS_PER_TOKEN + 1);
        assert!(matches!(e.embed(&long).await, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_detects_provider_dimension_drift() {
        let e = embedder(8, 6);
        assert!(matches!(
            e.embed("aspirin").await,
            Err(RagError::DimensionMismatch {
                expected: 8,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
