//! Deterministic in-process LLM client
//!
//! Used by tests and by the offline demo. Embeddings are hashed
//! bag-of-words vectors, so texts sharing words score as similar. Chat
//! responses come from a caller-supplied handler.

use super::{ChatMessage, LLMClient};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ChatHandler = Box<dyn Fn(&str, &[ChatMessage]) -> Result<String> + Send + Sync>;
type EmbedFailure = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// A recorded chat completion call
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatCall {
    /// Content of the final user message
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

pub struct MockLLMClient {
    dimensions: usize,
    chat_handler: ChatHandler,
    embed_failure: Option<EmbedFailure>,
    chat_calls: Mutex<Vec<ChatCall>>,
    embed_calls: AtomicUsize,
}

impl MockLLMClient {
    /// Client producing `dimensions`-wide embeddings and echo answers
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            chat_handler: Box::new(|_: &str, messages: &[ChatMessage]| {
                let question = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .and_then(|m| m.content.lines().find(|l| l.starts_with("Question:")))
                    .unwrap_or("Question: unknown");
                Ok(format!("Answer to {}", question.trim_start_matches("Question:").trim()))
            }),
            embed_failure: None,
            chat_calls: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the chat handler; it receives the model name and messages
    pub fn with_chat<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[ChatMessage]) -> Result<String> + Send + Sync + 'static,
    {
        self.chat_handler = Box::new(handler);
        self
    }

    /// Fail embedding calls whose input matches `predicate`
    pub fn with_embed_failure<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.embed_failure = Some(Box::new(predicate));
        self
    }

    pub fn chat_calls(&self) -> Vec<ChatCall> {
        self.chat_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn embed_call_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

/// Hashed bag-of-words embedding, L2-normalised
pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    if dimensions == 0 {
        return vector;
    }
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let bucket = (fnv1a(token.as_bytes()) % dimensions as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        if let Ok(mut calls) = self.chat_calls.lock() {
            calls.push(ChatCall {
                model: model.to_string(),
                messages: messages.clone(),
            });
        }
        (self.chat_handler)(model, &messages)
    }

    async fn embed_batch(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref fails) = self.embed_failure {
            if let Some(text) = texts.iter().find(|t| fails(t.as_str())) {
                return Err(RagError::UpstreamUnavailable(format!(
                    "mock embedding outage for {:?}",
                    text
                )));
            }
        }
        Ok(texts
            .iter()
            .map(|t| hashed_embedding(t, self.dimensions))
            .collect())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn test_shared_words_score_higher() {
        let q = hashed_embedding("warfarin bleeding risk", 64);
        let near = hashed_embedding("Warfarin increases bleeding risk.", 64);
        let far = hashed_embedding("Metformin lowers glucose", 64);
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_embedding_is_unit_length() {
        let v = hashed_embedding("ibuprofen", 16);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_records_chat_calls() {
        let client = MockLLMClient::new(4).with_chat(|model, _| Ok(format!("from {}", model)));
        let reply = client
            .chat_completion("m1", vec![ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(reply, "from m1");
        let calls = client.chat_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt(), "hello");
    }

    #[tokio::test]
    async fn test_embed_failure_injection() {
        let client = MockLLMClient::new(4).with_embed_failure(|t| t.contains("outage"));
        assert!(client
            .embed_batch("m", &["fine".to_string()])
            .await
            .is_ok());
        assert!(matches!(
            client.embed_batch("m", &["outage here".to_string()]).await,
            Err(RagError::UpstreamUnavailable(_))
        ));
        assert_eq!(client.embed_call_count(), 2);
    }
}
