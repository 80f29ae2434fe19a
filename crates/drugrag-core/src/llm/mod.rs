//! LLM integration
//!
//! Provides traits and implementations for:
//! - Embedding generation via external services (OpenAI, vLLM, etc.)
//! - Chat completion for decomposition, synthesis and aggregation
//! - Bounded retry at the provider boundary

mod client;
mod http_embedder;
mod mock;
mod retry;
mod traits;

pub use client::{APIMetrics, ChatMessage, HttpLLMClient, LLMClient, MetricsSnapshot};
pub use http_embedder::{estimate_tokens, HttpEmbedder};
pub use mock::{hashed_embedding, ChatCall, MockLLMClient};
pub use retry::RetryPolicy;
pub use traits::*;
