//! DrugRAG Core Library
//!
//! Retrieval-augmented question answering over a drug-information corpus.
//!
//! # Features
//! - Query decomposition into independent sub-questions
//! - Exact cosine and HNSW nearest-neighbour search over chunk embeddings
//! - Grounded per-sub-question synthesis with cited evidence
//! - Aggregation that reports unanswered and ungrounded parts
//! - OpenAI-compatible embedding and chat providers with bounded retries

pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod types;

pub use config::{Config, LLMServiceConfig, PipelineConfig, RetrievalMode, SearchMode};
pub use error::{Error, RagError, Result};
pub use index::{SnapshotInfo, VectorIndex};
pub use llm::{ChatMessage, Embedder, HttpEmbedder, HttpLLMClient, LLMClient, MockLLMClient};
pub use pipeline::{Pipeline, QueryOptions, QueryOutcome, QueryState};
pub use types::{
    Chunk, ChunkId, FinalAnswer, Query, RetrievalResult, ScoredChunk, SourceRef, SubAnswer,
    SubAnswerStatus, SubQuestion,
};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "drugrag";
