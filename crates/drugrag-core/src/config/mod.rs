//! Configuration management
//!
//! Plain records handed to the pipeline. Only [`Config::apply_env`] touches
//! the process environment, and only the host binary calls it.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding and generation provider
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Query pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP boundary
    #[serde(default)]
    pub server: ServerConfig,

    /// Indexed corpus location
    #[serde(default)]
    pub corpus: CorpusConfig,
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the OpenAI-compatible service for chat completions
    #[serde(default = "default_url")]
    pub url: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model used to split queries into sub-questions
    #[serde(default = "default_chat_model")]
    pub decompose_model: String,

    /// Model used for sub-answers and the final combination
    #[serde(default = "default_chat_model")]
    pub answer_model: String,

    /// Embedding dimensions (derived from the model name if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Largest embedding input the model accepts, in tokens
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }

    /// Configured dimensions, or the known width of the embedding model
    pub fn resolved_dimensions(&self) -> Option<usize> {
        self.embedding_dimensions
            .or_else(|| known_model_dimensions(&self.embedding_model))
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            embedding_url: None,
            embedding_model: default_embedding_model(),
            decompose_model: default_chat_model(),
            answer_model: default_chat_model(),
            embedding_dimensions: None,
            api_key: None,
            timeout_secs: default_timeout(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_input_tokens: default_max_input_tokens(),
        }
    }
}

fn default_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    512
}

fn default_max_input_tokens() -> usize {
    8191
}

fn known_model_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-large" => Some(3072),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        _ => None,
    }
}

/// Where retrieval text comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Retrieve separately for every sub-question
    #[default]
    PerSubQuestion,
    /// Retrieve once with the full query and share the hits
    OriginalQuery,
}

/// Nearest-neighbour strategy for index search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Brute-force cosine scan
    #[default]
    Exact,
    /// HNSW graph when built, exact scan otherwise
    Approximate,
}

/// Query pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Chunks retrieved per sub-question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_sub_questions")]
    pub max_sub_questions: usize,

    /// Sub-questions processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub retrieval_mode: RetrievalMode,

    #[serde(default)]
    pub search_mode: SearchMode,

    /// Minimum corpus size before an HNSW graph is built
    #[serde(default = "default_ann_threshold")]
    pub ann_threshold: usize,

    /// Character budget for retrieved context in one synthesis prompt
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,

    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Upper bound on one request through the HTTP boundary
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_sub_questions: default_max_sub_questions(),
            concurrency: default_concurrency(),
            retrieval_mode: RetrievalMode::default(),
            search_mode: SearchMode::default(),
            ann_threshold: default_ann_threshold(),
            context_budget_chars: default_context_budget(),
            max_query_chars: default_max_query_chars(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_max_sub_questions() -> usize {
    5
}

fn default_concurrency() -> usize {
    4
}

fn default_ann_threshold() -> usize {
    1000
}

fn default_context_budget() -> usize {
    12_000
}

fn default_max_query_chars() -> usize {
    4000
}

fn default_request_timeout() -> u64 {
    120
}

/// Bounded exponential backoff at the provider boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    20_000
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// CORS origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

/// Corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorpusConfig {
    /// Index snapshot produced by `drugrag index`
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from a path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to a path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Overlay process environment variables onto the loaded file
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm_service.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm_service.url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.llm_service.embedding_model = model;
        }
        if let Some(model) = get("DECOMPOSE_MODEL") {
            self.llm_service.decompose_model = model;
        }
        if let Some(model) = get("ANSWER_MODEL") {
            self.llm_service.answer_model = model;
        }
        if let Some(dims) = get("EMBEDDING_DIMS").and_then(|s| s.parse().ok()) {
            self.llm_service.embedding_dimensions = Some(dims);
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(bind) = get("DRUGRAG_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = get("DRUGRAG_SNAPSHOT") {
            self.corpus.snapshot = Some(PathBuf::from(path));
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.top_k == 0 {
            return Err(RagError::Config("pipeline.top_k must be at least 1".into()));
        }
        if p.max_sub_questions == 0 {
            return Err(RagError::Config(
                "pipeline.max_sub_questions must be at least 1".into(),
            ));
        }
        if p.concurrency == 0 {
            return Err(RagError::Config(
                "pipeline.concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.llm_service.resolved_dimensions() == Some(0) {
            return Err(RagError::Config(
                "llm_service.embedding_dimensions must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.pipeline.top_k, 3);
        assert_eq!(config.pipeline.max_sub_questions, 5);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.llm_service.embedding_model, "text-embedding-3-large");
        assert_eq!(config.llm_service.resolved_dimensions(), Some(3072));
        assert_eq!(config.pipeline.retrieval_mode, RetrievalMode::PerSubQuestion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "pipeline:\n  top_k: 5\n  retrieval_mode: original_query\nllm_service:\n  answer_model: gpt-4o\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pipeline.top_k, 5);
        assert_eq!(config.pipeline.retrieval_mode, RetrievalMode::OriginalQuery);
        assert_eq!(config.pipeline.max_sub_questions, 5);
        assert_eq!(config.llm_service.answer_model, "gpt-4o");
        assert_eq!(config.llm_service.decompose_model, "gpt-4o-mini");
    }

    #[test]
    fn test_apply_vars_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("ANSWER_MODEL", "gpt-4o"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("EMBEDDING_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm_service.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm_service.answer_model, "gpt-4o");
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        // Blank values leave the default alone
        assert_eq!(config.llm_service.embedding_model, "text-embedding-3-large");
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = Config::default();
        config.pipeline.top_k = 0;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.yml");

        let mut config = Config::default();
        config.pipeline.concurrency = 2;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.pipeline.concurrency, 2);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("absent.yml")).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }
}
