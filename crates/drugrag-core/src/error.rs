//! Error types for drugrag

use thiserror::Error;

/// Result type alias using RagError
pub type Result<T> = std::result::Result<T, RagError>;

/// Error type alias for convenience
pub type Error = RagError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const UPSTREAM: i32 = 4;
}

/// Main error type for drugrag
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index is empty")]
    EmptyIndex,

    #[error("Query cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures are all treated as the provider being unreachable.
        RagError::UpstreamUnavailable(err.to_string())
    }
}

impl RagError {
    /// Whether a retry at the provider boundary may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::RateLimited { .. })
    }

    /// Index-layer errors that indicate a programming or configuration fault
    pub fn is_fatal_index_error(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::EmptyIndex)
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            Self::UpstreamUnavailable(_) | Self::RateLimited { .. } => exit_codes::UPSTREAM,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => exit_codes::NOT_FOUND,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
