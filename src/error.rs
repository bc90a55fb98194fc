//! Error handling for the knowledge compiler and runtime

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, RagError>;

/// Main error type for builder and runtime operations
#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("retrieval failure: {0}")]
    Retrieval(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RagError {
    /// Check if the error is worth retrying (rate limits, transient upstream trouble)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::RateLimited(_) | RagError::Upstream(_) | RagError::Http(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            RagError::InvalidConfig(_) => "config",
            RagError::InvalidInput(_) => "input",
            RagError::Upstream(_) => "upstream",
            RagError::RateLimited(_) => "rate_limit",
            RagError::DimensionMismatch { .. } => "dimension",
            RagError::Retrieval(_) => "retrieval",
            RagError::NotFound(_) => "not_found",
            RagError::Unauthorized(_) => "unauthorized",
            RagError::Internal(_) => "internal",
            RagError::Io(_) => "io",
            RagError::Serialization(_) => "serialization",
            RagError::Manifest(_) => "manifest",
            RagError::Http(_) => "http",
            RagError::Database(_) => "database",
        }
    }

    /// Attach a contextual prefix to the error message
    pub fn context(self, ctx: &str) -> Self {
        match self {
            RagError::InvalidConfig(msg) => RagError::InvalidConfig(format!("{}: {}", ctx, msg)),
            RagError::InvalidInput(msg) => RagError::InvalidInput(format!("{}: {}", ctx, msg)),
            RagError::Upstream(msg) => RagError::Upstream(format!("{}: {}", ctx, msg)),
            RagError::RateLimited(msg) => RagError::RateLimited(format!("{}: {}", ctx, msg)),
            RagError::Retrieval(msg) => RagError::Retrieval(format!("{}: {}", ctx, msg)),
            RagError::NotFound(msg) => RagError::NotFound(format!("{}: {}", ctx, msg)),
            RagError::Unauthorized(msg) => RagError::Unauthorized(format!("{}: {}", ctx, msg)),
            RagError::Internal(msg) => RagError::Internal(format!("{}: {}", ctx, msg)),
            other => RagError::Internal(format!("{}: {}", ctx, other)),
        }
    }
}

/// Extension trait for attaching context to fallible call sites
pub trait ErrorContext<T> {
    /// Wrap the error with a short contextual tag
    fn with_context(self, ctx: &str) -> Result<T>;
}

impl<T, E: Into<RagError>> ErrorContext<T> for std::result::Result<T, E> {
    fn with_context(self, ctx: &str) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let rate_limited = RagError::RateLimited("429".to_string());
        assert!(rate_limited.is_retryable());

        let config_error = RagError::InvalidConfig("missing key".to_string());
        assert!(!config_error.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let upstream = RagError::Upstream("connection reset".to_string());
        assert_eq!(upstream.category(), "upstream");

        let mismatch = RagError::DimensionMismatch {
            expected: 768,
            actual: 512,
        };
        assert_eq!(mismatch.category(), "dimension");
    }

    #[test]
    fn test_context_prefix() {
        let err = RagError::Upstream("boom".to_string()).context("embed batch 7");
        assert_eq!(err.to_string(), "upstream failure: embed batch 7: boom");
    }

    #[test]
    fn test_context_preserves_variant() {
        let err = RagError::RateLimited("429".to_string()).context("batch 3");
        assert!(err.is_retryable());
        assert_eq!(err.category(), "rate_limit");
    }
}
