//! Error handling for the Skillsmith core library

use thiserror::Error;

/// Result type alias for Skillsmith operations
pub type Result<T> = std::result::Result<T, SkillsmithError>;

/// Main error type for Skillsmith operations
#[derive(Error, Debug)]
pub enum SkillsmithError {
    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),

    /// PDF could not be read or produced no pages
    #[error("Extraction failed for {source_path}: {message}")]
    ExtractionFailed {
        source_path: String,
        message: String,
    },

    /// Provider binary or credentials are missing
    #[error("Provider '{provider}' is unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Provider invocation exceeded its computed time limit
    #[error("Provider '{provider}' timed out after {seconds}s")]
    ProviderTimeout { provider: String, seconds: u64 },

    /// Provider output was cut off by a token limit
    #[error("Provider '{provider}' truncated its output: {message}")]
    ProviderTruncated { provider: String, message: String },

    /// Provider HTTP/SDK failure (network, quota, auth)
    #[error("Provider '{provider}' API error: {message}")]
    ProviderApi { provider: String, message: String },

    /// Empty or malformed provider output
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Stage 6 quality bar not met
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    /// Cached artifact on disk fails the schema check
    #[error("Cache mismatch for {artifact}: {message}")]
    CacheMismatch { artifact: String, message: String },

    /// Stage 4 entered without resume/retry flags but partial state exists
    #[error(
        "Partial enhancement state exists ({completed} completed, {failed} failed of {total}); \
         re-run with --resume or --retry-failed"
    )]
    PartialProgress {
        completed: usize,
        failed: usize,
        total: usize,
    },

    /// Pipeline-level failures that do not map to a stage-specific kind
    #[error("Pipeline error: {message}")]
    Pipeline { message: String },
}

impl SkillsmithError {
    /// Create an extraction error
    pub fn extraction<P: Into<String>, S: Into<String>>(source_path: P, message: S) -> Self {
        Self::ExtractionFailed {
            source_path: source_path.into(),
            message: message.into(),
        }
    }

    /// Create a provider-unavailable error
    pub fn provider_unavailable<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a provider-timeout error
    pub fn provider_timeout<P: Into<String>>(provider: P, seconds: u64) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            seconds,
        }
    }

    /// Create a provider-truncated error
    pub fn provider_truncated<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::ProviderTruncated {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a provider API error
    pub fn provider_api<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::ProviderApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create a cache-mismatch error
    pub fn cache_mismatch<A: Into<String>, S: Into<String>>(artifact: A, message: S) -> Self {
        Self::CacheMismatch {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create a pipeline error
    pub fn pipeline<S: Into<String>>(message: S) -> Self {
        Self::Pipeline {
            message: message.into(),
        }
    }

    /// Stable kind string used in status lines and progress records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractionFailed { .. } => "extraction-failed",
            Self::ProviderUnavailable { .. } => "provider-unavailable",
            Self::ProviderTimeout { .. } => "provider-timeout",
            Self::ProviderTruncated { .. } => "provider-truncated",
            Self::ProviderApi { .. } => "provider-api-error",
            Self::InvalidResponse { .. } => "invalid-response",
            Self::ValidationFailed { .. } => "validation-failed",
            Self::CacheMismatch { .. } => "cache-mismatch",
            Self::PartialProgress { .. } => "partial-progress",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) | Self::Yaml(_) => "serialization",
            Self::Config(_) => "configuration",
            Self::Pipeline { .. } | Self::Generic(_) => "pipeline",
        }
    }

    /// Check if the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. }
                | Self::ProviderTruncated { .. }
                | Self::ProviderApi { .. }
                | Self::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SkillsmithError::extraction("guide.pdf", "no pages");
        assert!(matches!(err, SkillsmithError::ExtractionFailed { .. }));
        assert_eq!(err.to_string(), "Extraction failed for guide.pdf: no pages");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SkillsmithError::provider_timeout("claude", 240).kind(),
            "provider-timeout"
        );
        assert_eq!(
            SkillsmithError::invalid_response("empty").kind(),
            "invalid-response"
        );
        assert_eq!(
            SkillsmithError::cache_mismatch("extraction_abc", "bad stage").kind(),
            "cache-mismatch"
        );
        let err = SkillsmithError::PartialProgress {
            completed: 7,
            failed: 0,
            total: 20,
        };
        assert_eq!(err.kind(), "partial-progress");
    }

    #[test]
    fn test_partial_progress_remediation_in_message() {
        let err = SkillsmithError::PartialProgress {
            completed: 7,
            failed: 2,
            total: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("7 completed"));
        assert!(msg.contains("--retry-failed"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SkillsmithError::provider_timeout("glm", 120).is_retryable());
        assert!(SkillsmithError::provider_api("glm", "quota").is_retryable());
        assert!(!SkillsmithError::validation("missing sections").is_retryable());
        assert!(!SkillsmithError::provider_unavailable("codex", "not on PATH").is_retryable());
    }

    #[test]
    fn test_error_from_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SkillsmithError = io_err.into();
        assert!(matches!(err, SkillsmithError::Io(_)));

        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: SkillsmithError = json_err.into();
        assert!(matches!(err, SkillsmithError::Json(_)));
    }
}
