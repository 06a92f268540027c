//! Embedding provider trait, error classification and factory.

use docqa_core::config::EmbeddingProviderSettings;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default request timeout for embedding calls.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Failure reported by a single embedding provider.
///
/// The variants drive the fallback policy: rate limits and connectivity
/// problems are expected and only warn, everything else is a degraded-mode
/// event.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Quota or rate limit exceeded (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection refused, DNS failure, timeout or 5xx.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with a non-retryable error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response could not be used (bad JSON, wrong count, empty vectors).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider could not be set up.
    #[error("configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Rate-limit and connectivity failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unreachable(_))
    }

    /// Classify a transport-level reqwest error.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(message)
        } else if status.is_server_error() {
            Self::Unreachable(format!("{}: {}", status, message))
        } else {
            Self::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "openai", "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Generate embeddings for multiple texts in a batch, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from its settings.
///
/// `api_key` is only consulted for OpenAI; a missing key is a configuration
/// error.
pub fn create_provider(
    settings: &EmbeddingProviderSettings,
    api_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    match settings {
        EmbeddingProviderSettings::OpenAi {
            api_key_env,
            model,
            endpoint,
            timeout,
        } => {
            let key = api_key.ok_or_else(|| {
                ProviderError::Config(format!("{} is not set", api_key_env))
            })?;
            let provider = super::providers::openai::OpenAiProvider::new(
                key,
                model,
                endpoint.as_deref(),
                Duration::from_secs(timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            )?;
            Ok(Arc::new(provider))
        }

        EmbeddingProviderSettings::Ollama {
            endpoint,
            model,
            timeout,
        } => {
            let provider = super::providers::ollama::OllamaProvider::new(
                endpoint,
                model,
                Duration::from_secs(timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            )?;
            Ok(Arc::new(provider))
        }

        EmbeddingProviderSettings::Trigram { dimensions } => {
            if *dimensions == 0 {
                return Err(ProviderError::Config(
                    "trigram dimensions must be greater than 0".to_string(),
                ));
            }
            Ok(Arc::new(super::providers::trigram::TrigramProvider::new(
                *dimensions,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trigram_provider() {
        let provider =
            create_provider(&EmbeddingProviderSettings::Trigram { dimensions: 64 }, None).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.model_name(), "trigram-v1");
    }

    #[test]
    fn test_create_openai_requires_key() {
        let settings = EmbeddingProviderSettings::OpenAi {
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "text-embedding-3-small".to_string(),
            endpoint: None,
            timeout: None,
        };

        let err = create_provider(&settings, None).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let provider = create_provider(&settings, Some("sk-test")).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_create_ollama_provider() {
        let settings = EmbeddingProviderSettings::Ollama {
            endpoint: "http://localhost:11434".to_string(),
            model: "mxbai-embed-large".to_string(),
            timeout: Some(5),
        };
        let provider = create_provider(&settings, None).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;

        assert!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, "quota".into())
                .is_transient()
        );
        assert!(ProviderError::from_status(StatusCode::BAD_GATEWAY, "down".into()).is_transient());
        let err = ProviderError::from_status(StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(!err.is_transient());
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let provider =
            create_provider(&EmbeddingProviderSettings::Trigram { dimensions: 32 }, None).unwrap();
        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 32);
    }
}
