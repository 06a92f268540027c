//! OpenAI embedding provider (`POST /v1/embeddings`).
//!
//! The whole batch goes out in a single request; the response items are put
//! back into input order by their `index` field.

use crate::embeddings::provider::{EmbeddingProvider, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const EMBEDDING_ENDPOINT: &str = "/v1/embeddings";

/// Remote embedding provider backed by the OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiProvider {
    /// Create a provider. `base_url` defaults to the public API.
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::Config(format!("Failed to create HTTP client for OpenAI: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_OPENAI_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, EMBEDDING_ENDPOINT)
    }
}

/// Order response items by index and check one vector came back per input.
fn into_ordered(
    mut data: Vec<EmbeddingItem>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);
    if data.iter().enumerate().any(|(i, item)| item.index != i) {
        return Err(ProviderError::InvalidResponse(
            "embedding indices are not 0..n".to_string(),
        ));
    }

    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "openai", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = self.url();
        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(ProviderError::from_status(status, message));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let embeddings = into_ordered(body.data, texts.len())?;
        debug!("Received {} embeddings from OpenAI", embeddings.len());
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, value: f32) -> EmbeddingItem {
        EmbeddingItem {
            index,
            embedding: vec![value; 2],
        }
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let provider = OpenAiProvider::new(
            "sk-test",
            "text-embedding-3-small",
            Some("http://localhost:8080/"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.url(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_into_ordered_sorts_by_index() {
        let ordered = into_ordered(vec![item(1, 1.0), item(0, 0.0), item(2, 2.0)], 3).unwrap();
        assert_eq!(ordered, vec![vec![0.0; 2], vec![1.0; 2], vec![2.0; 2]]);
    }

    #[test]
    fn test_into_ordered_rejects_wrong_count() {
        let err = into_ordered(vec![item(0, 0.0)], 2).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_into_ordered_rejects_duplicate_index() {
        let err = into_ordered(vec![item(0, 0.0), item(0, 1.0)], 2).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_error_body_parsing() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "You exceeded your current quota");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let provider = OpenAiProvider::new(
            "sk-test",
            "text-embedding-3-small",
            Some("http://127.0.0.1:9"),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = provider.embed_batch(&["hello".to_string()]).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
