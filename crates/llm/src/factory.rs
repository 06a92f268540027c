//! LLM provider factory.
//!
//! Creates chat clients from the generation settings in `AppConfig`.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use docqa_core::config::GenerationSettings;
use docqa_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create a chat client for the configured generation endpoint.
///
/// Only Ollama is supported for answer generation; the endpoint URL must use
/// `http` or `https`.
pub fn create_client(settings: &GenerationSettings) -> AppResult<Arc<dyn LlmClient>> {
    let endpoint = settings.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(AppError::Config(format!(
            "Generation endpoint must be an http(s) URL, got {:?}",
            endpoint
        )));
    }

    if settings.model.trim().is_empty() {
        return Err(AppError::Config("Generation model must not be empty".to_string()));
    }

    let client = OllamaClient::with_base_url(endpoint, Duration::from_secs(settings.timeout))?;
    Ok(Arc::new(client))
}
