//! Ollama chat provider implementation.
//!
//! Talks to the local Ollama runtime through `/api/chat`.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmStream, LlmStreamChunk};
use docqa_core::{AppError, AppResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const CHAT_ENDPOINT: &str = "/api/chat";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama `/api/chat` request format.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

/// One NDJSON line of a streamed reply.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Ollama chat client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for `http://localhost:11434` with the default timeout.
    pub fn new() -> AppResult<Self> {
        Self::with_base_url(DEFAULT_OLLAMA_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom base URL and request timeout.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn to_chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        ChatRequest {
            model: request.model.clone(),
            messages,
            stream: true,
            options,
        }
    }

    async fn send(&self, body: &ChatRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, CHAT_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let detail = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(AppError::Llm(format!("Ollama API error ({}): {}", status, detail)));
        }

        Ok(response)
    }
}

/// Parse complete NDJSON lines out of `buffer`, leaving any partial line behind.
fn drain_lines(buffer: &mut String) -> Vec<AppResult<LlmStreamChunk>> {
    let mut chunks = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        chunks.push(parse_line(line));
    }
    chunks
}

fn parse_line(line: &str) -> AppResult<LlmStreamChunk> {
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(line) {
        return Err(AppError::Llm(format!("Ollama stream error: {}", err.error)));
    }

    let response: ChatResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    Ok(LlmStreamChunk {
        content: response.message.map(|m| m.content).unwrap_or_default(),
        done: response.done,
    })
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming chat request to Ollama");

        let body = self.to_chat_request(request);
        let response = self.send(&body).await?;

        // Network chunks do not align with NDJSON lines, so buffer partial lines.
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, result| {
                let items = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_lines(buffer)
                    }
                    Err(e) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::with_base_url("http://ollama:11434/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://ollama:11434");
    }

    #[test]
    fn test_chat_request_conversion() {
        let client = OllamaClient::new().unwrap();
        let request = LlmRequest::new("Hello", "llama3")
            .with_system("You are a factual assistant.")
            .with_temperature(0.7)
            .with_max_tokens(64);

        let chat = client.to_chat_request(&request);
        assert_eq!(chat.model, "llama3");
        assert!(chat.stream);
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].content, "Hello");
        let options = chat.options.unwrap();
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.num_predict, Some(64));
    }

    #[test]
    fn test_chat_request_without_sampling_omits_options() {
        let client = OllamaClient::new().unwrap();
        let chat = client.to_chat_request(&LlmRequest::new("Hello", "llama3"));
        assert!(chat.options.is_none());
        let body = serde_json::to_value(&chat).unwrap();
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_drain_lines_keeps_partial_line() {
        let mut buffer = String::from(
            "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"model\":\"lla",
        );

        let chunks = drain_lines(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "Hel");
        assert_eq!(buffer, "{\"model\":\"lla");

        buffer.push_str("ma3\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":true}\n");
        let chunks = drain_lines(&mut buffer);
        assert_eq!(chunks.len(), 1);
        let last = chunks[0].as_ref().unwrap();
        assert_eq!(last.content, "lo");
        assert!(last.done);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_error_line_surfaces() {
        let mut buffer = String::from("{\"error\":\"model not found\"}\n");
        let chunks = drain_lines(&mut buffer);
        assert!(chunks[0].is_err());
    }
}
