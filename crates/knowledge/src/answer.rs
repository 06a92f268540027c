//! Grounded answer generation from retrieved chunks.

use crate::error::{KnowledgeError, KnowledgeResult};
use async_trait::async_trait;
use docqa_core::AppError;
use docqa_llm::{collect_stream, LlmClient, LlmRequest};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;

/// Returned without calling the model when retrieval produced nothing.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant information in the documents.";

/// Returned when the model streams back an empty answer.
pub const EMPTY_ANSWER: &str = "I couldn't generate an answer from the given context.";

const SYSTEM_PROMPT: &str = "You are a factual assistant.";

const TEMPLATE_NAME: &str = "answer";

const ANSWER_TEMPLATE: &str = r#"You are a helpful and factual assistant.

Use the following context to answer the question accurately and concisely.
If the answer is not contained in the context, reply with:
"I don't know from the provided documents."

Context:
{{context}}

Question:
{{question}}

Answer:"#;

/// Produces an answer from a question and its retrieved chunk texts.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// `chunks` are in retrieval order, most relevant first.
    async fn generate(&self, query: &str, chunks: &[String]) -> KnowledgeResult<String>;
}

#[derive(Serialize)]
struct PromptVars<'a> {
    context: String,
    question: &'a str,
}

/// Answer generator backed by a streaming chat model.
pub struct LlmAnswerGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    templates: Handlebars<'static>,
}

impl LlmAnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> KnowledgeResult<Self> {
        let mut templates = Handlebars::new();
        // Plain text prompt; chunk contents must reach the model unescaped.
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string(TEMPLATE_NAME, ANSWER_TEMPLATE)
            .map_err(|e| {
                KnowledgeError::Generation(AppError::Other(format!(
                    "Failed to register answer template: {}",
                    e
                )))
            })?;

        Ok(Self {
            client,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            templates,
        })
    }

    /// Sampling options passed with every request; `None` keeps the model default.
    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn request(&self, prompt: String) -> LlmRequest {
        let mut request = LlmRequest::new(prompt, &self.model).with_system(SYSTEM_PROMPT);
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Render the user prompt for `query` over `chunks`.
    pub fn render_prompt(&self, query: &str, chunks: &[String]) -> KnowledgeResult<String> {
        let vars = PromptVars {
            context: chunks.join("\n\n"),
            question: query,
        };
        self.templates.render(TEMPLATE_NAME, &vars).map_err(|e| {
            KnowledgeError::Generation(AppError::Other(format!(
                "Failed to render answer prompt: {}",
                e
            )))
        })
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(&self, query: &str, chunks: &[String]) -> KnowledgeResult<String> {
        if chunks.is_empty() {
            tracing::warn!("No context chunks for answer generation; returning fallback message");
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let prompt = self.render_prompt(query, chunks)?;
        let request = self.request(prompt);

        tracing::info!(
            "Sending prompt to {} model ({}) for answer generation",
            self.client.provider_name(),
            self.model
        );

        let stream = self
            .client
            .stream(&request)
            .await
            .map_err(KnowledgeError::Generation)?;
        let answer = collect_stream(stream)
            .await
            .map_err(KnowledgeError::Generation)?;

        let answer = answer.trim();
        if answer.is_empty() {
            tracing::warn!("Model returned an empty answer");
            return Ok(EMPTY_ANSWER.to_string());
        }

        tracing::info!("Generated answer ({} chars)", answer.len());
        Ok(answer.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::AppResult;
    use docqa_llm::{LlmStream, LlmStreamChunk};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Streams a fixed list of parts, or fails.
    struct ScriptedClient {
        parts: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
        last: Mutex<Option<LlmRequest>>,
    }

    impl ScriptedClient {
        fn new(parts: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                parts,
                fail: false,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                parts: vec![],
                fail: true,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if self.fail {
                return Err(AppError::Llm("connection refused".to_string()));
            }
            let mut chunks: Vec<AppResult<LlmStreamChunk>> = self
                .parts
                .iter()
                .map(|p| {
                    Ok(LlmStreamChunk {
                        content: p.to_string(),
                        done: false,
                    })
                })
                .collect();
            chunks.push(Ok(LlmStreamChunk {
                content: String::new(),
                done: true,
            }));
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let generator = LlmAnswerGenerator::new(ScriptedClient::new(vec![]), "llama3").unwrap();
        let prompt = generator
            .render_prompt(
                "What is <slot>?",
                &["first chunk".to_string(), "second & chunk".to_string()],
            )
            .unwrap();

        assert!(prompt.contains("first chunk\n\nsecond & chunk"));
        assert!(prompt.contains("Question:\nWhat is <slot>?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn test_generate_concatenates_stream() {
        let client = ScriptedClient::new(vec!["  Slots are ", "positions.  "]);
        let generator = LlmAnswerGenerator::new(client, "llama3").unwrap();

        let answer = generator
            .generate("What is a slot?", &["a slot is a position".to_string()])
            .await
            .unwrap();
        assert_eq!(answer, "Slots are positions.");
    }

    #[tokio::test]
    async fn test_sampling_options_reach_request() {
        let client = ScriptedClient::new(vec!["ok"]);
        let generator = LlmAnswerGenerator::new(client.clone(), "llama3")
            .unwrap()
            .with_sampling(Some(0.1), Some(256));

        generator.generate("q", &["context".to_string()]).await.unwrap();

        let last = client.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.model, "llama3");
        assert_eq!(last.system.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(last.temperature, Some(0.1));
        assert_eq!(last.max_tokens, Some(256));
    }

    #[tokio::test]
    async fn test_default_request_has_no_sampling_options() {
        let client = ScriptedClient::new(vec!["ok"]);
        let generator = LlmAnswerGenerator::new(client.clone(), "llama3").unwrap();

        generator.generate("q", &["context".to_string()]).await.unwrap();

        let last = client.last.lock().unwrap().clone().unwrap();
        assert!(last.temperature.is_none());
        assert!(last.max_tokens.is_none());
    }

    #[tokio::test]
    async fn test_no_chunks_skips_model() {
        let client = ScriptedClient::new(vec!["unused"]);
        let generator = LlmAnswerGenerator::new(client.clone(), "llama3").unwrap();

        let answer = generator.generate("anything", &[]).await.unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_model_answer() {
        let generator = LlmAnswerGenerator::new(ScriptedClient::new(vec!["   "]), "llama3").unwrap();
        let answer = generator
            .generate("q", &["context".to_string()])
            .await
            .unwrap();
        assert_eq!(answer, EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn test_model_failure_is_reported() {
        let generator = LlmAnswerGenerator::new(ScriptedClient::failing(), "llama3").unwrap();
        let err = generator
            .generate("q", &["context".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Generation(AppError::Llm(_))));
    }
}
