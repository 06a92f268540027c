//! LLM integration crate for docqa.
//!
//! Provides a provider-agnostic chat abstraction used for grounded answer
//! generation.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use docqa_llm::{collect_stream, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new()?;
//! let request = LlmRequest::new("Hello, world!", "llama3").with_temperature(0.2);
//! let answer = collect_stream(client.stream(&request).await?).await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{collect_stream, LlmClient, LlmRequest, LlmStream, LlmStreamChunk};
pub use factory::create_client;
pub use providers::OllamaClient;
