//! Embedding acquisition with a remote primary and a local fallback.
//!
//! A batch is always produced by exactly one provider. When the primary fails
//! for any reason the whole batch is re-embedded by the fallback; partial
//! primary output is discarded.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider, ProviderError};

use crate::error::{KnowledgeError, KnowledgeResult};
use docqa_core::AppConfig;
use std::sync::Arc;

/// Vectors for one batch plus which provider produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub provider: String,
    pub model: String,

    /// True when the primary was configured but the fallback produced the batch
    pub degraded: bool,
}

impl EmbeddingBatch {
    /// Width of the vectors in this batch.
    pub fn dim(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }
}

/// Primary/fallback embedding policy.
#[derive(Debug, Clone)]
pub struct FallbackEmbedder {
    primary: Option<Arc<dyn EmbeddingProvider>>,
    fallback: Arc<dyn EmbeddingProvider>,
}

impl FallbackEmbedder {
    pub fn new(
        primary: Option<Arc<dyn EmbeddingProvider>>,
        fallback: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Build both providers from configuration.
    ///
    /// A primary that cannot be created (typically a missing API key) is
    /// skipped and the fallback is used directly.
    pub fn from_config(config: &AppConfig) -> KnowledgeResult<Self> {
        let fallback = create_provider(&config.embedding.fallback, None).map_err(|e| {
            KnowledgeError::InvalidInput(format!("Fallback embedding provider: {}", e))
        })?;

        let primary = match &config.embedding.primary {
            Some(settings) => match create_provider(settings, config.resolve_api_key().as_deref())
            {
                Ok(provider) => Some(provider),
                Err(e) => {
                    tracing::info!(
                        "Primary embedding provider '{}' disabled ({}); using {} directly",
                        settings.provider_name(),
                        e,
                        fallback.provider_name()
                    );
                    None
                }
            },
            None => None,
        };

        if let Some(primary) = &primary {
            tracing::debug!(
                "Embeddings: primary={} ({}), fallback={} ({})",
                primary.provider_name(),
                primary.model_name(),
                fallback.provider_name(),
                fallback.model_name()
            );
        }

        Ok(Self::new(primary, fallback))
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Embed `texts`, falling back to the local provider on any primary failure.
    pub async fn embed(&self, texts: &[String]) -> KnowledgeResult<EmbeddingBatch> {
        if texts.is_empty() {
            return Err(KnowledgeError::InvalidInput(
                "No texts to embed".to_string(),
            ));
        }

        let primary = match &self.primary {
            Some(primary) => primary,
            None => {
                return self
                    .embed_with_fallback(texts, false)
                    .await
                    .map_err(|fallback| KnowledgeError::EmbeddingUnavailable {
                        primary: "not configured".to_string(),
                        fallback: fallback.to_string(),
                    });
            }
        };

        let primary_error = match primary.embed_batch(texts).await {
            Ok(vectors) => match check_batch(vectors, texts.len()) {
                Ok(vectors) => {
                    tracing::debug!(
                        "Embedded {} texts with {}",
                        texts.len(),
                        primary.provider_name()
                    );
                    return Ok(EmbeddingBatch {
                        vectors,
                        provider: primary.provider_name().to_string(),
                        model: primary.model_name().to_string(),
                        degraded: false,
                    });
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        if primary_error.is_transient() {
            tracing::warn!(
                "{} embeddings unavailable ({}); falling back to {}",
                primary.provider_name(),
                primary_error,
                self.fallback.provider_name()
            );
        } else {
            tracing::error!(
                degraded = true,
                "{} embeddings failed ({}); running degraded on {}",
                primary.provider_name(),
                primary_error,
                self.fallback.provider_name()
            );
        }

        self.embed_with_fallback(texts, true)
            .await
            .map_err(|fallback| KnowledgeError::EmbeddingUnavailable {
                primary: primary_error.to_string(),
                fallback: fallback.to_string(),
            })
    }

    /// Embed a single text, e.g. a query.
    pub async fn embed_one(&self, text: &str) -> KnowledgeResult<(Vec<f32>, EmbeddingBatch)> {
        let mut batch = self.embed(&[text.to_string()]).await?;
        let vector = batch.vectors.pop().ok_or_else(|| {
            KnowledgeError::EmbeddingUnavailable {
                primary: "no vector returned".to_string(),
                fallback: "no vector returned".to_string(),
            }
        })?;
        Ok((vector, batch))
    }

    async fn embed_with_fallback(
        &self,
        texts: &[String],
        degraded: bool,
    ) -> Result<EmbeddingBatch, ProviderError> {
        let vectors = self.fallback.embed_batch(texts).await?;
        let vectors = check_batch(vectors, texts.len())?;
        Ok(EmbeddingBatch {
            vectors,
            provider: self.fallback.provider_name().to_string(),
            model: self.fallback.model_name().to_string(),
            degraded,
        })
    }
}

/// Reject batches with the wrong count, ragged or empty widths.
fn check_batch(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    if vectors.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }

    let width = vectors.first().map(Vec::len).unwrap_or(0);
    if width == 0 {
        return Err(ProviderError::InvalidResponse(
            "empty embedding vector".to_string(),
        ));
    }
    if vectors.iter().any(|v| v.len() != width) {
        return Err(ProviderError::InvalidResponse(
            "embeddings in one batch have different widths".to_string(),
        ));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(ProviderError::InvalidResponse(
            "embedding contains NaN or infinite values".to_string(),
        ));
    }

    Ok(vectors)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers for exercising the fallback policy without a network.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What a scripted provider does on its next call.
    #[derive(Debug, Clone)]
    pub enum Step {
        /// Return one constant vector of this width per text.
        Width(usize),
        /// Return these vectors verbatim.
        Vectors(Vec<Vec<f32>>),
        RateLimited,
        Unreachable,
        Unauthorized,
    }

    #[derive(Debug)]
    pub struct ScriptedProvider {
        name: &'static str,
        steps: Mutex<VecDeque<Step>>,
        default: Step,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn always(name: &'static str, step: Step) -> Arc<Self> {
            Arc::new(Self {
                name,
                steps: Mutex::new(VecDeque::new()),
                default: step,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn script(name: &'static str, steps: Vec<Step>, default: Step) -> Arc<Self> {
            Arc::new(Self {
                name,
                steps: Mutex::new(steps.into()),
                default,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            self.name
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default.clone());

            match step {
                Step::Width(width) => Ok(texts
                    .iter()
                    .enumerate()
                    .map(|(i, _)| vec![i as f32; width])
                    .collect()),
                Step::Vectors(vectors) => Ok(vectors),
                Step::RateLimited => Err(ProviderError::RateLimited("quota".to_string())),
                Step::Unreachable => Err(ProviderError::Unreachable("refused".to_string())),
                Step::Unauthorized => Err(ProviderError::Api {
                    status: 401,
                    message: "bad key".to_string(),
                }),
            }
        }
    }
}
