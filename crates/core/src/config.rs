//! Configuration management for docqa.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (.docqa/config.yaml or `DOCQA_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all state stored in `.docqa/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const DATA_DIR_NAME: &str = ".docqa";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .docqa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit logs as JSON
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Embedding providers (remote primary, local fallback)
    pub embedding: EmbeddingSettings,

    /// Answer generation model
    pub generation: GenerationSettings,

    /// Vector index location
    pub index: IndexSettings,

    /// Chunking and retrieval parameters
    pub retrieval: RetrievalSettings,
}

/// Primary and fallback embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Remote provider tried first; `None` embeds locally only
    #[serde(default)]
    pub primary: Option<EmbeddingProviderSettings>,

    /// Local provider used when the primary fails
    pub fallback: EmbeddingProviderSettings,
}

/// Settings for one embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingProviderSettings {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(rename = "apiKeyEnv", default = "default_api_key_env")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        timeout: Option<u64>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
    Trigram {
        dimensions: usize,
    },
}

impl EmbeddingProviderSettings {
    /// Canonical provider name.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Ollama { .. } => "ollama",
            Self::Trigram { .. } => "trigram",
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Answer generation settings (Ollama chat model).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout: u64,
    /// Sampling temperature; the model default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Cap on generated tokens
    #[serde(default, rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_generation_timeout() -> u64 {
    120
}

/// Vector index location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexSettings {
    /// Index directory; relative paths resolve against the workspace
    pub path: Option<PathBuf>,
}

/// Chunking and retrieval parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    #[serde(rename = "topK")]
    pub top_k: usize,
    #[serde(rename = "chunkSize")]
    pub chunk_size: usize,
    #[serde(rename = "chunkOverlap")]
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    embedding: Option<EmbeddingSettings>,
    generation: Option<GenerationSettings>,
    index: Option<IndexSettings>,
    retrieval: Option<RetrievalFileSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RetrievalFileSettings {
    #[serde(rename = "topK")]
    top_k: Option<usize>,
    #[serde(rename = "chunkSize")]
    chunk_size: Option<usize>,
    #[serde(rename = "chunkOverlap")]
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
            embedding: EmbeddingSettings {
                primary: Some(EmbeddingProviderSettings::OpenAi {
                    api_key_env: default_api_key_env(),
                    model: "text-embedding-3-small".to_string(),
                    endpoint: None,
                    timeout: Some(30),
                }),
                fallback: EmbeddingProviderSettings::Ollama {
                    endpoint: "http://localhost:11434".to_string(),
                    model: "mxbai-embed-large".to_string(),
                    timeout: Some(30),
                },
            },
            generation: GenerationSettings {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
                timeout: default_generation_timeout(),
                temperature: None,
                max_tokens: None,
            },
            index: IndexSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and the process environment.
    ///
    /// Environment variables:
    /// - `DOCQA_WORKSPACE`: Override workspace path
    /// - `DOCQA_CONFIG`: Path to config file
    /// - `EMBEDDING_MODEL`: Remote (OpenAI) embedding model
    /// - `OLLAMA_BASE_URL`: Ollama endpoint for local embeddings and generation
    /// - `OLLAMA_MODEL`: Generation model
    /// - `OLLAMA_EMBEDDING_MODEL`: Local embedding model
    /// - `DATA_DIR`: Index directory
    /// - `TOP_K`, `CHUNK_SIZE`, `CHUNK_OVERLAP`: Retrieval parameters
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docqa_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Index: {:?}", config.index_dir());
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration reading variables through `env`.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workspace) = env("DOCQA_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Some(config_file) = env("DOCQA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.data_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        config.apply_env(&env)?;

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }

        if let Some(index) = config_file.index {
            result.index = index;
        }

        if let Some(retrieval) = config_file.retrieval {
            if let Some(top_k) = retrieval.top_k {
                result.retrieval.top_k = top_k;
            }
            if let Some(chunk_size) = retrieval.chunk_size {
                result.retrieval.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = retrieval.chunk_overlap {
                result.retrieval.chunk_overlap = chunk_overlap;
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_json = format.eq_ignore_ascii_case("json");
            }
        }

        Ok(result)
    }

    fn apply_env<F>(&mut self, env: &F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = env("EMBEDDING_MODEL") {
            if let Some(EmbeddingProviderSettings::OpenAi { model: m, .. }) =
                self.embedding.primary.as_mut()
            {
                *m = model;
            }
        }

        if let Some(url) = env("OLLAMA_BASE_URL") {
            if let EmbeddingProviderSettings::Ollama { endpoint, .. } = &mut self.embedding.fallback
            {
                *endpoint = url.clone();
            }
            self.generation.endpoint = url;
        }

        if let Some(model) = env("OLLAMA_EMBEDDING_MODEL") {
            if let EmbeddingProviderSettings::Ollama { model: m, .. } = &mut self.embedding.fallback
            {
                *m = model;
            }
        }

        if let Some(model) = env("OLLAMA_MODEL") {
            self.generation.model = model;
        }

        if let Some(dir) = env("DATA_DIR") {
            self.index.path = Some(PathBuf::from(dir));
        }

        if let Some(v) = env("TOP_K") {
            self.retrieval.top_k = parse_usize("TOP_K", &v)?;
        }
        if let Some(v) = env("CHUNK_SIZE") {
            self.retrieval.chunk_size = parse_usize("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = env("CHUNK_OVERLAP") {
            self.retrieval.chunk_overlap = parse_usize("CHUNK_OVERLAP", &v)?;
        }

        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }

        if env("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        index_dir: Option<PathBuf>,
        top_k: Option<usize>,
        log_level: Option<String>,
        log_json: bool,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(dir) = index_dir {
            self.index.path = Some(dir);
        }

        if let Some(top_k) = top_k {
            self.retrieval.top_k = top_k;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if log_json {
            self.log_json = true;
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .docqa directory.
    pub fn data_dir(&self) -> PathBuf {
        self.workspace.join(DATA_DIR_NAME)
    }

    /// Directory holding the vector buffer and metadata files.
    pub fn index_dir(&self) -> PathBuf {
        match &self.index.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.workspace.join(path),
            None => self.data_dir().join("index"),
        }
    }

    /// Ensure the index directory exists.
    pub fn ensure_index_dir(&self) -> AppResult<PathBuf> {
        let dir = self.index_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::Config(format!("Failed to create index directory {:?}: {}", dir, e))
        })?;
        Ok(dir)
    }

    /// Resolve the primary provider's API key from its environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        match &self.embedding.primary {
            Some(EmbeddingProviderSettings::OpenAi { api_key_env, .. }) => {
                std::env::var(api_key_env).ok().filter(|k| !k.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let r = &self.retrieval;

        if r.top_k == 0 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }

        if r.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be at least 1".to_string()));
        }

        if r.chunk_overlap >= r.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                r.chunk_overlap, r.chunk_size
            )));
        }

        if let EmbeddingProviderSettings::OpenAi { .. } = self.embedding.fallback {
            return Err(AppError::Config(
                "Fallback embedding provider must be local (ollama or trigram)".to_string(),
            ));
        }

        for settings in self.embedding.primary.iter().chain([&self.embedding.fallback]) {
            if let EmbeddingProviderSettings::Trigram { dimensions: 0 } = settings {
                return Err(AppError::Config(
                    "Trigram provider needs at least one dimension".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_usize(name: &str, value: &str) -> AppResult<usize> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!("{} must be a non-negative integer, got {:?}", name, value))
    })
}
