//! Configuration for the RAG evaluation pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{RagJudgeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default chat model used when neither an override nor a configured
/// default is available.
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default embedding model recorded in index metadata.
pub const DEFAULT_EMBED_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Chat-completion model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the chat API (e.g., "https://api.groq.com/openai")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "llama-3.3-70b-versatile")
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL for the embeddings API.
    pub api_base: String,

    /// API key for authentication (may be empty for local servers).
    #[serde(default)]
    pub api_key: String,

    /// Embedding model name.
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: DEFAULT_EMBED_MODEL.to_string(),
        }
    }
}

/// Trace sink configuration. All fields optional; the tracer degrades to
/// local-only ids when credentials are missing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceConfig {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub host: String,
    /// Which ingestion surface the sink exposes: "trace" (default) or
    /// "span" for older deployments that only accept flat span events.
    #[serde(default)]
    pub api: String,
    /// Manual tag attached to every trace.
    #[serde(default = "default_trace_tag")]
    pub tag: String,
}

fn default_trace_tag() -> String {
    "provider:groq".to_string()
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat model settings.
    pub llm: LlmConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Trace sink settings.
    pub trace: TraceConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    embedding: Option<EmbeddingFileSection>,
    trace: Option<TraceFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TraceFileSection {
    public_key: Option<String>,
    secret_key: Option<String>,
    host: Option<String>,
    api: Option<String>,
    tag: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_*, EMBED_*, TRACE_*)
    /// 2. Config file (~/.config/rag-judge/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        if let Ok(api_base) = env::var("LLM_API_BASE") {
            config.llm.api_base = api_base;
        }
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            config.llm.api_key = api_key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                config.llm.max_tokens = tokens;
            }
        }
        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                config.llm.temperature = temp;
            }
        }

        if let Ok(api_base) = env::var("EMBED_API_BASE") {
            config.embedding.api_base = api_base;
        }
        if let Ok(api_key) = env::var("EMBED_API_KEY") {
            config.embedding.api_key = api_key;
        }
        if let Ok(model) = env::var("EMBED_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(public_key) = env::var("TRACE_PUBLIC_KEY") {
            config.trace.public_key = public_key;
        }
        if let Ok(secret_key) = env::var("TRACE_SECRET_KEY") {
            config.trace.secret_key = secret_key;
        }
        if let Ok(host) = env::var("TRACE_HOST") {
            config.trace.host = host;
        }
        if let Ok(api) = env::var("TRACE_API") {
            config.trace.api = api;
        }
        if let Ok(tag) = env::var("TRACE_TAG") {
            config.trace.tag = tag;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagJudgeError::io(path, e))?;

        let file_config: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| RagJudgeError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
        }

        if let Some(embedding) = file_config.embedding {
            if let Some(api_base) = embedding.api_base {
                config.embedding.api_base = api_base;
            }
            if let Some(api_key) = embedding.api_key {
                config.embedding.api_key = api_key;
            }
            if let Some(model) = embedding.model {
                config.embedding.model = model;
            }
        }

        if let Some(trace) = file_config.trace {
            if let Some(public_key) = trace.public_key {
                config.trace.public_key = public_key;
            }
            if let Some(secret_key) = trace.secret_key {
                config.trace.secret_key = secret_key;
            }
            if let Some(host) = trace.host {
                config.trace.host = host;
            }
            if let Some(api) = trace.api {
                config.trace.api = api;
            }
            if let Some(tag) = trace.tag {
                config.trace.tag = tag;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-judge")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required chat-model configuration is present.
    ///
    /// A missing credential is fatal: the pipeline cannot run at all.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagJudgeError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagJudgeError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagJudgeError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that embedding configuration is present (ingest/retrieve only).
    pub fn validate_embedding(&self) -> Result<()> {
        if self.embedding.api_base.is_empty() {
            return Err(RagJudgeError::Config(
                "Embedding API base URL is required. Set EMBED_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.embedding.model.is_empty() {
            return Err(RagJudgeError::Config(
                "Embedding model is required. Set EMBED_MODEL environment variable or add to config file.".to_string()
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.embedding.model, DEFAULT_EMBED_MODEL);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(config.validate_embedding().is_err());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "test-model");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.model, "test-model");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  api_base: "https://api.groq.com/openai"
  api_key: "k"
embedding:
  api_base: "http://localhost:8080"
  model: "custom-embedder"
trace:
  tag: "provider:test"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.llm.api_base, "https://api.groq.com/openai");
        assert_eq!(config.llm.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.embedding.model, "custom-embedder");
        assert_eq!(config.trace.tag, "provider:test");
    }
}
