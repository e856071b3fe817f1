//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Retrieval and reranking configuration
    #[serde(default)]
    pub rag: RagConfig,

    /// Vector store connection settings
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// LLM backend settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Number of passages the pipeline ultimately returns
    #[serde(default = "default_n_similar_docs")]
    pub n_similar_docs: usize,

    /// Neighbor chunks to merge on each side of a hit (0 = no expansion)
    #[serde(default)]
    pub n_neighbor_chunks: usize,

    /// Words of surrounding context returned around a fuzzy match
    #[serde(default = "default_n_fuzzy_neighbor_words")]
    pub n_fuzzy_neighbor_words: usize,

    /// Enable BM25 lexical search alongside semantic search
    #[serde(default = "default_true")]
    pub use_bm25_search: bool,

    /// Enable fuzzy word-window search alongside semantic search
    #[serde(default = "default_true")]
    pub use_fuzzy_match: bool,

    /// Cross-encoder reranking model name (empty = reranking disabled)
    #[serde(default = "default_cross_encoder_model")]
    pub cross_encoder_model: String,

    /// Rerank retained passages for diversity
    #[serde(default = "default_true")]
    pub rerank_diversity: bool,

    /// Move strongest passages to the periphery of the context
    #[serde(default = "default_true")]
    pub rerank_periphery: bool,

    /// Generate a hypothetical answer and use it as an extra search probe
    #[serde(default)]
    pub hypothetical_answer: bool,

    /// Number of LLM query rephrasings used as extra search probes
    #[serde(default)]
    pub n_query_rephrases: usize,

    /// Skip standalone-query rewriting (query arrives pre-contextualized)
    #[serde(default)]
    pub assistant_mode: bool,

    /// Accumulate dialog history across turns
    #[serde(default = "default_true")]
    pub conversation_mode: bool,

    /// Return joined extracts instead of a synthesized answer
    #[serde(default)]
    pub retrieve_only: bool,

    /// Token budget for summarization input
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Stream the final answer generation
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_n_similar_docs() -> usize {
    3
}
fn default_n_fuzzy_neighbor_words() -> usize {
    100
}
fn default_cross_encoder_model() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}
fn default_max_context_tokens() -> usize {
    8000
}

impl RagConfig {
    /// Whether a cross-encoder reranking stage is configured
    pub fn cross_encoder_enabled(&self) -> bool {
        !self.cross_encoder_model.is_empty()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            n_similar_docs: default_n_similar_docs(),
            n_neighbor_chunks: 0,
            n_fuzzy_neighbor_words: default_n_fuzzy_neighbor_words(),
            use_bm25_search: true,
            use_fuzzy_match: true,
            cross_encoder_model: default_cross_encoder_model(),
            rerank_diversity: true,
            rerank_periphery: true,
            hypothetical_answer: false,
            n_query_rephrases: 0,
            assistant_mode: false,
            conversation_mode: true,
            retrieve_only: false,
            max_context_tokens: default_max_context_tokens(),
            stream: true,
        }
    }
}

/// Vector store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint URL
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// API key (optional, for cloud deployments)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding dimension
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
}

fn default_qdrant_endpoint() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "docchat".to_string()
}
fn default_vector_dim() -> usize {
    1024
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            collection: default_collection(),
            api_key: None,
            vector_dim: default_vector_dim(),
        }
    }
}

/// LLM backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Ollama endpoint URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Max tokens to generate per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Retry attempts on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_max_tokens() -> usize {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    250
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rag: RagConfig::default(),
            vector_store: VectorStoreConfig::default(),
            llm: LlmSettings::default(),
            log_level: default_log_level(),
        }
    }
}
fn default_true() -> bool {
    true
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_rag()?;
        self.validate_vector_store()?;
        self.validate_llm()?;
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.n_similar_docs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.n_similar_docs".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.max_context_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.max_context_tokens".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.n_query_rephrases > 10 {
            tracing::warn!(
                "rag.n_query_rephrases = {} is unusually high; each rephrase \
                 costs one LLM call per query",
                rag.n_query_rephrases
            );
        }

        Ok(())
    }

    fn validate_vector_store(&self) -> Result<(), ConfigError> {
        if self.vector_store.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vector_store.vector_dim".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.vector_store.collection.is_empty() {
            return Err(ConfigError::MissingField(
                "vector_store.collection".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.model.is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (DOCCHAT_ prefix, `__` separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DOCCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
