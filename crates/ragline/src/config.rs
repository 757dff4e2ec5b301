//! TOML configuration.
//!
//! Every section except `[db]` has defaults, so a minimal file is just:
//!
//! ```toml
//! [db]
//! path = "./data/ragline.sqlite"
//! ```
//!
//! Secrets are never read from the file. API keys come from the
//! environment variables named by [`EMBEDDER_API_KEY_ENV`],
//! [`LLM_API_KEY_ENV`] and [`QDRANT_API_KEY_ENV`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragline_core::budget::ContextBudget;
use ragline_core::chunk::{DEFAULT_OVERLAP_CHARS, DEFAULT_TARGET_CHARS};

pub const EMBEDDER_API_KEY_ENV: &str = "RAGLINE_EMBEDDER_API_KEY";
pub const LLM_API_KEY_ENV: &str = "RAGLINE_LLM_API_KEY";
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: DEFAULT_TARGET_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

fn default_target_chars() -> usize {
    DEFAULT_TARGET_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `top_n` given to newly created workspaces.
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API; `/embeddings` is appended.
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Retries for 429/5xx and transport errors. `0` surfaces the first failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Text embedded once to discover the vector dimension.
    #[serde(default = "default_probe_text")]
    pub probe_text: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: 0,
            probe_text: default_probe_text(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:8080/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    120
}
fn default_probe_text() -> String {
    "test".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            timeout_secs: default_store_timeout(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_store_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            repetition_penalty: default_repetition_penalty(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_llm_model() -> String {
    "default".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_repetition_penalty() -> f32 {
    1.1
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    /// Model context window, in estimated tokens.
    #[serde(default = "default_context_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_history_ratio")]
    pub history_ratio: f64,
    #[serde(default = "default_side_ratio")]
    pub system_ratio: f64,
    #[serde(default = "default_side_ratio")]
    pub user_ratio: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_context_tokens(),
            history_ratio: default_history_ratio(),
            system_ratio: default_side_ratio(),
            user_ratio: default_side_ratio(),
        }
    }
}

impl ContextConfig {
    pub fn budget(&self) -> ContextBudget {
        ContextBudget::from_ratios(
            self.max_tokens,
            self.history_ratio,
            self.system_ratio,
            self.user_ratio,
        )
    }
}

fn default_context_tokens() -> usize {
    128_000
}
fn default_history_ratio() -> f64 {
    0.7
}
fn default_side_ratio() -> f64 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    pub url: String,
    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,
}

fn default_web_timeout() -> u64 {
    60
}

/// What happens to a turn whose caller disconnects mid-stream.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Stop generating and persist nothing.
    #[default]
    Discard,
    /// Stop generating and persist the text received so far, without an audit row.
    PersistPartial,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GenerationConfig {
    #[serde(default)]
    pub disconnect_policy: DisconnectPolicy,
}

impl Config {
    /// Config with defaults everywhere and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            llm: LlmConfig::default(),
            context: ContextConfig::default(),
            web_search: None,
            generation: GenerationConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.target_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.target_chars");
    }

    // Validate retrieval
    if config.retrieval.default_top_n < 1 {
        anyhow::bail!("retrieval.default_top_n must be >= 1");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate context budget
    if config.context.max_tokens == 0 {
        anyhow::bail!("context.max_tokens must be > 0");
    }
    for (name, ratio) in [
        ("history_ratio", config.context.history_ratio),
        ("system_ratio", config.context.system_ratio),
        ("user_ratio", config.context.user_ratio),
    ] {
        if !(0.0..=1.0).contains(&ratio) {
            anyhow::bail!("context.{} must be in [0.0, 1.0]", name);
        }
    }

    Ok(())
}

/// Read an optional secret from the environment, ignoring empty values.
pub fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
