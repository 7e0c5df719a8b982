//! TOML configuration.
//!
//! Every section except `[server]` is optional and falls back to defaults.
//! Secrets never live in the file: API keys are read from the environment
//! (optionally seeded from a `.env` file by the binary).
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8099"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-large"
//! dims = 1024
//!
//! [index]
//! provider = "pinecone"
//! host = "https://docs-abc123.svc.pinecone.io"
//!
//! [retrieval]
//! mode = "mmr"
//! k = 6
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docchat_core::contextualize::RewritePolicy;
use docchat_core::index::SearchMode;
use docchat_core::orchestrator::DEFAULT_APOLOGY;
use docchat_core::retriever::RetrievalPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub instructions: InstructionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Metadata field the chunk text is stored under.
    #[serde(default = "default_text_key")]
    pub text_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            host: None,
            namespace: None,
            text_key: default_text_key(),
            timeout_secs: 30,
        }
    }
}

impl IndexConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_index_provider() -> String {
    "memory".to_string()
}
fn default_text_key() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda")]
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda: default_lambda(),
        }
    }
}

impl RetrievalConfig {
    pub fn search_mode(&self) -> SearchMode {
        match self.mode.as_str() {
            "similarity" => SearchMode::Similarity,
            _ => SearchMode::Diversity {
                fetch_k: self.fetch_k,
                lambda: self.lambda,
            },
        }
    }

    pub fn policy(&self) -> RetrievalPolicy {
        RetrievalPolicy {
            mode: self.search_mode(),
            k: self.k,
        }
    }
}

fn default_mode() -> String {
    "mmr".to_string()
}
fn default_k() -> usize {
    6
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_upsert_batch")]
    pub upsert_batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            upsert_batch_size: default_upsert_batch(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_upsert_batch() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_greeting_threshold")]
    pub greeting_word_threshold: usize,
    #[serde(default = "default_rewrite_window")]
    pub rewrite_window: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            greeting_word_threshold: default_greeting_threshold(),
            rewrite_window: default_rewrite_window(),
            history_window: default_history_window(),
            apology: default_apology(),
        }
    }
}

impl ConversationConfig {
    pub fn rewrite_policy(&self) -> RewritePolicy {
        RewritePolicy {
            greeting_word_threshold: self.greeting_word_threshold,
            window: self.rewrite_window,
        }
    }
}

fn default_greeting_threshold() -> usize {
    4
}
fn default_rewrite_window() -> usize {
    4
}
fn default_history_window() -> usize {
    8
}
fn default_apology() -> String {
    DEFAULT_APOLOGY.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstructionsConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_baseline")]
    pub baseline: String,
    /// Base URL of the remote settings store (e.g. a Supabase project URL).
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Environment variable holding the remote store's service key.
    #[serde(default = "default_remote_key_env")]
    pub remote_key_env: String,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

impl Default for InstructionsConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            baseline: default_baseline(),
            remote_url: None,
            remote_key_env: default_remote_key_env(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("system_prompt.json")
}
fn default_baseline() -> String {
    docchat_core::instructions::DEFAULT_BASELINE.to_string()
}
fn default_remote_key_env() -> String {
    "SUPABASE_SERVICE_ROLE_KEY".to_string()
}
fn default_remote_timeout() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }
    if config.chunking.upsert_batch_size == 0 {
        anyhow::bail!("chunking.upsert_batch_size must be > 0");
    }

    // Retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.fetch_k < config.retrieval.k {
        anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&config.retrieval.lambda) {
        anyhow::bail!("retrieval.lambda must be in [0.0, 1.0]");
    }
    match config.retrieval.mode.as_str() {
        "mmr" | "similarity" => {}
        other => anyhow::bail!(
            "Unknown retrieval mode: '{}'. Must be mmr or similarity.",
            other
        ),
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Index
    match config.index.provider.as_str() {
        "disabled" | "memory" => {}
        "pinecone" => {
            if config.index.host.is_none() {
                anyhow::bail!("index.host must be specified when provider is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be disabled, memory, or pinecone.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[server]\nbind = \"127.0.0.1:0\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.llm.provider, "disabled");
        assert_eq!(config.index.provider, "memory");
        assert_eq!(config.retrieval.k, 6);
        assert_eq!(
            config.retrieval.search_mode(),
            SearchMode::Diversity {
                fetch_k: 20,
                lambda: 0.7
            }
        );
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.conversation.greeting_word_threshold, 4);
        assert_eq!(config.instructions.cache_path, PathBuf::from("system_prompt.json"));
        assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_similarity_mode() {
        let config = parse("[retrieval]\nmode = \"similarity\"\nk = 3\n").unwrap();
        assert_eq!(config.retrieval.policy().mode, SearchMode::Similarity);
        assert_eq!(config.retrieval.policy().k, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").is_err());
        assert!(parse("[retrieval]\nk = 0\n").is_err());
        assert!(parse("[retrieval]\nk = 10\nfetch_k = 5\n").is_err());
        assert!(parse("[retrieval]\nlambda = 1.5\n").is_err());
        assert!(parse("[retrieval]\nmode = \"hybrid\"\n").is_err());
        assert!(parse("[llm]\nprovider = \"anthropic\"\n").is_err());
        assert!(parse("[llm]\nprovider = \"openai\"\n").is_err());
        assert!(parse("[index]\nprovider = \"pinecone\"\n").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").is_err());
    }

    #[test]
    fn test_accepts_full_openai_setup() {
        let config = parse(
            r#"
[llm]
provider = "openai"
model = "gpt-4o"

[embedding]
provider = "openai"
model = "text-embedding-3-large"
dims = 1024

[index]
provider = "pinecone"
host = "https://docs-abc.svc.pinecone.io"
"#,
        )
        .unwrap();
        assert!(config.llm.is_enabled());
        assert!(config.embedding.is_enabled());
        assert!(config.index.is_enabled());
    }
}
