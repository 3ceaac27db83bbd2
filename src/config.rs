//! TOML configuration parsing and validation.
//!
//! All credentials are explicit configuration values threaded through the
//! pipeline entry point. A secret may instead name an environment variable
//! (`*_env`), which is read once at load time; nothing here ever writes to
//! the process environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub wiki: WikiConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WikiConfig {
    pub app_id: String,
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Environment variable holding the app secret, used when `app_secret` is unset.
    #[serde(default)]
    pub app_secret_env: Option<String>,
    pub space_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Browser base for citation links, e.g. `https://acme.feishu.cn/wiki`.
    #[serde(default = "default_web_url")]
    pub web_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub export_sheets: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}
fn default_web_url() -> String {
    "https://feishu.cn/wiki".to_string()
}
fn default_page_size() -> u32 {
    50
}

impl WikiConfig {
    /// Resolve the app secret from the config value or the named env var.
    pub fn resolve_secret(&self) -> Result<String> {
        if let Some(secret) = self.app_secret.as_ref().filter(|s| !s.is_empty()) {
            return Ok(secret.clone());
        }
        if let Some(var) = &self.app_secret_env {
            return std::env::var(var)
                .with_context(|| format!("{} environment variable not set", var));
        }
        bail!("wiki.app_secret or wiki.app_secret_env must be set")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("./index/wiki-index.json")
}
fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Endpoint override (OpenAI-compatible base or Ollama URL).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            api_key: None,
            api_key_env: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    fn needs_remote_model(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "jina" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Results below this similarity are dropped before sources are shown.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_min_score() -> f64 {
    0.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_chat_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: default_chat_url(),
            api_key: None,
            api_key_env: None,
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

fn default_chat_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_system_prompt() -> String {
    "You are an expert engineer answering questions about the team's internal wiki. \
     Keep answers technical and grounded in the provided context; if the context \
     does not contain the answer, say so."
        .to_string()
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Resolve an API key from an inline value or a named env var.
pub fn resolve_api_key(inline: Option<&String>, env: Option<&String>) -> Option<String> {
    inline
        .filter(|k| !k.is_empty())
        .cloned()
        .or_else(|| env.and_then(|var| std::env::var(var).ok()))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.wiki.app_id.trim().is_empty() {
        bail!("wiki.app_id must not be empty");
    }
    if config.wiki.space_id.trim().is_empty() {
        bail!("wiki.space_id must not be empty");
    }
    if config.wiki.page_size == 0 {
        bail!("wiki.page_size must be > 0");
    }

    if config.index.max_tokens == 0 {
        bail!("index.max_tokens must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "openai" | "jina" | "ollama" | "local" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, jina, ollama, local, or hashing.",
            other
        ),
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if embedding.needs_remote_model() {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }

    match config.chat.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.chat.model.is_none() {
                bail!("chat.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown chat provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[wiki]
app_id = "cli_test"
app_secret = "s3cret"
space_id = "7000000000"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.wiki.base_url, "https://open.feishu.cn/open-apis");
        assert_eq!(cfg.wiki.page_size, 50);
        assert!(!cfg.wiki.export_sheets);
        assert_eq!(cfg.staging.dir, PathBuf::from("./data"));
        assert_eq!(cfg.embedding.batch_size, 16);
        assert_eq!(cfg.retrieval.min_score, 0.25);
        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.chat.is_enabled());
    }

    #[test]
    fn secret_resolves_inline() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.wiki.resolve_secret().unwrap(), "s3cret");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let cfg = parse(
            r#"
[wiki]
app_id = "cli_test"
space_id = "7000000000"
"#,
        )
        .unwrap();
        assert!(cfg.wiki.resolve_secret().is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let src = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn remote_embedding_requires_dims_and_model() {
        let src = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse(&src).is_err());

        let src = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-large\"\ndims = 3072\n",
            MINIMAL
        );
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn hashing_provider_needs_no_model() {
        let src = format!("{}\n[embedding]\nprovider = \"hashing\"\n", MINIMAL);
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn min_score_out_of_range_rejected() {
        let src = format!("{}\n[retrieval]\nmin_score = 1.5\n", MINIMAL);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn empty_space_id_rejected() {
        let err = parse(
            r#"
[wiki]
app_id = "cli_test"
app_secret = "x"
space_id = "  "
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("space_id"));
    }

    #[test]
    fn example_config_parses() {
        let cfg = parse(include_str!("../config/wctx.example.toml")).unwrap();
        assert_eq!(cfg.embedding.dims, Some(3072));
        assert_eq!(cfg.wiki.app_secret_env.as_deref(), Some("FEISHU_APP_SECRET"));
        assert!(cfg.chat.is_enabled());
    }
}
