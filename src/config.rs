use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ComadreConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub dialogue: DialogueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    7300
}
fn default_bind() -> String {
    "127.0.0.1".into()
}

/// Remote completion endpoint settings (OpenAI-compatible chat API).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub top_p: Option<f32>,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: None,
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".into()
}
fn default_model() -> String {
    "llama3-8b-8192".into()
}
fn default_max_tokens() -> u32 {
    100
}
fn default_temperature() -> f32 {
    0.75
}
fn default_llm_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// `"file"` or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Profile directory for the file backend. Defaults to `~/.comadre/profiles`.
    pub path: Option<String>,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_history_cap")]
    pub conversation_cap: usize,
    #[serde(default = "default_history_cap")]
    pub emotional_cap: usize,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub retain_identity_on_expiry: bool,
    #[serde(default)]
    pub retain_identity_on_clear: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            retention_hours: default_retention_hours(),
            conversation_cap: default_history_cap(),
            emotional_cap: default_history_cap(),
            store_timeout_ms: default_store_timeout_ms(),
            retain_identity_on_expiry: true,
            retain_identity_on_clear: false,
        }
    }
}

impl MemoryConfig {
    pub fn profile_dir(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => state_dir().join("profiles"),
        }
    }
}

fn default_backend() -> String {
    "file".into()
}
/// Longest accepted retention window, one hundred years.
pub const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

fn default_retention_hours() -> u64 {
    48
}
fn default_history_cap() -> usize {
    20
}
fn default_store_timeout_ms() -> u64 {
    3_000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogueConfig {
    /// Forget the pending question after a free-form reply that asks none.
    #[serde(default = "default_true")]
    pub clear_last_question: bool,
    /// Stands in for the user's words when the platform sends none.
    #[serde(default = "default_utterance")]
    pub default_utterance: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            clear_last_question: true,
            default_utterance: default_utterance(),
        }
    }
}

fn default_utterance() -> String {
    "Hola".into()
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `COMADRE_CONFIG` env var
/// 2. `~/.comadre/config.toml`
/// 3. Zero-config defaults (no file needed)
pub fn load() -> anyhow::Result<ComadreConfig> {
    let path = config_path();

    if path.exists() {
        load_from_path(&path)
    } else {
        info!("no config file found, using zero-config defaults");
        let mut config = ComadreConfig::default();
        resolve_api_key(&mut config);
        Ok(config)
    }
}

/// Load and validate a specific config file.
pub fn load_from_path(path: &Path) -> anyhow::Result<ComadreConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let mut config: ComadreConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;

    resolve_api_key(&mut config);
    validate(&config)?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("COMADRE_CONFIG") {
        return PathBuf::from(path);
    }
    state_dir().join("config.toml")
}

/// `~/.comadre`, or `./.comadre` when HOME is unset.
pub fn state_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".comadre")
}

/// Resolve the API key from the environment if not set in config.
fn resolve_api_key(config: &mut ComadreConfig) {
    if config.llm.api_key.is_none() {
        config.llm.api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
    }
}

/// Validate the config and return clear error messages.
pub fn validate(config: &ComadreConfig) -> anyhow::Result<()> {
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!(
            "llm.temperature must be within 0.0..=2.0, got {}",
            config.llm.temperature
        );
    }
    if let Some(top_p) = config.llm.top_p {
        if !(top_p > 0.0 && top_p <= 1.0) {
            anyhow::bail!("llm.top_p must be within (0.0, 1.0], got {top_p}");
        }
    }
    if config.llm.timeout_ms == 0 {
        anyhow::bail!("llm.timeout_ms must be > 0");
    }

    let valid_backends = ["file", "memory"];
    if !valid_backends.contains(&config.memory.backend.as_str()) {
        anyhow::bail!(
            "invalid memory.backend '{}': must be one of {:?}",
            config.memory.backend,
            valid_backends
        );
    }
    if config.memory.retention_hours == 0 {
        anyhow::bail!("memory.retention_hours must be > 0");
    }
    if config.memory.retention_hours > MAX_RETENTION_HOURS {
        anyhow::bail!(
            "memory.retention_hours must be <= {MAX_RETENTION_HOURS}, got {}",
            config.memory.retention_hours
        );
    }
    if config.memory.conversation_cap == 0 || config.memory.emotional_cap == 0 {
        anyhow::bail!("memory history caps must be > 0");
    }
    if config.memory.store_timeout_ms == 0 {
        anyhow::bail!("memory.store_timeout_ms must be > 0");
    }

    Ok(())
}
