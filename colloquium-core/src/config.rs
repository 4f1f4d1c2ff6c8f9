//! Configuration system for Colloquium.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment -> explicit overrides. Files live at
//! `~/.config/colloquium/config.toml` and `.colloquium/config.toml` in the
//! workspace directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::decision::{ClassificationPolicy, KeywordPolicy, LoopLimits, PrefixPolicy};
use crate::error::ConfigError;

/// Top-level configuration for the debate engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub generation: GenerationConfig,
    pub evidence: EvidenceConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub log: LogConfig,
}

impl Config {
    /// Rejects configurations the executor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.sink_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "orchestrator.sink_capacity must be at least 1".to_string(),
            });
        }
        if self.orchestrator.step_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "orchestrator.step_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.evidence.per_page == 0 {
            return Err(ConfigError::Validation {
                message: "evidence.per_page must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Validation {
                message: "generation.temperature must be between 0.0 and 2.0".to_string(),
            });
        }
        Ok(())
    }
}

/// Ceilings, timeouts, and streaming knobs for the graph executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum REVISE loops before the decision is forced to finalize.
    pub max_revisions: u32,
    /// Maximum RESEARCH_AGAIN loops before the decision is forced to finalize.
    pub max_research_cycles: u32,
    /// Per-step deadline in seconds.
    pub step_timeout_secs: u64,
    /// Bounded capacity of each session's event channel.
    pub sink_capacity: usize,
    /// How long an event send may block on a full channel before the
    /// session fails with a stalled sink.
    pub sink_send_timeout_ms: u64,
    /// Which criticism classification policy to use.
    pub classifier: ClassifierKind,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_revisions: 3,
            max_research_cycles: 2,
            step_timeout_secs: 120,
            sink_capacity: 256,
            sink_send_timeout_ms: 5_000,
            classifier: ClassifierKind::Prefix,
        }
    }
}

impl OrchestratorConfig {
    pub fn loop_limits(&self) -> LoopLimits {
        LoopLimits {
            max_revisions: self.max_revisions,
            max_research_cycles: self.max_research_cycles,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn sink_send_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_send_timeout_ms)
    }
}

/// Criticism classification policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Honor `[evidence]` / `[reasoning]` markers, keyword fallback.
    Prefix,
    /// Keyword scan only.
    Keyword,
}

impl ClassifierKind {
    /// Instantiates the selected policy.
    pub fn policy(self) -> Arc<dyn ClassificationPolicy> {
        match self {
            ClassifierKind::Prefix => Arc::new(PrefixPolicy::default()),
            ClassifierKind::Keyword => Arc::new(KeywordPolicy),
        }
    }
}

/// Configuration for the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible endpoint base URL.
    pub base_url: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier sent with every request.
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            request_timeout_secs: 120,
        }
    }
}

/// Configuration for evidence sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    pub openalex_base_url: String,
    /// Contact address sent to OpenAlex for polite-pool rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
    /// Documents requested per source per query.
    pub per_page: u32,
    /// Knowledge-base endpoint. The source is only attached when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_api_key: Option<String>,
    pub knowledge_api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            openalex_base_url: "https://api.openalex.org".to_string(),
            mailto: None,
            per_page: 5,
            knowledge_base_url: None,
            knowledge_api_key: None,
            knowledge_api_key_env: "KNOWLEDGE_API_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Configuration for the research packet store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Document store endpoint. Falls back to an in-memory store when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            api_key_env: "STORAGE_API_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Configuration for the task ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Task registry endpoint. Falls back to a no-op ledger when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level when no `-v` flags are given.
    pub level: String,
    /// Whether to also write JSON logs to the platform data directory.
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `COLLOQUIUM_`)
/// 3. Workspace-local config (`.colloquium/config.toml`)
/// 4. User config (`~/.config/colloquium/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&Config>,
) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    // User-level config
    if let Some(path) = user_config_path()
        && path.exists()
    {
        figment = figment.merge(Toml::file(&path));
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".colloquium").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (COLLOQUIUM_ORCHESTRATOR__MAX_REVISIONS, etc.)
    figment = figment.merge(Env::prefixed("COLLOQUIUM_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::Load {
        message: e.to_string(),
    })
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "colloquium", "colloquium")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Check whether any configuration file exists (user-level or
/// workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(path) = user_config_path()
        && path.exists()
    {
        return true;
    }

    if let Some(ws) = workspace
        && ws.join(".colloquium").join("config.toml").exists()
    {
        return true;
    }

    false
}
