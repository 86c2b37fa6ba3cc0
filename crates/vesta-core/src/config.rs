//! Configuration types for Vesta components.
//!
//! Values are layered: built-in defaults, then the optional `config.toml`,
//! then CLI flags and environment variables (applied by the binary).
//!
//! ```toml
//! [portal]
//! url = "https://data.gov.sg"
//! api_path = "api/action"
//! discovery_mode = "concurrent"
//!
//! [index]
//! chunk_size = 1000
//! top_k = 4
//!
//! [retry.llm]
//! max_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("Vesta/{} (data-analyst)", env!("CARGO_PKG_VERSION")),
        }
    }
}

// =============================================================================
// Fan-out mode
// =============================================================================

/// How per-package and per-dataset requests are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One request at a time, in input order.
    Sequential,
    /// Requests issued concurrently over the shared connection pool.
    #[default]
    Concurrent,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl FromStr for FetchMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            _ => Err(AppError::ConfigError(format!(
                "Unknown fetch mode: '{}'. Valid options: sequential, concurrent",
                s
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[portal]`: where datasets come from and how discovery fans out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Base URL of the CKAN portal.
    pub url: String,
    /// Path of the action API relative to `url`.
    pub api_path: String,
    /// Preferred language for multilingual metadata. Defaults to `"en"`.
    pub language: Option<String>,
    /// Landing page template with `{id}` and `{name}` placeholders.
    ///
    /// If not set, defaults to `{url}/dataset/{name}`.
    pub landing_page_template: Option<String>,
    pub discovery_mode: FetchMode,
    pub discovery_concurrency: usize,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            url: "https://data.gov.sg".to_string(),
            api_path: "api/action".to_string(),
            language: None,
            landing_page_template: None,
            discovery_mode: FetchMode::Concurrent,
            discovery_concurrency: 16,
        }
    }
}

impl PortalSettings {
    /// Returns the preferred language, defaulting to `"en"`.
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    /// Landing page for a dataset, from the template or the CKAN default.
    pub fn landing_page(&self, id: &str, name: &str) -> String {
        match &self.landing_page_template {
            Some(template) => template.replace("{id}", id).replace("{name}", name),
            None => format!("{}/dataset/{}", self.url.trim_end_matches('/'), name),
        }
    }
}

/// `[index]`: chunking and similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Candidate documents returned by a similarity query.
    pub top_k: usize,
    /// Texts per embedding API call.
    pub embedding_batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
            top_k: 4,
            embedding_batch_size: 64,
        }
    }
}

/// `[rows]`: datastore pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowsSettings {
    /// Records per page requested from `datastore_search`. The portal's own
    /// default applies when unset.
    pub page_limit: Option<u32>,
    /// Hard cap on pages followed for one dataset.
    pub max_pages: usize,
    pub fetch_mode: FetchMode,
    pub concurrency: usize,
}

impl Default for RowsSettings {
    fn default() -> Self {
        Self {
            page_limit: None,
            max_pages: 1000,
            fetch_mode: FetchMode::Concurrent,
            concurrency: 16,
        }
    }
}

/// `[agent]`: the table reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
    /// Rows shown per table in the agent's opening message.
    pub preview_rows: usize,
    /// Cap on rows returned by a single tool call.
    pub max_tool_rows: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            preview_rows: 5,
            max_tool_rows: 50,
        }
    }
}

/// `[openai]`: model names and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Partial override of a [`RetryPolicy`]. Unset keys keep the base policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub jitter: Option<bool>,
}

impl RetrySettings {
    pub fn apply(&self, mut base: RetryPolicy) -> RetryPolicy {
        if let Some(ms) = self.initial_delay_ms {
            base.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            base.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_attempts {
            base.max_attempts = n;
        }
        if let Some(jitter) = self.jitter {
            base.jitter = jitter;
        }
        base
    }
}

/// `[retry.portal]` and `[retry.llm]`. Keys placed directly under `[retry]`
/// are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub portal: RetrySettings,
    pub llm: RetrySettings,
}

impl RetryConfig {
    pub fn portal_policy(&self) -> RetryPolicy {
        self.portal.apply(RetryPolicy::http())
    }

    pub fn llm_policy(&self) -> RetryPolicy {
        self.llm.apply(RetryPolicy::llm())
    }
}

/// Root of `config.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalSettings,
    pub index: IndexSettings,
    pub rows: RowsSettings,
    pub agent: AgentSettings,
    pub openai: OpenAISettings,
    pub retry: RetryConfig,
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the default configuration directory path: `~/.config/vesta/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vesta"))
}

/// Returns the default configuration file path: `~/.config/vesta/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Vesta configuration
#
# Every key is optional; the values below are the built-in defaults.
# CLI flags and environment variables (PORTAL_URL, CHAT_MODEL, ...) win over this file.

[portal]
url = "https://data.gov.sg"
api_path = "api/action"
# language = "en"
# landing_page_template = "https://data.gov.sg/datasets?resultId={id}"
discovery_mode = "concurrent"   # or "sequential"
discovery_concurrency = 16

[index]
chunk_size = 1000
chunk_overlap = 0
top_k = 4
embedding_batch_size = 64

[rows]
# page_limit = 100
max_pages = 1000
fetch_mode = "concurrent"
concurrency = 16

[agent]
max_iterations = 8
preview_rows = 5
max_tool_rows = 50

[openai]
base_url = "https://api.openai.com/v1"
chat_model = "gpt-4o-mini"
embedding_model = "text-embedding-3-small"

# [retry.portal]
# initial_delay_ms = 500
# max_delay_ms = 30000
# max_attempts = 5
#
# [retry.llm]
# initial_delay_ms = 4000
# max_delay_ms = 10000
# max_attempts = 10
"#;

/// Load configuration from a TOML file.
///
/// * `Some(path)`: the file must exist and parse.
/// * `None`: uses `~/.config/vesta/config.toml`. A commented template is
///   written there on first run; when the file is absent and cannot be
///   created, built-in defaults are returned.
pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path.or_else(default_config_path) {
        Some(p) => p,
        None => return Ok(AppConfig::default()),
    };

    if !config_path.exists() {
        if !using_default_path {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
        if let Err(e) = create_default_config(&config_path) {
            tracing::warn!("Could not create default config template: {}", e);
            return Ok(AppConfig::default());
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    parse_config(&content).map_err(|e| match e {
        AppError::ConfigError(msg) => {
            AppError::ConfigError(format!("Invalid TOML in '{}': {}", config_path.display(), msg))
        }
        other => other,
    })
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig, AppError> {
    let config: AppConfig =
        toml::from_str(content).map_err(|e| AppError::ConfigError(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), AppError> {
    if config.index.chunk_size == 0 {
        return Err(AppError::ConfigError("index.chunk_size must be > 0".into()));
    }
    if config.index.chunk_overlap >= config.index.chunk_size {
        return Err(AppError::ConfigError(
            "index.chunk_overlap must be smaller than index.chunk_size".into(),
        ));
    }
    if config.index.top_k == 0 {
        return Err(AppError::ConfigError("index.top_k must be > 0".into()));
    }
    if config.rows.max_pages == 0 {
        return Err(AppError::ConfigError("rows.max_pages must be > 0".into()));
    }
    Ok(())
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
