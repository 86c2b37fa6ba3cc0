use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;

use vesta_core::AppConfig;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());
    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "vesta")]
#[command(
    author,
    version = version_info(),
    about = "Data analyst assistant for open data portals"
)]
#[command(after_help = "Examples:
  vesta chat
  vesta ask \"Which town had the most resale flats sold in 2020?\"
  vesta datasets --limit 20
  vesta --portal-url https://data.gov.sg ask \"How much rain fell in 2019?\"

Configuration:
  Settings are read from ~/.config/vesta/config.toml (or --config).
  Command line flags and environment variables override the file.")]
pub struct Config {
    /// OpenAI API key, required by `chat` and `ask`
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the CKAN portal (overrides [portal].url)
    #[arg(long, env = "PORTAL_URL")]
    pub portal_url: Option<String>,

    /// Path to config.toml
    #[arg(short, long, env = "VESTA_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Chat model name (overrides [openai].chat_model)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Embedding model name (overrides [openai].embedding_model)
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// OpenAI-compatible endpoint (overrides [openai].base_url)
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Log pipeline internals at debug level
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// The OpenAI API key, or an error when it is missing or blank.
    pub fn require_openai_key(&self) -> anyhow::Result<&str> {
        match self.openai_api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => anyhow::bail!(
                "OPENAI_API_KEY is not set.\n   Export it or pass --openai-api-key."
            ),
        }
    }

    /// Applies command line overrides on top of a loaded file configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(url) = &self.portal_url {
            config.portal.url = url.clone();
        }
        if let Some(model) = &self.chat_model {
            config.openai.chat_model = model.clone();
        }
        if let Some(model) = &self.embedding_model {
            config.openai.embedding_model = model.clone();
        }
        if let Some(base_url) = &self.openai_base_url {
            config.openai.base_url = base_url.clone();
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start an interactive session; type `exit` or `quit` to leave
    Chat,

    /// Answer a single question and print the datasets used
    #[command(after_help = "Example: vesta ask \"What was the average monthly rainfall in 2021?\"")]
    Ask {
        /// Question in natural language
        query: String,
    },

    /// List the CSV datasets available on the portal
    Datasets {
        /// Maximum number of datasets to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
}
