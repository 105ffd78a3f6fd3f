//! Configuration loading.
//!
//! Credentials come from the environment and are required at startup —
//! a missing value is a fatal configuration error, not a runtime one.
//! Operational tunables (listen address, TTLs, API base URLs) live in an
//! optional `scribe.toml` and all have defaults.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete Scribe configuration: required credentials plus tunables.
#[derive(Debug, Clone)]
pub struct Config {
    /// App-level token (`xapp-`) for Socket Mode connections
    pub app_token: String,
    /// Development bot token (`xoxb-`) used when no installation matches
    pub bot_token: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Request signing secret (HTTP events endpoint)
    pub signing_secret: String,
    /// OAuth redirect URI; must match the value registered with Slack and
    /// is used verbatim at both authorize and exchange time
    pub redirect_uri: String,
    /// Gemini API key
    pub google_api_key: String,
    /// Base64-encoded 32-byte master key for token encryption at rest
    pub encryption_key: String,
    /// Operational tunables
    pub settings: Settings,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Required variables: SLACK_APP_TOKEN, SLACK_BOT_TOKEN,
    /// SLACK_CLIENT_ID, SLACK_CLIENT_SECRET, SLACK_SIGNING_SECRET,
    /// SLACK_REDIRECT_URI, GOOGLE_API_KEY, SCRIBE_ENCRYPTION_KEY.
    ///
    /// If SCRIBE_CONFIG points at a TOML file, tunables are loaded from it;
    /// otherwise defaults apply.
    pub fn from_env() -> Result<Self> {
        let settings = match std::env::var("SCRIBE_CONFIG") {
            Ok(path) => load_settings(&path)
                .with_context(|| format!("Failed to load settings from {}", path))?,
            Err(_) => Settings::default(),
        };

        Ok(Self {
            app_token: require_env("SLACK_APP_TOKEN")?,
            bot_token: require_env("SLACK_BOT_TOKEN")?,
            client_id: require_env("SLACK_CLIENT_ID")?,
            client_secret: require_env("SLACK_CLIENT_SECRET")?,
            signing_secret: require_env("SLACK_SIGNING_SECRET")?,
            redirect_uri: require_env("SLACK_REDIRECT_URI")?,
            google_api_key: require_env("GOOGLE_API_KEY")?,
            encryption_key: require_env("SCRIBE_ENCRYPTION_KEY")?,
            settings,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} is required", name))
}

/// Operational tunables (all optional, all defaulted)
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP listen address for the OAuth/events endpoints
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite database path for installation records
    #[serde(default = "default_installations_db")]
    pub installations_db: String,

    /// OAuth state token TTL (seconds)
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,

    /// How often expired state tokens are swept (seconds)
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,

    /// Slack Web API base URL (overridable for tests)
    #[serde(default = "default_slack_api_base")]
    pub slack_api_base: String,

    /// Gemini API base URL (overridable for tests)
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,

    /// Gemini model used for mention replies
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Delay before reopening a dropped Socket Mode connection (seconds)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,

    /// Timeout applied to each outbound API call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_installations_db() -> String {
    "installations.db".to_string()
}

fn default_state_ttl() -> i64 {
    300
}

fn default_state_cleanup_interval() -> u64 {
    60
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-pro".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            installations_db: default_installations_db(),
            state_ttl_seconds: default_state_ttl(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
            slack_api_base: default_slack_api_base(),
            gemini_api_base: default_gemini_api_base(),
            gemini_model: default_gemini_model(),
            reconnect_delay_seconds: default_reconnect_delay(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Load tunables from a TOML file
pub fn load_settings(path: &str) -> Result<Settings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let settings: Settings = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(settings)
}
