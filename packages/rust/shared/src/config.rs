//! Application configuration for admitbot.
//!
//! User config lives at `~/.admitbot/admitbot.toml`.
//! Secrets are never stored in the file; only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AdmitBotError, Result};
use crate::types::Program;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "admitbot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".admitbot";

// ---------------------------------------------------------------------------
// Config structs (matching admitbot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Page fetching and rendering.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Curriculum document acquisition and sync.
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// GigaChat completion and file API.
    #[serde(default)]
    pub gigachat: GigaChatConfig,

    /// Telegram bot transport.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Tracked programs, in declaration order.
    #[serde(default = "default_programs")]
    pub programs: Vec<ProgramEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            documents: DocumentsConfig::default(),
            gigachat: GigaChatConfig::default(),
            telegram: TelegramConfig::default(),
            programs: default_programs(),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for the lightweight HTTP fetch.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Whether to fall back to a headless browser render.
    #[serde(default = "default_true")]
    pub render_enabled: bool,

    /// Chromium-family executable used for rendering.
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Upper bound on waiting for the rendered document body.
    #[serde(default = "default_render_wait")]
    pub render_wait_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            render_enabled: true,
            browser: default_browser(),
            render_wait_secs: default_render_wait(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_browser() -> String {
    "chromium".into()
}
fn default_render_wait() -> u64 {
    10
}

/// `[documents]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Local staging directory (wiped at every sync).
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Tracked document extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// How long to wait for a download to land after each acquisition.
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: u64,

    /// Staging directory polling interval while waiting.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Acquisition strategy: "links" or "command".
    #[serde(default = "default_acquirer")]
    pub acquirer: String,

    /// Argv template for the "command" acquirer (`{url}` and `{dir}` are substituted).
    #[serde(default)]
    pub command: Vec<String>,

    /// Timeout for one run of the acquisition command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            extension: default_extension(),
            settle_timeout_secs: default_settle_timeout(),
            poll_interval_ms: default_poll_interval(),
            acquirer: default_acquirer(),
            command: Vec::new(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_staging_dir() -> String {
    "downloads".into()
}
fn default_extension() -> String {
    "pdf".into()
}
fn default_settle_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    250
}
fn default_acquirer() -> String {
    "links".into()
}
fn default_command_timeout() -> u64 {
    60
}

/// `[gigachat]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GigaChatConfig {
    /// Name of the env var holding the authorization key (never store the key itself).
    #[serde(default = "default_credentials_env")]
    pub credentials_env: String,

    /// OAuth scope.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Model name for completions.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// OAuth token endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// API base URL (chat completions and files).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Verify TLS certificates of the API endpoints.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// HTTP timeout for API calls.
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for GigaChatConfig {
    fn default() -> Self {
        Self {
            credentials_env: default_credentials_env(),
            scope: default_scope(),
            model: default_model(),
            temperature: default_temperature(),
            auth_url: default_auth_url(),
            base_url: default_base_url(),
            verify_tls: true,
            timeout_secs: default_api_timeout(),
        }
    }
}

fn default_credentials_env() -> String {
    "GIGACHAT_CREDENTIALS".into()
}
fn default_scope() -> String {
    "GIGACHAT_API_PERS".into()
}
fn default_model() -> String {
    "GigaChat".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_auth_url() -> String {
    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".into()
}
fn default_base_url() -> String {
    "https://gigachat.devices.sberbank.ru/api/v1".into()
}
fn default_api_timeout() -> u64 {
    120
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Name of the env var holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Bot API root.
    #[serde(default = "default_telegram_api")]
    pub api_url: String,

    /// Long-polling timeout for `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_url: default_telegram_api(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_token_env() -> String {
    "TELEGRAM_TOKEN".into()
}
fn default_telegram_api() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout() -> u64 {
    30
}

/// `[[programs]]` entry: one tracked master's program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Display name, used as the context label.
    pub name: String,
    /// Program page URL.
    pub url: String,
}

fn default_programs() -> Vec<ProgramEntry> {
    vec![
        ProgramEntry {
            name: "Artificial Intelligence".into(),
            url: "https://abit.itmo.ru/program/master/ai".into(),
        },
        ProgramEntry {
            name: "AI Product Management".into(),
            url: "https://abit.itmo.ru/program/master/ai_product".into(),
        },
    ]
}

impl AppConfig {
    /// Build the program registry, validating every URL.
    pub fn programs(&self) -> Result<Vec<Program>> {
        if self.programs.is_empty() {
            return Err(AdmitBotError::validation("no programs configured"));
        }

        self.programs
            .iter()
            .map(|entry| {
                let url = Url::parse(&entry.url).map_err(|e| {
                    AdmitBotError::config(format!(
                        "invalid URL for program '{}': {e}",
                        entry.name
                    ))
                })?;
                Ok(Program::new(entry.name.clone(), url))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.admitbot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AdmitBotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.admitbot/admitbot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AdmitBotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AdmitBotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AdmitBotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AdmitBotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AdmitBotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named environment variable.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(AdmitBotError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}
