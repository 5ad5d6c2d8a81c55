//! Application configuration for Ratsarchiv.
//!
//! User config lives at `~/.ratsarchiv/ratsarchiv.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::types::WalkDirection;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ratsarchiv.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ratsarchiv";

// ---------------------------------------------------------------------------
// Config structs (matching ratsarchiv.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream source and credentials.
    #[serde(default)]
    pub source: SourceConfig,

    /// Output tree.
    #[serde(default)]
    pub output: OutputConfig,

    /// Walk and download tuning.
    #[serde(default)]
    pub crawl: CrawlSettings,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL of the meeting calendar page.
    #[serde(default)]
    pub calendar_url: String,

    /// Sign-in form URL; no sign-in is attempted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,

    /// Name of the env var holding the user name (never store the value itself).
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Name of the env var holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            calendar_url: String::new(),
            login_url: None,
            username_env: default_username_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_username_env() -> String {
    "RATSARCHIV_USERNAME".into()
}
fn default_password_env() -> String {
    "RATSARCHIV_PASSWORD".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the year/month/meeting tree.
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "ratsarchiv-output".into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Walk direction.
    #[serde(default)]
    pub direction: WalkDirection,

    /// Maximum months visited per run.
    #[serde(default = "default_max_units")]
    pub max_units: u32,

    /// Hard wall-clock budget per document download.
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,

    /// Pause between two document downloads.
    #[serde(default = "default_document_delay_ms")]
    pub document_delay_ms: u64,

    /// Pause after each page navigation.
    #[serde(default)]
    pub navigation_delay_ms: u64,

    /// Attempts for page navigation calls.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial delay between attempts (doubles each time).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum navigation steps while seeking the starting month.
    #[serde(default = "default_seek_limit")]
    pub seek_limit: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            direction: WalkDirection::default(),
            max_units: default_max_units(),
            download_timeout_ms: default_download_timeout_ms(),
            document_delay_ms: default_document_delay_ms(),
            navigation_delay_ms: 0,
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            seek_limit: default_seek_limit(),
        }
    }
}

fn default_max_units() -> u32 {
    12
}
fn default_download_timeout_ms() -> u64 {
    10_000
}
fn default_document_delay_ms() -> u64 {
    1_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_seek_limit() -> u32 {
    240
}

// ---------------------------------------------------------------------------
// Harvest config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root of the output tree.
    pub output_root: PathBuf,
    /// Walk direction.
    pub direction: WalkDirection,
    /// Maximum months visited in one run.
    pub max_units: u32,
    /// Hard budget per document attempt.
    pub download_timeout: Duration,
    /// Pause between documents.
    pub document_delay: Duration,
    /// Pause after page navigation.
    pub navigation_delay: Duration,
    /// Attempts for navigation calls (at least 1).
    pub retry_attempts: u32,
    /// First retry delay.
    pub retry_delay: Duration,
    /// Seek step limit.
    pub seek_limit: u32,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_root: PathBuf::from(&config.output.directory),
            direction: config.crawl.direction,
            max_units: config.crawl.max_units,
            download_timeout: Duration::from_millis(config.crawl.download_timeout_ms),
            document_delay: Duration::from_millis(config.crawl.document_delay_ms),
            navigation_delay: Duration::from_millis(config.crawl.navigation_delay_ms),
            retry_attempts: config.crawl.retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.crawl.retry_delay_ms),
            seek_limit: config.crawl.seek_limit,
        }
    }
}

/// Credentials resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ratsarchiv/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ratsarchiv/ratsarchiv.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the calendar URL is set.
pub fn validate_source(config: &AppConfig) -> Result<()> {
    if config.source.calendar_url.trim().is_empty() {
        return Err(HarvestError::config(
            "no calendar_url configured. Set [source].calendar_url in ratsarchiv.toml",
        ));
    }
    Ok(())
}

/// Resolve sign-in credentials from the configured env vars.
///
/// Returns `Ok(None)` when no login URL is configured.
pub fn validate_credentials(config: &AppConfig) -> Result<Option<Credentials>> {
    if config.source.login_url.is_none() {
        return Ok(None);
    }

    let read = |var_name: &str| match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HarvestError::config(format!(
            "credentials not found. Set the {var_name} environment variable."
        ))),
    };

    Ok(Some(Credentials {
        username: read(&config.source.username_env)?,
        password: read(&config.source.password_env)?,
    }))
}
