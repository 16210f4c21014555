//! Application configuration for Adapt.
//!
//! User config lives at `~/.adapt/adapt.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AdaptError, Result};
use crate::types::CourseSize;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "adapt.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".adapt";

/// Largest number of simultaneous uploads the orchestrator will run.
pub const MAX_UPLOAD_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// Config structs (matching adapt.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Course API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload and extraction limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Wizard defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the course API.
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Name of the env var holding the access token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// HTTP timeout for API calls, in seconds. Generation can be slow.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Owner (curator) id used for storage namespaces.
    #[serde(default)]
    pub owner_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            access_token_env: default_access_token_env(),
            timeout_secs: default_timeout(),
            owner_id: String::new(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:3000".into()
}
fn default_access_token_env() -> String {
    "ADAPT_ACCESS_TOKEN".into()
}
fn default_timeout() -> u64 {
    120
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage server.
    #[serde(default = "default_storage_url")]
    pub url: String,

    /// Bucket course documents are written to.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Name of the env var holding the storage API key.
    #[serde(default = "default_storage_key_env")]
    pub api_key_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            bucket: default_bucket(),
            api_key_env: default_storage_key_env(),
        }
    }
}

fn default_storage_url() -> String {
    "http://localhost:54321".into()
}
fn default_bucket() -> String {
    "courses".into()
}
fn default_storage_key_env() -> String {
    "ADAPT_STORAGE_KEY".into()
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest single file accepted, in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Largest total batch accepted at submit, in bytes.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,

    /// Minimum extracted characters before questions can be generated.
    #[serde(default = "default_min_extracted_chars")]
    pub min_extracted_chars: usize,

    /// Simultaneous uploads (clamped to 1..=4).
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_batch_bytes: default_max_batch_bytes(),
            min_extracted_chars: default_min_extracted_chars(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    30 * 1024 * 1024
}
fn default_max_batch_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_min_extracted_chars() -> usize {
    200
}
fn default_upload_concurrency() -> usize {
    1
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Course size preselected in the form.
    #[serde(default)]
    pub course_size: CourseSize,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime limits for one wizard instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_file_bytes: u64,
    pub max_batch_bytes: u64,
    pub min_extracted_chars: usize,
    /// Always within `1..=MAX_UPLOAD_CONCURRENCY`.
    pub upload_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_file_bytes: config.limits.max_file_bytes,
            max_batch_bytes: config.limits.max_batch_bytes,
            min_extracted_chars: config.limits.min_extracted_chars,
            upload_concurrency: config
                .limits
                .upload_concurrency
                .clamp(1, MAX_UPLOAD_CONCURRENCY),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.adapt/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| AdaptError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.adapt/adapt.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| AdaptError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AdaptError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AdaptError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = render_config(&AppConfig::default())?;

    std::fs::write(&path, content).map_err(|e| AdaptError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Serialize a config as pretty TOML.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| AdaptError::config(e.to_string()))
}

/// Read a secret from the env var named by `var_name`. Empty counts as unset.
pub fn read_secret(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Resolve the owner id: explicit value first, then `[api] owner_id`.
pub fn resolve_owner_id(explicit: Option<&str>, config: &AppConfig) -> Result<String> {
    explicit
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| {
            let configured = config.api.owner_id.trim();
            (!configured.is_empty()).then(|| configured.to_string())
        })
        .ok_or_else(|| {
            AdaptError::config(
                "owner id not set. Pass --owner, set ADAPT_OWNER_ID, or add owner_id to [api]",
            )
        })
}
