//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ControlError;
use crate::logs::LogLevel;

/// Control core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Provisioning agent configuration
    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    /// Bundle staging configuration
    #[serde(default)]
    pub staging: StagingSettings,

    /// Git hosting API configuration
    #[serde(default)]
    pub githost: GitHostSettings,

    /// Directory holding the control core's durable collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Platform API base URL, injected into generated runtime config
    #[serde(default = "default_platform_url")]
    pub platform_api_url: String,

    /// Admin proxy and circuit breaker configuration
    #[serde(default)]
    pub proxy: ProxySettings,
}

fn default_platform_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/mozaiks/data")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            provisioning: ProvisioningSettings::default(),
            staging: StagingSettings::default(),
            githost: GitHostSettings::default(),
            data_dir: default_data_dir(),
            platform_api_url: default_platform_url(),
            proxy: ProxySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when absent
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        if tokio::fs::metadata(path).await.is_err() {
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }
}

/// Provisioning agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Base URL of the provisioning agent
    #[serde(default = "default_agent_url")]
    pub base_url: String,

    /// API key for the provisioning agent
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,

    /// Admin connection string override for database administration
    #[serde(default)]
    pub admin_connection_override: Option<String>,

    /// Name of the database holding the control core's own collections
    #[serde(default = "default_metadata_database")]
    pub metadata_database: String,
}

fn default_agent_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_agent_timeout() -> u64 {
    30
}

fn default_metadata_database() -> String {
    "mozaiks_meta".to_string()
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            base_url: default_agent_url(),
            api_key: String::new(),
            timeout_secs: default_agent_timeout(),
            admin_connection_override: None,
            metadata_database: default_metadata_database(),
        }
    }
}

/// Bundle staging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSettings {
    /// Directory for staged bundle files
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,

    /// Maximum bundle size in bytes
    #[serde(default = "default_max_bundle_bytes")]
    pub max_bundle_bytes: u64,

    /// Optional URL of the base runtime file set merged under every bundle
    #[serde(default)]
    pub core_bundle_url: Option<String>,

    /// TTL for the cached base runtime file set, in seconds
    #[serde(default = "default_core_cache_ttl")]
    pub core_cache_ttl_secs: u64,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/var/lib/mozaiks/staging")
}

fn default_max_bundle_bytes() -> u64 {
    // 100 MiB
    100 * 1024 * 1024
}

fn default_core_cache_ttl() -> u64 {
    600
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            max_bundle_bytes: default_max_bundle_bytes(),
            core_bundle_url: None,
            core_cache_ttl_secs: default_core_cache_ttl(),
        }
    }
}

/// Git hosting API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHostSettings {
    /// Base URL of the git hosting REST API
    #[serde(default = "default_githost_url")]
    pub base_url: String,

    /// Access token
    #[serde(default)]
    pub token: String,

    /// Owner (organization or user) that repositories are created under
    #[serde(default = "default_githost_owner")]
    pub owner: String,

    /// Create repositories as private
    #[serde(default = "default_true")]
    pub private_repos: bool,

    /// Request timeout in seconds for metadata and object calls
    #[serde(default = "default_githost_timeout")]
    pub timeout_secs: u64,
}

fn default_githost_url() -> String {
    "https://api.github.com".to_string()
}

fn default_githost_owner() -> String {
    "mozaiks-apps".to_string()
}

fn default_githost_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for GitHostSettings {
    fn default() -> Self {
        Self {
            base_url: default_githost_url(),
            token: String::new(),
            owner: default_githost_owner(),
            private_repos: true,
            timeout_secs: default_githost_timeout(),
        }
    }
}

/// Admin proxy and circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// HTTP client timeout in seconds
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,

    /// Maximum response body size in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Failures within the window before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Rolling failure window in seconds
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,

    /// How long the circuit stays open, in seconds
    #[serde(default = "default_break_secs")]
    pub break_secs: u64,

    /// TTL for idle circuit entries, in seconds
    #[serde(default = "default_circuit_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_proxy_timeout() -> u64 {
    10
}

fn default_max_response_bytes() -> usize {
    // 2 MiB
    2 * 1024 * 1024
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_failure_window() -> u64 {
    30
}

fn default_break_secs() -> u64 {
    20
}

fn default_circuit_ttl() -> u64 {
    300
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout(),
            max_response_bytes: default_max_response_bytes(),
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
            break_secs: default_break_secs(),
            cache_ttl_secs: default_circuit_ttl(),
        }
    }
}
