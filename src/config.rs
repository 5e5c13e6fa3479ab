use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined onto
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://upneeepaaa.com/API/api/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Where the secure store and log files live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("billpay"))
        .unwrap_or_else(|| PathBuf::from(".billpay"))
        .to_string_lossy()
        .to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

/// Bill-payment workflow tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Host of the page the gateway redirects to after payment
    #[serde(default = "default_callback_host")]
    pub callback_host: String,
    /// Path prefix of that page
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// Delay before asking the UI to open the transaction list (default: 500ms)
    #[serde(default = "default_settle_ms")]
    pub redirect_settle_ms: u64,
    /// Gateway used when the server lists none
    #[serde(default = "default_gateway_id")]
    pub default_gateway_id: i64,
}

fn default_callback_host() -> String {
    "upneeepaaa.com".to_string()
}

fn default_callback_path() -> String {
    "/transaction-history".to_string()
}

fn default_settle_ms() -> u64 {
    500
}

fn default_gateway_id() -> i64 {
    1
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            callback_host: default_callback_host(),
            callback_path: default_callback_path(),
            redirect_settle_ms: default_settle_ms(),
            default_gateway_id: default_gateway_id(),
        }
    }
}

impl WorkflowConfig {
    pub fn redirect_settle(&self) -> Duration {
        Duration::from_millis(self.redirect_settle_ms)
    }
}

/// Transaction history paging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    10
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a file under the storage dir instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the user config file (~/.config/billpay/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("billpay").join("config.toml"))
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the client works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with BILLPAY_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("BILLPAY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to the user config file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path =
            Self::user_config_path().context("No config directory on this platform")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get absolute path to the storage directory
    pub fn storage_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.storage.dir);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Path of the secure-store file
    pub fn secure_store_path(&self) -> PathBuf {
        self.storage_path().join("secure-store.json")
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.storage_path().join("logs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            workflow: WorkflowConfig::default(),
            history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.workflow.callback_path, "/transaction-history");
        assert_eq!(config.workflow.redirect_settle(), Duration::from_millis(500));
        assert_eq!(config.history.page_size, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("billpay.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"http://localhost:8000/api/v1\"\n\n[history]\npage_size = 25\n",
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.history.page_size, 25);
        // Untouched sections keep their defaults
        assert_eq!(config.workflow.callback_host, "upneeepaaa.com");
    }

    #[test]
    fn test_paths_under_storage_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.dir = temp_dir.path().to_string_lossy().to_string();

        assert!(config.secure_store_path().starts_with(temp_dir.path()));
        assert!(config.secure_store_path().ends_with("secure-store.json"));
        assert!(config.logs_path().ends_with("logs"));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api.base_url, config.api.base_url);
        assert_eq!(
            parsed.workflow.default_gateway_id,
            config.workflow.default_gateway_id
        );
    }
}
