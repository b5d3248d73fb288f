//! Configuration infrastructure
//!
//! Settings are layered in this order, later layers winning:
//! 1. Built-in defaults (see [`defaults`])
//! 2. The JSON configuration file, when present
//! 3. Environment variables prefixed `HARVEST__`, sections separated by `__`
//!    (e.g. `HARVEST__ENRICHMENT__CONCURRENCY=8`)

#![allow(clippy::derivable_impls)]

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where snapshots, exports and images live
    pub paths: PathsConfig,

    /// Image enrichment settings
    pub enrichment: EnrichmentConfig,

    /// HTTP client settings for image fetches
    pub http: HttpConfig,

    /// Retry policy applied at the listing source boundary
    pub source_retry: RetryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// File locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Full merged snapshot
    pub snapshot_path: PathBuf,

    /// New records of the latest run only
    pub new_batch_path: PathBuf,

    /// Tabular export of the snapshot
    pub csv_path: PathBuf,

    /// Write the tabular export after each successful run
    pub export_csv: bool,

    /// Root directory for enriched images
    pub images_dir: PathBuf,

    /// Raw harvest dump produced by the browser collector
    pub source_path: PathBuf,
}

/// Image enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Records enriched concurrently per chunk
    pub concurrency: usize,

    /// Bound for both image dimensions in pixels
    pub max_dimension: u32,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,

    /// Apply an unsharp mask after resizing
    pub sharpen: bool,

    /// Unsharp mask blur sigma
    pub sharpen_sigma: f32,

    /// Unsharp mask threshold
    pub sharpen_threshold: i32,

    /// Pause between successive image fetches of the same record
    pub inter_request_delay_ms: u64,

    /// Persist the partially enriched snapshot after every chunk
    pub checkpoint_each_chunk: bool,
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent string
    pub user_agent: String,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Upper bound for a single image payload
    pub max_image_bytes: usize,
}

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt, doubled for each further attempt
    pub backoff_delay_ms: u64,

    /// Ceiling for the doubled delay
    pub max_backoff_ms: u64,

    /// Add up to 10% random jitter to each delay
    pub jitter: bool,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; relative paths resolve against the working directory
    pub log_dir: PathBuf,

    /// Log file name
    pub file_name: String,

    /// Rotation: "never" or "daily"
    pub rotation: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            enrichment: EnrichmentConfig::default(),
            http: HttpConfig::default(),
            source_retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(defaults::SNAPSHOT_PATH),
            new_batch_path: PathBuf::from(defaults::NEW_BATCH_PATH),
            csv_path: PathBuf::from(defaults::CSV_PATH),
            export_csv: defaults::EXPORT_CSV,
            images_dir: PathBuf::from(defaults::IMAGES_DIR),
            source_path: PathBuf::from(defaults::SOURCE_PATH),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::ENRICHMENT_CONCURRENCY,
            max_dimension: defaults::MAX_IMAGE_DIMENSION,
            jpeg_quality: defaults::JPEG_QUALITY,
            sharpen: defaults::SHARPEN,
            sharpen_sigma: defaults::SHARPEN_SIGMA,
            sharpen_threshold: defaults::SHARPEN_THRESHOLD,
            inter_request_delay_ms: defaults::INTER_REQUEST_DELAY_MS,
            checkpoint_each_chunk: defaults::CHECKPOINT_EACH_CHUNK,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
            follow_redirects: true,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            backoff_delay_ms: defaults::RETRY_BACKOFF_DELAY_MS,
            max_backoff_ms: defaults::RETRY_MAX_BACKOFF_MS,
            jitter: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_name: defaults::LOG_FILE_NAME.to_string(),
            rotation: defaults::LOG_ROTATION.to_string(),
        }
    }
}

impl AppConfig {
    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.enrichment.concurrency == 0 {
            bail!("enrichment.concurrency must be at least 1");
        }
        if self.enrichment.max_dimension == 0 {
            bail!("enrichment.max_dimension must be at least 1");
        }
        if self.source_retry.max_attempts == 0 {
            bail!("source_retry.max_attempts must be at least 1");
        }
        if self.http.user_agent.trim().is_empty() {
            bail!("http.user_agent must not be empty");
        }
        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
    /// Replaces the process environment as the override layer when set
    env_source: Option<Map<String, String>>,
}

impl ConfigManager {
    /// Default configuration location under the user config directory
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("listing-harvester");

        Ok(config_dir.join(defaults::CONFIG_FILE_NAME))
    }

    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            env_source: None,
        }
    }

    /// Reads `HARVEST__` overrides from `vars` instead of the process environment
    #[must_use]
    pub fn with_env_source(mut self, vars: Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Manager for the default location
    pub fn with_default_path() -> Result<Self> {
        Ok(Self::new(Self::default_config_path()?))
    }

    /// Writes the defaults on first run, then loads the layered configuration
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 First run detected - writing default configuration");
            self.save_config(&AppConfig::default()).await?;
        }
        self.load_config()
    }

    /// Loads the layered configuration; a missing file yields the defaults
    pub fn load_config(&self) -> Result<AppConfig> {
        let config = self
            .builder()?
            .build()
            .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))?
            .try_deserialize::<AppConfig>()
            .context("Configuration has an invalid shape")?;

        if self.config_path.exists() {
            info!("Loaded configuration from: {:?}", self.config_path);
        } else {
            info!("Configuration file not found, using defaults: {:?}", self.config_path);
        }
        Ok(config)
    }

    fn builder(&self) -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        Ok(Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(self.config_path.as_path())
                    .format(FileFormat::Json)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            ))
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub const fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    /// Configuration file name in the user config directory
    pub const CONFIG_FILE_NAME: &str = "listing_harvester_config.json";

    /// Environment variable prefix for overrides
    pub const ENV_PREFIX: &str = "HARVEST";

    pub const SNAPSHOT_PATH: &str = "ads.json";
    pub const NEW_BATCH_PATH: &str = "new_ads.json";
    pub const CSV_PATH: &str = "ads.csv";
    pub const EXPORT_CSV: bool = true;
    pub const IMAGES_DIR: &str = "images";
    pub const SOURCE_PATH: &str = "harvest.json";

    /// Default records enriched concurrently
    pub const ENRICHMENT_CONCURRENCY: usize = 5;

    /// Default bound for image width and height
    pub const MAX_IMAGE_DIMENSION: u32 = 1000;

    /// Default JPEG quality
    pub const JPEG_QUALITY: u8 = 80;

    pub const SHARPEN: bool = true;
    pub const SHARPEN_SIGMA: f32 = 0.5;
    pub const SHARPEN_THRESHOLD: i32 = 1;

    /// Default pause between image fetches of one record in milliseconds
    pub const INTER_REQUEST_DELAY_MS: u64 = 500;

    pub const CHECKPOINT_EACH_CHUNK: bool = true;

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) listing-harvester/0.1";

    /// Default upper bound for one image payload (15 MiB)
    pub const MAX_IMAGE_BYTES: usize = 15 * 1024 * 1024;

    /// Default attempts at the listing source boundary
    pub const RETRY_MAX_ATTEMPTS: u32 = 3;

    /// Default first retry delay in milliseconds
    pub const RETRY_BACKOFF_DELAY_MS: u64 = 2000;

    /// Default retry delay ceiling in milliseconds
    pub const RETRY_MAX_BACKOFF_MS: u64 = 30_000;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_NAME: &str = "harvester.log";
    pub const LOG_ROTATION: &str = "daily";
}
