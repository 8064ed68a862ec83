use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing node of the myth-busting section.
    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// Articles taken from the first page on a seed run.
    #[serde(default = "default_initial_n")]
    pub initial_n: usize,

    /// Ceiling on listing pages walked by an incremental run.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_write_bom")]
    pub write_bom: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.as_ref().display(), e)))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration for a run: explicit path, then the user
    /// config directory, then built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_with_env(path);
        }

        if let Ok(path) = Self::default_path() {
            if path.exists() {
                return Self::load_with_env(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.crawler.base_url)
            .map_err(|_| Error::InvalidUrl(self.crawler.base_url.clone()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!("Unsupported scheme: {}", base.scheme())));
        }

        if self.crawler.initial_n == 0 {
            return Err(Error::Config("initial_n must be greater than 0".to_string()));
        }

        if self.crawler.max_pages == 0 {
            return Err(Error::Config("max_pages must be greater than 0".to_string()));
        }

        if self.crawler.timeout == 0 {
            return Err(Error::Config("timeout must be greater than 0".to_string()));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(Error::Config("store path cannot be empty".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("HPA_MYTHS_INITIAL_N") {
            if let Ok(val) = value.parse() {
                self.crawler.initial_n = val;
            }
        }

        if let Ok(value) = std::env::var("HPA_MYTHS_MAX_PAGES") {
            if let Ok(val) = value.parse() {
                self.crawler.max_pages = val;
            }
        }

        if let Ok(path) = std::env::var("HPA_MYTHS_STORE_PATH") {
            if !path.is_empty() {
                self.store.path = PathBuf::from(path);
            }
        }

        if let Ok(level) = std::env::var("HPA_MYTHS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("hpa-myths"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            node_id: default_node_id(),
            initial_n: default_initial_n(),
            max_pages: default_max_pages(),
            request_delay_ms: default_request_delay_ms(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            write_bom: default_write_bom(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
            log_dir: default_log_dir(),
            json_format: false,
        }
    }
}

fn default_base_url() -> String { "https://www.hpa.gov.tw".to_string() }
fn default_node_id() -> u32 { 127 }
fn default_initial_n() -> usize { 10 }
fn default_max_pages() -> usize { 5 }
fn default_request_delay_ms() -> u64 { 800 }
fn default_timeout() -> u64 { 10 }
fn default_retry_attempts() -> usize { 2 }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}

fn default_store_path() -> PathBuf { PathBuf::from("hpa_health_myths.csv") }
fn default_write_bom() -> bool { true }

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }
