use crate::constants::DEFAULT_TIMEZONE;
use crate::error::{Result, ScraperError};
use crate::scheduler::cron::CronSchedule;
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub timezone: String,
    pub daily_scraping: String,
    pub daily_cleanup: String,
    pub weekly_cleanup: String,
    pub retention_days: i64,
    pub adapter_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            daily_scraping: "0 6 * * *".to_string(),
            daily_cleanup: "0 1 * * *".to_string(),
            weekly_cleanup: "0 2 * * 0".to_string(),
            retention_days: 7,
            adapter_timeout_secs: 300,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ScraperError::Config(format!("unknown timezone '{}': {}", self.timezone, e)))
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            request_delay_ms: 500,
            max_redirects: 10,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub max_items_warning: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { default_ttl_secs: 300, max_items_warning: 1000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageBackend::Sqlite, sqlite_path: PathBuf::from("data/events.db") }
    }
}

impl StorageConfig {
    /// Whether stored events outlive the process.
    pub fn is_persistent(&self) -> bool {
        self.backend != StorageBackend::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily-rotated JSON log.
    pub dir: PathBuf,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("logs"), filter: "family_events=info,info".into() }
    }
}

impl Config {
    /// Loads `FAMILY_EVENTS_CONFIG` (or `config.toml`), then applies env overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();
        let path = std::env::var("FAMILY_EVENTS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db) = std::env::var("FAMILY_EVENTS_DB") {
            if !db.trim().is_empty() {
                self.storage.backend = StorageBackend::Sqlite;
                self.storage.sqlite_path = PathBuf::from(db);
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ScraperError::Config(format!("invalid PORT '{}': {}", port, e)))?;
        }
        Ok(())
    }

    /// Rejects schedules the job table could not honor.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        s.tz()?;
        let scraping = CronSchedule::parse(&s.daily_scraping)?;
        let cleanup = CronSchedule::parse(&s.daily_cleanup)?;
        CronSchedule::parse(&s.weekly_cleanup)?;

        match (cleanup.daily_time(), scraping.daily_time()) {
            (Some(c), Some(r)) if c < r => {}
            _ => {
                return Err(ScraperError::Config(format!(
                    "daily_cleanup '{}' must fire once a day strictly before daily_scraping '{}'",
                    s.daily_cleanup, s.daily_scraping
                )))
            }
        }
        if s.retention_days <= 0 {
            return Err(ScraperError::Config("retention_days must be positive".into()));
        }
        if s.adapter_timeout_secs == 0 {
            return Err(ScraperError::Config("adapter_timeout_secs must be positive".into()));
        }
        tracing_subscriber::EnvFilter::try_new(&self.logging.filter)
            .map_err(|e| ScraperError::Config(format!("invalid logging filter '{}': {}", self.logging.filter, e)))?;
        Ok(())
    }
}
