use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub cache: CacheConfig,
    pub poll: PollConfig,
}

/// Telemetry store configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
///
/// `max_retries` defaults to zero: failures surface immediately and retries
/// are left to the caller.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub stale_time_ms: u64,
}

/// Background refresh configuration
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_ms: u64,
}

/// Default telemetry API root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

const MIN_POLL_INTERVAL_MS: u64 = 10_000;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url =
            env::var("TELEMETRY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        reqwest::Url::parse(&base_url).map_err(|e| AppError::Config {
            message: format!("TELEMETRY_BASE_URL is not a valid URL ({}): {}", base_url, e),
        })?;

        let telemetry = TelemetryConfig {
            base_url,
            api_key: env::var("TELEMETRY_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };

        let cache = CacheConfig {
            stale_time_ms: env_or("CACHE_STALE_TIME_MS", CacheConfig::default().stale_time_ms),
        };

        let poll = PollConfig::new(env_or("POLL_INTERVAL_MS", PollConfig::default().interval_ms));

        Ok(Config {
            telemetry,
            logging,
            request,
            cache,
            poll,
        })
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl RequestConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 30000,
        }
    }
}

impl CacheConfig {
    /// Staleness window as a `Duration`.
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

impl PollConfig {
    /// Create a poll config, clamping the interval into the 10-60s range.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        }
    }

    /// Poll interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 30000 }
    }
}
