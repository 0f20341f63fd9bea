//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::NotifyError;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub http: HttpConfig,
    pub push: PushConfig,
    pub logging: LoggingConfig,
}

/// Backend location
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// REST base URL including the API prefix (e.g., "https://nexus.example.com/api")
    pub api_url: String,
    /// Number of notifications requested per list fetch (default: 20)
    pub page_size: u32,
}

impl BackendConfig {
    /// Parse the API base URL
    pub fn api_base(&self) -> Result<url::Url, NotifyError> {
        let parsed = url::Url::parse(self.api_url.trim())
            .map_err(|e| NotifyError::Config(format!("backend.api_url is invalid: {}", e)))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(NotifyError::Config(format!(
                "backend.api_url must use http or https, got {}",
                other
            ))),
        }
    }
}

/// Credential source
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Bearer token given inline
    pub token: Option<String>,
    /// File holding the bearer token (takes precedence over `token`)
    pub token_file: Option<PathBuf>,
}

impl AuthConfig {
    /// Resolve the configured bearer token, if any
    ///
    /// # Errors
    /// Returns error if `token_file` is set but cannot be read
    pub fn resolve_token(&self) -> Result<Option<String>, NotifyError> {
        if let Some(path) = &self.token_file {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                NotifyError::Config(format!(
                    "auth.token_file {} could not be read: {}",
                    path.display(),
                    e
                ))
            })?;
            return Ok(Some(raw.trim().to_string()).filter(|token| !token.is_empty()));
        }

        Ok(self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string))
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds (default: 10)
    pub timeout_seconds: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Open the live connection at all
    pub enabled: bool,
    pub reconnect: ReconnectConfig,
}

/// Reconnection schedule
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt (default: 5000)
    pub initial_delay_ms: u64,
    /// Upper bound for the exponential delay (default: 60000)
    pub max_delay_ms: u64,
    /// Growth factor per consecutive failed attempt (default: 2.0)
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (default: 0.0)
    pub jitter_ratio: f64,
    /// Stop retrying after this many consecutive failures (default: never)
    pub max_attempts: Option<u32>,
    /// Consecutive failures before the circuit opens (default: 10, 0 disables)
    pub circuit_breaker_threshold: u32,
    /// How long an open circuit waits before the next attempt (default: 300)
    pub circuit_breaker_cooldown_seconds: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_ratio: 0.0,
            max_attempts: None,
            circuit_breaker_threshold: 10,
            circuit_breaker_cooldown_seconds: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (NEXUS_NOTIFY__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, NotifyError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("backend.api_url", "http://localhost:8000/api")?
            .set_default("backend.page_size", 20)?
            .set_default("http.timeout_seconds", 10)?
            .set_default("http.user_agent", "nexus-notify/0.1.0")?
            .set_default("push.enabled", true)?
            .set_default("push.reconnect.initial_delay_ms", 5_000)?
            .set_default("push.reconnect.max_delay_ms", 60_000)?
            .set_default("push.reconnect.multiplier", 2.0)?
            .set_default("push.reconnect.jitter_ratio", 0.0)?
            .set_default("push.reconnect.circuit_breaker_threshold", 10)?
            .set_default("push.reconnect.circuit_breaker_cooldown_seconds", 300)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("NEXUS_NOTIFY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), NotifyError> {
        self.backend.api_base()?;

        if self.backend.page_size == 0 {
            return Err(NotifyError::Config(
                "backend.page_size must be greater than 0".to_string(),
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(NotifyError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let reconnect = &self.push.reconnect;
        if reconnect.initial_delay_ms == 0 {
            return Err(NotifyError::Config(
                "push.reconnect.initial_delay_ms must be greater than 0".to_string(),
            ));
        }

        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(NotifyError::Config(
                "push.reconnect.max_delay_ms must not be below initial_delay_ms".to_string(),
            ));
        }

        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(NotifyError::Config(
                "push.reconnect.multiplier must be at least 1.0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&reconnect.jitter_ratio) {
            return Err(NotifyError::Config(
                "push.reconnect.jitter_ratio must be within [0, 1)".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            tracing::warn!(
                format = %self.logging.format,
                "Unknown logging.format; falling back to pretty"
            );
        }

        Ok(())
    }
}
