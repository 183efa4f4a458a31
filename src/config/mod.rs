use std::env;
use std::fmt;
use std::time::Duration;

/// Distinguishes runtime behavior for different deployments of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the pipeline engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub ai: AiServiceConfig,
    pub polling: PollingConfig,
    pub ranking: RankingConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let base_url = env::var("AI_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000/v1".to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        let timeout_secs = positive_var("AI_TIMEOUT_SECS", 30, ConfigError::InvalidTimeout)?;
        let interval_ms = positive_var("AI_POLL_INTERVAL_MS", 2_000, ConfigError::InvalidPollInterval)?;
        let max_attempts = positive_var("AI_POLL_MAX_ATTEMPTS", 90, ConfigError::InvalidPollAttempts)?;
        let limit = positive_var("RANKING_LIMIT", 20, ConfigError::InvalidRankingLimit)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            ai: AiServiceConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            polling: PollingConfig {
                interval: Duration::from_millis(interval_ms),
                max_attempts: u32::try_from(max_attempts)
                    .map_err(|_| ConfigError::InvalidPollAttempts)?,
            },
            ranking: RankingConfig {
                limit: usize::try_from(limit).map_err(|_| ConfigError::InvalidRankingLimit)?,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn positive_var(name: &str, default: u64, error: ConfigError) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(error),
        },
        Err(_) => Ok(default),
    }
}

/// Where and how to reach the AI scoring service.
#[derive(Debug, Clone)]
pub struct AiServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Client-side pacing used while waiting on evaluation runs.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub limit: usize,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidBaseUrl(String),
    InvalidTimeout,
    InvalidPollInterval,
    InvalidPollAttempts,
    InvalidRankingLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBaseUrl(value) => {
                write!(f, "AI_BASE_URL must be an http(s) URL, got '{}'", value)
            }
            ConfigError::InvalidTimeout => write!(f, "AI_TIMEOUT_SECS must be a positive integer"),
            ConfigError::InvalidPollInterval => {
                write!(f, "AI_POLL_INTERVAL_MS must be a positive integer")
            }
            ConfigError::InvalidPollAttempts => {
                write!(f, "AI_POLL_MAX_ATTEMPTS must be a positive u32")
            }
            ConfigError::InvalidRankingLimit => write!(f, "RANKING_LIMIT must be a positive integer"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_LOG_LEVEL",
            "AI_BASE_URL",
            "AI_TIMEOUT_SECS",
            "AI_POLL_INTERVAL_MS",
            "AI_POLL_MAX_ATTEMPTS",
            "RANKING_LIMIT",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.ai.base_url, "http://localhost:8000/v1");
        assert_eq!(config.ai.timeout, Duration::from_secs(30));
        assert_eq!(config.polling.interval, Duration::from_secs(2));
        assert_eq!(config.polling.max_attempts, 90);
        assert_eq!(config.ranking.limit, 20);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("AI_BASE_URL", "https://scoring.internal/v1/");
        env::set_var("APP_ENV", "ci");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.ai.base_url, "https://scoring.internal/v1");
        assert_eq!(config.environment, AppEnvironment::Test);
        reset_env();
    }

    #[test]
    fn rejects_non_http_base_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("AI_BASE_URL", "ftp://scoring");
        let err = AppConfig::load().expect_err("ftp is rejected");
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
        reset_env();
    }

    #[test]
    fn rejects_zero_ranking_limit() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("RANKING_LIMIT", "0");
        let err = AppConfig::load().expect_err("zero limit is rejected");
        assert!(matches!(err, ConfigError::InvalidRankingLimit));
        reset_env();
    }
}
