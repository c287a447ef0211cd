//! Environment-driven configuration

use crate::runtime::RetryPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_API_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub cache_dir: PathBuf,
    pub audit_dir: PathBuf,
    /// Username allowed to run `/status` and `/remove`.
    pub operator: Option<String>,
    pub max_concurrent_jobs: usize,
    pub batch_cap: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// An idle session with no flow is retired after this long.
    pub session_idle: Duration,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("TELEGRAM_BOT_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        Ok(Self {
            token,
            cache_dir: env_or("CONTACT_DESK_CACHE_DIR", PathBuf::from("cache")),
            audit_dir: env_or("CONTACT_DESK_AUDIT_DIR", PathBuf::from("data")),
            operator: std::env::var("CONTACT_DESK_OPERATOR")
                .ok()
                .map(|op| op.trim().trim_start_matches('@').to_string())
                .filter(|op| !op.is_empty()),
            max_concurrent_jobs: env_or("CONTACT_DESK_MAX_JOBS", 50usize).max(1),
            batch_cap: env_or("CONTACT_DESK_BATCH_CAP", 20usize).max(1),
            retry: RetryPolicy {
                max_attempts: env_or("CONTACT_DESK_RETRY_ATTEMPTS", 10u32).max(1),
                delay: Duration::from_secs(env_or("CONTACT_DESK_RETRY_DELAY_SECS", 6u64)),
            },
            request_timeout: Duration::from_secs(env_or(
                "CONTACT_DESK_REQUEST_TIMEOUT_SECS",
                60u64,
            )),
            session_idle: Duration::from_secs(env_or("CONTACT_DESK_SESSION_IDLE_SECS", 600u64)),
        })
    }
}
