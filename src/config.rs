use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use log::warn;

/// Default API key used when MCP_API_KEY is not set. Startup logs a warning
/// whenever this value is in effect.
pub const INSECURE_DEFAULT_API_KEY: &str = "change-me-in-production";

pub fn env_str(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val,
        _ => default.to_string(),
    }
}

pub fn env_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Top-level bridge configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub port: u16,
    pub log_level: String,
    pub timezone: Tz,
    pub webhook: WebhookConfig,
    pub media: MediaConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let api_key = env_str("MCP_API_KEY", "");
        let api_key = if api_key.is_empty() {
            warn!("MCP_API_KEY not set, using default (insecure!)");
            INSECURE_DEFAULT_API_KEY.to_string()
        } else {
            api_key
        };

        let port = env_int("MCP_PORT", 8080).clamp(1, u16::MAX as i64) as u16;

        let log_level = match env_str("LOG_LEVEL", "INFO").to_uppercase().as_str() {
            lvl @ ("DEBUG" | "INFO" | "WARN" | "ERROR") => lvl.to_string(),
            other => {
                warn!("Invalid LOG_LEVEL '{other}', using INFO");
                "INFO".to_string()
            }
        };

        let tz_name = env_str("TIMEZONE", "UTC");
        let timezone = Tz::from_str(&tz_name).unwrap_or_else(|_| {
            warn!("Invalid TIMEZONE '{tz_name}', using UTC");
            Tz::UTC
        });

        Self {
            api_key,
            port,
            log_level,
            timezone,
            webhook: WebhookConfig::from_env(),
            media: MediaConfig::from_env(),
        }
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Optional primary webhook auto-registered under `system:primary`.
    pub primary_url: Option<String>,
    /// Maximum delivery attempts per event, clamped to the backoff table.
    pub max_retries: usize,
    /// Delay consulted after attempt N fails is `retry_backoff[N]`.
    pub retry_backoff: Vec<Duration>,
    pub delivery_timeout: Duration,
    pub worker_pool_size: usize,
    pub channel_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            primary_url: None,
            max_retries: 3,
            retry_backoff: vec![
                Duration::ZERO,
                Duration::from_secs(5),
                Duration::from_secs(15),
            ],
            delivery_timeout: Duration::from_secs(10),
            worker_pool_size: 3,
            channel_capacity: 100,
        }
    }
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut max_retries = env_int("WEBHOOK_MAX_RETRIES", 3).max(0) as usize;
        if max_retries > defaults.retry_backoff.len() {
            max_retries = defaults.retry_backoff.len();
        }

        let primary_url = std::env::var("WEBHOOK_URL").ok().filter(|u| !u.is_empty());

        Self {
            primary_url,
            max_retries,
            delivery_timeout: Duration::from_secs(
                env_int("WEBHOOK_TIMEOUT_SECONDS", 10).max(1) as u64
            ),
            worker_pool_size: env_int("WEBHOOK_WORKER_POOL_SIZE", 3).max(1) as usize,
            ..defaults
        }
    }
}

/// Media auto-download configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub auto_download_enabled: bool,
    /// History-sync media is gated separately and defaults off.
    pub auto_download_from_history: bool,
    /// Maximum size in bytes; zero means unbounded.
    pub auto_download_max_size: u64,
    pub auto_download_types: HashSet<String>,
    pub storage_path: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            auto_download_enabled: true,
            auto_download_from_history: false,
            auto_download_max_size: 10 * 1024 * 1024,
            auto_download_types: ["image", "audio", "sticker"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            storage_path: PathBuf::from(crate::paths::DATA_MEDIA_DIR),
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let max_size_mb = env_int("MEDIA_AUTO_DOWNLOAD_MAX_SIZE_MB", 10).max(0) as u64;
        let types = env_str("MEDIA_AUTO_DOWNLOAD_TYPES", "image,audio,sticker")
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            auto_download_enabled: env_bool("MEDIA_AUTO_DOWNLOAD_ENABLED", true),
            auto_download_from_history: env_bool("MEDIA_AUTO_DOWNLOAD_FROM_HISTORY", false),
            auto_download_max_size: max_size_mb * 1024 * 1024,
            auto_download_types: types,
            storage_path: PathBuf::from(crate::paths::DATA_MEDIA_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_defaults() {
        let cfg = WebhookConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_backoff.len(), 3);
        assert_eq!(cfg.delivery_timeout, Duration::from_secs(10));
        assert_eq!(cfg.worker_pool_size, 3);
        assert_eq!(cfg.channel_capacity, 100);
    }

    #[test]
    fn media_defaults() {
        let cfg = MediaConfig::default();
        assert!(cfg.auto_download_enabled);
        assert!(!cfg.auto_download_from_history);
        assert_eq!(cfg.auto_download_max_size, 10 * 1024 * 1024);
        assert!(cfg.auto_download_types.contains("image"));
        assert!(cfg.auto_download_types.contains("sticker"));
        assert!(!cfg.auto_download_types.contains("video"));
    }
}
