use std::{env, time::Duration};

use crate::pipeline::PipelineConfig;

use super::env::{AppConfig, ConfigError, LoggingConfig, RelayConfig};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("RELAY_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("RELAY_BASE_URL"))?;

        let relay = RelayConfig {
            base_url,
            timeout: duration_ms("RELAY_TIMEOUT_MS", 15_000),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            quiet_interval: duration_ms("QUIET_INTERVAL_MS", 300),
            fallback_interval: duration_ms("FALLBACK_INTERVAL_MS", 3_000),
            cache_cap: parse_usize("CACHE_CAP").unwrap_or(defaults.cache_cap),
        };

        Ok(Self {
            relay,
            logging,
            pipeline,
        })
    }
}

fn duration_ms(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        env::var(key)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default),
    )
}

fn parse_usize(key: &str) -> Option<usize> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
}
