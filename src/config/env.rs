use std::time::Duration;

use thiserror::Error;

use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub logs_dir: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}
