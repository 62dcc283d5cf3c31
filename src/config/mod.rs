pub mod env;
mod loader;

pub use env::{AppConfig, ConfigError, LoggingConfig, RelayConfig};
pub use loader::load_config;
