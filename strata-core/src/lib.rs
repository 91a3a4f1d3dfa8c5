pub mod config;
pub mod telemetry;

pub use config::{ConfigError, ConfigValue, FromConfigValue, StrataConfig};
pub use telemetry::{init_tracing, try_init_tracing};
