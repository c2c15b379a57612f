pub mod parser;
pub mod validator;

pub use self::parser::{
    Config, DatabaseConfig, GlideConfig, LoggingConfig, MetricsConfig, SyncConfig, WebConfig,
};
pub use self::validator::ConfigError;
