mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LoggingSettings, Settings, TransportSettings};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the transport and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    let transport = partial.transport.as_ref();
    let logging = partial.logging.as_ref();

    Ok(Settings {
        transport: TransportSettings {
            url: transport
                .and_then(|t| t.url.clone())
                .unwrap_or(default.transport.url),
            reconnect_interval_ms: transport
                .and_then(|t| t.reconnect_interval_ms)
                .unwrap_or(default.transport.reconnect_interval_ms),
            max_reconnect_attempts: transport
                .and_then(|t| t.max_reconnect_attempts)
                .unwrap_or(default.transport.max_reconnect_attempts),
            heartbeat_interval_ms: transport
                .and_then(|t| t.heartbeat_interval_ms)
                .unwrap_or(default.transport.heartbeat_interval_ms),
            auto_reconnect: transport
                .and_then(|t| t.auto_reconnect)
                .unwrap_or(default.transport.auto_reconnect),
            message_queue_size: transport
                .and_then(|t| t.message_queue_size)
                .unwrap_or(default.transport.message_queue_size),
            ack_timeout_ms: transport
                .and_then(|t| t.ack_timeout_ms)
                .unwrap_or(default.transport.ack_timeout_ms),
        },
        logging: LoggingSettings {
            level: logging
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
