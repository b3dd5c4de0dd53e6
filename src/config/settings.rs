use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the transport itself and for logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub transport: TransportSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the transport client.
///
/// Controls the server endpoint, reconnect/backoff behavior, heartbeat
/// cadence, outbound queue capacity, and the default acknowledgment timeout.
#[derive(Debug, Deserialize, Clone)]
pub struct TransportSettings {
    pub url: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval_ms: u64,
    pub auto_reconnect: bool,
    pub message_queue_size: usize,
    pub ack_timeout_ms: u64,
}

/// Configuration settings for logging.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub transport: Option<PartialTransportSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

/// Partial transport settings.
///
/// Used when loading transport configuration from external sources with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialTransportSettings {
    pub url: Option<String>,
    pub reconnect_interval_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_interval_ms: Option<u64>,
    pub auto_reconnect: Option<bool>,
    pub message_queue_size: Option<usize>,
    pub ack_timeout_ms: Option<u64>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: TransportSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 10,
            heartbeat_interval_ms: 30_000,
            auto_reconnect: true,
            message_queue_size: 1000,
            ack_timeout_ms: 10_000,
        }
    }
}
