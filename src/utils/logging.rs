use tracing::Level;

use crate::config::LoggingSettings;

/// Installs the global log subscriber for the transport.
///
/// The verbosity comes from [`LoggingSettings`]; unrecognized level names
/// fall back to `info`. When a subscriber is already installed (embedding
/// applications, repeated calls in tests) this quietly does nothing.
pub fn init(settings: &LoggingSettings) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_from_name(&settings.level))
        .with_target(false)
        .try_init();
}

fn level_from_name(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
