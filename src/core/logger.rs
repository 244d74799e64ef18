// Structured Logging Setup
// tracing-subscriber with env-filter; safe to call more than once

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize structured logging for the process.
///
/// `log_level` falls back to INFO when absent or unrecognized. Noisy
/// transport crates are pinned to warn so tick traffic stays readable.
pub fn setup_logging(log_level: Option<&str>, json_format: bool) {
    let level = match log_level.unwrap_or("INFO").to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    };

    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive(level.into())
            .add_directive("tokio_tungstenite=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap())
            .add_directive("rustls=warn".parse().unwrap());

        if json_format {
            tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_env_filter(filter)
                .init();
        }

        tracing::info!(level = %level, json = json_format, "Logging initialized");
    });
}
