//! Tracing setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and script output.

use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;

/// Install a global `fmt` subscriber. Later calls are ignored.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pixel_bridge={level},script={level}")));

    // try_init fails only when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initialize tracing from the application log level.
pub fn init_from_config(config: &BridgeConfig) {
    init_tracing(&config.application.log_level);
}
