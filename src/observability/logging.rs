//! # Logging
//!
//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter directive for the configured level
pub fn default_directive(log_level: &str) -> String {
    format!("autounseal={}", log_level.trim().to_ascii_lowercase())
}

/// Install the global `fmt` subscriber
///
/// `RUST_LOG` wins when set; otherwise only this crate logs, at `log_level`.
/// A second call is a no-op.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
