//! `tracing` subscriber setup.
//!
//! Events go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over `[logging].level`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: Option<&LoggingConfig>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.map(|c| c.level.as_str()).unwrap_or("warn");
        EnvFilter::new(format!(
            "warn,chat_recall={level},chat_recall_core={level}"
        ))
    })
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(config: Option<&LoggingConfig>) {
    let layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(layer)
        .try_init();
}
