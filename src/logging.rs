//! Tracing subscriber setup for the binary
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

/// Filter directive: `RUST_LOG` wins, then an explicit override, then config
pub fn filter_directive(config: &LoggingConfig, level_override: Option<&str>) -> String {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !env.trim().is_empty() {
            return env;
        }
    }
    let level = level_override.unwrap_or(&config.level);
    format!("ragline={},warn", level)
}

/// Install a stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) {
    let filter = EnvFilter::new(filter_directive(config, level_override));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    let _ = tracing_subscriber::registry().with(layer).try_init();
}
