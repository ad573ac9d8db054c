//! Logging setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level; without it, noisy
/// dependency crates are quieted to `warn`.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = build_env_filter(config);

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(&config.level))
    } else {
        EnvFilter::new(format!(
            "{},sqlx=warn,hyper=warn,aws_config=warn,aws_smithy_runtime=warn",
            config.level
        ))
    }
}
