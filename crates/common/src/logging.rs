use crate::config::Environment;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the global tracing subscriber: pretty output for development,
/// JSON lines for production.
///
/// Use [`crate::TelemetryGuard::init`] instead when traces should also be
/// exported over OTLP; only one of the two may run per process.
pub fn setup_logging(environment: Environment, default_directive: &str) {
    let registry = tracing_subscriber::registry().with(env_filter(default_directive));

    match environment {
        Environment::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_level(true)
                        .with_current_span(true),
                )
                .init();
        }
        Environment::Development => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(true),
                )
                .init();
        }
    }
}
