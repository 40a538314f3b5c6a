//! Process log subscriber: JSON lines on stdout, optionally bridged to OTLP.

use anyhow::{Context, Result};
use opentelemetry_sdk::trace::Tracer;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Install the process-wide `tracing` subscriber.
///
/// Configures:
/// - A JSON-formatted [`tracing_subscriber`] layer for structured log output,
///   filtered by `RUST_LOG`, else `log_level`.
/// - When `tracer` is present, a [`tracing_opentelemetry`] layer with its own
///   [`export_filter`], so request spans are exported whatever the log level.
///
/// # Errors
///
/// Returns an error if a subscriber has already been installed.
pub fn init_logging(log_level: &str, tracer: Option<Tracer>) -> Result<()> {
    subscriber(log_level, tracer)
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(())
}

fn subscriber(log_level: &str, tracer: Option<Tracer>) -> impl Subscriber + Send + Sync + 'static {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let otel_layer = tracer.map(|t| {
        tracing_opentelemetry::layer()
            .with_tracer(t)
            .with_filter(export_filter())
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_filter(env_filter))
        .with(otel_layer)
}

/// Spans handed to the exporter: this crate's, at info and above.
/// Dependency spans (tonic, h2) stay out.
fn export_filter() -> Targets {
    Targets::new().with_target(env!("CARGO_CRATE_NAME"), LevelFilter::INFO)
}
