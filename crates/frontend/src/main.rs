//! `frontend`: placeholder storefront binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Build the [`TracingHandle`] (OTLP export or no-op propagation).
//! 3. Install the JSON log subscriber, bridged to the tracer when exporting.
//! 4. Spawn the profiler bootstrap in the background, if enabled.
//! 5. Build the Axum router behind the middleware pipeline and serve.
//!
//! Only steps 1 and 5 can stop the process.

mod config;
mod profiler;
mod server;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use config::Config;
use profiler::{
    agent::{AgentProfiler, ProfileTarget},
    BackoffPolicy,
};
use server::router::RouteOptions;
use telemetry::{otel::TracingMode, RequestLogSink, TracingHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Tracing
    // -----------------------------------------------------------------------
    let trace_handle: TracingHandle =
        telemetry::init_tracing(cfg.tracing_enabled(), cfg.collector()).await;

    // -----------------------------------------------------------------------
    // 3. Logging
    // -----------------------------------------------------------------------
    if let Err(e) = telemetry::init_logging(&cfg.log_level, trace_handle.tracer()) {
        eprintln!("WARN: continuing without structured process logs: {e:#}");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %cfg.bind_addr(),
        base_url = %cfg.base_url,
        "frontend starting"
    );
    if let Some(e) = trace_handle.fallback_reason() {
        warn!(error = %e, kind = e.kind(), "tracing unavailable; falling back to no-op");
    } else if let TracingMode::Exporting { endpoint } = trace_handle.mode() {
        info!(%endpoint, "exporting spans");
    } else {
        info!("tracing disabled");
    }

    // -----------------------------------------------------------------------
    // 4. Profiler
    // -----------------------------------------------------------------------
    if cfg.profiler_enabled() {
        let agent = Arc::new(AgentProfiler::new(cfg.profiler_agent()));
        let _profiler = profiler::spawn(agent, ProfileTarget::frontend(), BackoffPolicy::default());
    } else {
        info!("profiling disabled");
    }

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let options = RouteOptions::from_config(&cfg);
    info!(healthz = options.healthz, session = ?options.session, "routes configured");
    let app = server::router::build(options, trace_handle.propagation(), RequestLogSink::stdout());

    server::serve(&cfg.bind_addr(), app).await
}
