//! Error taxonomy for the optional subsystems.
//!
//! None of these errors is ever fatal to the process: tracing errors degrade
//! to no-op tracing, profiler errors are retried and then abandoned. Only a
//! listener bind failure (reported through `anyhow` in the binary) ends the
//! process.

use thiserror::Error;

/// Failure to bring up span export.
#[derive(Debug, Error)]
pub enum TracingError {
    /// Tracing was requested but no collector address was supplied.
    #[error("collector address is not configured")]
    MissingCollector,

    /// The collector address could not be parsed into a URL with an authority.
    #[error("invalid collector address {0:?}")]
    InvalidCollector(String),

    /// A TCP connection to the collector could not be established in time.
    #[error("collector {addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    /// The OTLP exporter rejected its configuration.
    #[error("failed to build span exporter: {0}")]
    Exporter(String),
}

/// Failure of a single profiler start attempt.
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// No agent endpoint is configured, so no attempt can succeed.
    #[error("profiler agent endpoint is not configured")]
    NotConfigured,

    /// The agent could not be reached.
    #[error("profiler agent unavailable: {0}")]
    Unavailable(String),

    /// The agent was reached but the registration handshake failed.
    #[error("profiler registration failed: {0}")]
    Registration(String),
}

impl TracingError {
    /// Short machine-readable tag for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TracingError::MissingCollector => "missing_collector",
            TracingError::InvalidCollector(_) => "invalid_collector",
            TracingError::Unreachable { .. } => "unreachable",
            TracingError::Exporter(_) => "exporter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_error_kinds() {
        assert_eq!(TracingError::MissingCollector.kind(), "missing_collector");
        assert_eq!(
            TracingError::InvalidCollector("::".into()).kind(),
            "invalid_collector"
        );
        assert_eq!(
            TracingError::Unreachable {
                addr: "127.0.0.1:4317".into(),
                reason: "refused".into()
            }
            .kind(),
            "unreachable"
        );
        assert_eq!(TracingError::Exporter("x".into()).kind(), "exporter");
    }

    #[test]
    fn display_includes_context() {
        let e = TracingError::Unreachable {
            addr: "otel:4317".into(),
            reason: "connection refused".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("otel:4317"));
        assert!(msg.contains("connection refused"));

        let e = ProfilerError::Unavailable("timed out".into());
        assert!(e.to_string().contains("timed out"));
    }
}
