//! Telemetry: tracing bootstrap, process logging and the request log sink.
//!
//! Nothing here is global apart from the `tracing` subscriber itself. The
//! [`TracingHandle`] and [`RequestLogSink`] are built once in `main` and passed
//! to the components that use them.
//!
//! # Telemetry invariants
//!
//! - A failure in any of these subsystems never fails a request or stops the
//!   process.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;
pub mod otel;
pub mod sink;

pub use init::init_logging;
pub use otel::{init_tracing, Propagation, RequestTrace, TracingHandle};
pub use sink::RequestLogSink;
