//! Wire-level names and record types shared by the frontend components.
//!
//! Everything here is serialised either into HTTP headers, into the JSON
//! request log on stdout, or into the profiler agent handshake.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

/// Body of `GET /`.
pub const GREETING: &str = "Frontend is up in dummy mode!\n";

/// Body of `GET /_healthz`.
pub const HEALTH_OK: &str = "ok";

/// Cookie carrying the session identifier between requests.
pub const SESSION_COOKIE: &str = "shop_session-id";

/// Request/response header carrying the session identifier.
pub const SESSION_HEADER: &str = "x-session-id";

/// Response header echoing the request log's `http.req.id`.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Lifetime of a freshly issued session cookie (48 hours).
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 48;

/// Session identifier handed to every client in shared-session mode.
pub const SHARED_SESSION_ID: &str = "12345678-1234-1234-1234-123456789123";

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

/// Severity of a request log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Severity for a completed response: 5xx is an error, 4xx a warning.
    pub fn for_status(status: u16) -> Self {
        match status {
            0..=399 => Severity::Info,
            400..=499 => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One line of the request log, written once per completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    /// RFC 3339 wall-clock time with nanosecond precision.
    pub timestamp: String,
    pub severity: Severity,
    pub message: String,
    #[serde(rename = "http.req.id")]
    pub request_id: String,
    #[serde(rename = "http.req.method")]
    pub method: String,
    #[serde(rename = "http.req.path")]
    pub path: String,
    #[serde(rename = "http.resp.status")]
    pub status: u16,
    /// Elapsed handling time in milliseconds.
    #[serde(rename = "http.resp.took_ms")]
    pub took_ms: f64,
    #[serde(rename = "http.resp.bytes", skip_serializing_if = "Option::is_none", default)]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_sampled: Option<bool>,
}

impl RequestLogRecord {
    /// Render the record as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Profiler agent handshake
// ---------------------------------------------------------------------------

/// Registration message sent to the profiler agent on start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerRegistration {
    pub service: String,
    pub version: String,
}
