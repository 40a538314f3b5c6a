//! Terminal request handlers.

use common::protocol::{GREETING, HEALTH_OK};

/// `GET /`: greeting, proves the process is serving.
pub async fn home() -> &'static str {
    GREETING
}

/// `GET /_healthz`: orchestrator probe.
pub async fn healthz() -> &'static str {
    HEALTH_OK
}
