//! Request logging stage: one structured record per completed request.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
};
use chrono::{SecondsFormat, Utc};
use common::protocol::{RequestLogRecord, Severity, REQUEST_ID_HEADER, SESSION_HEADER};
use uuid::Uuid;

use super::{Middleware, StageFuture};
use crate::telemetry::{RequestLogSink, RequestTrace};

const COMPLETE: &str = "request complete";

/// Emits a [`RequestLogRecord`] to the injected sink after the response is
/// produced.
///
/// Sits inside the tracing stage (so the trace id is known) and outside the
/// session stage (so the session id is read off the response).
pub struct RequestLogger {
    sink: RequestLogSink,
}

impl RequestLogger {
    pub fn new(sink: RequestLogSink) -> Self {
        Self { sink }
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn call(self: Arc<Self>, req: Request, next: Next) -> StageFuture {
        Box::pin(async move {
            let start = Instant::now();
            let request_id = Uuid::new_v4().to_string();
            let method = req.method().to_string();
            let path = req.uri().path().to_owned();
            let trace = req
                .extensions()
                .get::<RequestTrace>()
                .filter(|t| t.is_valid())
                .cloned();

            let mut response = next.run(req).await;

            let took = start.elapsed();
            let status = response.status().as_u16();
            let record = RequestLogRecord {
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
                severity: Severity::for_status(status),
                message: COMPLETE.into(),
                request_id: request_id.clone(),
                method,
                path,
                status,
                took_ms: took.as_secs_f64() * 1_000.0,
                bytes: response.body().size_hint().exact(),
                session: response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                trace_id: trace.as_ref().map(|t| t.trace_id().to_string()),
                span_id: trace.as_ref().map(|t| t.span_id().to_string()),
                trace_sampled: trace.as_ref().map(RequestTrace::is_sampled),
            };
            self.sink.emit(&record);

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}
