//! Outermost stage: trace-context extraction, request span, propagation.

use std::sync::Arc;

use axum::{extract::Request, middleware::Next};
use tracing::{field, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{Middleware, StageFuture};
use crate::telemetry::otel::{request_context, Propagation, RequestTrace};

/// Opens an `http.request` span per request and attaches a [`RequestTrace`].
///
/// The incoming `traceparent`/`baggage` headers become the span's parent, and
/// the resulting context is written back on the response.
pub struct TraceContextStage {
    propagation: Propagation,
}

impl TraceContextStage {
    pub fn new(propagation: Propagation) -> Self {
        Self { propagation }
    }
}

impl Middleware for TraceContextStage {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn call(self: Arc<Self>, mut req: Request, next: Next) -> StageFuture {
        Box::pin(async move {
            let parent = self.propagation.extract(req.headers());
            let span = info_span!(
                "http.request",
                otel.kind = "server",
                http.method = %req.method(),
                http.target = %req.uri().path(),
                http.status_code = field::Empty,
            );
            span.set_parent(parent.clone());

            let cx = request_context(&parent, span.context());
            req.extensions_mut().insert(RequestTrace::new(cx.clone()));

            let mut response = next.run(req).instrument(span.clone()).await;

            span.record("http.status_code", response.status().as_u16());
            self.propagation.inject(&cx, response.headers_mut());
            response
        })
    }
}
