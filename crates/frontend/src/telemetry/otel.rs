//! Trace-context propagation and optional OTLP span export.
//!
//! [`init_tracing`] always returns a usable [`TracingHandle`]. When export is
//! disabled or the collector cannot be reached the handle is a no-op for
//! export purposes, but its propagator still produces a valid (unsampled)
//! span context for every request, so middleware code is identical in both
//! modes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};
use common::TracingError;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::{SpanExporterBuilder, WithExportConfig};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tokio::net::TcpStream;
use uuid::Uuid;

/// `service.name` reported on exported spans.
pub const SERVICE_NAME: &str = "frontend";

/// Default OTLP/gRPC port when the collector address omits one.
const DEFAULT_OTLP_PORT: u16 = 4317;

/// Upper bound on the startup reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// What the tracing bootstrap ended up doing.
#[derive(Debug, Clone)]
pub enum TracingMode {
    /// Export was not requested.
    Disabled,
    /// Spans are batched to the collector at `endpoint`.
    Exporting { endpoint: String },
    /// Export was requested but could not be set up.
    Fallback(Arc<TracingError>),
}

/// Tracing capability handed to every component that needs it.
#[derive(Clone)]
pub struct TracingHandle {
    propagation: Propagation,
    tracer: Option<Tracer>,
    // Held so the batch processor lives as long as the handle.
    _provider: Option<TracerProvider>,
    mode: TracingMode,
}

impl TracingHandle {
    /// A handle that propagates context but exports nothing.
    pub fn noop(mode: TracingMode) -> Self {
        Self {
            propagation: Propagation::w3c(),
            tracer: None,
            _provider: None,
            mode,
        }
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation.clone()
    }

    /// Tracer backing the `tracing` → OpenTelemetry bridge, if exporting.
    pub fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }

    pub fn mode(&self) -> &TracingMode {
        &self.mode
    }

    /// Why export was abandoned, when it was requested but failed.
    pub fn fallback_reason(&self) -> Option<&TracingError> {
        match &self.mode {
            TracingMode::Fallback(e) => Some(e),
            _ => None,
        }
    }
}

/// Build the tracing handle.
///
/// Never fails: every error on the export path degrades to a no-op handle
/// whose [`TracingHandle::fallback_reason`] explains why.
pub async fn init_tracing(enabled: bool, collector: Option<&str>) -> TracingHandle {
    if !enabled {
        return TracingHandle::noop(TracingMode::Disabled);
    }
    match exporting_handle(collector).await {
        Ok(handle) => handle,
        Err(e) => TracingHandle::noop(TracingMode::Fallback(Arc::new(e))),
    }
}

async fn exporting_handle(collector: Option<&str>) -> Result<TracingHandle, TracingError> {
    let endpoint = CollectorEndpoint::parse(collector.ok_or(TracingError::MissingCollector)?)?;
    endpoint.probe().await?;

    let exporter = SpanExporterBuilder::from(
        opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint.url.clone()),
    )
    .build_span_exporter()
    .map_err(|e| TracingError::Exporter(e.to_string()))?;

    // Owned by the handle, not installed globally.
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default().with_resource(service_resource()),
        )
        .build();
    let tracer = provider.tracer(SERVICE_NAME);

    Ok(TracingHandle {
        propagation: Propagation::w3c(),
        tracer: Some(tracer),
        _provider: Some(provider),
        mode: TracingMode::Exporting {
            endpoint: endpoint.url,
        },
    })
}

fn service_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            SERVICE_NAME,
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ])
}

/// Collector address normalised to a URL with an explicit port.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CollectorEndpoint {
    /// URL handed to the OTLP exporter.
    url: String,
    /// `host:port` used for the reachability probe.
    addr: String,
}

impl CollectorEndpoint {
    fn parse(raw: &str) -> Result<Self, TracingError> {
        let invalid = || TracingError::InvalidCollector(raw.to_owned());
        let raw = raw.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_owned()
        } else {
            format!("http://{raw}")
        };
        let uri: Uri = with_scheme.parse().map_err(|_| invalid())?;
        let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let scheme = uri.scheme_str().unwrap_or("http");
        let port = uri.port_u16().unwrap_or(DEFAULT_OTLP_PORT);
        let addr = format!("{host}:{port}");
        Ok(Self {
            url: format!("{scheme}://{addr}"),
            addr,
        })
    }

    async fn probe(&self) -> Result<(), TracingError> {
        let unreachable = |reason: String| TracingError::Unreachable {
            addr: self.addr.clone(),
            reason,
        };
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(unreachable(e.to_string())),
            Err(_) => Err(unreachable(format!("no answer within {PROBE_TIMEOUT:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// W3C trace-context plus baggage propagator over HTTP headers.
#[derive(Clone)]
pub struct Propagation {
    inner: Arc<TextMapCompositePropagator>,
}

impl Propagation {
    pub fn w3c() -> Self {
        let propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ];
        Self {
            inner: Arc::new(TextMapCompositePropagator::new(propagators)),
        }
    }

    /// Parent context carried by the incoming headers (may be empty).
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.inner.extract(&HeaderExtractor(headers))
    }

    /// Write `traceparent` / `tracestate` / `baggage` for `cx` into `headers`.
    pub fn inject(&self, cx: &Context, headers: &mut HeaderMap) {
        self.inner.inject_context(cx, &mut HeaderInjector(headers));
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Per-request context
// ---------------------------------------------------------------------------

/// Trace context attached to a request's extensions.
#[derive(Clone)]
pub struct RequestTrace {
    context: Context,
}

impl RequestTrace {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn trace_id(&self) -> TraceId {
        self.context.span().span_context().trace_id()
    }

    pub fn span_id(&self) -> SpanId {
        self.context.span().span_context().span_id()
    }

    pub fn is_sampled(&self) -> bool {
        self.context.span().span_context().is_sampled()
    }

    pub fn is_valid(&self) -> bool {
        self.context.span().span_context().is_valid()
    }
}

/// Resolve the context a request runs under.
///
/// `span_cx` is the context of the request's own span. It carries a valid
/// span context only when spans are being exported; otherwise a local span
/// id is minted, continuing the incoming trace id and flags if there is one
/// and starting a fresh unsampled trace if not. Baggage from `parent` is kept.
pub fn request_context(parent: &Context, span_cx: Context) -> Context {
    if span_cx.span().span_context().is_valid() {
        return span_cx;
    }
    let inherited = parent.span().span_context().clone();
    let (trace_id, flags, state) = if inherited.is_valid() {
        (
            inherited.trace_id(),
            inherited.trace_flags(),
            inherited.trace_state().clone(),
        )
    } else {
        (random_trace_id(), TraceFlags::default(), TraceState::default())
    };
    let local = SpanContext::new(trace_id, random_span_id(), flags, false, state);
    parent.with_remote_span_context(local)
}

fn random_trace_id() -> TraceId {
    TraceId::from_bytes(*Uuid::new_v4().as_bytes())
}

fn random_span_id() -> SpanId {
    let bytes = Uuid::new_v4().into_bytes();
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[..8]);
    SpanId::from_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::baggage::BaggageExt;

    const TRACEPARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn fresh_context_is_valid_and_unsampled() {
        let prop = Propagation::w3c();
        let parent = prop.extract(&HeaderMap::new());
        let cx = request_context(&parent, Context::new());
        let trace = RequestTrace::new(cx);
        assert!(trace.is_valid());
        assert!(!trace.is_sampled());
    }

    #[test]
    fn incoming_trace_id_is_continued() {
        let prop = Propagation::w3c();
        let parent = prop.extract(&headers(&[("traceparent", TRACEPARENT)]));
        let trace = RequestTrace::new(request_context(&parent, Context::new()));
        assert_eq!(
            trace.trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
        assert_ne!(trace.span_id().to_string(), "b7ad6b7169203331");
        assert!(trace.is_sampled());
    }

    #[test]
    fn baggage_survives_and_is_reinjected() {
        let prop = Propagation::w3c();
        let parent = prop.extract(&headers(&[
            ("traceparent", TRACEPARENT),
            ("baggage", "tenant=acme"),
        ]));
        let cx = request_context(&parent, Context::new());
        assert_eq!(
            cx.baggage().get("tenant").map(|v| v.as_str().into_owned()),
            Some("acme".to_owned())
        );

        let mut out = HeaderMap::new();
        prop.inject(&cx, &mut out);
        let traceparent = out.get("traceparent").unwrap().to_str().unwrap();
        assert!(traceparent.starts_with("00-0af7651916cd43dd8448eb211c80319c-"));
        assert!(out.get("baggage").unwrap().to_str().unwrap().contains("tenant=acme"));
    }

    #[test]
    fn malformed_traceparent_starts_new_trace() {
        let prop = Propagation::w3c();
        let parent = prop.extract(&headers(&[("traceparent", "garbage")]));
        let trace = RequestTrace::new(request_context(&parent, Context::new()));
        assert!(trace.is_valid());
        assert!(!trace.is_sampled());
    }

    #[test]
    fn collector_endpoint_normalisation() {
        let e = CollectorEndpoint::parse("otel-collector:4317").unwrap();
        assert_eq!(e.url, "http://otel-collector:4317");
        assert_eq!(e.addr, "otel-collector:4317");

        let e = CollectorEndpoint::parse("https://collector.example").unwrap();
        assert_eq!(e.url, "https://collector.example:4317");

        assert!(CollectorEndpoint::parse("http://").is_err());
    }

    #[tokio::test]
    async fn disabled_is_noop() {
        let handle = init_tracing(false, Some("127.0.0.1:4317")).await;
        assert!(matches!(handle.mode(), TracingMode::Disabled));
        assert!(handle.tracer().is_none());
        assert!(handle.fallback_reason().is_none());
    }

    #[tokio::test]
    async fn enabled_without_collector_falls_back() {
        let handle = init_tracing(true, None).await;
        assert!(handle.tracer().is_none());
        assert!(matches!(
            handle.fallback_reason(),
            Some(TracingError::MissingCollector)
        ));
    }

    #[tokio::test]
    async fn unreachable_collector_falls_back() {
        // Grab a free port, then close it so nothing is listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handle = init_tracing(true, Some(&addr.to_string())).await;
        assert!(handle.tracer().is_none());
        assert_eq!(handle.fallback_reason().map(TracingError::kind), Some("unreachable"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reachable_collector_exports() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = init_tracing(true, Some(&addr.to_string())).await;
        assert!(handle.tracer().is_some());
        match handle.mode() {
            TracingMode::Exporting { endpoint } => {
                assert_eq!(endpoint, &format!("http://{addr}"))
            }
            other => panic!("expected exporting mode, got {other:?}"),
        }
    }
}
