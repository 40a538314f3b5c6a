//! Axum router construction.

use axum::{routing::get, Router};
use common::protocol::SHARED_SESSION_ID;
use tracing::info;

use super::handlers;
use super::middleware::{Pipeline, RequestLogger, SessionPolicy, SessionTagger, TraceContextStage};
use crate::config::Config;
use crate::telemetry::{Propagation, RequestLogSink};

/// Route set and session behaviour derived from configuration.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Register `/_healthz`.
    pub healthz: bool,
    pub session: SessionPolicy,
}

impl RouteOptions {
    pub fn from_config(cfg: &Config) -> Self {
        let session = if cfg.shared_session() {
            SessionPolicy::Shared(SHARED_SESSION_ID.into())
        } else {
            SessionPolicy::PerClient
        };
        Self {
            healthz: cfg.healthz_enabled(),
            session,
        }
    }
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            healthz: true,
            session: SessionPolicy::PerClient,
        }
    }
}

/// The middleware stages, outermost first: tracing, logging, session.
pub fn pipeline(propagation: Propagation, sink: RequestLogSink, session: SessionPolicy) -> Pipeline {
    Pipeline::new()
        .stage(TraceContextStage::new(propagation))
        .stage(RequestLogger::new(sink))
        .stage(SessionTagger::new(session))
}

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Unmatched paths fall through to axum's default 404.
pub fn build(options: RouteOptions, propagation: Propagation, sink: RequestLogSink) -> Router {
    let mut routes = Router::new().route("/", get(handlers::home));
    if options.healthz {
        routes = routes.route("/_healthz", get(handlers::healthz));
    }
    let pipeline = pipeline(propagation, sink, options.session);
    info!(stages = ?pipeline.names(), "middleware pipeline");
    pipeline.wrap(routes)
}
