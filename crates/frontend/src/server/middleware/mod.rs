//! Request pipeline: an ordered list of middleware stages around the router.
//!
//! Every stage implements [`Middleware`]: look at the request, call `next`,
//! observe the response. [`Pipeline`] turns the list into axum layers so that
//! the first stage added is the outermost one.

pub mod logging;
pub mod session;
pub mod trace;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response, Router};

pub use logging::RequestLogger;
pub use session::{SessionPolicy, SessionTagger};
pub use trace::TraceContextStage;

/// Future returned by a middleware stage.
pub type StageFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A request/response interceptor.
pub trait Middleware: Send + Sync + 'static {
    /// Short stage name, used in startup logs.
    fn name(&self) -> &'static str;

    /// Process `req`, hand it to `next`, and return the (possibly amended)
    /// response.
    fn call(self: Arc<Self>, req: Request, next: Next) -> StageFuture;
}

/// Ordered middleware stages, outermost first.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage inside all previously added ones.
    pub fn stage(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Stage names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Wrap every route (and the fallback) of `router` in the pipeline.
    pub fn wrap(self, router: Router) -> Router {
        // `Router::layer` wraps what is already there, so the innermost stage
        // has to be applied first.
        self.stages.into_iter().rev().fold(router, |router, stage| {
            router.layer(axum::middleware::from_fn(
                move |req: Request, next: Next| Arc::clone(&stage).call(req, next),
            ))
        })
    }
}
