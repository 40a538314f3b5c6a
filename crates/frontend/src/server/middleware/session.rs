//! Session tagging stage.
//!
//! Every request leaves this stage with a [`SessionId`] in its extensions and
//! every response carries the same id in `x-session-id`. Newly minted ids are
//! also handed out as a cookie so the client sends them back next time.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
};
use common::protocol::{SESSION_COOKIE, SESSION_COOKIE_MAX_AGE_SECS, SESSION_HEADER};
use cookie::{time::Duration, Cookie};
use uuid::Uuid;

use super::{Middleware, StageFuture};

const MAX_SESSION_ID_LEN: usize = 128;

/// Session identifier attached to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// How session ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Reuse the id the client presents, mint a new one otherwise.
    PerClient,
    /// Every request gets this id regardless of what the client sends.
    Shared(String),
}

pub struct SessionTagger {
    policy: SessionPolicy,
}

impl SessionTagger {
    pub fn new(policy: SessionPolicy) -> Self {
        Self { policy }
    }

    /// Pick the id for a request and whether the client needs to be told.
    fn assign(&self, headers: &HeaderMap) -> (String, bool) {
        let presented = presented_session(headers);
        match &self.policy {
            SessionPolicy::Shared(id) => (id.clone(), presented.as_deref() != Some(id.as_str())),
            SessionPolicy::PerClient => match presented {
                Some(id) => (id, false),
                None => (Uuid::new_v4().to_string(), true),
            },
        }
    }
}

impl Middleware for SessionTagger {
    fn name(&self) -> &'static str {
        "session"
    }

    fn call(self: Arc<Self>, mut req: Request, next: Next) -> StageFuture {
        Box::pin(async move {
            let (id, fresh) = self.assign(req.headers());
            // Valid ids are plain ASCII, so this only fails for a misconfigured
            // shared id.
            let value = HeaderValue::from_str(&id).ok();

            if let Some(v) = &value {
                req.headers_mut().insert(SESSION_HEADER, v.clone());
            }
            req.extensions_mut().insert(SessionId(id.clone()));

            let mut response = next.run(req).await;

            if let Some(v) = value {
                response.headers_mut().insert(SESSION_HEADER, v);
            }
            if fresh {
                if let Ok(v) = HeaderValue::from_str(&session_cookie(id).to_string()) {
                    response.headers_mut().append(header::SET_COOKIE, v);
                }
            }
            response
        })
    }
}

/// First well-formed session id the client sent: cookie first, then header.
fn presented_session(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE && is_valid_session_id(c.value()))
        .map(|c| c.value().to_owned());

    from_cookie.or_else(|| {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| is_valid_session_id(v))
            .map(str::to_owned)
    })
}

/// `Set-Cookie` handing a newly minted id to the client.
fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .max_age(Duration::seconds(SESSION_COOKIE_MAX_AGE_SECS as i64))
        .build()
}

/// 1..=128 characters of ASCII alphanumerics, `-` or `_`.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::middleware::Pipeline;
    use axum::{body::Body, http, routing::get, Extension, Router};
    use common::protocol::SHARED_SESSION_ID;
    use std::collections::HashSet;
    use tower::ServiceExt;

    async fn echo_session(Extension(id): Extension<SessionId>) -> String {
        id.0
    }

    fn app(policy: SessionPolicy) -> Router {
        Pipeline::new()
            .stage(SessionTagger::new(policy))
            .wrap(Router::new().route("/", get(echo_session)))
    }

    async fn send(app: Router, req: http::Request<Body>) -> (String, http::HeaderMap) {
        let resp = app.oneshot(req).await.unwrap();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (String::from_utf8(bytes.to_vec()).unwrap(), headers)
    }

    fn get_root() -> http::request::Builder {
        http::Request::builder().uri("/")
    }

    #[tokio::test]
    async fn mints_id_when_absent() {
        let (body, headers) = send(
            app(SessionPolicy::PerClient),
            get_root().body(Body::empty()).unwrap(),
        )
        .await;
        assert!(Uuid::parse_str(&body).is_ok());
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), body.as_str());
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={body};")));
        assert!(cookie.contains("Max-Age=172800"));
    }

    #[tokio::test]
    async fn echoes_cookie_session_unchanged() {
        let req = get_root()
            .header(header::COOKIE, format!("theme=dark; {SESSION_COOKIE}=abc-123_XYZ"))
            .body(Body::empty())
            .unwrap();
        let (body, headers) = send(app(SessionPolicy::PerClient), req).await;
        assert_eq!(body, "abc-123_XYZ");
        assert_eq!(headers.get(SESSION_HEADER).unwrap(), "abc-123_XYZ");
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn set_cookie_attributes_round_trip() {
        let (body, headers) = send(
            app(SessionPolicy::PerClient),
            get_root().body(Body::empty()).unwrap(),
        )
        .await;
        let raw = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        let cookie = Cookie::parse(raw).unwrap();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), body);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(172_800)));
    }

    #[tokio::test]
    async fn finds_session_among_untidy_cookies() {
        let req = get_root()
            .header(header::COOKIE, format!("flag;  theme=dark ;{SESSION_COOKIE}=tidy-id;"))
            .body(Body::empty())
            .unwrap();
        let (body, headers) = send(app(SessionPolicy::PerClient), req).await;
        assert_eq!(body, "tidy-id");
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn echoes_header_session_unchanged() {
        let req = get_root()
            .header(SESSION_HEADER, "from-header")
            .body(Body::empty())
            .unwrap();
        let (body, _) = send(app(SessionPolicy::PerClient), req).await;
        assert_eq!(body, "from-header");
    }

    #[tokio::test]
    async fn replaces_malformed_session() {
        let req = get_root()
            .header(header::COOKIE, format!("{SESSION_COOKIE}=has spaces<>"))
            .body(Body::empty())
            .unwrap();
        let (body, headers) = send(app(SessionPolicy::PerClient), req).await;
        assert_ne!(body, "has spaces<>");
        assert!(Uuid::parse_str(&body).is_ok());
        assert!(headers.get(header::SET_COOKIE).is_some());
    }

    #[tokio::test]
    async fn shared_policy_overrides_client() {
        let app = app(SessionPolicy::Shared(SHARED_SESSION_ID.into()));
        let req = get_root()
            .header(SESSION_HEADER, "mine")
            .body(Body::empty())
            .unwrap();
        let (body, headers) = send(app.clone(), req).await;
        assert_eq!(body, SHARED_SESSION_ID);
        assert!(headers.get(header::SET_COOKIE).is_some());

        let req = get_root()
            .header(header::COOKIE, format!("{SESSION_COOKIE}={SHARED_SESSION_ID}"))
            .body(Body::empty())
            .unwrap();
        let (body, headers) = send(app, req).await;
        assert_eq!(body, SHARED_SESSION_ID);
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn fresh_ids_are_unique() {
        let app = app(SessionPolicy::PerClient);
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let (body, _) = send(app.clone(), get_root().body(Body::empty()).unwrap()).await;
            assert!(seen.insert(body));
        }
    }

    #[test]
    fn session_id_validation() {
        assert!(is_valid_session_id("a"));
        assert!(is_valid_session_id(&"x".repeat(128)));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id(&"x".repeat(129)));
        assert!(!is_valid_session_id("semi;colon"));
    }
}
