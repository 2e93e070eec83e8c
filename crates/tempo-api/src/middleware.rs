//! HTTP middleware for the API server.

use crate::auth::Actor;
use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tempo_cache::keys::rate_limit_key;
use tempo_core::Result;
use tempo_core::config::RateLimitSettings;
use tempo_core::ports::KeyValueStore;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Create CORS middleware layer.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::HeaderName::from_static("idempotency-key"),
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header::RETRY_AFTER,
        ])
        .allow_origin(Any)
}

/// Incoming request ids are kept only if short and made of `[A-Za-z0-9._-]`.
pub fn sanitize_request_id(raw: &str) -> Option<&str> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    valid.then_some(raw)
}

/// Accept a well-formed `x-request-id` or mint one, and echo it on the response.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_request_id)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Sanitised ids and uuids are always valid header values.
    let value = HeaderValue::from_str(&id).ok();
    if let Some(value) = &value {
        request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Verdict for one request against the fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u64 },
    Limited { retry_after: u64 },
}

/// Fixed-window counter per identity. The first hit in a window starts its
/// expiry; store errors let the request through.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    enabled: bool,
    window_secs: u64,
    max_requests: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &RateLimitSettings) -> Self {
        Self {
            store,
            prefix: "rate_limit".to_string(),
            enabled: settings.enabled,
            window_secs: settings.window_secs.max(1),
            max_requests: settings.max_requests.max(1),
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub async fn check(&self, identity: &str) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed {
                remaining: self.max_requests,
            };
        }
        match self.count(identity).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(identity, error = %e, "Rate limiter unavailable; allowing request");
                RateDecision::Allowed {
                    remaining: self.max_requests,
                }
            }
        }
    }

    async fn count(&self, identity: &str) -> Result<RateDecision> {
        let key = rate_limit_key(&self.prefix, identity);
        let hits = u64::try_from(self.store.increment(&key).await?).unwrap_or(0);

        // A counter left without expiry would never reset.
        let ttl = if hits == 1 {
            self.store.expire(&key, self.window_secs).await?;
            Some(self.window_secs)
        } else {
            match self.store.ttl(&key).await? {
                Some(ttl) => Some(ttl),
                None => {
                    self.store.expire(&key, self.window_secs).await?;
                    None
                }
            }
        };

        if hits > self.max_requests {
            return Ok(RateDecision::Limited {
                retry_after: ttl.unwrap_or(self.window_secs).max(1),
            });
        }
        Ok(RateDecision::Allowed {
            remaining: self.max_requests - hits,
        })
    }
}

/// Apply [`RateLimiter`] per authenticated coach. Runs after authentication.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(actor) = request.extensions().get::<Actor>().copied() else {
        return next.run(request).await;
    };

    match state.rate_limiter.check(&actor.coach_id.to_string()).await {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        RateDecision::Limited { retry_after } => {
            ApiError::rate_limited(state.rate_limiter.max_requests(), retry_after).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_cache::MemoryStore;

    fn limiter(store: Arc<MemoryStore>, max: u64) -> RateLimiter {
        RateLimiter::new(
            store,
            &RateLimitSettings {
                enabled: true,
                window_secs: 60,
                max_requests: max,
            },
        )
    }

    #[test]
    fn test_sanitize_request_id() {
        assert_eq!(sanitize_request_id("abc-123_x.y"), Some("abc-123_x.y"));
        assert_eq!(sanitize_request_id(""), None);
        assert_eq!(sanitize_request_id("has space"), None);
        assert_eq!(sanitize_request_id("semi;colon"), None);
        assert_eq!(sanitize_request_id(&"a".repeat(128)).map(str::len), Some(128));
        assert_eq!(sanitize_request_id(&"a".repeat(129)), None);
    }

    #[tokio::test]
    async fn test_fixed_window_limits_after_max() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store.clone(), 2);

        assert_eq!(limiter.check("c1").await, RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check("c1").await, RateDecision::Allowed { remaining: 0 });
        let RateDecision::Limited { retry_after } = limiter.check("c1").await else {
            panic!("third request should be limited");
        };
        assert!((1..=60).contains(&retry_after));

        // Separate identities have separate windows.
        assert_eq!(limiter.check("c2").await, RateDecision::Allowed { remaining: 1 });
        assert!(store.ttl("rate_limit_c1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_expiry() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store, 1);

        limiter.check("c1").await;
        assert!(matches!(limiter.check("c1").await, RateDecision::Limited { .. }));
        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        assert_eq!(limiter.check("c1").await, RateDecision::Allowed { remaining: 0 });
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(store.clone(), 1);
        store.set_unavailable(true);

        for _ in 0..5 {
            assert!(matches!(limiter.check("c1").await, RateDecision::Allowed { .. }));
        }
    }
}
