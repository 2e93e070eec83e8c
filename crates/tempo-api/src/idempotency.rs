//! Replay-safe execution of side-effecting writes.
//!
//! A guarded handler runs at most once per (actor, route, `Idempotency-Key`).
//! Before it runs, the key is reserved with set-if-absent so a concurrent
//! duplicate is turned away with 409 instead of executing twice. A 2xx
//! outcome replaces the reservation with a `{status, body}` snapshot that
//! later duplicates receive verbatim. Any other outcome releases the
//! reservation so the client may retry.

use crate::error::ApiError;
use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tempo_cache::keys::idempotency_key;
use tempo_core::config::IdempotencySettings;
use tempo_core::ports::KeyValueStore;
use tracing::{debug, warn};
use uuid::Uuid;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Validated `Idempotency-Key` header. Missing or non-UUID values are rejected
/// before the handler body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyKey(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for IdempotencyKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| ApiError::bad_request("Missing Idempotency-Key header"))?;
        raw.to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(IdempotencyKey)
            .ok_or_else(|| ApiError::bad_request("Idempotency-Key must be a UUID"))
    }
}

/// Outcome of a guarded handler: what gets sent and, on success, remembered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: u16,
    pub body: Value,
}

impl Snapshot {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status: status.as_u16(),
            body,
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl IntoResponse for Snapshot {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum Record {
    /// A request holding this key is still executing.
    Pending { token: String },
    Done(Snapshot),
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn KeyValueStore>,
    record_ttl_secs: u64,
    reservation_ttl_secs: u64,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &IdempotencySettings) -> Self {
        Self {
            store,
            record_ttl_secs: settings.record_ttl_secs.max(1),
            reservation_ttl_secs: settings.reservation_ttl_secs.max(1),
        }
    }

    /// Run `handler` unless this (actor, route, key) already ran.
    ///
    /// Store failures before the handler runs fail the request; after it runs
    /// they are logged and the handler's response is returned unchanged.
    pub async fn run<F, Fut>(
        &self,
        actor: impl Display,
        route: &str,
        key: IdempotencyKey,
        handler: F,
    ) -> Result<Response, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Snapshot, ApiError>>,
    {
        let record_key = idempotency_key(actor, route, key.0);

        if let Some(found) = self.lookup(&record_key).await? {
            return Ok(settled(found));
        }

        let pending = serde_json::to_string(&Record::Pending {
            token: Uuid::new_v4().to_string(),
        })
        .map_err(ApiError::internal)?;
        let reserved = self
            .store
            .set_if_absent(&record_key, &pending, self.reservation_ttl_secs)
            .await
            .map_err(ApiError::internal)?;
        if !reserved {
            // Lost the race; whoever won may have finished already.
            return match self.lookup(&record_key).await? {
                Some(found) => Ok(settled(found)),
                None => Err(in_progress()),
            };
        }

        let outcome = handler().await;
        match &outcome {
            Ok(snapshot) if snapshot.is_success() => self.remember(&record_key, &pending, snapshot).await,
            _ => self.release(&record_key, &pending).await,
        }
        outcome.map(IntoResponse::into_response)
    }

    /// `Ok(Some)` with a replay or a conflict when the key is taken.
    async fn lookup(&self, record_key: &str) -> Result<Option<Result<Snapshot, ApiError>>, ApiError> {
        let Some(raw) = self.store.get(record_key).await.map_err(ApiError::internal)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Record>(&raw) {
            Ok(Record::Done(snapshot)) => {
                debug!(key = %record_key, status = snapshot.status, "Replaying idempotent response");
                Ok(Some(Ok(snapshot)))
            }
            Ok(Record::Pending { .. }) => Ok(Some(Err(in_progress()))),
            Err(e) => {
                warn!(key = %record_key, error = %e, "Dropping corrupt idempotency record");
                self.store
                    .delete_if_equals(record_key, &raw)
                    .await
                    .map_err(ApiError::internal)?;
                Ok(None)
            }
        }
    }

    async fn remember(&self, record_key: &str, pending: &str, snapshot: &Snapshot) {
        let stored = match serde_json::to_string(&Record::Done(snapshot.clone())) {
            Ok(body) => self.store.set(record_key, &body, self.record_ttl_secs).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            warn!(key = %record_key, error = %e, "Failed to persist idempotency record");
            self.release(record_key, pending).await;
        }
    }

    /// Drop our own reservation; never someone else's record.
    async fn release(&self, record_key: &str, pending: &str) {
        if let Err(e) = self.store.delete_if_equals(record_key, pending).await {
            warn!(key = %record_key, error = %e, "Failed to release idempotency reservation");
        }
    }
}

fn settled(found: Result<Snapshot, ApiError>) -> Response {
    match found {
        Ok(snapshot) => {
            let mut response = snapshot.into_response();
            response
                .headers_mut()
                .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
            response
        }
        Err(conflict) => conflict.into_response(),
    }
}

fn in_progress() -> ApiError {
    ApiError::conflict("A request with this Idempotency-Key is already in progress")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempo_cache::MemoryStore;

    fn guard(store: Arc<MemoryStore>) -> IdempotencyGuard {
        IdempotencyGuard::new(store, &IdempotencySettings::default())
    }

    fn created(n: usize) -> Result<Snapshot, ApiError> {
        Ok(Snapshot::new(StatusCode::CREATED, serde_json::json!({ "n": n })))
    }

    #[tokio::test]
    async fn test_second_call_replays_first_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone());
        let key = IdempotencyKey(Uuid::new_v4());
        let calls = AtomicUsize::new(0);

        let first = guard
            .run("coach", "POST /clients", key, || async { created(calls.fetch_add(1, Ordering::SeqCst)) })
            .await
            .unwrap();
        let second = guard
            .run("coach", "POST /clients", key, || async { created(calls.fetch_add(1, Ordering::SeqCst)) })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(second.status(), StatusCode::CREATED);
        assert!(first.headers().get(REPLAYED_HEADER).is_none());
        assert_eq!(second.headers()[REPLAYED_HEADER], "true");
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_actor_and_route() {
        let guard = guard(Arc::new(MemoryStore::new()));
        let key = IdempotencyKey(Uuid::new_v4());
        let calls = AtomicUsize::new(0);
        let run = |actor: &'static str, route: &'static str| {
            guard.run(actor, route, key, || async { created(calls.fetch_add(1, Ordering::SeqCst)) })
        };

        run("a", "POST /clients").await.unwrap();
        run("b", "POST /clients").await.unwrap();
        run("a", "POST /other").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failures_are_not_remembered() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone());
        let key = IdempotencyKey(Uuid::new_v4());

        let failed = guard
            .run("coach", "POST /clients", key, || async {
                Err::<Snapshot, _>(ApiError::bad_request("nope"))
            })
            .await;
        assert!(failed.is_err());
        assert!(store.is_empty().await);

        let retried = guard
            .run("coach", "POST /clients", key, || async { created(7) })
            .await
            .unwrap();
        assert_eq!(retried.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_non_success_snapshot_is_not_remembered() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone());
        let key = IdempotencyKey(Uuid::new_v4());

        guard
            .run("coach", "POST /x", key, || async {
                Ok(Snapshot::new(StatusCode::MULTIPLE_CHOICES, Value::Null))
            })
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone());
        let key = IdempotencyKey(Uuid::new_v4());
        let record_key = idempotency_key("coach", "POST /clients", key.0);
        store
            .set(&record_key, r#"{"state":"pending","token":"other"}"#, 60)
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let response = guard
            .run("coach", "POST /clients", key, || async { created(calls.fetch_add(1, Ordering::SeqCst)) })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_outage_before_handler_fails_request() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard(store.clone());
        store.set_unavailable(true);

        let calls = AtomicUsize::new(0);
        let result = guard
            .run("coach", "POST /clients", IdempotencyKey(Uuid::new_v4()), || async {
                created(calls.fetch_add(1, Ordering::SeqCst))
            })
            .await;
        assert_eq!(result.unwrap_err().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
