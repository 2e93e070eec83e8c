//! Test helper functions and utilities.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use reqwest::Client;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempo_api::idempotency::IDEMPOTENCY_KEY_HEADER;
use tempo_api::{AppState, Backends, create_router};
use tempo_cache::keys::INSIGHT_NAMESPACE;
use tempo_cache::{MemoryStore, TtlCache};
use tempo_core::config::Settings;
use tempo_core::ids::JobId;
use tempo_core::job::JobState;
use tempo_core::ports::JobQueue;
use tempo_db::{MemoryCheckinStore, MemoryClientRepository, MemoryInsightStore, MemoryPlanStore};
use tempo_queue::{ConsumerOptions, MemoryJobQueue, QueueConfig, WorkerHandle, consume};
use tempo_worker::{InsightJobHandler, ScanLimits};
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

use crate::fixtures::{CoachFixture, test_settings};

/// The whole API wired to in-memory adapters.
pub struct MemoryApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub kv: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub clients: Arc<MemoryClientRepository>,
    pub checkins: Arc<MemoryCheckinStore>,
    pub insights: Arc<MemoryInsightStore>,
    pub plans: Arc<MemoryPlanStore>,
    pub settings: Settings,
}

impl MemoryApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        crate::init_test_logging();

        let kv = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryJobQueue::new(QueueConfig::from_settings(&settings.queue)));
        let clients = Arc::new(MemoryClientRepository::new());
        let checkins = Arc::new(MemoryCheckinStore::new());
        let insights = Arc::new(MemoryInsightStore::new());
        let plans = Arc::new(MemoryPlanStore::new());

        let backends = Backends {
            kv: kv.clone(),
            queue_metrics: Arc::clone(queue.metrics()),
            queue: queue.clone(),
            clients: clients.clone(),
            checkins: checkins.clone(),
            insights: insights.clone(),
            plans: plans.clone(),
        };
        let state = Arc::new(AppState::new(backends, &settings));

        Self {
            router: create_router(Arc::clone(&state)),
            state,
            kv,
            queue,
            clients,
            checkins,
            insights,
            plans,
            settings,
        }
    }

    /// Send one request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let raw = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec();
        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            raw,
        }
    }

    pub async fn get(&self, path: &str, coach: &CoachFixture) -> TestResponse {
        self.send(request(Method::GET, path).bearer(coach).build()).await
    }

    pub async fn post(&self, path: &str, coach: &CoachFixture, key: Option<Uuid>, body: &Value) -> TestResponse {
        let mut builder = request(Method::POST, path).bearer(coach).json(body);
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, &key.to_string());
        }
        self.send(builder.build()).await
    }

    /// Create a client for `coach` and return its id.
    pub async fn create_client(&self, coach: &CoachFixture, body: &Value) -> String {
        let response = self
            .post("/api/v1/clients", coach, Some(Uuid::new_v4()), body)
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "create client: {}", response.body);
        response.body["clientId"]
            .as_str()
            .expect("clientId in response")
            .to_string()
    }

    /// Start the insight worker against the same in-memory adapters.
    pub fn start_worker(&self) -> WorkerHandle {
        let cache = TtlCache::new(self.kv.clone(), INSIGHT_NAMESPACE, self.settings.cache.insight_ttl_secs);
        let handler = InsightJobHandler::new(
            self.checkins.clone(),
            self.insights.clone(),
            cache,
            ScanLimits::from_settings(&self.settings.worker),
        );
        consume(
            self.queue.clone(),
            self.settings.queue.name.clone(),
            Arc::new(handler),
            ConsumerOptions::from_settings(&self.settings.worker, &self.settings.queue),
        )
    }

    pub async fn job_state(&self, job_id: &str) -> Option<JobState> {
        self.queue
            .state(&self.settings.queue.name, &JobId::new(job_id))
            .await
            .expect("memory queue state")
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Option<JobState> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self.job_state(job_id).await;
            if matches!(state, Some(JobState::Completed | JobState::Failed)) {
                return state;
            }
            if tokio::time::Instant::now() >= deadline {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for MemoryApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body["code"].as_str()
    }
}

pub fn request(method: Method, path: &str) -> RequestBuilder {
    RequestBuilder {
        inner: Request::builder().method(method).uri(path),
        body: Body::empty(),
    }
}

/// Thin wrapper over [`axum::http::request::Builder`] for test requests.
pub struct RequestBuilder {
    inner: axum::http::request::Builder,
    body: Body,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    pub fn bearer(self, coach: &CoachFixture) -> Self {
        let value = coach.bearer();
        self.header("authorization", &value)
    }

    pub fn json(mut self, body: &Value) -> Self {
        self.inner = self.inner.header("content-type", "application/json");
        self.body = Body::from(body.to_string());
        self
    }

    pub fn build(self) -> Request<Body> {
        self.inner.body(self.body).expect("Failed to build request")
    }
}

/// Start an API server for testing and return its address.
pub async fn start_test_server(
    backends: Backends,
    settings: &Settings,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = create_router(Arc::new(AppState::new(backends, settings)));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Test server stopped");
        }
    });

    Ok((addr, handle))
}

/// Create an HTTP client for testing.
pub fn test_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create test client")
}

/// API test client with base URL and a signed-in coach.
pub struct ApiTestClient {
    client: Client,
    base_url: String,
    coach: CoachFixture,
}

impl ApiTestClient {
    pub fn new(addr: SocketAddr, coach: CoachFixture) -> Self {
        Self {
            client: test_client(),
            base_url: format!("http://{}", addr),
            coach,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.coach.token)
            .send()
            .await
    }

    pub async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        key: Uuid,
        body: &T,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.coach.token)
            .header(IDEMPOTENCY_KEY_HEADER, key.to_string())
            .json(body)
            .send()
            .await
    }

    /// Check health endpoint.
    pub async fn health(&self) -> anyhow::Result<bool> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Ok(resp.status().is_success())
    }
}

/// Wait for a condition with timeout.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}
