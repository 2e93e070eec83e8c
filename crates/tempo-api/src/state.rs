//! Application state shared across handlers.

use crate::auth::JwtVerifier;
use crate::idempotency::IdempotencyGuard;
use crate::middleware::RateLimiter;
use crate::services::{CheckinService, InsightService};
use std::sync::Arc;
use tempo_cache::keys::{CHECKIN_NAMESPACE, INSIGHT_NAMESPACE};
use tempo_cache::{TtlCache, VersionedCache};
use tempo_core::config::Settings;
use tempo_core::ports::{CheckinStore, ClientRepository, InsightStore, JobQueue, KeyValueStore, PlanStore};
use tempo_queue::QueueMetrics;

/// External collaborators the API is wired to.
#[derive(Clone)]
pub struct Backends {
    pub kv: Arc<dyn KeyValueStore>,
    pub queue: Arc<dyn JobQueue>,
    pub queue_metrics: Arc<QueueMetrics>,
    pub clients: Arc<dyn ClientRepository>,
    pub checkins: Arc<dyn CheckinStore>,
    pub insights: Arc<dyn InsightStore>,
    pub plans: Arc<dyn PlanStore>,
}

/// Application state shared across all handlers.
pub struct AppState {
    pub kv: Arc<dyn KeyValueStore>,
    pub queue_metrics: Arc<QueueMetrics>,
    pub clients: Arc<dyn ClientRepository>,
    pub plans: Arc<dyn PlanStore>,
    pub checkins: CheckinService,
    pub insights: InsightService,
    pub idempotency: IdempotencyGuard,
    pub rate_limiter: RateLimiter,
    pub verifier: JwtVerifier,
}

impl AppState {
    pub fn new(backends: Backends, settings: &Settings) -> Self {
        let Backends {
            kv,
            queue,
            queue_metrics,
            clients,
            checkins,
            insights,
            plans,
        } = backends;

        let list_cache = VersionedCache::new(Arc::clone(&kv), CHECKIN_NAMESPACE, &settings.cache);
        let insight_cache = TtlCache::new(Arc::clone(&kv), INSIGHT_NAMESPACE, settings.cache.insight_ttl_secs);

        Self {
            checkins: CheckinService::new(checkins, list_cache),
            insights: InsightService::new(insights, insight_cache, queue, settings.queue.name.clone()),
            idempotency: IdempotencyGuard::new(Arc::clone(&kv), &settings.idempotency),
            rate_limiter: RateLimiter::new(Arc::clone(&kv), &settings.rate_limit),
            verifier: JwtVerifier::new(&settings.auth),
            kv,
            queue_metrics,
            clients,
            plans,
        }
    }
}
