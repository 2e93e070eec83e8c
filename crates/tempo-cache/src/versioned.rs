//! Generation-tagged cache for paginated list queries.
//!
//! Each entity owns a version counter. Entry keys embed the version they were
//! written under, so one atomic increment orphans every cached page for that
//! entity at once. Orphans are never read again and fall out by TTL.

use crate::keys::{version_key, versioned_key};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::Arc;
use tempo_core::Result;
use tempo_core::checkin::CheckinQuery;
use tempo_core::range::format_date;
use tempo_core::config::CacheSettings;
use tempo_core::ports::KeyValueStore;
use tracing::{debug, warn};

/// A query whose result can be cached.
pub trait CacheQuery {
    /// Every parameter that affects the result content, in a fixed order.
    fn cache_parts(&self) -> Vec<String>;
}

impl CacheQuery for CheckinQuery {
    fn cache_parts(&self) -> Vec<String> {
        vec![
            self.range.start_str(),
            self.range.end_str(),
            self.limit.to_string(),
            self.cursor.map(format_date).unwrap_or_default(),
        ]
    }
}

#[derive(Clone)]
pub struct VersionedCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl_min_secs: u64,
    ttl_max_secs: u64,
    version_ttl_secs: u64,
}

impl VersionedCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>, settings: &CacheSettings) -> Self {
        let (lo, hi) = if settings.list_ttl_min_secs <= settings.list_ttl_max_secs {
            (settings.list_ttl_min_secs, settings.list_ttl_max_secs)
        } else {
            (settings.list_ttl_max_secs, settings.list_ttl_min_secs)
        };
        Self {
            store,
            namespace: namespace.into(),
            ttl_min_secs: lo.max(1),
            ttl_max_secs: hi.max(1),
            version_ttl_secs: settings.version_ttl_secs,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current generation; 0 when never bumped or when the stored value is unusable.
    pub async fn current_version(&self, entity: impl Display) -> Result<u64> {
        let key = version_key(&self.namespace, entity);
        let raw = self.store.get(&key).await?;
        Ok(raw
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    /// Atomically advance the generation and refresh the counter's lifetime.
    pub async fn bump_version(&self, entity: impl Display) -> Result<u64> {
        let key = version_key(&self.namespace, entity);
        let version = self.store.increment(&key).await?;
        self.store.expire(&key, self.version_ttl_secs).await?;
        debug!(key = %key, version, "Bumped cache version");
        Ok(u64::try_from(version).unwrap_or(0))
    }

    /// Cached result for `query` under `version`.
    ///
    /// An entry that no longer deserializes is deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        entity: impl Display,
        version: u64,
        query: &impl CacheQuery,
    ) -> Result<Option<T>> {
        let key = versioned_key(&self.namespace, entity, version, &query.cache_parts());
        let Some(raw) = self.store.get(&key).await? else {
            debug!(key = %key, "Cache miss");
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping corrupt cache entry");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Store `value` under a jittered TTL.
    pub async fn put<T: Serialize>(
        &self,
        entity: impl Display,
        version: u64,
        query: &impl CacheQuery,
        value: &T,
    ) -> Result<()> {
        let key = versioned_key(&self.namespace, entity, version, &query.cache_parts());
        let body = serde_json::to_string(value)?;
        self.store.set(&key, &body, self.jittered_ttl()).await
    }

    fn jittered_ttl(&self) -> u64 {
        rand::thread_rng().gen_range(self.ttl_min_secs..=self.ttl_max_secs)
    }
}
