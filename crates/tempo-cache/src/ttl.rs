//! Single-key cache for derived aggregates, invalidated by explicit delete.

use crate::keys::scoped_key;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::sync::Arc;
use tempo_core::{DateRange, Result};
use tempo_core::ports::KeyValueStore;
use tracing::{debug, warn};

/// One value per (entity, date range), e.g. `insight:{client}:{from}:{to}`.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    default_ttl_secs: u64,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>, default_ttl_secs: u64) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            default_ttl_secs,
        }
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    fn key(&self, entity: impl Display, range: &DateRange) -> String {
        let (from, to) = (range.start_str(), range.end_str());
        scoped_key(&self.namespace, entity, &[from.as_str(), to.as_str()])
    }

    /// Same corrupt-entry repair as the versioned cache.
    pub async fn get<T: DeserializeOwned>(&self, entity: impl Display, range: &DateRange) -> Result<Option<T>> {
        let key = self.key(entity, range);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping corrupt cache entry");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    pub async fn put<T: Serialize>(
        &self,
        entity: impl Display,
        range: &DateRange,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        let key = self.key(entity, range);
        let body = serde_json::to_string(value)?;
        self.store
            .set(&key, &body, ttl_secs.unwrap_or(self.default_ttl_secs))
            .await
    }

    /// Unconditional delete.
    pub async fn invalidate(&self, entity: impl Display, range: &DateRange) -> Result<()> {
        let key = self.key(entity, range);
        let removed = self.store.delete(&key).await?;
        debug!(key = %key, removed, "Invalidated cache entry");
        Ok(())
    }
}
