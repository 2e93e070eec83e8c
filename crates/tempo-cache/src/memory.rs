//! In-process [`KeyValueStore`] for tests and single-node development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempo_core::ports::KeyValueStore;
use tempo_core::{Error, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Mirrors the Redis semantics the caches rely on: atomic increments that
/// keep an existing expiry, set-if-absent, and expiry-aware reads.
///
/// Expiry follows the tokio clock, so paused-time tests can advance it.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error, as a dead server would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().await.values().filter(|s| s.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Store("connection refused".to_string()));
        }
        Ok(())
    }

    fn deadline(ttl_secs: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(ttl_secs.max(1)))
    }
}

fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str) -> Option<&'a mut Slot> {
    let now = Instant::now();
    if slots.get(key).is_some_and(|s| !s.is_live(now)) {
        slots.remove(key);
    }
    slots.get_mut(key)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        Ok(live(&mut slots, key).map(|s| s.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check()?;
        self.slots.lock().await.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Self::deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        if live(&mut slots, key).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Self::deadline(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        let existed = live(&mut slots, key).is_some();
        slots.remove(key);
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        let matched = live(&mut slots, key).is_some_and(|s| s.value == expected);
        if matched {
            slots.remove(key);
        }
        Ok(matched)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        match live(&mut slots, key) {
            Some(slot) => {
                let current: i64 = slot.value.parse().map_err(|_| {
                    Error::Store("value is not an integer or out of range".to_string())
                })?;
                let next = current + 1;
                slot.value = next.to_string();
                Ok(next)
            }
            None => {
                slots.insert(
                    key.to_string(),
                    Slot {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        match live(&mut slots, key) {
            Some(slot) => {
                slot.expires_at = Self::deadline(ttl_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.check()?;
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        Ok(live(&mut slots, key)
            .and_then(|s| s.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs()))
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_follows_tokio_clock() {
        let store = MemoryStore::new();
        store.set("k", "v", 10).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_keeps_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("n").await.unwrap(), 1);
        assert_eq!(store.ttl("n").await.unwrap(), None);
        store.expire("n", 100).await.unwrap();
        assert_eq!(store.increment("n").await.unwrap(), 2);
        assert!(store.ttl("n").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("n", "abc", 60).await.unwrap();
        assert!(matches!(store.increment("n").await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_set_if_absent_and_compare_delete() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("lock", "a", 60).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", 60).await.unwrap());
        assert!(!store.delete_if_equals("lock", "b").await.unwrap());
        assert!(store.delete_if_equals("lock", "a").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.get("k").await.is_err());
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
