//! Key/value store adapters and cache layers for Tempo.
//!
//! [`VersionedCache`] serves paginated list reads that become unreachable as
//! soon as the underlying collection changes. [`TtlCache`] holds one derived
//! value per (entity, range) and is invalidated explicitly.

pub mod connection;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod ttl;
pub mod versioned;

pub use connection::{ConnectionState, RedisConnection};
pub use keys::sanitize_key;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use ttl::TtlCache;
pub use versioned::{CacheQuery, VersionedCache};
