//! Test infrastructure for Tempo.
//!
//! In-memory wiring ([`helpers::MemoryApp`]) drives the full router and the
//! insight worker without external services. The `integration` feature
//! enables tests against real PostgreSQL and Redis started by testcontainers.
//!
//! # Usage
//!
//! ```ignore
//! use tempo_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new().await.unwrap();
//!     // Use ctx.db, ctx.redis, ctx.backends(), etc.
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tempo_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
