//! Test context providing access to all test infrastructure.

use crate::containers::{PostgresContainer, RedisContainer};
use crate::fixtures::test_settings;
use std::sync::Arc;
use tempo_api::Backends;
use tempo_cache::{RedisConnection, RedisStore};
use tempo_core::config::Settings;
use tempo_db::{Database, PgCheckinStore, PgClientRepository, PgInsightStore, PgPlanStore};
use tempo_queue::{QueueConfig, RedisJobQueue};

/// Test context with PostgreSQL and Redis running.
///
/// Drop this to stop all containers.
pub struct TestContext {
    pub postgres: PostgresContainer,
    pub redis: RedisContainer,
    pub db: Database,
    pub connection: Arc<RedisConnection>,
    pub settings: Settings,
}

impl TestContext {
    /// Create a new test context with all containers running.
    pub async fn new() -> anyhow::Result<Self> {
        crate::init_test_logging();

        // Start containers in parallel
        let (postgres, redis) = tokio::try_join!(PostgresContainer::start(), RedisContainer::start())?;

        let mut settings = test_settings();
        settings.database.url = postgres.connection_string().to_string();
        settings.redis.url = redis.url().to_string();

        let db = Database::connect(&settings.database).await?;
        db.ensure_schema().await?;

        let connection = Arc::new(RedisConnection::new(&settings.redis)?);
        connection.connect().await?;

        Ok(Self {
            postgres,
            redis,
            db,
            connection,
            settings,
        })
    }

    /// Create context with only PostgreSQL.
    pub async fn postgres_only() -> anyhow::Result<PostgresOnlyContext> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let mut settings = test_settings();
        settings.database.url = postgres.connection_string().to_string();

        let db = Database::connect(&settings.database).await?;
        db.ensure_schema().await?;

        Ok(PostgresOnlyContext { postgres, db })
    }

    /// Create context with only Redis.
    pub async fn redis_only() -> anyhow::Result<RedisOnlyContext> {
        crate::init_test_logging();

        let redis = RedisContainer::start().await?;
        let mut settings = test_settings();
        settings.redis.url = redis.url().to_string();

        let connection = Arc::new(RedisConnection::new(&settings.redis)?);
        connection.connect().await?;

        Ok(RedisOnlyContext { redis, connection })
    }

    /// The production adapters, pointed at the containers.
    pub fn backends(&self) -> Backends {
        let queue = RedisJobQueue::new(
            Arc::clone(&self.connection),
            QueueConfig::from_settings(&self.settings.queue),
        );
        Backends {
            kv: Arc::new(RedisStore::new(Arc::clone(&self.connection))),
            queue_metrics: Arc::clone(queue.metrics()),
            queue: Arc::new(queue),
            clients: Arc::new(PgClientRepository::new(self.db.pool().clone())),
            checkins: Arc::new(PgCheckinStore::new(self.db.pool().clone())),
            insights: Arc::new(PgInsightStore::new(self.db.pool().clone())),
            plans: Arc::new(PgPlanStore::new(self.db.pool().clone())),
        }
    }

    pub fn db_url(&self) -> &str {
        self.postgres.connection_string()
    }

    pub fn redis_url(&self) -> &str {
        self.redis.url()
    }
}

/// Minimal context with only PostgreSQL.
pub struct PostgresOnlyContext {
    pub postgres: PostgresContainer,
    pub db: Database,
}

impl PostgresOnlyContext {
    pub fn db_url(&self) -> &str {
        self.postgres.connection_string()
    }
}

/// Minimal context with only Redis.
pub struct RedisOnlyContext {
    pub redis: RedisContainer,
    pub connection: Arc<RedisConnection>,
}

impl RedisOnlyContext {
    pub fn store(&self) -> RedisStore {
        RedisStore::new(Arc::clone(&self.connection))
    }

    pub fn queue(&self, config: QueueConfig) -> RedisJobQueue {
        RedisJobQueue::new(Arc::clone(&self.connection), config)
    }
}
