//! Tempo insight worker entrypoint.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tempo_cache::keys::INSIGHT_NAMESPACE;
use tempo_cache::{RedisConnection, RedisStore, TtlCache};
use tempo_core::config::Settings;
use tempo_db::{Database, PgCheckinStore, PgInsightStore};
use tempo_queue::{ConsumerOptions, QueueConfig, RedisJobQueue, consume};
use tempo_trace::{TracingConfig, init_tracer, shutdown_tracer};
use tempo_worker::{InsightJobHandler, ScanLimits};
use tracing::info;

#[derive(Parser)]
#[command(name = "tempo-worker")]
#[command(author, version, about = "Computes client insights from queued jobs", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to ./tempo.toml when present.
    #[arg(short, long, env = "TEMPO_CONFIG")]
    config: Option<PathBuf>,

    /// Jobs processed in parallel; overrides `worker.concurrency`.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(concurrency) = cli.concurrency {
        settings.worker.concurrency = concurrency;
    }

    init_tracer(&TracingConfig::from_settings(&settings.tracing, "tempo-worker"))?;

    let redis = Arc::new(RedisConnection::new(&settings.redis)?);
    redis.connect().await.context("connecting to redis")?;

    let database = Database::connect(&settings.database)
        .await
        .context("connecting to postgres")?;
    database.ensure_schema().await?;

    let store = Arc::new(RedisStore::new(Arc::clone(&redis)));
    let cache = TtlCache::new(store, INSIGHT_NAMESPACE, settings.cache.insight_ttl_secs);
    let handler = Arc::new(InsightJobHandler::new(
        Arc::new(PgCheckinStore::new(database.pool().clone())),
        Arc::new(PgInsightStore::new(database.pool().clone())),
        cache,
        ScanLimits::from_settings(&settings.worker),
    ));

    let queue = Arc::new(RedisJobQueue::new(
        Arc::clone(&redis),
        QueueConfig::from_settings(&settings.queue),
    ));
    let worker = consume(
        queue,
        settings.queue.name.clone(),
        handler,
        ConsumerOptions::from_settings(&settings.worker, &settings.queue),
    );
    info!(queue = %settings.queue.name, "Worker running");

    shutdown_signal().await;

    worker.close().await;
    redis.disconnect().await;
    database.pool().close().await;
    info!("Worker stopped");
    shutdown_tracer();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}
