//! Tempo API server entrypoint.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tempo_api::{AppState, Backends, create_router};
use tempo_cache::{RedisConnection, RedisStore};
use tempo_core::config::Settings;
use tempo_db::{Database, PgCheckinStore, PgClientRepository, PgInsightStore, PgPlanStore};
use tempo_queue::{QueueConfig, RedisJobQueue};
use tempo_trace::{TracingConfig, init_tracer, shutdown_tracer};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "tempo-api")]
#[command(author, version, about = "Tempo coaching platform API", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to ./tempo.toml when present.
    #[arg(short, long, env = "TEMPO_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address; overrides `server.bind`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(bind) = cli.bind {
        settings.server.bind = bind;
    }

    init_tracer(&TracingConfig::from_settings(&settings.tracing, "tempo-api"))?;

    let redis = Arc::new(RedisConnection::new(&settings.redis)?);
    redis.connect().await.context("connecting to redis")?;

    let database = Database::connect(&settings.database)
        .await
        .context("connecting to postgres")?;
    database.ensure_schema().await?;

    let queue = RedisJobQueue::new(Arc::clone(&redis), QueueConfig::from_settings(&settings.queue));
    let backends = Backends {
        kv: Arc::new(RedisStore::new(Arc::clone(&redis))),
        queue_metrics: Arc::clone(queue.metrics()),
        queue: Arc::new(queue),
        clients: Arc::new(PgClientRepository::new(database.pool().clone())),
        checkins: Arc::new(PgCheckinStore::new(database.pool().clone())),
        insights: Arc::new(PgInsightStore::new(database.pool().clone())),
        plans: Arc::new(PgPlanStore::new(database.pool().clone())),
    };
    let app = create_router(Arc::new(AppState::new(backends, &settings)));

    let listener = TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;
    info!(addr = %settings.server.bind, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    redis.disconnect().await;
    database.pool().close().await;
    info!("API stopped");
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
