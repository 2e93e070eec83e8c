//! Process-wide Redis connection with an explicit lifecycle.

use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tempo_core::config::RedisSettings;
use tempo_core::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lifecycle of the shared connection.
#[derive(Clone, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected(ConnectionManager),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Shared Redis connection reused by every store, cache and queue in a process.
///
/// `connect` is idempotent: concurrent callers wait on the same attempt and
/// all receive the same multiplexed connection. `disconnect` is safe to call
/// when never connected.
pub struct RedisConnection {
    client: redis::Client,
    connect_timeout: Duration,
    command_timeout: Duration,
    state: Mutex<ConnectionState>,
}

impl RedisConnection {
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|e| Error::Config(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            connect_timeout: settings.connect_timeout(),
            command_timeout: settings.command_timeout(),
            state: Mutex::new(ConnectionState::Disconnected),
        })
    }

    /// Return the live connection, establishing it on first use.
    pub async fn connect(&self) -> Result<ConnectionManager> {
        let mut state = self.state.lock().await;
        if let ConnectionState::Connected(conn) = &*state {
            return Ok(conn.clone());
        }

        let manager = with_timeout(
            "connect",
            self.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await?;

        info!(
            connect_timeout_ms = self.connect_timeout.as_millis() as u64,
            "Connected to Redis"
        );
        *state = ConnectionState::Connected(manager.clone());
        Ok(manager)
    }

    /// Drop the connection. The next `connect` opens a fresh one.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if state.is_connected() {
            info!("Disconnecting from Redis");
        } else {
            debug!("Redis disconnect requested while not connected");
        }
        *state = ConnectionState::Disconnected;
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

/// Bound a Redis future by `limit`, mapping failures to store errors.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::Store(format!("{operation}: {e}"))),
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            millis: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        let settings = RedisSettings {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(RedisConnection::new(&settings), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let conn = RedisConnection::new(&RedisSettings::default()).unwrap();
        conn.disconnect().await;
        conn.disconnect().await;
        assert!(!conn.is_connected().await);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<()> = with_timeout("GET", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { millis: 5, .. })));
    }
}
