//! Redis connection bootstrap for the feed broker.
//!
//! Every broker process holds two kinds of Redis connection: a shared
//! command connection used by every feed handle, and (if listening) a
//! dedicated pub/sub connection owned by the Listener. This crate builds
//! and keeps the former alive; the latter is constructed directly from a
//! [`Client`] by the listener, since a `PubSub` connection cannot be shared.

use once_cell::sync::OnceCell;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
///
/// `ConnectionManager` is itself cheap to clone and multiplexes internally,
/// but callers that need to run raw `WATCH`/`MULTI`/`EXEC` sequences need
/// exclusive use of one logical connection for the duration of the
/// transaction, hence the mutex rather than a bare clone-per-call.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Keepalive configuration to prevent idle connection timeouts.
///
/// Cloud load balancers and container network proxies often have TCP idle
/// timeouts (typically 10-30 minutes). When a connection is idle longer than
/// this, it gets silently dropped, causing "broken pipe" errors on the next
/// command. The keepalive sends periodic PING commands to prevent this.
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// Interval between PING commands (default: 30 seconds).
    pub interval: Duration,
    /// Whether keepalive is enabled (default: true).
    pub enabled: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

impl KeepaliveConfig {
    /// Create keepalive config from environment variables.
    ///
    /// - `REDIS_KEEPALIVE_ENABLED`: "true" or "false" (default: true)
    /// - `REDIS_KEEPALIVE_INTERVAL_SECS`: interval in seconds (default: 30)
    pub fn from_env() -> Self {
        let enabled = std::env::var("REDIS_KEEPALIVE_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        let interval_secs = std::env::var("REDIS_KEEPALIVE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30)
            .max(5); // Minimum 5 seconds

        Self {
            interval: Duration::from_secs(interval_secs),
            enabled,
        }
    }
}

/// A connected Redis store: the shared command connection plus its
/// keepalive task. Dropping this drops the keepalive task with it.
pub struct RedisStore {
    manager: SharedConnectionManager,
    client: Client,
    _keepalive: Option<KeepaliveTask>,
}

impl RedisStore {
    /// Connect to Redis with default keepalive settings (enabled, 30s interval).
    pub async fn connect(redis_url: &str) -> Result<Self, RedisError> {
        Self::connect_with_keepalive(redis_url, KeepaliveConfig::from_env()).await
    }

    /// Connect to Redis with custom keepalive configuration.
    pub async fn connect_with_keepalive(
        redis_url: &str,
        keepalive: KeepaliveConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(redis_url)?;
        let connection_manager = ConnectionManager::new(client.clone()).await?;
        let manager = Arc::new(Mutex::new(connection_manager));

        let keepalive_task = if keepalive.enabled {
            info!(
                "Redis keepalive enabled with {}s interval",
                keepalive.interval.as_secs()
            );
            Some(KeepaliveTask::spawn(manager.clone(), keepalive))
        } else {
            None
        };

        Ok(Self {
            manager,
            client,
            _keepalive: keepalive_task,
        })
    }

    /// The shared command connection, cloneable into every feed handle.
    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Open a fresh, independent multiplexed async connection intended for
    /// a single long-lived pub/sub subscriber. Not shared via the mutex
    /// above since the Listener owns it exclusively for the life of the
    /// process.
    pub async fn new_pubsub_connection(&self) -> Result<redis::aio::PubSub, RedisError> {
        self.client.get_async_pubsub().await
    }
}

/// Background task that sends periodic PING commands to keep the shared
/// connection alive across idle periods.
struct KeepaliveTask {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl KeepaliveTask {
    fn spawn(manager: SharedConnectionManager, config: KeepaliveConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(async move {
            keepalive_loop(manager, config.interval, shutdown_rx).await;
        });

        Self {
            shutdown_tx,
            handle,
        }
    }
}

impl Drop for KeepaliveTask {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.handle.abort();
    }
}

async fn keepalive_loop(
    manager: SharedConnectionManager,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut consecutive_failures = 0u32;
    const MAX_FAILURES_BEFORE_WARN: u32 = 3;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Redis keepalive task shutting down");
                break;
            }
            _ = sleep(interval) => {
                let result: Result<String, RedisError> = {
                    let mut conn = manager.lock().await;
                    redis::cmd("PING").query_async(&mut *conn).await
                };

                match result {
                    Ok(response) => {
                        if response == "PONG" {
                            debug!("Redis keepalive PING successful");
                            consecutive_failures = 0;
                        } else {
                            warn!("Redis keepalive received unexpected response: {}", response);
                        }
                    }
                    Err(err) => {
                        consecutive_failures += 1;
                        if consecutive_failures >= MAX_FAILURES_BEFORE_WARN {
                            warn!(
                                "Redis keepalive PING failed ({} consecutive failures): {}",
                                consecutive_failures, err
                            );
                        } else {
                            debug!("Redis keepalive PING failed (will retry): {}", err);
                        }
                        // ConnectionManager auto-reconnects on the next command.
                    }
                }
            }
        }
    }
}

// Redis command timeout configuration.
const DEFAULT_REDIS_COMMAND_TIMEOUT_MS: u64 = 3_000;
const MIN_REDIS_COMMAND_TIMEOUT_MS: u64 = 500;

fn redis_command_timeout() -> Duration {
    static TIMEOUT: OnceCell<Duration> = OnceCell::new();
    *TIMEOUT.get_or_init(|| {
        let ms = std::env::var("REDIS_COMMAND_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REDIS_COMMAND_TIMEOUT_MS)
            .max(MIN_REDIS_COMMAND_TIMEOUT_MS);

        info!("Redis command timeout set to {}ms", ms);
        Duration::from_millis(ms)
    })
}

/// Wrap a non-blocking Redis command future with a timeout, so a wedged
/// connection surfaces as an error instead of hanging the caller forever.
///
/// Not used for the deliberately-blocking calls (`BRPOP`, the Listener's
/// `listen()` loop) which have their own caller-supplied timeout semantics.
pub async fn with_timeout<F, T>(future: F) -> Result<T, RedisError>
where
    F: std::future::Future<Output = Result<T, RedisError>>,
{
    match timeout(redis_command_timeout(), future).await {
        Ok(res) => res,
        Err(_) => {
            error!(
                "Redis command timed out after {:?}",
                redis_command_timeout()
            );
            Err(RedisError::from((
                redis::ErrorKind::IoError,
                "redis command timed out",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_config_defaults_to_enabled_30s() {
        let config = KeepaliveConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn keepalive_config_from_env_respects_minimum() {
        std::env::set_var("REDIS_KEEPALIVE_INTERVAL_SECS", "1");
        let config = KeepaliveConfig::from_env();
        assert_eq!(config.interval, Duration::from_secs(5));
        std::env::remove_var("REDIS_KEEPALIVE_INTERVAL_SECS");
    }
}
