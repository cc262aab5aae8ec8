//! Process-level configuration, loaded from the environment the same way
//! `redis-store`'s `KeepaliveConfig::from_env` does.

use redis_store::KeepaliveConfig;

/// Connection parameters for a broker instance.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub redis_url: String,
    /// Whether to start the background listener task on `Broker::connect`.
    pub listen: bool,
    pub keepalive: KeepaliveConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            listen: true,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// - `REDIS_URL` (default `redis://127.0.0.1:6379`)
    /// - `REDIS_LISTEN` (`true`/`false`/`1`/`0`, default `true`)
    /// - `REDIS_KEEPALIVE_ENABLED`, `REDIS_KEEPALIVE_INTERVAL_SECS`
    pub fn from_env() -> Self {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let listen = std::env::var("REDIS_LISTEN")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        Self {
            redis_url,
            listen,
            keepalive: KeepaliveConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listens_against_localhost() {
        let config = BrokerConfig::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert!(config.listen);
    }

    #[test]
    fn from_env_respects_redis_listen_false() {
        std::env::set_var("REDIS_LISTEN", "false");
        let config = BrokerConfig::from_env();
        assert!(!config.listen);
        std::env::remove_var("REDIS_LISTEN");
    }
}
