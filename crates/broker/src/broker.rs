//! The facade: owns the store adapter, config cache, and (optionally) the
//! listener. Grounded on `thoonk/pubsub.py`'s `Pubsub` class for the
//! create/delete/config/lookup surface, and the corpus's
//! `InvalidationPublisher::new` for connecting on construction.

use std::collections::HashMap;
use std::sync::Arc;

use redis_store::RedisStore;
use tokio::sync::Mutex;
use tracing::info;

use broker_errors::{BrokerError, Result};

use crate::acl::{Acl, PermissiveAcl};
use crate::cache::ConfigCache;
use crate::config::BrokerConfig;
use crate::feeds::FeedHandle;
use crate::listener::{HandlerRegistry, Listener};
use crate::schema::{Schema, CONFFEED, DELFEED, FEEDS, NEWFEED};
use crate::store::{Store, TxStep};
use crate::types::{EventKind, FeedConfig, FeedType};

/// A connected broker instance: one `ConnectionManager`, one config cache,
/// and, if `BrokerConfig.listen` was set, a running background listener.
pub struct Broker {
    redis: RedisStore,
    store: Store,
    cache: Arc<ConfigCache>,
    handlers: Arc<HandlerRegistry>,
    listener: Mutex<Option<Listener>>,
    acl: Arc<dyn Acl>,
    /// Factories for custom feed types registered via
    /// [`Broker::register_feed_type`]. The five built-ins are dispatched
    /// directly by [`FeedHandle::construct`] and never consult this map.
    custom_types: Mutex<HashMap<String, ()>>,
}

impl Broker {
    /// Connect using the given configuration, starting the listener if
    /// `config.listen` is set.
    pub async fn connect(config: BrokerConfig) -> Result<Arc<Broker>> {
        Self::connect_with_acl(config, Arc::new(PermissiveAcl)).await
    }

    pub async fn connect_with_acl(config: BrokerConfig, acl: Arc<dyn Acl>) -> Result<Arc<Broker>> {
        let redis =
            RedisStore::connect_with_keepalive(&config.redis_url, config.keepalive.clone())
                .await?;
        let store = Store::new(redis.manager());
        let cache = Arc::new(ConfigCache::new(store.clone()));
        let handlers = Arc::new(HandlerRegistry::new());

        let broker = Arc::new(Broker {
            redis,
            store: store.clone(),
            cache: cache.clone(),
            handlers: handlers.clone(),
            listener: Mutex::new(None),
            acl,
            custom_types: Mutex::new(HashMap::new()),
        });

        if config.listen {
            let listener =
                Listener::spawn(&broker.redis, cache, handlers, store).await?;
            *broker.listener.lock().await = Some(listener);
            info!(redis_url = %config.redis_url, "broker connected and listening");
        } else {
            info!(redis_url = %config.redis_url, "broker connected without a listener");
        }

        Ok(broker)
    }

    /// Create a new feed. Fails with `FeedExists` if the name is already
    /// taken.
    pub async fn create_feed(&self, name: &str, feed_type: FeedType) -> Result<Arc<FeedHandle>> {
        self.set_config(name, FeedConfig::new(feed_type), true).await
    }

    /// Overwrite an existing feed's configuration (e.g. to change
    /// `max_length`). Fails with `FeedDoesNotExist` if the feed has not
    /// been created yet — use [`Broker::create_feed`] for that.
    pub async fn reconfigure(&self, name: &str, config: FeedConfig) -> Result<Arc<FeedHandle>> {
        if !self.feed_exists(name).await? {
            return Err(BrokerError::FeedDoesNotExist(name.to_string()));
        }
        self.set_config(name, config, false).await
    }

    /// Write a feed's configuration. `is_new` controls whether `FeedExists`
    /// is enforced (creation) or config is merely overwritten (reconfigure).
    async fn set_config(
        &self,
        name: &str,
        config: FeedConfig,
        is_new: bool,
    ) -> Result<Arc<FeedHandle>> {
        let config_json = config.to_json()?;
        let feeds_key = FEEDS.to_string();

        let created = self
            .store
            .transaction(&[feeds_key.clone()], |mut conn| {
                let name = name.to_string();
                let config_json = config_json.clone();
                async move {
                    let already_member: bool = redis::cmd("SISMEMBER")
                        .arg(FEEDS)
                        .arg(&name)
                        .query_async(&mut conn)
                        .await?;

                    if is_new && already_member {
                        return Err(BrokerError::FeedExists(name));
                    }

                    let mut writes = vec![redis::cmd("SET")
                        .arg(Schema::config(&name))
                        .arg(&config_json)
                        .clone()];
                    if !already_member {
                        writes.push(redis::cmd("SADD").arg(FEEDS).arg(&name).clone());
                    }

                    Ok(TxStep::Commit {
                        writes,
                        value: !already_member,
                    })
                }
            })
            .await?;

        if created {
            self.store
                .publish(NEWFEED, &format!("{name}\0{}", self.cache.instance))
                .await?;
        } else {
            self.store
                .publish(CONFFEED, &format!("{name}\0{}", self.cache.instance))
                .await?;
        }

        self.cache.forget(name).await;
        self.cache.get(name).await
    }

    /// Remove a feed and every key under its schema.
    pub async fn delete_feed(&self, name: &str) -> Result<()> {
        let feeds_key = FEEDS.to_string();

        let existed = self
            .store
            .transaction(&[feeds_key.clone()], |mut conn| {
                let name = name.to_string();
                async move {
                    let is_member: bool = redis::cmd("SISMEMBER")
                        .arg(FEEDS)
                        .arg(&name)
                        .query_async(&mut conn)
                        .await?;

                    if !is_member {
                        return Ok(TxStep::Abort(false));
                    }

                    let mut writes = vec![redis::cmd("SREM").arg(FEEDS).arg(&name).clone()];
                    for key in Schema::all_keys(&name) {
                        writes.push(redis::cmd("DEL").arg(key).clone());
                    }

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if !existed {
            return Err(BrokerError::FeedDoesNotExist(name.to_string()));
        }

        self.cache.forget(name).await;
        self.store
            .publish(DELFEED, &format!("{name}\0{}", self.cache.instance))
            .await?;
        Ok(())
    }

    pub async fn feed_exists(&self, name: &str) -> Result<bool> {
        self.store.sismember(FEEDS, name).await
    }

    pub async fn get_feed_names(&self) -> Result<Vec<String>> {
        self.store.smembers(FEEDS).await
    }

    pub async fn get_config(&self, name: &str) -> Result<FeedConfig> {
        let raw = self
            .store
            .get(&Schema::config(name))
            .await?
            .ok_or_else(|| BrokerError::FeedDoesNotExist(name.to_string()))?;
        FeedConfig::from_json(&raw)
    }

    /// Create `name` with the given type if it doesn't already exist,
    /// otherwise return its existing handle — the explicit-registry
    /// replacement for the source's dynamic `broker.queue(...)`-style
    /// attribute access.
    pub async fn create_or_get(&self, feed_type: FeedType, name: &str) -> Result<Arc<FeedHandle>> {
        if self.feed_exists(name).await? {
            self.cache.get(name).await
        } else {
            self.create_feed(name, feed_type).await
        }
    }

    pub async fn get_feed(&self, name: &str) -> Result<Arc<FeedHandle>> {
        self.cache.get(name).await
    }

    pub async fn feed(&self, name: &str) -> Result<Arc<FeedHandle>> {
        self.create_or_get(FeedType::Feed, name).await
    }

    pub async fn queue(&self, name: &str) -> Result<Arc<FeedHandle>> {
        self.create_or_get(FeedType::Queue, name).await
    }

    pub async fn job(&self, name: &str) -> Result<Arc<FeedHandle>> {
        self.create_or_get(FeedType::Job, name).await
    }

    pub async fn sorted_feed(&self, name: &str) -> Result<Arc<FeedHandle>> {
        self.create_or_get(FeedType::SortedFeed, name).await
    }

    /// Register a custom feed-type name so `create_feed`/`create_or_get`
    /// accept it. The type itself still dispatches to the base `Feed`
    /// behavior at the store layer (see `FeedHandle::construct`); this
    /// registry exists for callers that want a name reserved and a typed
    /// accessor of their own built atop [`Broker::create_or_get`].
    pub async fn register_feed_type(&self, type_name: &str) {
        self.custom_types.lock().await.insert(type_name.to_string(), ());
    }

    /// Register a handler for an event kind. Fails with `NotListening` if
    /// this instance wasn't configured to listen.
    pub async fn register_handler(
        &self,
        kind: EventKind,
        handler: crate::listener::Handler,
    ) -> Result<()> {
        if self.listener.lock().await.is_none() {
            return Err(BrokerError::NotListening);
        }
        self.handlers.register(kind, handler).await;
        Ok(())
    }

    pub async fn remove_handlers(&self, kind: EventKind) -> Result<()> {
        if self.listener.lock().await.is_none() {
            return Err(BrokerError::NotListening);
        }
        self.handlers.clear(kind).await;
        Ok(())
    }

    pub fn acl(&self) -> &Arc<dyn Acl> {
        &self.acl
    }

    /// Tear the listener down. The shared command connection is dropped
    /// along with the `Broker` itself.
    pub async fn close(&self) -> Result<()> {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.close().await?;
        }
        Ok(())
    }
}
