//! State shared by every feed-type variant: the feed's name, its store
//! handle, and the lazily-refreshed config cell, mirroring the corpus's
//! `config_lock` + `config_valid` pair on the base `Feed` class.

use std::sync::Arc;

use tokio::sync::Mutex;

use broker_errors::{BrokerError, Result};

use crate::schema::Schema;
use crate::store::Store;
use crate::types::FeedConfig;

struct CachedConfig {
    value: Option<FeedConfig>,
    valid: bool,
}

/// Shared via `Arc` so every clone of a feed handle observes the same
/// cached config and invalidation state.
#[derive(Clone)]
pub struct FeedCommon {
    pub name: String,
    pub store: Store,
    config: Arc<Mutex<CachedConfig>>,
}

impl FeedCommon {
    pub fn new(name: impl Into<String>, store: Store, config: FeedConfig) -> Self {
        Self {
            name: name.into(),
            store,
            config: Arc::new(Mutex::new(CachedConfig {
                value: Some(config),
                valid: true,
            })),
        }
    }

    /// Current config, re-fetched from the store if a `conffeed` event
    /// marked the cached copy invalid.
    pub async fn config(&self) -> Result<FeedConfig> {
        let mut cached = self.config.lock().await;
        if !cached.valid {
            let raw = self
                .store
                .get(&Schema::config(&self.name))
                .await?
                .ok_or_else(|| BrokerError::FeedDoesNotExist(self.name.clone()))?;
            cached.value = Some(FeedConfig::from_json(&raw)?);
            cached.valid = true;
        }
        Ok(cached.value.clone().expect("populated just above"))
    }

    /// Mark the cached config stale; the next [`FeedCommon::config`] call
    /// re-reads it from the store. Called by the listener on `conffeed`.
    pub async fn invalidate_config(&self) {
        self.config.lock().await.valid = false;
    }

    pub fn ids_key(&self) -> String {
        Schema::ids(&self.name)
    }

    pub fn items_key(&self) -> String {
        Schema::items(&self.name)
    }
}
