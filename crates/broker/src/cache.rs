//! Per-process cache mapping feed name to a live feed handle. Grounded on
//! `thoonk/config.py`'s `ConfigCache`: an exclusive map guarded by one
//! lock, entries invalidated by the originating process's instance id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use broker_errors::{BrokerError, Result};

use crate::feeds::FeedHandle;
use crate::schema::{Schema, FEEDS};
use crate::store::Store;
use crate::types::FeedConfig;

pub struct ConfigCache {
    store: Store,
    /// This process's identity, stamped onto every `newfeed`/`delfeed`/
    /// `conffeed` event it emits so it can recognize and skip its own
    /// broadcasts when they echo back.
    pub instance: String,
    feeds: Mutex<HashMap<String, Arc<FeedHandle>>>,
}

impl ConfigCache {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            instance: Uuid::new_v4().simple().to_string(),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// The handle for `name`, constructing and caching it on first use.
    /// Fails with `FeedDoesNotExist` if `name` isn't a member of `feeds`.
    pub async fn get(&self, name: &str) -> Result<Arc<FeedHandle>> {
        let mut feeds = self.feeds.lock().await;
        if let Some(handle) = feeds.get(name) {
            return Ok(handle.clone());
        }

        if !self.store.sismember(FEEDS, name).await? {
            return Err(BrokerError::FeedDoesNotExist(name.to_string()));
        }

        let raw = self
            .store
            .get(&Schema::config(name))
            .await?
            .ok_or_else(|| BrokerError::FeedDoesNotExist(name.to_string()))?;
        let config = FeedConfig::from_json(&raw)?;

        let handle = Arc::new(FeedHandle::construct(name, self.store.clone(), config));
        feeds.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// React to a `delfeed`/`conffeed` broadcast. Events originating from
    /// this same process (matching `instance`) are ignored since this
    /// process already applied the change locally.
    pub async fn invalidate(&self, name: &str, instance: &str, delete: bool) {
        if instance == self.instance {
            return;
        }
        let mut feeds = self.feeds.lock().await;
        if let Some(handle) = feeds.get(name) {
            if delete {
                feeds.remove(name);
            } else if let FeedHandle::Feed(f) = handle.as_ref() {
                f.common.invalidate_config().await;
            } else if let FeedHandle::Queue(q) = handle.as_ref() {
                q.common.invalidate_config().await;
            } else if let FeedHandle::Job(j) = handle.as_ref() {
                j.common.invalidate_config().await;
            } else if let FeedHandle::Sorted(s) = handle.as_ref() {
                s.common.invalidate_config().await;
            }
        }
    }

    pub async fn forget(&self, name: &str) {
        self.feeds.lock().await.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique_per_cache() {
        let a = Uuid::new_v4().simple().to_string();
        let b = Uuid::new_v4().simple().to_string();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
