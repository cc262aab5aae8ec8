//! FIFO queue with optional head-priority insert. Grounded on
//! `thoonk/feeds/queue.py`.

use std::time::Duration;

use uuid::Uuid;

use broker_errors::{BrokerError, Result};

use crate::schema::Schema;
use crate::store::Store;

use super::common::FeedCommon;

/// Where a newly-put item lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

#[derive(Clone)]
pub struct Queue {
    pub common: FeedCommon,
}

impl Queue {
    pub fn new(common: FeedCommon) -> Self {
        Self { common }
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    fn store(&self) -> &Store {
        &self.common.store
    }

    /// Enqueue an item; `Priority::High` jumps the queue. No publish/edit
    /// event fires — queues deliver via consumption, not broadcast.
    pub async fn put(&self, payload: &str, priority: Priority) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let publishes_key = Schema::publishes(&self.common.name);

        self.store().hset(&items_key, &id, payload).await?;
        match priority {
            Priority::High => self.store().rpush(&ids_key, &id).await?,
            Priority::Normal => self.store().lpush(&ids_key, &id).await?,
        }
        self.store().incr(&publishes_key).await?;

        Ok(id)
    }

    /// Blocking pop from the head of the queue. `Duration::ZERO` blocks
    /// indefinitely; elapsing the timeout fails with [`BrokerError::Empty`].
    pub async fn get(&self, timeout: Duration) -> Result<String> {
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();

        let id = self
            .store()
            .brpop(&ids_key, timeout)
            .await?
            .ok_or(BrokerError::Empty)?;

        let payload = self.store().hget(&items_key, &id).await?;
        self.store().hdel(&items_key, &id).await?;

        payload.ok_or_else(|| BrokerError::ItemDoesNotExist(id.clone()))
    }
}
