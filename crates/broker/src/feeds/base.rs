//! The base feed: an unbounded or length-bounded collection of items
//! ordered by publish time, delivered by `publish`/`edit`/`retract` events.
//! Grounded on `thoonk/feeds/feed.py`'s `Feed` class.

use uuid::Uuid;

use broker_errors::Result;

use crate::schema::Schema;
use crate::store::{Store, TxStep};

use super::common::FeedCommon;

#[derive(Clone)]
pub struct Feed {
    pub common: FeedCommon,
}

impl Feed {
    pub fn new(common: FeedCommon) -> Self {
        Self { common }
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    fn store(&self) -> &Store {
        &self.common.store
    }

    /// Ids ordered by publish time (ascending).
    pub async fn get_ids(&self) -> Result<Vec<String>> {
        self.store().zrange(&self.common.ids_key(), 0, -1).await
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<String>> {
        self.store().hget(&self.common.items_key(), id).await
    }

    pub async fn get_all(&self) -> Result<Vec<(String, String)>> {
        self.store().hgetall(&self.common.items_key()).await
    }

    /// Publish a new item, or edit it in place if `id` already names an
    /// existing item. Returns the id used.
    pub async fn publish(&self, payload: &str, id: Option<String>) -> Result<String> {
        let publish_id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let publishes_key = Schema::publishes(&self.common.name);
        let retract_channel = Schema::retract_channel(&self.common.name);

        let max_length = self.common.config().await?.max_length();

        let was_new: bool = self
            .store()
            .transaction(&[ids_key.clone()], |mut conn| {
                let publish_id = publish_id.clone();
                let ids_key = ids_key.clone();
                let items_key = items_key.clone();
                let publishes_key = publishes_key.clone();
                let retract_channel = retract_channel.clone();
                let payload = payload.to_string();
                async move {
                    let already_exists: bool =
                        redis::cmd("HEXISTS")
                            .arg(&items_key)
                            .arg(&publish_id)
                            .query_async(&mut conn)
                            .await?;

                    let mut writes = Vec::new();

                    if max_length > 0 {
                        let oldest: Vec<String> = redis::cmd("ZRANGE")
                            .arg(&ids_key)
                            .arg(0)
                            .arg(-(max_length as isize))
                            .query_async(&mut conn)
                            .await?;
                        for evict in oldest {
                            if evict == publish_id {
                                continue;
                            }
                            writes.push(redis::cmd("ZREM").arg(&ids_key).arg(&evict).clone());
                            writes.push(redis::cmd("HDEL").arg(&items_key).arg(&evict).clone());
                            writes.push(
                                redis::cmd("PUBLISH")
                                    .arg(&retract_channel)
                                    .arg(&evict)
                                    .clone(),
                            );
                        }
                    }

                    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
                    writes.push(
                        redis::cmd("ZADD")
                            .arg(&ids_key)
                            .arg(now)
                            .arg(&publish_id)
                            .clone(),
                    );
                    writes.push(redis::cmd("INCR").arg(&publishes_key).clone());
                    writes.push(
                        redis::cmd("HSET")
                            .arg(&items_key)
                            .arg(&publish_id)
                            .arg(&payload)
                            .clone(),
                    );

                    Ok(TxStep::Commit {
                        writes,
                        value: !already_exists,
                    })
                }
            })
            .await?;

        if was_new {
            self.store()
                .publish(
                    &Schema::publish_channel(&self.common.name),
                    &format!("{publish_id}\0{payload}"),
                )
                .await?;
        } else {
            self.store()
                .publish(
                    &Schema::edit_channel(&self.common.name),
                    &format!("{publish_id}\0{payload}"),
                )
                .await?;
        }

        Ok(publish_id)
    }

    /// Remove an item. A missing id is a silent no-op, matching the
    /// corpus's `retract` which simply `UNWATCH`es and returns.
    pub async fn retract(&self, id: &str) -> Result<()> {
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let retract_channel = Schema::retract_channel(&self.common.name);

        self.store()
            .transaction(&[ids_key.clone()], |mut conn| {
                let id = id.to_string();
                let ids_key = ids_key.clone();
                let items_key = items_key.clone();
                let retract_channel = retract_channel.clone();
                async move {
                    let rank: Option<i64> = redis::cmd("ZRANK")
                        .arg(&ids_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if rank.is_none() {
                        return Ok(TxStep::Abort(()));
                    }

                    let writes = vec![
                        redis::cmd("ZREM").arg(&ids_key).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&items_key).arg(&id).clone(),
                        redis::cmd("PUBLISH").arg(&retract_channel).arg(&id).clone(),
                    ];

                    Ok(TxStep::Commit { writes, value: () })
                }
            })
            .await
    }
}

