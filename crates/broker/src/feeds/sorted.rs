//! A manually-ordered feed where position is explicit rather than derived
//! from publish time. Grounded on `thoonk/feeds/sorted_feed.py`.

use broker_errors::{BrokerError, Result};

use crate::schema::Schema;
use crate::store::{Store, TxStep};
use crate::types::Position;

use super::common::FeedCommon;

#[derive(Clone)]
pub struct SortedFeed {
    pub common: FeedCommon,
}

impl SortedFeed {
    pub fn new(common: FeedCommon) -> Self {
        Self { common }
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    fn store(&self) -> &Store {
        &self.common.store
    }

    pub async fn get_ids(&self) -> Result<Vec<String>> {
        self.store().lrange(&self.common.ids_key(), 0, -1).await
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<String>> {
        self.store().hget(&self.common.items_key(), id).await
    }

    pub async fn get_items(&self) -> Result<Vec<(String, String)>> {
        self.store().hgetall(&self.common.items_key()).await
    }

    async fn next_id(&self) -> Result<String> {
        let n = self.store().incr(&Schema::idincr(&self.common.name)).await?;
        Ok(n.to_string())
    }

    /// Append to the end of the feed. Same as [`SortedFeed::append`].
    pub async fn publish(&self, payload: &str) -> Result<String> {
        self.insert_at_end(payload).await
    }

    pub async fn append(&self, payload: &str) -> Result<String> {
        self.insert_at_end(payload).await
    }

    async fn insert_at_end(&self, payload: &str) -> Result<String> {
        let id = self.next_id().await?;
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let publishes_key = Schema::publishes(&self.common.name);

        self.store().rpush(&ids_key, &id).await?;
        self.store().incr(&publishes_key).await?;
        self.store().hset(&items_key, &id, payload).await?;

        self.store()
            .publish(
                &Schema::publish_channel(&self.common.name),
                &format!("{id}\0{payload}"),
            )
            .await?;
        self.store()
            .publish(
                &Schema::position_channel(&self.common.name),
                &format!("{id}\0{}", Position::Last.to_wire()),
            )
            .await?;

        Ok(id)
    }

    /// Add to the beginning of the feed.
    pub async fn prepend(&self, payload: &str) -> Result<String> {
        let id = self.next_id().await?;
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let publishes_key = Schema::publishes(&self.common.name);

        self.store().lpush(&ids_key, &id).await?;
        self.store().incr(&publishes_key).await?;
        self.store().hset(&items_key, &id, payload).await?;

        self.store()
            .publish(
                &Schema::publish_channel(&self.common.name),
                &format!("{id}\0{payload}"),
            )
            .await?;
        self.store()
            .publish(
                &Schema::position_channel(&self.common.name),
                &format!("{id}\0{}", Position::First.to_wire()),
            )
            .await?;

        Ok(id)
    }

    /// Insert immediately before an existing item.
    pub async fn publish_before(&self, before_id: &str, payload: &str) -> Result<String> {
        self.insert_relative(before_id, payload, true).await
    }

    /// Insert immediately after an existing item.
    pub async fn publish_after(&self, after_id: &str, payload: &str) -> Result<String> {
        self.insert_relative(after_id, payload, false).await
    }

    async fn insert_relative(&self, rel_id: &str, payload: &str, before: bool) -> Result<String> {
        let id = self.next_id().await?;
        let items_key = self.common.items_key();
        let ids_key = self.common.ids_key();
        let position = if before {
            Position::Before(rel_id.to_string())
        } else {
            Position::After(rel_id.to_string())
        };

        let inserted = self
            .store()
            .transaction(&[items_key.clone()], |mut conn| {
                let id = id.clone();
                let items_key = items_key.clone();
                let ids_key = ids_key.clone();
                let rel_id = rel_id.to_string();
                let payload = payload.to_string();
                async move {
                    let rel_exists: bool = redis::cmd("HEXISTS")
                        .arg(&items_key)
                        .arg(&rel_id)
                        .query_async(&mut conn)
                        .await?;

                    if !rel_exists {
                        return Ok(TxStep::Abort(false));
                    }

                    let direction = if before { "BEFORE" } else { "AFTER" };
                    let writes = vec![
                        redis::cmd("LINSERT")
                            .arg(&ids_key)
                            .arg(direction)
                            .arg(&rel_id)
                            .arg(&id)
                            .clone(),
                        redis::cmd("HSET").arg(&items_key).arg(&id).arg(&payload).clone(),
                    ];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if !inserted {
            return Err(BrokerError::ReferenceDoesNotExist(rel_id.to_string()));
        }

        self.store()
            .publish(
                &Schema::publish_channel(&self.common.name),
                &format!("{id}\0{payload}"),
            )
            .await?;
        self.store()
            .publish(
                &Schema::position_channel(&self.common.name),
                &format!("{id}\0{}", position.to_wire()),
            )
            .await?;

        Ok(id)
    }

    /// Replace an item's payload in place.
    pub async fn edit(&self, id: &str, payload: &str) -> Result<()> {
        let items_key = self.common.items_key();
        let publishes_key = Schema::publishes(&self.common.name);

        let edited = self
            .store()
            .transaction(&[items_key.clone()], |mut conn| {
                let id = id.to_string();
                let items_key = items_key.clone();
                let payload = payload.to_string();
                async move {
                    let exists: bool = redis::cmd("HEXISTS")
                        .arg(&items_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if !exists {
                        return Ok(TxStep::Abort(false));
                    }

                    let writes =
                        vec![redis::cmd("HSET").arg(&items_key).arg(&id).arg(&payload).clone()];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if !edited {
            return Err(BrokerError::ItemDoesNotExist(id.to_string()));
        }

        self.store().incr(&publishes_key).await?;
        self.store()
            .publish(
                &Schema::publish_channel(&self.common.name),
                &format!("{id}\0{payload}"),
            )
            .await?;
        Ok(())
    }

    /// Move an existing item to a new position among its siblings.
    pub async fn move_to(&self, id: &str, position: Position) -> Result<()> {
        let items_key = self.common.items_key();
        let ids_key = self.common.ids_key();

        let moved = self
            .store()
            .transaction(&[items_key.clone()], |mut conn| {
                let id = id.to_string();
                let items_key = items_key.clone();
                let ids_key = ids_key.clone();
                let position = position.clone();
                async move {
                    let exists: bool = redis::cmd("HEXISTS")
                        .arg(&items_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;
                    if !exists {
                        return Ok(TxStep::Abort(false));
                    }

                    if let Position::Before(ref rel) | Position::After(ref rel) = position {
                        let rel_exists: bool = redis::cmd("HEXISTS")
                            .arg(&items_key)
                            .arg(rel)
                            .query_async(&mut conn)
                            .await?;
                        if !rel_exists {
                            return Ok(TxStep::Abort(false));
                        }
                    }

                    let mut writes = vec![redis::cmd("LREM").arg(&ids_key).arg(1).arg(&id).clone()];
                    match &position {
                        Position::First => {
                            writes.push(redis::cmd("LPUSH").arg(&ids_key).arg(&id).clone());
                        }
                        Position::Last => {
                            writes.push(redis::cmd("RPUSH").arg(&ids_key).arg(&id).clone());
                        }
                        Position::Before(rel) => {
                            writes.push(
                                redis::cmd("LINSERT")
                                    .arg(&ids_key)
                                    .arg("BEFORE")
                                    .arg(rel)
                                    .arg(&id)
                                    .clone(),
                            );
                        }
                        Position::After(rel) => {
                            writes.push(
                                redis::cmd("LINSERT")
                                    .arg(&ids_key)
                                    .arg("AFTER")
                                    .arg(rel)
                                    .arg(&id)
                                    .clone(),
                            );
                        }
                    }

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if !moved {
            return Err(BrokerError::ItemDoesNotExist(id.to_string()));
        }

        self.store()
            .publish(
                &Schema::position_channel(&self.common.name),
                &format!("{id}\0{}", position.to_wire()),
            )
            .await?;
        Ok(())
    }

    pub async fn move_before(&self, rel_id: &str, id: &str) -> Result<()> {
        self.move_to(id, Position::Before(rel_id.to_string())).await
    }

    pub async fn move_after(&self, rel_id: &str, id: &str) -> Result<()> {
        self.move_to(id, Position::After(rel_id.to_string())).await
    }

    pub async fn move_first(&self, id: &str) -> Result<()> {
        self.move_to(id, Position::First).await
    }

    pub async fn move_last(&self, id: &str) -> Result<()> {
        self.move_to(id, Position::Last).await
    }

    /// Remove an item from the feed. A missing id is a silent no-op.
    pub async fn retract(&self, id: &str) -> Result<()> {
        let items_key = self.common.items_key();
        let ids_key = self.common.ids_key();
        let retract_channel = Schema::retract_channel(&self.common.name);

        self.store()
            .transaction(&[items_key.clone()], |mut conn| {
                let id = id.to_string();
                let items_key = items_key.clone();
                let ids_key = ids_key.clone();
                let retract_channel = retract_channel.clone();
                async move {
                    let exists: bool = redis::cmd("HEXISTS")
                        .arg(&items_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if !exists {
                        return Ok(TxStep::Abort(()));
                    }

                    let writes = vec![
                        redis::cmd("LREM").arg(&ids_key).arg(1).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&items_key).arg(&id).clone(),
                        redis::cmd("PUBLISH").arg(&retract_channel).arg(&id).clone(),
                    ];

                    Ok(TxStep::Commit { writes, value: () })
                }
            })
            .await
    }
}
