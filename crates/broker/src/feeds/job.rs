//! A queue whose items are not destroyed on retrieval but move through a
//! claim/cancel/stall/retry/finish state machine. Grounded on
//! `thoonk/feeds/job.py`.

use std::time::Duration;

use uuid::Uuid;

use broker_errors::{BrokerError, Result};

use crate::schema::Schema;
use crate::store::{Store, TxStep};
use crate::types::Claimed;

use super::common::FeedCommon;
use super::queue::Priority;

#[derive(Clone)]
pub struct Job {
    pub common: FeedCommon,
}

impl Job {
    pub fn new(common: FeedCommon) -> Self {
        Self { common }
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    fn store(&self) -> &Store {
        &self.common.store
    }

    /// Every id currently tracked by this job feed, in no particular order
    /// (the source's `get_ids` for jobs reads `HKEYS` over the item hash,
    /// not the FIFO list — queued, claimed, and stalled ids are all items).
    pub async fn get_ids(&self) -> Result<Vec<String>> {
        self.store().hkeys(&self.common.items_key()).await
    }

    pub async fn put(&self, payload: &str, priority: Priority) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let published_key = Schema::published(&self.common.name);

        self.store().hset(&items_key, &id, payload).await?;
        match priority {
            Priority::High => self.store().rpush(&ids_key, &id).await?,
            Priority::Normal => self.store().lpush(&ids_key, &id).await?,
        }
        let now = now_secs();
        self.store().zadd(&published_key, &id, now).await?;

        Ok(id)
    }

    /// Blocking claim of the head job. `Duration::ZERO` blocks indefinitely.
    pub async fn get(&self, timeout: Duration) -> Result<Claimed> {
        let ids_key = self.common.ids_key();
        let items_key = self.common.items_key();
        let claimed_key = Schema::claimed(&self.common.name);
        let cancelled_key = Schema::cancelled(&self.common.name);

        let id = self
            .store()
            .brpop(&ids_key, timeout)
            .await?
            .ok_or(BrokerError::Empty)?;

        self.store()
            .zadd(&claimed_key, &id, now_secs())
            .await?;

        let payload = self
            .store()
            .hget(&items_key, &id)
            .await?
            .ok_or_else(|| BrokerError::ItemDoesNotExist(id.clone()))?;

        let cancel_count = self
            .store()
            .hget(&cancelled_key, &id)
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        self.store()
            .publish(&Schema::claimed_channel(&self.common.name), &id)
            .await?;

        Ok(Claimed {
            id,
            payload,
            cancel_count,
        })
    }

    /// Mark a claimed job done, removing it. If `result` is supplied, it is
    /// both published on `job.finish:<f>` and pushed to the id's own result
    /// list for [`Job::get_result`] to block-pop — the two always happen
    /// together, never one without the other (see DESIGN.md). A miss (id
    /// not claimed) is a no-op, not an error.
    pub async fn finish(&self, id: &str, result: Option<&str>) -> Result<()> {
        let claimed_key = Schema::claimed(&self.common.name);
        let cancelled_key = Schema::cancelled(&self.common.name);
        let items_key = self.common.items_key();
        let finishes_key = Schema::finishes(&self.common.name);

        let committed = self
            .store()
            .transaction(&[claimed_key.clone()], |mut conn| {
                let id = id.to_string();
                let claimed_key = claimed_key.clone();
                let cancelled_key = cancelled_key.clone();
                let items_key = items_key.clone();
                let finishes_key = finishes_key.clone();
                async move {
                    let rank: Option<i64> = redis::cmd("ZRANK")
                        .arg(&claimed_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if rank.is_none() {
                        return Ok(TxStep::Abort(false));
                    }

                    let writes = vec![
                        redis::cmd("ZREM").arg(&claimed_key).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&cancelled_key).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&items_key).arg(&id).clone(),
                        redis::cmd("INCR").arg(&finishes_key).clone(),
                    ];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if committed {
            if let Some(result) = result {
                self.store()
                    .publish(
                        &Schema::finish_channel(&self.common.name),
                        &format!("{id}\0{result}"),
                    )
                    .await?;
                self.store()
                    .lpush(&Schema::finished(&self.common.name, id), result)
                    .await?;
            }
        }

        Ok(())
    }

    /// Block-pop a result pushed by a `finish(id, Some(result))` call.
    pub async fn get_result(&self, id: &str, timeout: Duration) -> Result<String> {
        self.store()
            .brpop(&Schema::finished(&self.common.name, id), timeout)
            .await?
            .ok_or(BrokerError::Empty)
    }

    /// Requeue a claimed job at the head of the queue, bumping its cancel
    /// counter. A miss is a no-op.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let claimed_key = Schema::claimed(&self.common.name);
        let cancelled_key = Schema::cancelled(&self.common.name);
        let ids_key = self.common.ids_key();
        let cancelled_channel = Schema::cancelled_channel(&self.common.name);

        let committed = self
            .store()
            .transaction(&[claimed_key.clone()], |mut conn| {
                let id = id.to_string();
                let claimed_key = claimed_key.clone();
                let cancelled_key = cancelled_key.clone();
                let ids_key = ids_key.clone();
                async move {
                    let rank: Option<i64> = redis::cmd("ZRANK")
                        .arg(&claimed_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if rank.is_none() {
                        return Ok(TxStep::Abort(false));
                    }

                    let writes = vec![
                        redis::cmd("HINCRBY").arg(&cancelled_key).arg(&id).arg(1).clone(),
                        redis::cmd("LPUSH").arg(&ids_key).arg(&id).clone(),
                        redis::cmd("ZREM").arg(&claimed_key).arg(&id).clone(),
                    ];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if committed {
            self.store().publish(&cancelled_channel, id).await?;
        }
        Ok(())
    }

    /// Move a claimed job to the stalled set, clearing its cancel counter.
    /// A miss is a no-op.
    pub async fn stall(&self, id: &str) -> Result<()> {
        let claimed_key = Schema::claimed(&self.common.name);
        let cancelled_key = Schema::cancelled(&self.common.name);
        let stalled_key = Schema::stalled(&self.common.name);
        let published_key = Schema::published(&self.common.name);
        let stalled_channel = Schema::stalled_channel(&self.common.name);

        let committed = self
            .store()
            .transaction(&[claimed_key.clone()], |mut conn| {
                let id = id.to_string();
                let claimed_key = claimed_key.clone();
                let cancelled_key = cancelled_key.clone();
                let stalled_key = stalled_key.clone();
                let published_key = published_key.clone();
                async move {
                    let rank: Option<i64> = redis::cmd("ZRANK")
                        .arg(&claimed_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if rank.is_none() {
                        return Ok(TxStep::Abort(false));
                    }

                    let writes = vec![
                        redis::cmd("ZREM").arg(&claimed_key).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&cancelled_key).arg(&id).clone(),
                        redis::cmd("SADD").arg(&stalled_key).arg(&id).clone(),
                        redis::cmd("ZREM").arg(&published_key).arg(&id).clone(),
                    ];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if committed {
            self.store().publish(&stalled_channel, id).await?;
        }
        Ok(())
    }

    /// Move a stalled job back to the queue. A miss is a no-op.
    pub async fn retry(&self, id: &str) -> Result<()> {
        let stalled_key = Schema::stalled(&self.common.name);
        let ids_key = self.common.ids_key();
        let published_key = Schema::published(&self.common.name);
        let retried_channel = Schema::retried_channel(&self.common.name);

        let committed = self
            .store()
            .transaction(&[stalled_key.clone()], |mut conn| {
                let id = id.to_string();
                let stalled_key = stalled_key.clone();
                let ids_key = ids_key.clone();
                let published_key = published_key.clone();
                async move {
                    let is_member: bool = redis::cmd("SISMEMBER")
                        .arg(&stalled_key)
                        .arg(&id)
                        .query_async(&mut conn)
                        .await?;

                    if !is_member {
                        return Ok(TxStep::Abort(false));
                    }

                    let writes = vec![
                        redis::cmd("SREM").arg(&stalled_key).arg(&id).clone(),
                        redis::cmd("LPUSH").arg(&ids_key).arg(&id).clone(),
                        redis::cmd("ZADD")
                            .arg(&published_key)
                            .arg(now_secs())
                            .arg(&id)
                            .clone(),
                    ];

                    Ok(TxStep::Commit {
                        writes,
                        value: true,
                    })
                }
            })
            .await?;

        if committed {
            self.store().publish(&retried_channel, id).await?;
        }
        Ok(())
    }

    /// Remove an id from every job-state key, wherever it currently sits.
    pub async fn retract(&self, id: &str) -> Result<()> {
        let items_key = self.common.items_key();
        let cancelled_key = Schema::cancelled(&self.common.name);
        let published_key = Schema::published(&self.common.name);
        let stalled_key = Schema::stalled(&self.common.name);
        let claimed_key = Schema::claimed(&self.common.name);
        let ids_key = self.common.ids_key();
        let finished_key = Schema::finished(&self.common.name, id);

        self.store()
            .transaction(&[items_key.clone()], |mut conn| {
                let id = id.to_string();
                let items_key = items_key.clone();
                let cancelled_key = cancelled_key.clone();
                let published_key = published_key.clone();
                let stalled_key = stalled_key.clone();
                let claimed_key = claimed_key.clone();
                let ids_key = ids_key.clone();
                let finished_key = finished_key.clone();
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
                        redis::cmd("HDEL").arg(&items_key).arg(&id).clone(),
                        redis::cmd("HDEL").arg(&cancelled_key).arg(&id).clone(),
                        redis::cmd("ZREM").arg(&published_key).arg(&id).clone(),
                        redis::cmd("SREM").arg(&stalled_key).arg(&id).clone(),
                        redis::cmd("ZREM").arg(&claimed_key).arg(&id).clone(),
                        redis::cmd("LREM").arg(&ids_key).arg(1).arg(&id).clone(),
                        redis::cmd("DEL").arg(&finished_key).clone(),
                    ];

                    Ok(TxStep::Commit { writes, value: () })
                }
            })
            .await
    }

    /// Recover ids left orphaned by a crashed worker: anything in the item
    /// hash that's in none of queued/claimed/stalled goes back to the head
    /// of the queue. Reconciliation order follows whatever Redis returns
    /// from `HKEYS`; no additional sort is imposed or required.
    pub async fn maintenance(&self) -> Result<()> {
        let items_key = self.common.items_key();
        let ids_key = self.common.ids_key();
        let claimed_key = Schema::claimed(&self.common.name);
        let stalled_key = Schema::stalled(&self.common.name);

        let all_ids = self.store().hkeys(&items_key).await?;
        let queued = self.store().lrange(&ids_key, 0, -1).await?;
        let claimed = self.store().zrange(&claimed_key, 0, -1).await?;
        let stalled = self.store().smembers(&stalled_key).await?;

        for id in all_ids {
            let tracked =
                queued.contains(&id) || claimed.contains(&id) || stalled.contains(&id);
            if !tracked {
                self.store().lpush(&ids_key, &id).await?;
            }
        }

        Ok(())
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
