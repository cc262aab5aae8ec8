//! Thin typed wrapper over the shared `ConnectionManager`: every primitive
//! Redis operation a feed type needs, plus the hand-rolled `WATCH`/`MULTI`/
//! `EXEC` retry loop that stands in for the sync API's `redis::transaction`
//! (the async crate has no equivalent), built the same way the corpus's
//! `versioning::get_or_compute` issues its own WATCH/MULTI/EXEC by hand.

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Value;
use redis_store::with_timeout;
use tracing::{debug, trace};

use broker_errors::Result;
use redis_store::SharedConnectionManager;

/// What a transaction body asks the adapter to do once its read phase is
/// done: either commit a batch of write commands and return a value, or
/// bail out without writing anything (e.g. a no-op retract on a missing id).
pub enum TxStep<T> {
    Commit { writes: Vec<redis::Cmd>, value: T },
    Abort(T),
}

/// Store adapter: one per broker instance, cloned cheaply (it only wraps
/// the shared `Arc<Mutex<ConnectionManager>>`).
#[derive(Clone)]
pub struct Store {
    manager: SharedConnectionManager,
}

impl Store {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }

    async fn conn(&self) -> ConnectionManager {
        self.manager.lock().await.clone()
    }

    // ---- strings / counters ----

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("GET").arg(key).query_async(&mut conn)).await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(redis::cmd("SET").arg(key).arg(value).query_async(&mut conn)).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(redis::cmd("DEL").arg(key).query_async::<_, ()>(&mut conn)).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await;
        let n: i64 = with_timeout(redis::cmd("EXISTS").arg(key).query_async(&mut conn)).await?;
        Ok(n > 0)
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("INCR").arg(key).query_async(&mut conn)).await?)
    }

    // ---- hashes ----

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn)).await?)
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("HSET")
                .arg(key)
                .arg(field)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("HDEL")
                .arg(key)
                .arg(field)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("HEXISTS").arg(key).arg(field).query_async(&mut conn)).await?)
    }

    pub async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("HKEYS").arg(key).query_async(&mut conn)).await?)
    }

    pub async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("HGETALL").arg(key).query_async(&mut conn)).await?)
    }

    pub async fn hincrby(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        let mut conn = self.conn().await;
        Ok(with_timeout(
            redis::cmd("HINCRBY")
                .arg(key)
                .arg(field)
                .arg(by)
                .query_async(&mut conn),
        )
        .await?)
    }

    // ---- sets ----

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("SADD")
                .arg(key)
                .arg(member)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("SREM")
                .arg(key)
                .arg(member)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await;
        Ok(
            with_timeout(redis::cmd("SISMEMBER").arg(key).arg(member).query_async(&mut conn))
                .await?,
        )
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("SMEMBERS").arg(key).query_async(&mut conn)).await?)
    }

    // ---- lists ----

    pub async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("LPUSH")
                .arg(key)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("RPUSH")
                .arg(key)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(
            redis::cmd("LRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .query_async(&mut conn),
        )
        .await?)
    }

    pub async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("LREM")
                .arg(key)
                .arg(count)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn linsert_before(&self, key: &str, pivot: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("LINSERT")
                .arg(key)
                .arg("BEFORE")
                .arg(pivot)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn linsert_after(&self, key: &str, pivot: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("LINSERT")
                .arg(key)
                .arg("AFTER")
                .arg(pivot)
                .arg(value)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn llen(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("LLEN").arg(key).query_async(&mut conn)).await?)
    }

    /// Blocking right-pop with a timeout; `Duration::ZERO` blocks indefinitely.
    /// Never wrapped in [`with_timeout`] — this call's wait is caller-directed,
    /// not a symptom of a wedged connection.
    pub async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.conn().await;
        let secs = timeout.as_secs_f64();
        trace!(key, secs, "BRPOP");
        let reply: Option<(String, String)> =
            redis::cmd("BRPOP").arg(key).arg(secs).query_async(&mut conn).await?;
        Ok(reply.map(|(_key, value)| value))
    }

    // ---- sorted sets ----

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("ZADD")
                .arg(key)
                .arg(score)
                .arg(member)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("ZREM")
                .arg(key)
                .arg(member)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    pub async fn zrank(&self, key: &str, member: &str) -> Result<Option<i64>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("ZRANK").arg(key).arg(member).query_async(&mut conn)).await?)
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn().await;
        Ok(with_timeout(
            redis::cmd("ZRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .query_async(&mut conn),
        )
        .await?)
    }

    // ---- pub/sub (publish side only; subscribe lives on the Listener's
    // dedicated connection) ----

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn().await;
        with_timeout(
            redis::cmd("PUBLISH")
                .arg(channel)
                .arg(payload)
                .query_async::<_, ()>(&mut conn),
        )
        .await?;
        Ok(())
    }

    // ---- optional scripted fast path (unused by the shipped feed types;
    // a documented extension point per DESIGN.md) ----

    pub async fn script_load(&self, script: &str) -> Result<String> {
        let mut conn = self.conn().await;
        Ok(with_timeout(redis::cmd("SCRIPT").arg("LOAD").arg(script).query_async(&mut conn)).await?)
    }

    pub async fn eval_sha(&self, sha: &str, keys: &[String], args: &[String]) -> Result<Value> {
        let mut conn = self.conn().await;
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for k in keys {
            cmd.arg(k);
        }
        for a in args {
            cmd.arg(a);
        }
        Ok(with_timeout(cmd.query_async(&mut conn)).await?)
    }

    /// Run `body` under an optimistic-concurrency transaction watching
    /// `watch_keys`. `body` receives a fresh clone of the connection to
    /// read the watched snapshot and returns a [`TxStep`]: [`TxStep::Commit`]
    /// queues its write commands inside `MULTI`/`EXEC` (retrying the whole
    /// body on a lost watch), [`TxStep::Abort`] unwatches and returns without
    /// writing.
    ///
    /// Holds the shared connection's mutex for the entire `WATCH`→body→
    /// `MULTI`→writes→`EXEC` sequence — the clone handed to `body` still
    /// shares the one underlying connection, so any other caller issuing a
    /// command mid-sequence would otherwise interleave onto the same
    /// connection and get swept into this `MULTI` block or corrupt the
    /// `WATCH`. Dropping the guard only between retries (not within one) is
    /// what gives the `Arc<Mutex<_>>` in `redis-store` its actual purpose.
    pub async fn transaction<T, F, Fut>(&self, watch_keys: &[String], mut body: F) -> Result<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<TxStep<T>>>,
    {
        loop {
            let mut guard = self.manager.lock().await;
            let mut conn = guard.clone();

            if !watch_keys.is_empty() {
                let mut watch = redis::cmd("WATCH");
                for k in watch_keys {
                    watch.arg(k.as_str());
                }
                with_timeout(watch.query_async::<_, ()>(&mut conn)).await?;
            }

            let step = match body(conn.clone()).await {
                Ok(step) => step,
                Err(err) => {
                    let _ = redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await;
                    return Err(err);
                }
            };

            match step {
                TxStep::Abort(value) => {
                    if !watch_keys.is_empty() {
                        let _ = redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await;
                    }
                    return Ok(value);
                }
                TxStep::Commit { writes, value } => {
                    with_timeout(redis::cmd("MULTI").query_async::<_, ()>(&mut conn)).await?;
                    for write in &writes {
                        with_timeout(write.query_async::<_, ()>(&mut conn)).await?;
                    }
                    let exec: Option<Vec<Value>> =
                        with_timeout(redis::cmd("EXEC").query_async(&mut conn)).await?;

                    if exec.is_some() {
                        return Ok(value);
                    }
                    debug!(?watch_keys, "transaction lost its watch, retrying");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_step_variants_construct() {
        let commit: TxStep<u8> = TxStep::Commit {
            writes: vec![redis::cmd("PING")],
            value: 1,
        };
        assert!(matches!(commit, TxStep::Commit { value: 1, .. }));

        let abort: TxStep<u8> = TxStep::Abort(0);
        assert!(matches!(abort, TxStep::Abort(0)));
    }
}
