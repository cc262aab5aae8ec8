//! `SerializedQueue<T>`: a generic wrapper over [`Queue`] that transparently
//! (de)serializes structured payloads as JSON, replacing the source
//! implementation's Python-`pickle` encoding (pickle has no idiomatic Rust
//! analogue). Not a distinct [`crate::types::FeedType`] — the wire format
//! and Redis-side behavior are identical to a plain queue.

use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use broker_errors::Result;

use super::queue::{Priority, Queue};

pub struct SerializedQueue<T> {
    inner: Queue,
    _marker: PhantomData<T>,
}

impl<T> SerializedQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(inner: Queue) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn put(&self, item: &T, priority: Priority) -> Result<String> {
        let payload = serde_json::to_string(item)?;
        self.inner.put(&payload, priority).await
    }

    pub async fn get(&self, timeout: Duration) -> Result<T> {
        let payload = self.inner.get(timeout).await?;
        Ok(serde_json::from_str(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Task {
        kind: String,
        attempt: u32,
    }

    #[test]
    fn task_round_trips_through_json() {
        let task = Task {
            kind: "resize".to_string(),
            attempt: 1,
        };
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(task, decoded);
    }
}
