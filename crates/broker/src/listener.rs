//! Background subscriber task. Owns the one `redis::aio::PubSub` connection
//! in the process, maintains its subscriptions as feeds come and go, and
//! fans decoded events out to registered handlers. Grounded on
//! `thoonk/pubsub.py`'s `Pubsub.listen` for the subscription-maintenance
//! shape and the corpus's `InvalidationSubscriber::subscribe` for the
//! spawn/stream/dispatch shape.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use redis_store::RedisStore;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use broker_errors::{BrokerError, Result};

use crate::cache::ConfigCache;
use crate::schema::{self, CONFFEED, DELFEED, NEWFEED};
use crate::store::Store;
use crate::types::{Event, EventKind, Position};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Per-event-kind handler lists, invoked by the listener as events arrive.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, kind: EventKind, handler: Handler) {
        self.handlers.lock().await.entry(kind).or_default().push(handler);
    }

    pub async fn clear(&self, kind: EventKind) {
        self.handlers.lock().await.remove(&kind);
    }

    async fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let handlers = self.handlers.lock().await;
        let Some(list) = handlers.get(&kind) else {
            return;
        };
        for handler in list {
            let fut = handler(event.clone());
            if let Err(err) = fut.await {
                error!(feed = event.feed(), ?kind, error = %err, "event handler failed");
            }
        }
    }
}

/// Handle to the running listener task. Dropping or calling [`Listener::close`]
/// tears it down.
pub struct Listener {
    quit: watch::Sender<()>,
    quit_channel: String,
    store: Store,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Spawn the listener on its own task. Subscribes to the three global
    /// feed-lifecycle channels, this instance's private quit channel, and
    /// every existing feed's own channels.
    pub async fn spawn(
        store: &RedisStore,
        cache: Arc<ConfigCache>,
        handlers: Arc<HandlerRegistry>,
        feed_store: Store,
    ) -> Result<Listener> {
        let mut pubsub = store.new_pubsub_connection().await?;
        pubsub.subscribe(NEWFEED).await?;
        pubsub.subscribe(DELFEED).await?;
        pubsub.subscribe(CONFFEED).await?;

        let quit_channel = schema::quit_channel(&cache.instance);
        pubsub.subscribe(&quit_channel).await?;

        let existing = feed_store.smembers("feeds").await?;
        for feed in &existing {
            if let Ok(handle) = cache.get(feed).await {
                for channel in handle.channels() {
                    pubsub.subscribe(&channel).await?;
                }
            }
        }

        let (quit_tx, mut quit_rx) = watch::channel(());
        // Mark the initial value as seen so only an explicit send trips it.
        quit_rx.borrow_and_update();

        let task_quit_channel = quit_channel.clone();
        let handle = tokio::spawn(async move {
            info!("listener started");
            loop {
                // A fresh `on_message()` each iteration reads exactly one
                // message without holding a borrow across the `subscribe`
                // calls a `newfeed`/`delfeed` event may need to issue.
                let next = {
                    let mut stream = pubsub.on_message();
                    tokio::select! {
                        _ = quit_rx.changed() => None,
                        msg = stream.next() => msg,
                    }
                };

                let Some(msg) = next else {
                    break;
                };

                let channel: String = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(channel, error = %err, "failed to decode pub/sub payload");
                        continue;
                    }
                };

                match channel.as_str() {
                    _ if channel == task_quit_channel => {
                        debug!("received quit signal on private channel");
                        break;
                    }
                    NEWFEED => {
                        if let Some((feed, _instance)) = split_once_nul(&payload) {
                            if let Ok(handle) = cache.get(feed).await {
                                for chan in handle.channels() {
                                    if let Err(err) = pubsub.subscribe(&chan).await {
                                        warn!(feed, error = %err, "failed to subscribe to new feed channel");
                                    }
                                }
                            }
                            handlers
                                .dispatch(Event::Create {
                                    feed: feed.to_string(),
                                })
                                .await;
                        }
                    }
                    DELFEED => {
                        if let Some((feed, instance)) = split_once_nul(&payload) {
                            cache.invalidate(feed, instance, true).await;
                            handlers
                                .dispatch(Event::Delete {
                                    feed: feed.to_string(),
                                })
                                .await;
                        }
                    }
                    CONFFEED => {
                        if let Some((feed, instance)) = split_once_nul(&payload) {
                            cache.invalidate(feed, instance, false).await;
                            handlers
                                .dispatch(Event::Conf {
                                    feed: feed.to_string(),
                                })
                                .await;
                        }
                    }
                    other => {
                        if let Some(event) = decode_feed_event(other, &payload) {
                            handlers.dispatch(event).await;
                        } else {
                            debug!(channel = other, "ignoring message on unrecognized channel");
                        }
                    }
                }
            }
            info!("listener stopped");
        });

        Ok(Listener {
            quit: quit_tx,
            quit_channel,
            store: feed_store,
            handle,
        })
    }

    /// Publish on the private quit channel and flip the in-process signal,
    /// then wait for the task to exit. The channel publish is what lets a
    /// handle other than the one that spawned this listener — or the same
    /// process after losing its `Listener` value — still close it down;
    /// the local `watch` send just avoids waiting on a network round trip
    /// when this same handle is doing the closing.
    pub async fn close(self) -> Result<()> {
        let _ = self.quit.send(());
        self.store.publish(&self.quit_channel, "").await?;
        self.handle
            .await
            .map_err(|_| BrokerError::NotListening)?;
        Ok(())
    }
}

fn split_once_nul(payload: &str) -> Option<(&str, &str)> {
    payload.split_once('\0')
}

/// Decode a per-feed channel name and payload into an [`Event`]. Pure and
/// unit-testable without a live connection.
fn decode_feed_event(channel: &str, payload: &str) -> Option<Event> {
    if let Some(feed) = strip_feed(channel, "feed.publish:") {
        let (id, item) = split_once_nul(payload)?;
        return Some(Event::Publish {
            feed: feed.to_string(),
            id: id.to_string(),
            item: item.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.edit:") {
        let (id, item) = split_once_nul(payload)?;
        return Some(Event::Edit {
            feed: feed.to_string(),
            id: id.to_string(),
            item: item.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.retract:") {
        return Some(Event::Retract {
            feed: feed.to_string(),
            id: payload.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.position:") {
        let (id, raw_position) = split_once_nul(payload)?;
        let position = Position::from_wire(raw_position)?;
        return Some(Event::Position {
            feed: feed.to_string(),
            id: id.to_string(),
            position,
        });
    }
    if let Some(feed) = strip_feed(channel, "job.finish:") {
        let (id, result) = split_once_nul(payload)?;
        return Some(Event::Finish {
            feed: feed.to_string(),
            id: id.to_string(),
            result: result.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.claimed:") {
        return Some(Event::Claimed {
            feed: feed.to_string(),
            id: payload.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.cancelled:") {
        return Some(Event::Cancelled {
            feed: feed.to_string(),
            id: payload.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.stalled:") {
        return Some(Event::Stalled {
            feed: feed.to_string(),
            id: payload.to_string(),
        });
    }
    if let Some(feed) = strip_feed(channel, "feed.retried:") {
        return Some(Event::Retried {
            feed: feed.to_string(),
            id: payload.to_string(),
        });
    }
    None
}

fn strip_feed<'a>(channel: &'a str, prefix: &str) -> Option<&'a str> {
    channel.strip_prefix(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_publish_event() {
        let event = decode_feed_event("feed.publish:alerts", "42\0hello").unwrap();
        match event {
            Event::Publish { feed, id, item } => {
                assert_eq!(feed, "alerts");
                assert_eq!(id, "42");
                assert_eq!(item, "hello");
            }
            _ => panic!("expected Publish"),
        }
    }

    #[test]
    fn decodes_retract_event_with_bare_id_payload() {
        let event = decode_feed_event("feed.retract:alerts", "42").unwrap();
        match event {
            Event::Retract { feed, id } => {
                assert_eq!(feed, "alerts");
                assert_eq!(id, "42");
            }
            _ => panic!("expected Retract"),
        }
    }

    #[test]
    fn decodes_position_event() {
        let event = decode_feed_event("feed.position:sorted", "7\0:end").unwrap();
        match event {
            Event::Position { feed, id, position } => {
                assert_eq!(feed, "sorted");
                assert_eq!(id, "7");
                assert_eq!(position, Position::Last);
            }
            _ => panic!("expected Position"),
        }
    }

    #[test]
    fn unrecognized_channel_decodes_to_none() {
        assert!(decode_feed_event("something.else:x", "payload").is_none());
    }

    #[test]
    fn split_once_nul_splits_on_the_null_byte() {
        assert_eq!(split_once_nul("a\0b"), Some(("a", "b")));
        assert_eq!(split_once_nul("no-separator"), None);
    }
}
