//! A distributed feed, queue, and job broker layered on Redis.
//!
//! Clients create named *feeds* of one of several types; each type gives a
//! specific ordering, persistence, and delivery discipline over the same
//! Redis-backed primitives. Every process connected to the same Redis
//! instance observes one consistent view of every feed, and receives
//! real-time notifications of create/delete/config/publish/retract/edit/
//! position and job lifecycle events via the [`Broker`]'s background
//! listener.
//!
//! # Example
//!
//! ```no_run
//! use broker::{Broker, BrokerConfig, FeedType};
//! use broker::feeds::Priority;
//!
//! #[tokio::main]
//! async fn main() -> broker_errors::Result<()> {
//!     let broker = Broker::connect(BrokerConfig::from_env()).await?;
//!
//!     let handle = broker.queue("jobs").await?;
//!     let queue = handle.as_queue().expect("jobs is a queue feed");
//!     queue.put("hello", Priority::Normal).await?;
//!     let payload = queue.get(std::time::Duration::from_secs(5)).await?;
//!     assert_eq!(payload, "hello");
//!
//!     broker.close().await?;
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod broker;
pub mod cache;
pub mod config;
pub mod feeds;
pub mod listener;
pub mod schema;
pub mod store;
pub mod types;

pub use acl::{Acl, PermissiveAcl};
pub use broker::Broker;
pub use broker_errors::{BrokerError, Result};
pub use cache::ConfigCache;
pub use config::BrokerConfig;
pub use feeds::FeedHandle;
pub use listener::{Handler, HandlerRegistry, Listener};
pub use store::Store;
pub use types::{Claimed, Event, EventKind, FeedConfig, FeedType, Item, Position};
