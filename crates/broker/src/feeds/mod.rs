//! The five feed-type variants, sharing [`common::FeedCommon`] for name,
//! store handle, and config caching.

pub mod base;
pub mod common;
pub mod job;
pub mod queue;
pub mod serialized;
pub mod sorted;

pub use base::Feed;
pub use job::Job;
pub use queue::{Priority, Queue};
pub use serialized::SerializedQueue;
pub use sorted::SortedFeed;

use crate::store::Store;
use crate::types::FeedConfig;
use common::FeedCommon;

/// A feed handle, dispatched on its stored `type`. Modeled as an enum over
/// capabilities rather than a trait object, since each variant's operations
/// differ (only `Feed` and `SortedFeed` share publish/retract shape, and
/// even those diverge in event payloads).
pub enum FeedHandle {
    Feed(Feed),
    Queue(Queue),
    Job(Job),
    Sorted(SortedFeed),
}

impl FeedHandle {
    pub fn construct(
        name: impl Into<String>,
        store: Store,
        config: FeedConfig,
    ) -> FeedHandle {
        let name = name.into();
        match config.feed_type() {
            crate::types::FeedType::Queue => {
                FeedHandle::Queue(Queue::new(FeedCommon::new(name, store, config)))
            }
            crate::types::FeedType::Job => {
                FeedHandle::Job(Job::new(FeedCommon::new(name, store, config)))
            }
            crate::types::FeedType::SortedFeed => {
                FeedHandle::Sorted(SortedFeed::new(FeedCommon::new(name, store, config)))
            }
            // Feed and any unrecognized custom type fall back to the base
            // feed behavior; a real custom type would be produced by a
            // registered factory before reaching this dispatch.
            crate::types::FeedType::Feed | crate::types::FeedType::Custom(_) => {
                FeedHandle::Feed(Feed::new(FeedCommon::new(name, store, config)))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FeedHandle::Feed(f) => f.name(),
            FeedHandle::Queue(q) => q.name(),
            FeedHandle::Job(j) => j.name(),
            FeedHandle::Sorted(s) => s.name(),
        }
    }

    /// The channels this feed's events are broadcast on, for the listener
    /// to subscribe to when the feed is created or discovered.
    pub fn channels(&self) -> Vec<String> {
        let name = self.name();
        match self {
            FeedHandle::Feed(_) => vec![
                crate::schema::Schema::publish_channel(name),
                crate::schema::Schema::edit_channel(name),
                crate::schema::Schema::retract_channel(name),
            ],
            FeedHandle::Queue(_) => vec![],
            FeedHandle::Job(_) => vec![
                crate::schema::Schema::publish_channel(name),
                crate::schema::Schema::retract_channel(name),
                crate::schema::Schema::finish_channel(name),
                crate::schema::Schema::claimed_channel(name),
                crate::schema::Schema::cancelled_channel(name),
                crate::schema::Schema::stalled_channel(name),
                crate::schema::Schema::retried_channel(name),
            ],
            FeedHandle::Sorted(_) => vec![
                crate::schema::Schema::publish_channel(name),
                crate::schema::Schema::retract_channel(name),
                crate::schema::Schema::position_channel(name),
            ],
        }
    }

    pub fn as_feed(&self) -> Option<&Feed> {
        match self {
            FeedHandle::Feed(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_queue(&self) -> Option<&Queue> {
        match self {
            FeedHandle::Queue(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            FeedHandle::Job(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_sorted(&self) -> Option<&SortedFeed> {
        match self {
            FeedHandle::Sorted(s) => Some(s),
            _ => None,
        }
    }
}
