//! Key and channel naming for every feed, mirroring the corpus's
//! associated-function-only `CacheKey` builder: no state, one function per
//! name, feed name in, key or channel name out.

/// Global set of known feed names.
pub const FEEDS: &str = "feeds";

/// Broadcast channel: a feed was created. Payload `name\0instance`.
pub const NEWFEED: &str = "newfeed";

/// Broadcast channel: a feed was deleted. Payload `name\0instance`.
pub const DELFEED: &str = "delfeed";

/// Broadcast channel: a feed's config changed. Payload `name\0instance`.
pub const CONFFEED: &str = "conffeed";

/// `listener.quit:<instance>` — a process-private channel. `Listener::spawn`
/// subscribes to its own instance's channel; `Listener::close` publishes on
/// it so the running task unsubscribes and exits, matching the corpus's
/// `Pubsub.listen`/quit-channel pairing rather than relying solely on an
/// in-process signal.
pub fn quit_channel(instance: &str) -> String {
    format!("listener.quit:{instance}")
}

/// Key and channel builder for a single feed, given its name.
pub struct Schema;

impl Schema {
    /// `feed.config:<f>` — the feed's configuration, stored as a hash.
    pub fn config(feed: &str) -> String {
        format!("feed.config:{feed}")
    }

    /// `feed.ids:<f>` — ordered ids (list, or sorted set for sorted feeds).
    pub fn ids(feed: &str) -> String {
        format!("feed.ids:{feed}")
    }

    /// `feed.items:<f>` — id -> payload hash.
    pub fn items(feed: &str) -> String {
        format!("feed.items:{feed}")
    }

    /// `feed.publishes:<f>` — monotonic publish counter.
    pub fn publishes(feed: &str) -> String {
        format!("feed.publishes:{feed}")
    }

    /// `feed.idincr:<f>` — id generator for sorted feeds.
    pub fn idincr(feed: &str) -> String {
        format!("feed.idincr:{feed}")
    }

    /// `feed.published:<f>` — job publish times, sorted set.
    pub fn published(feed: &str) -> String {
        format!("feed.published:{feed}")
    }

    /// `feed.claimed:<f>` — job claim times, sorted set.
    pub fn claimed(feed: &str) -> String {
        format!("feed.claimed:{feed}")
    }

    /// `feed.stalled:<f>` — stalled job ids, set.
    pub fn stalled(feed: &str) -> String {
        format!("feed.stalled:{feed}")
    }

    /// `feed.running:<f>` — running job id -> start time, hash.
    pub fn running(feed: &str) -> String {
        format!("feed.running:{feed}")
    }

    /// `feed.cancelled:<f>` — job id -> cancel count, hash.
    pub fn cancelled(feed: &str) -> String {
        format!("feed.cancelled:{feed}")
    }

    /// `feed.finished:<f>\0<id>` — per-job result list, opted into only when
    /// `finish` is called with a result.
    pub fn finished(feed: &str, id: &str) -> String {
        format!("feed.finished:{feed}\0{id}")
    }

    /// `feed.finishes:<f>` — count of jobs finished, mirrors `publishes`.
    pub fn finishes(feed: &str) -> String {
        format!("feed.finishes:{feed}")
    }

    /// `feed.publish:<f>` channel — publish/edit broadcast.
    pub fn publish_channel(feed: &str) -> String {
        format!("feed.publish:{feed}")
    }

    /// `feed.edit:<f>` channel.
    pub fn edit_channel(feed: &str) -> String {
        format!("feed.edit:{feed}")
    }

    /// `feed.retract:<f>` channel.
    pub fn retract_channel(feed: &str) -> String {
        format!("feed.retract:{feed}")
    }

    /// `feed.position:<f>` channel, sorted feeds only.
    pub fn position_channel(feed: &str) -> String {
        format!("feed.position:{feed}")
    }

    /// `job.finish:<f>` channel.
    pub fn finish_channel(feed: &str) -> String {
        format!("job.finish:{feed}")
    }

    /// `feed.claimed:<f>` channel (job claimed, distinct use of the same
    /// name as the claimed sorted-set key — disambiguated by whether it's
    /// used as a `PUBLISH` target or a `ZADD` target).
    pub fn claimed_channel(feed: &str) -> String {
        format!("feed.claimed:{feed}")
    }

    /// `feed.cancelled:<f>` channel.
    pub fn cancelled_channel(feed: &str) -> String {
        format!("feed.cancelled:{feed}")
    }

    /// `feed.stalled:<f>` channel.
    pub fn stalled_channel(feed: &str) -> String {
        format!("feed.stalled:{feed}")
    }

    /// `feed.retried:<f>` channel.
    pub fn retried_channel(feed: &str) -> String {
        format!("feed.retried:{feed}")
    }

    /// Every data key owned by a feed, for deletion on `delete_feed`. Event
    /// channels aren't included since channels aren't deleted, only
    /// unsubscribed from.
    pub fn all_keys(feed: &str) -> Vec<String> {
        vec![
            Self::config(feed),
            Self::ids(feed),
            Self::items(feed),
            Self::publishes(feed),
            Self::idincr(feed),
            Self::published(feed),
            Self::claimed(feed),
            Self::stalled(feed),
            Self::running(feed),
            Self::cancelled(feed),
            Self::finishes(feed),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_key_names() {
        assert_eq!(Schema::config("alerts"), "feed.config:alerts");
        assert_eq!(Schema::ids("alerts"), "feed.ids:alerts");
        assert_eq!(Schema::finished("alerts", "42"), "feed.finished:alerts\u{0}42");
    }

    #[test]
    fn all_keys_covers_every_per_feed_key() {
        let keys = Schema::all_keys("t");
        assert!(keys.contains(&"feed.config:t".to_string()));
        assert!(keys.contains(&"feed.cancelled:t".to_string()));
        assert_eq!(keys.len(), 11);
    }
}
