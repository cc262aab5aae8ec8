//! Error taxonomy shared by every layer of the feed/queue/job broker.
//!
//! A single `thiserror`-derived enum is used everywhere rather than one type
//! per crate, since callers need to match on `FeedDoesNotExist` / `Empty` /
//! etc. regardless of which layer raised it.

use thiserror::Error;

/// The named failure kinds of the broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Attempt to create a feed whose name is already a member of `feeds`.
    #[error("feed already exists: {0}")]
    FeedExists(String),

    /// Operation targeting a feed name that is not a member of `feeds`.
    #[error("feed does not exist: {0}")]
    FeedDoesNotExist(String),

    /// Retract or edit of an unknown id in a feed that distinguishes them.
    #[error("item does not exist: {0}")]
    ItemDoesNotExist(String),

    /// A blocking retrieval (`get`, `get_result`) timed out.
    #[error("blocking retrieval timed out")]
    Empty,

    /// finish/cancel/stall targeting a job id that isn't claimed.
    #[error("job does not exist or is not in the expected state: {0}")]
    JobDoesNotExist(String),

    /// retry targeting a job id that isn't stalled.
    #[error("job is not pending: {0}")]
    JobNotPending(String),

    /// Handler registration when the broker wasn't configured to listen.
    #[error("broker instance is not listening for events")]
    NotListening,

    /// A position-move or insert referenced an id that has no position
    /// (used by sorted feeds; distinct from ItemDoesNotExist because the
    /// missing id here is the *reference* point, not the subject).
    #[error("reference item does not exist: {0}")]
    ReferenceDoesNotExist(String),

    /// Malformed wire payload received on a pub/sub channel.
    #[error("malformed event payload on channel {channel}: {detail}")]
    InvalidEvent { channel: String, detail: String },

    /// Underlying store failure that isn't one of the above.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization failure (config JSON, `SerializedQueue` payloads).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_feed() {
        let err = BrokerError::FeedExists("alerts".to_string());
        assert_eq!(err.to_string(), "feed already exists: alerts");

        let err = BrokerError::FeedDoesNotExist("alerts".to_string());
        assert_eq!(err.to_string(), "feed does not exist: alerts");
    }

    #[test]
    fn empty_has_a_fixed_message() {
        assert_eq!(
            BrokerError::Empty.to_string(),
            "blocking retrieval timed out"
        );
    }

    #[test]
    fn serde_error_converts_via_from() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: BrokerError = json_err.into();
        assert!(matches!(err, BrokerError::Serialization(_)));
    }
}
