//! Shared value types used across feed kinds, the broker facade, and the
//! listener's wire decoding.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An item as stored and handed back to callers: an opaque id plus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub payload: String,
}

/// A job handed to a worker by `Job::get`: payload plus how many times it
/// has previously been cancelled and re-dispatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claimed {
    pub id: String,
    pub payload: String,
    pub cancel_count: u64,
}

/// The recognized feed type discriminant, stored under the `type` config key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedType {
    Feed,
    Queue,
    Job,
    SortedFeed,
    /// An extension type registered at runtime under a name not known here.
    Custom(String),
}

impl Serialize for FeedType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FeedType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FeedType::parse(&raw))
    }
}

impl FeedType {
    pub fn as_str(&self) -> &str {
        match self {
            FeedType::Feed => "feed",
            FeedType::Queue => "queue",
            FeedType::Job => "job",
            FeedType::SortedFeed => "sorted_feed",
            FeedType::Custom(name) => name,
        }
    }

    pub fn parse(raw: &str) -> FeedType {
        match raw {
            "feed" => FeedType::Feed,
            "queue" => FeedType::Queue,
            "job" => FeedType::Job,
            "sorted_feed" => FeedType::SortedFeed,
            other => FeedType::Custom(other.to_string()),
        }
    }
}

/// A feed's configuration: a string->string map with two recognized keys
/// (`type`, `max_length`) plus whatever a custom feed type stores alongside.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedConfig {
    pub fields: HashMap<String, String>,
}

impl FeedConfig {
    pub fn new(feed_type: FeedType) -> Self {
        let mut fields = HashMap::new();
        fields.insert("type".to_string(), feed_type.as_str().to_string());
        Self { fields }
    }

    pub fn feed_type(&self) -> FeedType {
        self.fields
            .get("type")
            .map(|t| FeedType::parse(t))
            .unwrap_or(FeedType::Feed)
    }

    pub fn max_length(&self) -> usize {
        self.fields
            .get("max_length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> broker_errors::Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    pub fn from_json(raw: &str) -> broker_errors::Result<Self> {
        let fields: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self { fields })
    }
}

/// Where a sorted-feed item should land relative to another, mirroring the
/// wire tags `begin:`, `:end`, `:<ref>`, `<ref>:`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
    Before(String),
    After(String),
}

impl Position {
    /// Encode for the `feed.position:<f>` event payload's second field.
    pub fn to_wire(&self) -> String {
        match self {
            Position::First => "begin:".to_string(),
            Position::Last => ":end".to_string(),
            Position::Before(id) => format!(":{id}"),
            Position::After(id) => format!("{id}:"),
        }
    }

    /// Decode a wire tag. Returns `None` for malformed input.
    pub fn from_wire(raw: &str) -> Option<Position> {
        if raw == "begin:" {
            return Some(Position::First);
        }
        if raw == ":end" {
            return Some(Position::Last);
        }
        if let Some(id) = raw.strip_prefix(':') {
            if !id.is_empty() {
                return Some(Position::Before(id.to_string()));
            }
        }
        if let Some(id) = raw.strip_suffix(':') {
            if !id.is_empty() {
                return Some(Position::After(id.to_string()));
            }
        }
        None
    }
}

/// A decoded broadcast, dispatched by the listener to registered handlers.
#[derive(Clone, Debug)]
pub enum Event {
    Create { feed: String },
    Delete { feed: String },
    Conf { feed: String },
    Publish { feed: String, id: String, item: String },
    Edit { feed: String, id: String, item: String },
    Retract { feed: String, id: String },
    Position { feed: String, id: String, position: Position },
    Finish { feed: String, id: String, result: String },
    Claimed { feed: String, id: String },
    Cancelled { feed: String, id: String },
    Stalled { feed: String, id: String },
    Retried { feed: String, id: String },
}

/// The discriminant used to register handlers, independent of an event's
/// payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Delete,
    Conf,
    Publish,
    Edit,
    Retract,
    Position,
    Finish,
    Claimed,
    Cancelled,
    Stalled,
    Retried,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Create { .. } => EventKind::Create,
            Event::Delete { .. } => EventKind::Delete,
            Event::Conf { .. } => EventKind::Conf,
            Event::Publish { .. } => EventKind::Publish,
            Event::Edit { .. } => EventKind::Edit,
            Event::Retract { .. } => EventKind::Retract,
            Event::Position { .. } => EventKind::Position,
            Event::Finish { .. } => EventKind::Finish,
            Event::Claimed { .. } => EventKind::Claimed,
            Event::Cancelled { .. } => EventKind::Cancelled,
            Event::Stalled { .. } => EventKind::Stalled,
            Event::Retried { .. } => EventKind::Retried,
        }
    }

    pub fn feed(&self) -> &str {
        match self {
            Event::Create { feed }
            | Event::Delete { feed }
            | Event::Conf { feed }
            | Event::Publish { feed, .. }
            | Event::Edit { feed, .. }
            | Event::Retract { feed, .. }
            | Event::Position { feed, .. }
            | Event::Finish { feed, .. }
            | Event::Claimed { feed, .. }
            | Event::Cancelled { feed, .. }
            | Event::Stalled { feed, .. }
            | Event::Retried { feed, .. } => feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_type_round_trips_through_str() {
        for t in [
            FeedType::Feed,
            FeedType::Queue,
            FeedType::Job,
            FeedType::SortedFeed,
        ] {
            assert_eq!(FeedType::parse(t.as_str()), t);
        }
        assert_eq!(
            FeedType::parse("widget"),
            FeedType::Custom("widget".to_string())
        );
    }

    #[test]
    fn feed_config_defaults_max_length_to_zero() {
        let config = FeedConfig::new(FeedType::Queue);
        assert_eq!(config.max_length(), 0);
        assert_eq!(config.feed_type(), FeedType::Queue);
    }

    #[test]
    fn position_wire_round_trip() {
        assert_eq!(Position::from_wire("begin:"), Some(Position::First));
        assert_eq!(Position::from_wire(":end"), Some(Position::Last));
        assert_eq!(
            Position::from_wire(":42"),
            Some(Position::Before("42".to_string()))
        );
        assert_eq!(
            Position::from_wire("42:"),
            Some(Position::After("42".to_string()))
        );
        assert_eq!(Position::from_wire("garbage"), None);
    }
}
