//! # Change Feed Types
//!
//! Wire-level shapes exchanged with a realtime change feed. Payloads stay as
//! untyped JSON here; `mb-realtime` validates them before they touch a cache.

use crate::models::{Comment, Post, Reaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Post,
    Comment,
    Reaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Reaction => "reaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single change notification as delivered by the backend.
///
/// `new` carries the row after an insert or update, `old` the row before an
/// update or delete. Delete payloads are often truncated to the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub entity: EntityKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// Lifecycle notices a channel emits alongside data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Status(ChannelStatus),
    Change(RawChange),
}

/// Equality filter on a numeric column, e.g. `post_id = 7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedFilter {
    pub column: String,
    pub value: i64,
}

impl FeedFilter {
    pub fn eq(column: &str, value: i64) -> Self {
        Self {
            column: column.to_string(),
            value,
        }
    }

    /// A record matches when the column equals the value. Records that do
    /// not carry the column at all (truncated delete payloads) also match.
    pub fn matches(&self, record: &Value) -> bool {
        match record.get(&self.column) {
            Some(v) => v.as_i64() == Some(self.value),
            None => true,
        }
    }
}

/// What a channel listens to: one entity kind, optionally narrowed by a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedTopic {
    pub entity: EntityKind,
    pub filter: Option<FeedFilter>,
}

impl FeedTopic {
    pub fn all(entity: EntityKind) -> Self {
        Self {
            entity,
            filter: None,
        }
    }

    pub fn filtered(entity: EntityKind, column: &str, value: i64) -> Self {
        Self {
            entity,
            filter: Some(FeedFilter::eq(column, value)),
        }
    }

    /// Whether a change belongs on this topic.
    pub fn accepts(&self, change: &RawChange) -> bool {
        if change.entity != self.entity {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        match change.new.as_ref().or(change.old.as_ref()) {
            Some(record) => filter.matches(record),
            None => false,
        }
    }

    /// Stable query key, e.g. `comment:post_id=eq.7`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FeedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(
                f,
                "{}:{}=eq.{}",
                self.entity.as_str(),
                filter.column,
                filter.value
            ),
            None => f.write_str(self.entity.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// An open channel: its id (needed to unsubscribe) and the message stream.
#[derive(Debug)]
pub struct FeedChannel {
    pub id: ChannelId,
    pub messages: mpsc::UnboundedReceiver<FeedMessage>,
}

/// An entity that can live in a realtime cache.
pub trait LiveEntity: DeserializeOwned + Clone + Send + 'static {
    const KIND: EntityKind;

    fn id(&self) -> i64;
}

impl LiveEntity for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn id(&self) -> i64 {
        self.id
    }
}

impl LiveEntity for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn id(&self) -> i64 {
        self.id
    }
}

impl LiveEntity for Reaction {
    const KIND: EntityKind = EntityKind::Reaction;

    fn id(&self) -> i64 {
        self.id
    }
}
