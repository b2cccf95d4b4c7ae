//! # Domain Models
//!
//! These structs represent the core entities of Moodboard.
//! Numeric ids come from the backend; user ids are opaque UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-board (or per-group) policy controlling how authors are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum AnonymityMode {
    /// Always shown under the generated alias.
    AlwaysAnon,
    /// Always shown under the entered name.
    RequireName,
    /// The author picks per post; anonymous unless they opt in.
    #[default]
    AllowChoice,
}

impl AnonymityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysAnon => "always_anon",
            Self::RequireName => "require_name",
            Self::AllowChoice => "allow_choice",
        }
    }

    /// Parses a stored mode. Anything unrecognised falls back to `AllowChoice`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim() {
            "always_anon" => Self::AlwaysAnon,
            "require_name" => Self::RequireName,
            _ => Self::AllowChoice,
        }
    }
}

impl From<String> for AnonymityMode {
    fn from(raw: String) -> Self {
        Self::parse_lossy(&raw)
    }
}

/// Closed vocabulary of emotion labels a post can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Anxiety,
    Excitement,
    Calm,
    Tired,
    Lonely,
    Grateful,
    Proud,
}

impl Emotion {
    pub const ALL: [Emotion; 10] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Anxiety,
        Emotion::Excitement,
        Emotion::Calm,
        Emotion::Tired,
        Emotion::Lonely,
        Emotion::Grateful,
        Emotion::Proud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Anxiety => "anxiety",
            Self::Excitement => "excitement",
            Self::Calm => "calm",
            Self::Tired => "tired",
            Self::Lonely => "lonely",
            Self::Grateful => "grateful",
            Self::Proud => "proud",
        }
    }

    /// Matches a label case-insensitively against the vocabulary.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|e| e.as_str() == label)
    }
}

/// A public board (e.g., "daily", "work", "love").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub anonymity_mode: AnonymityMode,
    pub created_at: DateTime<Utc>,
}

/// A private group joined through an invite code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub invite_code: String,
    pub anonymity_mode: AnonymityMode,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: i64,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// The fundamental unit of conversation. Lives in a board or a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub board_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    /// Name as typed by the author, kept even when the post is anonymous.
    #[serde(default)]
    pub author_name: Option<String>,
    pub is_anonymous: bool,
    pub display_name: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub emotions: Vec<Emotion>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    #[serde(default)]
    pub author_name: Option<String>,
    pub is_anonymous: bool,
    pub display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Sad,
    Angry,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Laugh => "laugh",
            Self::Sad => "sad",
            Self::Angry => "angry",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "like" => Some(Self::Like),
            "love" => Some(Self::Love),
            "laugh" => Some(Self::Laugh),
            "sad" => Some(Self::Sad),
            "angry" => Some(Self::Angry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Uuid,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

/// Where a post list is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    Board(i64),
    Group(i64),
}

#[derive(Debug, Clone)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
    pub anonymity_mode: AnonymityMode,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub invite_code: String,
    pub anonymity_mode: AnonymityMode,
    pub owner_id: Uuid,
}

/// Insert payload for a post. `is_anonymous` and `display_name` come from
/// [`crate::alias::resolve_display_name`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub scope: PostScope,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub is_anonymous: bool,
    pub display_name: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub is_anonymous: bool,
    pub display_name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewReaction {
    pub post_id: i64,
    pub user_id: Uuid,
    pub kind: ReactionKind,
}
