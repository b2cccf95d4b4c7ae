//! # Core Traits (Ports)
//!
//! Any backend plugin must implement these traits to be used by the binary.

use crate::error::Result;
use crate::feed::{ChannelId, FeedChannel, FeedTopic};
use crate::models::{
    Board, Comment, Emotion, Group, GroupMember, NewBoard, NewComment, NewGroup, NewPost,
    NewReaction, Post, PostScope, Reaction, ReactionKind,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Backend write/read contract for boards, groups, posts, comments and reactions.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait CommunityRepo: Send + Sync {
    // Board Operations
    async fn create_board(&self, board: NewBoard) -> Result<Board>;
    async fn get_board(&self, id: i64) -> Result<Option<Board>>;
    async fn list_boards(&self) -> Result<Vec<Board>>;

    // Group Operations
    async fn create_group(&self, group: NewGroup) -> Result<Group>;
    async fn get_group(&self, id: i64) -> Result<Option<Group>>;
    async fn find_group_by_invite_code(&self, code: &str) -> Result<Option<Group>>;
    async fn add_group_member(&self, group_id: i64, user_id: Uuid) -> Result<GroupMember>;
    async fn is_group_member(&self, group_id: i64, user_id: Uuid) -> Result<bool>;

    // Post Operations
    async fn create_post(&self, post: NewPost) -> Result<Post>;
    async fn get_post(&self, id: i64) -> Result<Option<Post>>;
    /// Newest first.
    async fn list_posts(&self, scope: PostScope, limit: i64, offset: i64) -> Result<Vec<Post>>;
    async fn set_post_emotions(&self, post_id: i64, emotions: Vec<Emotion>) -> Result<Post>;
    async fn delete_post(&self, id: i64) -> Result<()>;

    // Comment Operations
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;
    /// Oldest first.
    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>>;
    async fn delete_comment(&self, id: i64) -> Result<()>;

    // Reaction Operations
    async fn find_reaction(&self, post_id: i64, user_id: Uuid, kind: ReactionKind) -> Result<Option<Reaction>>;
    async fn create_reaction(&self, reaction: NewReaction) -> Result<Reaction>;
    async fn list_reactions(&self, post_id: i64) -> Result<Vec<Reaction>>;
    async fn delete_reaction(&self, id: i64) -> Result<()>;
}

/// Push-based change notifications, scoped by [`FeedTopic`].
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a channel. The first message on a healthy channel is
    /// `ChannelStatus::Subscribed`.
    async fn subscribe(&self, topic: &FeedTopic) -> Result<FeedChannel>;

    /// Releases a channel. Unknown ids return `AppError::NotFound`.
    async fn unsubscribe(&self, channel: ChannelId) -> Result<()>;
}

/// Hosted sentiment model. Returns raw labels; callers clamp them to
/// [`Emotion`].
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait EmotionTagger: Send + Sync {
    async fn tag(&self, title: &str, content: &str) -> Result<Vec<String>>;
}

/// Group invite code contract.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait InviteCodeProvider: Send + Sync {
    /// Generates a fresh, unpredictable code.
    fn generate(&self) -> String;

    /// Canonical form of user input, or `None` when it cannot be a code.
    fn normalize(&self, input: &str) -> Option<String>;
}
