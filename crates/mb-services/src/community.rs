//! Orchestrates the write path: resolve what the author is shown as, send
//! the write to the backend, and hand the stored entity back for an
//! optimistic cache insert.

use crate::emotion::{detect_emotions, RetryPolicy};
use mb_core::{
    resolve_display_name, AnonymityMode, AppError, CommunityRepo, Comment, DisplayNameParams,
    Emotion, EmotionTagger, Group, InviteCodeProvider, NewComment, NewGroup, NewPost, NewReaction,
    Post, PostScope, Reaction, ReactionKind, ResolvedDisplay, Result,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Who is writing and how they want to appear.
#[derive(Debug, Clone, Default)]
pub struct Author {
    pub user_id: Option<Uuid>,
    /// Name as typed in the composer; may be blank.
    pub raw_name: Option<String>,
    /// Only consulted on `allow_choice` boards.
    pub want_name_shown: bool,
}

#[derive(Debug, Clone)]
pub struct ComposePost {
    pub scope: PostScope,
    pub author: Author,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ComposeComment {
    pub post_id: i64,
    pub author: Author,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionToggle {
    Added(Reaction),
    Removed(i64),
}

pub struct CommunityService {
    repo: Arc<dyn CommunityRepo>,
    invites: Arc<dyn InviteCodeProvider>,
    tagger: Option<Arc<dyn EmotionTagger>>,
    retry: RetryPolicy,
}

impl CommunityService {
    pub fn new(repo: Arc<dyn CommunityRepo>, invites: Arc<dyn InviteCodeProvider>) -> Self {
        Self {
            repo,
            invites,
            tagger: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn EmotionTagger>, retry: RetryPolicy) -> Self {
        self.tagger = Some(tagger);
        self.retry = retry;
        self
    }

    /// Anonymity mode of a scope. Group scopes also require membership.
    async fn scope_mode(&self, scope: PostScope, user_id: Option<Uuid>) -> Result<AnonymityMode> {
        match scope {
            PostScope::Board(id) => {
                let board = self
                    .repo
                    .get_board(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Board", id))?;
                Ok(board.anonymity_mode)
            }
            PostScope::Group(id) => {
                let group = self
                    .repo
                    .get_group(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Group", id))?;
                let member = match user_id {
                    Some(user_id) => self.repo.is_group_member(id, user_id).await?,
                    None => false,
                };
                if !member {
                    return Err(AppError::Unauthorized(format!("not a member of group {id}")));
                }
                Ok(group.anonymity_mode)
            }
        }
    }

    fn resolve(mode: AnonymityMode, scope: PostScope, author: &Author) -> ResolvedDisplay {
        let user_id = author.user_id.map(|id| id.to_string());
        let mut params = DisplayNameParams::new(mode).show_name(author.want_name_shown);
        params.raw_name = author.raw_name.as_deref();
        params.user_id = user_id.as_deref();
        match scope {
            PostScope::Board(id) => params.board_id = Some(id),
            PostScope::Group(id) => params.group_id = Some(id),
        }
        resolve_display_name(&params)
    }

    /// What the composer shows as the author line before submitting.
    pub async fn preview_display_name(&self, scope: PostScope, author: &Author) -> Result<ResolvedDisplay> {
        let mode = self.scope_mode(scope, author.user_id).await?;
        Ok(Self::resolve(mode, scope, author))
    }

    pub async fn create_post(&self, req: ComposePost) -> Result<Post> {
        let title = req.title.trim();
        let content = req.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(AppError::ValidationError("title and content are required".into()));
        }

        let mode = self.scope_mode(req.scope, req.author.user_id).await?;
        let display = Self::resolve(mode, req.scope, &req.author);
        let post = self
            .repo
            .create_post(NewPost {
                scope: req.scope,
                author_id: req.author.user_id,
                author_name: req.author.raw_name.clone(),
                is_anonymous: display.is_anonymous,
                display_name: display.display_name,
                title: title.to_string(),
                content: content.to_string(),
            })
            .await?;
        tracing::info!(post_id = post.id, scope = ?req.scope, anonymous = post.is_anonymous, "post created");
        Ok(post)
    }

    /// Comments follow the policy of the board or group their post lives in.
    pub async fn create_comment(&self, req: ComposeComment) -> Result<Comment> {
        let content = req.content.trim();
        if content.is_empty() {
            return Err(AppError::ValidationError("comment is empty".into()));
        }

        let post = self
            .repo
            .get_post(req.post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", req.post_id))?;
        let scope = match (post.group_id, post.board_id) {
            (Some(group_id), _) => PostScope::Group(group_id),
            (None, Some(board_id)) => PostScope::Board(board_id),
            (None, None) => {
                return Err(AppError::Internal(format!("post {} has no scope", post.id)));
            }
        };
        let mode = self.scope_mode(scope, req.author.user_id).await?;
        let display = Self::resolve(mode, scope, &req.author);

        let comment = self
            .repo
            .create_comment(NewComment {
                post_id: post.id,
                author_id: req.author.user_id,
                author_name: req.author.raw_name.clone(),
                is_anonymous: display.is_anonymous,
                display_name: display.display_name,
                content: content.to_string(),
            })
            .await?;
        tracing::info!(comment_id = comment.id, post_id = post.id, "comment created");
        Ok(comment)
    }

    /// Only the author may delete a post.
    pub async fn delete_post(&self, post_id: i64, user_id: Uuid) -> Result<()> {
        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", post_id))?;
        if post.author_id != Some(user_id) {
            return Err(AppError::Unauthorized(format!("post {post_id} belongs to someone else")));
        }
        self.repo.delete_post(post_id).await
    }

    /// Adds the reaction, or removes it when the user already left one of
    /// that kind.
    pub async fn toggle_reaction(&self, post_id: i64, user_id: Uuid, kind: ReactionKind) -> Result<ReactionToggle> {
        match self.repo.find_reaction(post_id, user_id, kind).await? {
            Some(existing) => {
                self.repo.delete_reaction(existing.id).await?;
                tracing::debug!(post_id, reaction_id = existing.id, "reaction removed");
                Ok(ReactionToggle::Removed(existing.id))
            }
            None => {
                let reaction = self
                    .repo
                    .create_reaction(NewReaction { post_id, user_id, kind })
                    .await?;
                tracing::debug!(post_id, reaction_id = reaction.id, "reaction added");
                Ok(ReactionToggle::Added(reaction))
            }
        }
    }

    /// Creates a group with a fresh invite code; the owner joins immediately.
    pub async fn create_group(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<String>,
        anonymity_mode: AnonymityMode,
    ) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("group name is required".into()));
        }
        let invite_code = self.invites.generate();
        let group = self
            .repo
            .create_group(NewGroup {
                name: name.to_string(),
                description,
                invite_code,
                anonymity_mode,
                owner_id,
            })
            .await?;
        self.repo.add_group_member(group.id, owner_id).await?;
        tracing::info!(group_id = group.id, "group created");
        Ok(group)
    }

    /// Joins the group behind an invite code. Joining twice is not an error.
    pub async fn join_group(&self, code: &str, user_id: Uuid) -> Result<Group> {
        let code = self
            .invites
            .normalize(code)
            .ok_or_else(|| AppError::ValidationError("malformed invite code".into()))?;
        let group = self
            .repo
            .find_group_by_invite_code(&code)
            .await?
            .ok_or_else(|| AppError::not_found("Group", &code))?;

        if self.repo.is_group_member(group.id, user_id).await? {
            tracing::debug!(group_id = group.id, "already a member");
            return Ok(group);
        }
        self.repo.add_group_member(group.id, user_id).await?;
        tracing::info!(group_id = group.id, "joined group");
        Ok(group)
    }

    /// Tags a stored post and writes the labels back. The update reaches
    /// open screens through the change feed. Returns the labels written;
    /// empty when tagging is disabled or failed.
    pub async fn tag_post(&self, post: &Post) -> Result<Vec<Emotion>> {
        let Some(tagger) = &self.tagger else {
            return Ok(Vec::new());
        };
        let emotions = detect_emotions(tagger.as_ref(), self.retry, &post.title, &post.content).await;
        if emotions.is_empty() {
            return Ok(emotions);
        }
        self.repo.set_post_emotions(post.id, emotions.clone()).await?;
        Ok(emotions)
    }

    /// Runs [`Self::tag_post`] in the background; failures are logged.
    pub fn spawn_tagging(self: &Arc<Self>, post: Post) -> JoinHandle<Vec<Emotion>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.tag_post(&post).await {
                Ok(emotions) => emotions,
                Err(e) => {
                    tracing::warn!(post_id = post.id, error = %e, "storing emotion tags failed");
                    Vec::new()
                }
            }
        })
    }
}
