//! # mb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `mb-core` domain models, and publishes every committed write to a
//! [`LocalChangeHub`] so realtime screens see it.

pub mod feed;
mod schema;

pub use feed::LocalChangeHub;

use async_trait::async_trait;
use chrono::Utc;
use mb_core::error::{AppError, Result};
use mb_core::models::{
    AnonymityMode, Board, Comment, Emotion, Group, GroupMember, NewBoard, NewComment, NewGroup,
    NewPost, NewReaction, Post, PostScope, Reaction, ReactionKind,
};
use mb_core::traits::CommunityRepo;
use mb_core::{ChangeKind, EntityKind, RawChange};
use serde_json::{json, Value};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub struct SqliteCommunityRepo {
    pool: SqlitePool,
    hub: Arc<LocalChangeHub>,
}

fn db_err(e: sqlx::Error) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => AppError::Conflict(db.message().to_string()),
        Some(db) if db.is_foreign_key_violation() => AppError::ValidationError(db.message().to_string()),
        _ => AppError::Internal(e.to_string()),
    }
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(db_err)
}

fn board_from_row(row: &SqliteRow) -> Result<Board> {
    Ok(Board {
        id: col(row, "id")?,
        name: col(row, "name")?,
        description: col(row, "description")?,
        anonymity_mode: AnonymityMode::parse_lossy(&col::<String>(row, "anonymity_mode")?),
        created_at: col(row, "created_at")?,
    })
}

fn group_from_row(row: &SqliteRow) -> Result<Group> {
    Ok(Group {
        id: col(row, "id")?,
        name: col(row, "name")?,
        description: col(row, "description")?,
        invite_code: col(row, "invite_code")?,
        anonymity_mode: AnonymityMode::parse_lossy(&col::<String>(row, "anonymity_mode")?),
        owner_id: col(row, "owner_id")?,
        created_at: col(row, "created_at")?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let emotions: String = col(row, "emotions")?;
    Ok(Post {
        id: col(row, "id")?,
        board_id: col(row, "board_id")?,
        group_id: col(row, "group_id")?,
        author_id: col(row, "author_id")?,
        author_name: col(row, "author_name")?,
        is_anonymous: col(row, "is_anonymous")?,
        display_name: col(row, "display_name")?,
        title: col(row, "title")?,
        content: col(row, "content")?,
        emotions: serde_json::from_str(&emotions)
            .map_err(|e| AppError::Internal(format!("bad emotions column: {e}")))?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: col(row, "id")?,
        post_id: col(row, "post_id")?,
        author_id: col(row, "author_id")?,
        author_name: col(row, "author_name")?,
        is_anonymous: col(row, "is_anonymous")?,
        display_name: col(row, "display_name")?,
        content: col(row, "content")?,
        created_at: col(row, "created_at")?,
    })
}

fn reaction_from_row(row: &SqliteRow) -> Result<Reaction> {
    let kind: String = col(row, "kind")?;
    Ok(Reaction {
        id: col(row, "id")?,
        post_id: col(row, "post_id")?,
        user_id: col(row, "user_id")?,
        kind: ReactionKind::parse(&kind)
            .ok_or_else(|| AppError::Internal(format!("unknown reaction kind {kind}")))?,
        created_at: col(row, "created_at")?,
    })
}

fn to_json<T: serde::Serialize>(entity: &T) -> Result<Value> {
    serde_json::to_value(entity).map_err(|e| AppError::Internal(e.to_string()))
}

impl SqliteCommunityRepo {
    /// Connects (creating the file if needed) and applies the schema.
    /// In-memory databases are pinned to one connection so every query sees
    /// the same data.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:");
        let max_connections = if in_memory { 1 } else { 5 };
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            // Dropping the last connection drops the database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(db_err)?;

        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        tracing::info!(max_connections, "sqlite schema ready");

        Ok(Self {
            pool,
            hub: Arc::new(LocalChangeHub::new()),
        })
    }

    /// The change feed fed by this repo's writes.
    pub fn hub(&self) -> Arc<LocalChangeHub> {
        Arc::clone(&self.hub)
    }

    fn publish(&self, kind: ChangeKind, entity: EntityKind, new: Option<Value>, old: Option<Value>) {
        self.hub.publish(RawChange { kind, entity, new, old });
    }

    /// Deletes publish only the primary key, like a default replica identity.
    async fn delete_by_id(&self, table: &str, entity: EntityKind, id: i64) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(entity.as_str(), id));
        }
        self.publish(ChangeKind::Delete, entity, None, Some(json!({ "id": id })));
        Ok(())
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn get_reaction(&self, id: i64) -> Result<Option<Reaction>> {
        let row = sqlx::query("SELECT * FROM reactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(reaction_from_row).transpose()
    }
}

#[async_trait]
impl CommunityRepo for SqliteCommunityRepo {
    async fn create_board(&self, board: NewBoard) -> Result<Board> {
        let id = sqlx::query("INSERT INTO boards (name, description, anonymity_mode, created_at) VALUES (?, ?, ?, ?)")
            .bind(&board.name)
            .bind(&board.description)
            .bind(board.anonymity_mode.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .last_insert_rowid();
        self.get_board(id).await?.ok_or_else(|| AppError::not_found("board", id))
    }

    async fn get_board(&self, id: i64) -> Result<Option<Board>> {
        let row = sqlx::query("SELECT * FROM boards WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(board_from_row).transpose()
    }

    async fn list_boards(&self) -> Result<Vec<Board>> {
        let rows = sqlx::query("SELECT * FROM boards ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(board_from_row).collect()
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group> {
        let id = sqlx::query(
            "INSERT INTO community_groups (name, description, invite_code, anonymity_mode, owner_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.invite_code)
        .bind(group.anonymity_mode.as_str())
        .bind(group.owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();
        self.get_group(id).await?.ok_or_else(|| AppError::not_found("group", id))
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT * FROM community_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn find_group_by_invite_code(&self, code: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT * FROM community_groups WHERE invite_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn add_group_member(&self, group_id: i64, user_id: Uuid) -> Result<GroupMember> {
        let joined_at = Utc::now();
        sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(group_id)
            .bind(user_id)
            .bind(joined_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(GroupMember {
            group_id,
            user_id,
            joined_at,
        })
    }

    async fn is_group_member(&self, group_id: i64, user_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let (board_id, group_id) = match post.scope {
            PostScope::Board(id) => (Some(id), None),
            PostScope::Group(id) => (None, Some(id)),
        };
        let id = sqlx::query(
            "INSERT INTO posts (board_id, group_id, author_id, author_name, is_anonymous, display_name, title, content, emotions, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', ?)",
        )
        .bind(board_id)
        .bind(group_id)
        .bind(post.author_id)
        .bind(&post.author_name)
        .bind(post.is_anonymous)
        .bind(&post.display_name)
        .bind(&post.title)
        .bind(&post.content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        let stored = self.get_post(id).await?.ok_or_else(|| AppError::not_found("post", id))?;
        self.publish(ChangeKind::Insert, EntityKind::Post, Some(to_json(&stored)?), None);
        Ok(stored)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self, scope: PostScope, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let (sql, scope_id) = match scope {
            PostScope::Board(id) => ("SELECT * FROM posts WHERE board_id = ? ORDER BY id DESC LIMIT ? OFFSET ?", id),
            PostScope::Group(id) => ("SELECT * FROM posts WHERE group_id = ? ORDER BY id DESC LIMIT ? OFFSET ?", id),
        };
        let rows = sqlx::query(sql)
            .bind(scope_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(post_from_row).collect()
    }

    async fn set_post_emotions(&self, post_id: i64, emotions: Vec<Emotion>) -> Result<Post> {
        let encoded = serde_json::to_string(&emotions).map_err(|e| AppError::Internal(e.to_string()))?;
        let result = sqlx::query("UPDATE posts SET emotions = ?, updated_at = ? WHERE id = ?")
            .bind(encoded)
            .bind(Utc::now())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("post", post_id));
        }
        let stored = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post", post_id))?;
        self.publish(ChangeKind::Update, EntityKind::Post, Some(to_json(&stored)?), None);
        Ok(stored)
    }

    async fn delete_post(&self, id: i64) -> Result<()> {
        self.delete_by_id("posts", EntityKind::Post, id).await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let id = sqlx::query(
            "INSERT INTO comments (post_id, author_id, author_name, is_anonymous, display_name, content, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(&comment.author_name)
        .bind(comment.is_anonymous)
        .bind(&comment.display_name)
        .bind(&comment.content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        let stored = self.get_comment(id).await?.ok_or_else(|| AppError::not_found("comment", id))?;
        self.publish(ChangeKind::Insert, EntityKind::Comment, Some(to_json(&stored)?), None);
        Ok(stored)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE post_id = ? ORDER BY id ASC")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn delete_comment(&self, id: i64) -> Result<()> {
        self.delete_by_id("comments", EntityKind::Comment, id).await
    }

    async fn find_reaction(&self, post_id: i64, user_id: Uuid, kind: ReactionKind) -> Result<Option<Reaction>> {
        let row = sqlx::query("SELECT * FROM reactions WHERE post_id = ? AND user_id = ? AND kind = ?")
            .bind(post_id)
            .bind(user_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(reaction_from_row).transpose()
    }

    async fn create_reaction(&self, reaction: NewReaction) -> Result<Reaction> {
        let id = sqlx::query("INSERT INTO reactions (post_id, user_id, kind, created_at) VALUES (?, ?, ?, ?)")
            .bind(reaction.post_id)
            .bind(reaction.user_id)
            .bind(reaction.kind.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .last_insert_rowid();

        let stored = self.get_reaction(id).await?.ok_or_else(|| AppError::not_found("reaction", id))?;
        self.publish(ChangeKind::Insert, EntityKind::Reaction, Some(to_json(&stored)?), None);
        Ok(stored)
    }

    async fn list_reactions(&self, post_id: i64) -> Result<Vec<Reaction>> {
        let rows = sqlx::query("SELECT * FROM reactions WHERE post_id = ? ORDER BY id ASC")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(reaction_from_row).collect()
    }

    async fn delete_reaction(&self, id: i64) -> Result<()> {
        self.delete_by_id("reactions", EntityKind::Reaction, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_core::{ChangeFeed, ChannelStatus, FeedMessage, FeedTopic};

    async fn repo_with_board(mode: AnonymityMode) -> (SqliteCommunityRepo, Board) {
        let repo = SqliteCommunityRepo::new("sqlite::memory:").await.unwrap();
        let board = repo
            .create_board(NewBoard {
                name: "daily".into(),
                description: Some("small things".into()),
                anonymity_mode: mode,
            })
            .await
            .unwrap();
        (repo, board)
    }

    fn new_post(board_id: i64, title: &str) -> NewPost {
        NewPost {
            scope: PostScope::Board(board_id),
            author_id: Some(Uuid::new_v4()),
            author_name: Some("Kim".into()),
            is_anonymous: true,
            display_name: "귀여운 고양이 8".into(),
            title: title.into(),
            content: "body".into(),
        }
    }

    #[tokio::test]
    async fn board_roundtrip() {
        let (repo, board) = repo_with_board(AnonymityMode::AlwaysAnon).await;
        let fetched = repo.get_board(board.id).await.unwrap().unwrap();
        assert_eq!(fetched.anonymity_mode, AnonymityMode::AlwaysAnon);
        assert_eq!(repo.list_boards().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn posts_list_newest_first() {
        let (repo, board) = repo_with_board(AnonymityMode::AllowChoice).await;
        for title in ["one", "two", "three"] {
            repo.create_post(new_post(board.id, title)).await.unwrap();
        }
        let page = repo.list_posts(PostScope::Board(board.id), 2, 0).await.unwrap();
        let titles: Vec<&str> = page.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two"]);
        let rest = repo.list_posts(PostScope::Board(board.id), 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(rest[0].is_anonymous);
    }

    #[tokio::test]
    async fn writes_are_published() {
        let (repo, board) = repo_with_board(AnonymityMode::AllowChoice).await;
        let hub = repo.hub();
        let mut posts = hub.subscribe(&FeedTopic::all(EntityKind::Post)).await.unwrap();
        assert_eq!(
            posts.messages.recv().await,
            Some(FeedMessage::Status(ChannelStatus::Subscribed))
        );

        let post = repo.create_post(new_post(board.id, "hi")).await.unwrap();
        let Some(FeedMessage::Change(insert)) = posts.messages.recv().await else {
            panic!("expected insert");
        };
        assert_eq!(insert.kind, ChangeKind::Insert);
        assert_eq!(insert.new.unwrap()["id"], json!(post.id));

        repo.set_post_emotions(post.id, vec![Emotion::Calm]).await.unwrap();
        let Some(FeedMessage::Change(update)) = posts.messages.recv().await else {
            panic!("expected update");
        };
        assert_eq!(update.kind, ChangeKind::Update);
        assert_eq!(update.new.unwrap()["emotions"], json!(["calm"]));

        repo.delete_post(post.id).await.unwrap();
        let Some(FeedMessage::Change(delete)) = posts.messages.recv().await else {
            panic!("expected delete");
        };
        assert_eq!(delete.old, Some(json!({ "id": post.id })));
    }

    #[tokio::test]
    async fn comment_feed_is_scoped_to_post() {
        let (repo, board) = repo_with_board(AnonymityMode::AllowChoice).await;
        let first = repo.create_post(new_post(board.id, "a")).await.unwrap();
        let second = repo.create_post(new_post(board.id, "b")).await.unwrap();
        let hub = repo.hub();
        let mut channel = hub
            .subscribe(&FeedTopic::filtered(EntityKind::Comment, "post_id", first.id))
            .await
            .unwrap();
        channel.messages.recv().await;

        for post_id in [second.id, first.id] {
            repo.create_comment(NewComment {
                post_id,
                author_id: None,
                author_name: None,
                is_anonymous: true,
                display_name: "익명".into(),
                content: "hello".into(),
            })
            .await
            .unwrap();
        }
        let Some(FeedMessage::Change(change)) = channel.messages.recv().await else {
            panic!("expected change");
        };
        assert_eq!(change.new.unwrap()["post_id"], json!(first.id));
        assert!(channel.messages.try_recv().is_err());
        assert_eq!(repo.list_comments(first.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_reaction_conflicts() {
        let (repo, board) = repo_with_board(AnonymityMode::AllowChoice).await;
        let post = repo.create_post(new_post(board.id, "a")).await.unwrap();
        let user_id = Uuid::new_v4();
        let reaction = NewReaction {
            post_id: post.id,
            user_id,
            kind: ReactionKind::Like,
        };
        repo.create_reaction(reaction.clone()).await.unwrap();
        assert!(matches!(
            repo.create_reaction(reaction).await,
            Err(AppError::Conflict(_))
        ));
        assert!(repo
            .find_reaction(post.id, user_id, ReactionKind::Like)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn group_membership_and_invite_lookup() {
        let repo = SqliteCommunityRepo::new("sqlite::memory:").await.unwrap();
        let owner = Uuid::new_v4();
        let group = repo
            .create_group(NewGroup {
                name: "book club".into(),
                description: None,
                invite_code: "K7QX3MPA".into(),
                anonymity_mode: AnonymityMode::RequireName,
                owner_id: owner,
            })
            .await
            .unwrap();
        assert_eq!(group.owner_id, owner);
        assert!(!repo.is_group_member(group.id, owner).await.unwrap());
        repo.add_group_member(group.id, owner).await.unwrap();
        assert!(repo.is_group_member(group.id, owner).await.unwrap());

        let found = repo.find_group_by_invite_code("K7QX3MPA").await.unwrap().unwrap();
        assert_eq!(found.id, group.id);
        assert!(repo.find_group_by_invite_code("NOPE2345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let repo = SqliteCommunityRepo::new("sqlite::memory:").await.unwrap();
        assert!(matches!(repo.delete_comment(99).await, Err(AppError::NotFound(..))));
    }
}
