//! # Moodboard Binary
//!
//! Assembles the application from compile-time features and drives one
//! scripted session against the local backend: a board feed and a comment
//! thread stay live while posts, comments, reactions and emotion tags are
//! written through the service layer.

mod tagger;

use anyhow::Context;
use mb_configs::AppConfig;
use mb_core::{
    AnonymityMode, ChangeFeed, Comment, CommunityRepo, EntityKind, FeedTopic, LiveEntity, NewBoard,
    Post, PostScope, ReactionKind,
};
use mb_realtime::{ListOrder, LiveQuery, QueryCacheRegistry};
use mb_services::{Author, CommunityService, ComposeComment, ComposePost, ReactionToggle, RetryPolicy};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(feature = "db-sqlite")]
use mb_db_sqlite::SqliteCommunityRepo;

#[cfg(feature = "invite-simple")]
use mb_invite_simple::SimpleInviteCodes;

#[cfg(not(all(feature = "db-sqlite", feature = "invite-simple")))]
compile_error!("moodboard needs a backend: enable `db-sqlite` and `invite-simple`");

const PAGE_SIZE: i64 = 20;
const QUIET_PERIOD: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config);
    run(config).await
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Applies feed messages until the channel has been quiet for a moment.
async fn drain<T: LiveEntity>(query: &mut LiveQuery<T>) -> usize {
    let mut applied = 0;
    while let Ok(Some(outcome)) = tokio::time::timeout(QUIET_PERIOD, query.next_change()).await {
        if outcome.changed() {
            applied += 1;
        }
    }
    applied
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Backend
    let repo = Arc::new(
        SqliteCommunityRepo::new(config.database_url.expose_secret())
            .await
            .context("opening database")?,
    );
    let hub = repo.hub();
    let feed: &dyn ChangeFeed = hub.as_ref();

    // 2. Services
    let invites = Arc::new(SimpleInviteCodes::new(config.invite.salt.expose_secret()));
    let mut service = CommunityService::new(repo.clone(), invites);
    if config.emotion.enabled {
        let retry = RetryPolicy {
            max_attempts: config.emotion.max_attempts,
            ..RetryPolicy::default()
        };
        service = service.with_tagger(Arc::new(tagger::KeywordTagger), retry);
    }
    let service = Arc::new(service);

    tracing::info!(retention_secs = config.realtime.retention_secs, "moodboard session starting");

    // 3. A board to write into
    let board = match repo.list_boards().await?.into_iter().next() {
        Some(board) => board,
        None => {
            repo.create_board(NewBoard {
                name: "daily".into(),
                description: Some("오늘의 기분".into()),
                anonymity_mode: AnonymityMode::AllowChoice,
            })
            .await?
        }
    };
    let scope = PostScope::Board(board.id);

    // 4. Board feed screen
    let mut posts: QueryCacheRegistry<Post> = QueryCacheRegistry::new(config.realtime.retention());
    let mut feed_query = posts.activate(
        FeedTopic::filtered(EntityKind::Post, "board_id", board.id),
        ListOrder::NewestFirst,
        Instant::now(),
    );
    feed_query.mount(feed, repo.list_posts(scope, PAGE_SIZE, 0)).await;
    tracing::info!(board = %board.name, posts = feed_query.items().len(), state = ?feed_query.state(), "feed mounted");

    // 5. Write a post; show it before the notification lands
    let writer = Author {
        user_id: Some(Uuid::new_v4()),
        raw_name: Some("민지".into()),
        want_name_shown: false,
    };
    let preview = service.preview_display_name(scope, &writer).await?;
    tracing::info!(display_name = %preview.display_name, "composer preview");

    let post = service
        .create_post(ComposePost {
            scope,
            author: writer.clone(),
            title: "오늘은 좀 피곤".into(),
            content: "그래도 산책하고 나니 평온해졌다".into(),
        })
        .await?;
    feed_query.insert_optimistic(post.clone());

    // 6. Tag emotions in the background while the feed keeps applying changes
    let mut tagging = service.spawn_tagging(post.clone());
    loop {
        tokio::select! {
            joined = &mut tagging => {
                match joined {
                    Ok(emotions) => tracing::info!(post_id = post.id, ?emotions, "tagging finished"),
                    Err(e) => tracing::warn!(post_id = post.id, error = %e, "tagging task failed"),
                }
                break;
            }
            Some(outcome) = feed_query.next_change() => {
                tracing::debug!(?outcome, "feed change while tagging");
            }
        }
    }
    drain(&mut feed_query).await;
    if let Some(tagged) = feed_query.cache().get(post.id) {
        tracing::info!(post_id = tagged.id, emotions = ?tagged.emotions, "feed entry after tagging");
    }

    // 7. Post detail screen: comments oldest first
    let mut comments: LiveQuery<Comment> = LiveQuery::new(
        FeedTopic::filtered(EntityKind::Comment, "post_id", post.id),
        ListOrder::Chronological,
    );
    comments.mount(feed, repo.list_comments(post.id)).await;

    let reader = Author {
        user_id: Some(Uuid::new_v4()),
        raw_name: Some("지훈".into()),
        want_name_shown: true,
    };
    for content in ["수고했어요", "내일은 푹 쉬어요"] {
        let comment = service
            .create_comment(ComposeComment {
                post_id: post.id,
                author: reader.clone(),
                content: content.into(),
            })
            .await?;
        comments.insert_optimistic(comment);
    }
    let applied = drain(&mut comments).await;
    tracing::info!(comments = comments.items().len(), applied, "comment thread settled");

    // 8. Reactions toggle on and off
    if let Some(reader_id) = reader.user_id {
        for _ in 0..2 {
            match service.toggle_reaction(post.id, reader_id, ReactionKind::Love).await? {
                ReactionToggle::Added(reaction) => tracing::info!(reaction_id = reaction.id, "reaction added"),
                ReactionToggle::Removed(id) => tracing::info!(reaction_id = id, "reaction removed"),
            }
        }
    }

    // 9. A private group joined by invite code
    if let (Some(owner_id), Some(reader_id)) = (writer.user_id, reader.user_id) {
        let group = service
            .create_group(owner_id, "산책 모임", None, AnonymityMode::AlwaysAnon)
            .await?;
        // Codes are accepted the way people paste them.
        let typed = format!(" {} ", group.invite_code.to_lowercase());
        let joined = service.join_group(&typed, reader_id).await?;
        tracing::info!(group_id = joined.id, "reader joined group");

        let group_scope = PostScope::Group(joined.id);
        let shown = service.preview_display_name(group_scope, &reader).await?;
        tracing::info!(display_name = %shown.display_name, "reader appears in group as");
    }

    // 10. The author takes back a second thought
    if let Some(writer_id) = writer.user_id {
        let regret = service
            .create_post(ComposePost {
                scope,
                author: writer.clone(),
                title: "괜히 썼나".into(),
                content: "지울게요".into(),
            })
            .await?;
        feed_query.insert_optimistic(regret.clone());
        service.delete_post(regret.id, writer_id).await?;
        feed_query.remove_local(regret.id);
        drain(&mut feed_query).await;
        tracing::info!(post_id = regret.id, posts = feed_query.items().len(), "post deleted");
    }

    // 11. Leave the screens; the feed cache is parked for a quick return
    comments.unmount(feed).await;
    posts.deactivate(feed_query, feed, Instant::now()).await;
    let back = posts.activate(
        FeedTopic::filtered(EntityKind::Post, "board_id", board.id),
        ListOrder::NewestFirst,
        Instant::now(),
    );
    tracing::info!(
        parked_posts = back.items().len(),
        open_channels = hub.channel_count(),
        "session finished"
    );

    Ok(())
}
