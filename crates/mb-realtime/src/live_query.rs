//! One screen's view of a list: cache plus its change-feed subscription.
//!
//! A `LiveQuery` is owned by a single task and mutated through `&mut self`,
//! so fetch results, optimistic writes and feed events are applied one at a
//! time in arrival order.

use crate::cache::{CacheOutcome, ListOrder, LiveCache};
use crate::guard::validate;
use crate::subscription::{Subscription, SubscriptionState};
use mb_core::{ChangeFeed, FeedMessage, FeedTopic, LiveEntity};
use std::future::Future;

pub struct LiveQuery<T> {
    cache: LiveCache<T>,
    subscription: Subscription,
}

impl<T: LiveEntity> LiveQuery<T> {
    pub fn new(topic: FeedTopic, order: ListOrder) -> Self {
        Self::with_cache(topic, LiveCache::new(order))
    }

    /// Starts from an existing cache, e.g. one parked by the registry.
    pub fn with_cache(topic: FeedTopic, cache: LiveCache<T>) -> Self {
        Self {
            cache,
            subscription: Subscription::new(topic),
        }
    }

    pub fn topic(&self) -> &FeedTopic {
        self.subscription.topic()
    }

    pub fn key(&self) -> String {
        self.topic().key()
    }

    pub fn state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_live()
    }

    pub fn cache(&self) -> &LiveCache<T> {
        &self.cache
    }

    pub fn items(&self) -> &[T] {
        self.cache.items()
    }

    /// Subscribes and runs the initial fetch side by side. Neither failure
    /// blocks the other; both are logged.
    pub async fn mount<F, E>(&mut self, feed: &dyn ChangeFeed, initial: F)
    where
        F: Future<Output = Result<Vec<T>, E>>,
        E: std::fmt::Display,
    {
        let topic = self.topic().clone();
        let ((), fetched) = tokio::join!(self.subscription.open(feed), initial);
        match fetched {
            Ok(items) => {
                tracing::debug!(%topic, count = items.len(), "initial fetch");
                self.apply_pending();
                self.cache.replace_all(items);
            }
            Err(e) => tracing::warn!(%topic, error = %e, "initial fetch failed"),
        }
    }

    /// Applies one feed message. Returns the cache outcome for data changes,
    /// `None` for statuses, rejected payloads, or an inactive instance.
    pub fn handle_message(&mut self, message: FeedMessage) -> Option<CacheOutcome> {
        if !self.subscription.is_live() {
            tracing::trace!(topic = %self.topic(), "dropping message for inactive query");
            return None;
        }
        match message {
            FeedMessage::Status(status) => {
                self.subscription.on_status(&status);
                None
            }
            FeedMessage::Change(change) => match validate::<T>(&change) {
                Ok(valid) => {
                    let outcome = self.cache.apply(valid);
                    tracing::debug!(topic = %self.topic(), kind = ?change.kind, ?outcome, "change applied");
                    Some(outcome)
                }
                Err(e) => {
                    tracing::warn!(topic = %self.topic(), error = %e, "dropping malformed change");
                    None
                }
            },
        }
    }

    /// Waits for the next message that touches the cache and applies it.
    /// Status messages are handled along the way. `None` once the channel
    /// is gone.
    pub async fn next_change(&mut self) -> Option<CacheOutcome> {
        loop {
            let message = self.subscription.recv().await?;
            if let Some(outcome) = self.handle_message(message) {
                return Some(outcome);
            }
        }
    }

    /// Applies every message already queued on the channel. Returns how
    /// many touched the cache.
    ///
    /// Fetch results go through here first: events delivered before the
    /// fetch landed must not be replayed over it.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(message) = self.subscription.try_recv() {
            if self.handle_message(message).is_some_and(|outcome| outcome.changed()) {
                applied += 1;
            }
        }
        applied
    }

    /// Pull-to-refresh: the snapshot replaces the cache.
    pub fn refresh(&mut self, items: Vec<T>) {
        self.apply_pending();
        self.cache.replace_all(items);
    }

    /// "Load more": merges a fetched page. Returns how many were new.
    pub fn load_more(&mut self, page: Vec<T>) -> usize {
        self.apply_pending();
        self.cache.merge_page(page)
    }

    /// Shows our own write before its notification arrives. The later
    /// notification is deduplicated by id.
    pub fn insert_optimistic(&mut self, entity: T) -> CacheOutcome {
        self.cache.insert(entity)
    }

    /// Removes an entity after our own delete succeeded.
    pub fn remove_local(&mut self, id: i64) -> CacheOutcome {
        self.cache.remove(id)
    }

    /// Switches to another filter key: the old subscription is closed, the
    /// cache cleared, and a fresh instance mounted.
    pub async fn retarget<F, E>(&mut self, feed: &dyn ChangeFeed, topic: FeedTopic, initial: F)
    where
        F: Future<Output = Result<Vec<T>, E>>,
        E: std::fmt::Display,
    {
        self.subscription.close(feed).await;
        self.subscription = Subscription::new(topic);
        self.cache = LiveCache::new(self.cache.order());
        self.mount(feed, initial).await;
    }

    /// Stops delivery and releases the channel. Idempotent.
    pub async fn unmount(&mut self, feed: &dyn ChangeFeed) {
        self.subscription.close(feed).await;
    }

    pub fn into_cache(self) -> LiveCache<T> {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mb_core::{AppError, ChangeKind, ChannelId, ChannelStatus, Comment, EntityKind, FeedChannel, MockChangeFeed, RawChange};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn comment(id: i64) -> Comment {
        Comment {
            id,
            post_id: 7,
            author_id: None,
            author_name: None,
            is_anonymous: true,
            display_name: "익명".to_string(),
            content: format!("comment {id}"),
            created_at: Utc::now(),
        }
    }

    fn insert(id: i64) -> FeedMessage {
        insert_on(id, 7)
    }

    fn insert_on(id: i64, post_id: i64) -> FeedMessage {
        let mut comment = comment(id);
        comment.post_id = post_id;
        FeedMessage::Change(RawChange {
            kind: ChangeKind::Insert,
            entity: EntityKind::Comment,
            new: Some(serde_json::to_value(comment).unwrap()),
            old: None,
        })
    }

    fn update(comment: &Comment) -> FeedMessage {
        FeedMessage::Change(RawChange {
            kind: ChangeKind::Update,
            entity: EntityKind::Comment,
            new: Some(serde_json::to_value(comment).unwrap()),
            old: None,
        })
    }

    fn feed_with_channel() -> (MockChangeFeed, mpsc::UnboundedSender<FeedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = Some(FeedChannel {
            id: ChannelId(1),
            messages: rx,
        });
        let mut feed = MockChangeFeed::new();
        feed.expect_subscribe().returning(move |_| {
            slot.take().ok_or_else(|| AppError::Transport("already subscribed".into()))
        });
        feed.expect_unsubscribe().returning(|_| Ok(()));
        (feed, tx)
    }

    fn topic() -> FeedTopic {
        FeedTopic::filtered(EntityKind::Comment, "post_id", 7)
    }

    #[tokio::test]
    async fn mount_populates_cache_and_pumps_events() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(1), comment(2)]) })
            .await;

        tx.send(FeedMessage::Status(ChannelStatus::Subscribed)).unwrap();
        tx.send(insert(3)).unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Inserted));
        assert_eq!(query.state(), SubscriptionState::Active);
        assert_eq!(query.cache().ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribe_failure_does_not_block_fetch() {
        let mut feed = MockChangeFeed::new();
        feed.expect_subscribe()
            .returning(|_| Err(AppError::Transport("offline".into())));
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(1)]) })
            .await;
        assert_eq!(query.cache().ids(), vec![1]);
        assert_eq!(query.state(), SubscriptionState::Closed);
        assert_eq!(query.next_change().await, None);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_subscription_running() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::<Comment>::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Err::<Vec<Comment>, _>(AppError::Internal("500".into())) })
            .await;
        assert!(query.cache().is_empty());
        tx.send(insert(1)).unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Inserted));
    }

    #[tokio::test]
    async fn optimistic_insert_then_notification_is_deduplicated() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query.mount(&feed, async { Ok::<_, AppError>(Vec::new()) }).await;

        assert_eq!(query.insert_optimistic(comment(10)), CacheOutcome::Inserted);
        tx.send(insert(10)).unwrap();
        tx.send(insert(11)).unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Ignored));
        assert_eq!(query.next_change().await, Some(CacheOutcome::Inserted));
        assert_eq!(query.cache().ids(), vec![10, 11]);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let (feed, _tx) = feed_with_channel();
        let mut query = LiveQuery::<Comment>::new(topic(), ListOrder::Chronological);
        query.mount(&feed, async { Ok::<_, AppError>(Vec::new()) }).await;

        let bad = FeedMessage::Change(RawChange {
            kind: ChangeKind::Insert,
            entity: EntityKind::Comment,
            new: Some(json!({"id": 1, "post_id": "seven"})),
            old: None,
        });
        assert_eq!(query.handle_message(bad), None);
        assert!(query.cache().is_empty());
    }

    #[tokio::test]
    async fn events_after_unmount_are_noops() {
        let (feed, _tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(1)]) })
            .await;
        query.unmount(&feed).await;
        query.unmount(&feed).await;

        assert_eq!(query.handle_message(insert(2)), None);
        assert_eq!(query.cache().ids(), vec![1]);
        assert_eq!(query.state(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn refresh_wins_and_later_events_apply_on_top() {
        let (feed, _tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query.mount(&feed, async { Ok::<_, AppError>(Vec::new()) }).await;

        query.handle_message(insert(1));
        query.handle_message(insert(2));
        let mut edited = comment(2);
        edited.content = "edited".into();
        query.refresh(vec![edited]);
        assert_eq!(query.cache().ids(), vec![2]);

        query.handle_message(insert(3));
        assert_eq!(query.cache().ids(), vec![2, 3]);
        assert_eq!(query.cache().get(2).unwrap().content, "edited");
    }

    #[tokio::test]
    async fn retarget_closes_old_channel_and_starts_over() {
        let (tx, rx) = mpsc::unbounded_channel::<FeedMessage>();
        let (tx2, rx2) = mpsc::unbounded_channel::<FeedMessage>();
        let mut channels = vec![
            FeedChannel { id: ChannelId(2), messages: rx2 },
            FeedChannel { id: ChannelId(1), messages: rx },
        ];
        let mut feed = MockChangeFeed::new();
        feed.expect_subscribe().times(2).returning(move |_| Ok(channels.pop().unwrap()));
        feed.expect_unsubscribe()
            .withf(|id| *id == ChannelId(1))
            .times(1)
            .returning(|_| Ok(()));

        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query.mount(&feed, async { Ok::<_, AppError>(vec![comment(1)]) }).await;

        let next = FeedTopic::filtered(EntityKind::Comment, "post_id", 8);
        query.retarget(&feed, next, async { Ok::<_, AppError>(Vec::new()) }).await;
        assert_eq!(query.key(), "comment:post_id=eq.8");
        assert!(query.cache().is_empty());
        assert!(tx.send(insert(5)).is_err());

        tx2.send(insert_on(6, 8)).unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Inserted));
        assert_eq!(query.cache().get(6).unwrap().post_id, 8);
    }

    #[tokio::test]
    async fn refresh_wins_over_queued_events() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(2)]) })
            .await;

        let mut stale = comment(2);
        stale.content = "stale".into();
        tx.send(update(&stale)).unwrap();
        tx.send(insert(3)).unwrap();

        let mut fresh = comment(2);
        fresh.content = "fresh".into();
        query.refresh(vec![fresh]);

        assert_eq!(query.cache().ids(), vec![2]);
        assert_eq!(query.cache().get(2).unwrap().content, "fresh");
        assert_eq!(query.apply_pending(), 0);
    }

    #[tokio::test]
    async fn events_queued_during_initial_fetch_do_not_override_it() {
        let (tx, rx) = mpsc::unbounded_channel::<FeedMessage>();
        let mut slot = Some(FeedChannel { id: ChannelId(1), messages: rx });
        let mut feed = MockChangeFeed::new();
        feed.expect_subscribe().returning(move |_| Ok(slot.take().unwrap()));

        let mut stale = comment(1);
        stale.content = "stale".into();
        tx.send(FeedMessage::Status(ChannelStatus::Subscribed)).unwrap();
        tx.send(update(&stale)).unwrap();

        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(1)]) })
            .await;

        assert_eq!(query.state(), SubscriptionState::Active);
        assert_eq!(query.cache().get(1).unwrap().content, "comment 1");
    }

    #[tokio::test]
    async fn load_more_overwrites_queued_stale_rows_in_place() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::NewestFirst);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(5), comment(4), comment(3)]) })
            .await;

        let mut stale = comment(4);
        stale.content = "stale".into();
        tx.send(update(&stale)).unwrap();

        let mut fresh = comment(4);
        fresh.content = "fresh".into();
        assert_eq!(query.load_more(vec![fresh, comment(2), comment(1)]), 2);
        assert_eq!(query.cache().ids(), vec![5, 4, 3, 2, 1]);
        assert_eq!(query.cache().get(4).unwrap().content, "fresh");
    }

    #[tokio::test]
    async fn events_apply_before_the_subscribe_ack() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::<Comment>::new(topic(), ListOrder::Chronological);
        query.mount(&feed, async { Ok::<_, AppError>(Vec::new()) }).await;
        assert_eq!(query.state(), SubscriptionState::Subscribing);

        tx.send(insert(1)).unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Inserted));
        assert_eq!(query.state(), SubscriptionState::Subscribing);
        assert_eq!(query.cache().ids(), vec![1]);
    }

    #[tokio::test]
    async fn remove_local_drops_own_delete_and_ignores_echo() {
        let (feed, tx) = feed_with_channel();
        let mut query = LiveQuery::new(topic(), ListOrder::Chronological);
        query
            .mount(&feed, async { Ok::<_, AppError>(vec![comment(1), comment(2)]) })
            .await;

        assert_eq!(query.remove_local(1), CacheOutcome::Removed);
        tx.send(FeedMessage::Change(RawChange {
            kind: ChangeKind::Delete,
            entity: EntityKind::Comment,
            new: None,
            old: Some(json!({ "id": 1 })),
        }))
        .unwrap();
        assert_eq!(query.next_change().await, Some(CacheOutcome::Ignored));
        assert_eq!(query.cache().ids(), vec![2]);
    }
}
