//! Change-feed subscription lifecycle.
//!
//! # Lifecycle
//!
//! 1. **Idle**: created, not yet subscribed
//! 2. **Subscribing**: `subscribe` returned a channel, waiting for acknowledgment
//! 3. **Active**: the channel reported `Subscribed`; events flow
//! 4. **Closed**: deactivated; terminal for this instance
//!
//! Channel errors and timeouts while Active are logged and the instance keeps
//! listening. There is no automatic reconnect; a remount opens a new instance.

use mb_core::{ChangeFeed, ChannelId, ChannelStatus, FeedChannel, FeedMessage, FeedTopic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribing,
    Active,
    Closed,
}

/// One subscription to one [`FeedTopic`], owned by the screen that opened it.
#[derive(Debug)]
pub struct Subscription {
    topic: FeedTopic,
    state: SubscriptionState,
    /// Cleared synchronously on deactivation; checked before every event.
    live: Arc<AtomicBool>,
    channel: Option<FeedChannel>,
    /// Present until the channel has been handed back to the feed.
    unreleased: Option<ChannelId>,
}

impl Subscription {
    pub fn new(topic: FeedTopic) -> Self {
        Self {
            topic,
            state: SubscriptionState::Idle,
            live: Arc::new(AtomicBool::new(false)),
            channel: None,
            unreleased: None,
        }
    }

    pub fn topic(&self) -> &FeedTopic {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Shared liveness flag, for callbacks that outlive a borrow of `self`.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }

    /// Idle -> Subscribing. A failed subscribe is logged and leaves the
    /// instance Closed; it never propagates.
    pub async fn open(&mut self, feed: &dyn ChangeFeed) {
        if self.state != SubscriptionState::Idle {
            tracing::debug!(topic = %self.topic, state = ?self.state, "subscription already opened");
            return;
        }
        self.state = SubscriptionState::Subscribing;
        self.live.store(true, Ordering::Release);

        match feed.subscribe(&self.topic).await {
            Ok(channel) => {
                tracing::debug!(topic = %self.topic, channel = %channel.id, "subscribing");
                self.unreleased = Some(channel.id);
                self.channel = Some(channel);
            }
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "subscribe failed");
                self.deactivate();
            }
        }
    }

    /// Applies a channel status notice.
    pub fn on_status(&mut self, status: &ChannelStatus) {
        match (self.state, status) {
            (SubscriptionState::Subscribing, ChannelStatus::Subscribed) => {
                tracing::info!(topic = %self.topic, "realtime subscription active");
                self.state = SubscriptionState::Active;
            }
            (_, ChannelStatus::ChannelError(reason)) => {
                tracing::warn!(topic = %self.topic, %reason, "realtime channel error");
            }
            (_, ChannelStatus::TimedOut) => {
                tracing::warn!(topic = %self.topic, "realtime channel timed out");
            }
            (state, status) => {
                tracing::debug!(topic = %self.topic, ?state, ?status, "ignoring channel status");
            }
        }
    }

    /// Next message from the channel. `None` once deactivated, when no channel
    /// was ever opened, or when the feed dropped its side.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        if !self.is_live() {
            return None;
        }
        let message = self.channel.as_mut()?.messages.recv().await;
        if message.is_none() {
            tracing::debug!(topic = %self.topic, "feed closed the channel");
        }
        message
    }

    /// Next message already queued on the channel, without waiting.
    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        if !self.is_live() {
            return None;
        }
        self.channel.as_mut()?.messages.try_recv().ok()
    }

    /// Stops event delivery immediately. Queued messages are discarded.
    /// Returns the channel id when it still needs releasing.
    pub fn deactivate(&mut self) -> Option<ChannelId> {
        self.live.store(false, Ordering::Release);
        self.state = SubscriptionState::Closed;
        self.channel = None;
        self.unreleased.take()
    }

    /// Deactivates and releases the channel with the feed. Safe to call more
    /// than once; only the first call reaches the feed.
    pub async fn close(&mut self, feed: &dyn ChangeFeed) {
        let Some(channel) = self.deactivate() else {
            tracing::debug!(topic = %self.topic, "subscription already released");
            return;
        };
        match feed.unsubscribe(channel).await {
            Ok(()) => tracing::debug!(topic = %self.topic, %channel, "unsubscribed"),
            Err(e) => tracing::warn!(topic = %self.topic, %channel, error = %e, "unsubscribe failed"),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.deactivate() {
            // Dropping the receiver lets the feed prune the channel on its next send.
            tracing::debug!(topic = %self.topic, %channel, "subscription dropped without close");
        }
    }
}
