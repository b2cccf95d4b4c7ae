//! In-process change feed.
//!
//! The repo publishes a [`RawChange`] after every committed write; the hub
//! fans it out to channels whose topic accepts it. Channels whose receiver
//! was dropped are pruned on the next publish.

use async_trait::async_trait;
use dashmap::DashMap;
use mb_core::error::{AppError, Result};
use mb_core::{ChangeFeed, ChannelId, ChannelStatus, FeedChannel, FeedMessage, FeedTopic, RawChange};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

struct Registered {
    topic: FeedTopic,
    tx: mpsc::UnboundedSender<FeedMessage>,
}

#[derive(Default)]
pub struct LocalChangeHub {
    next_id: AtomicU64,
    channels: DashMap<ChannelId, Registered>,
}

impl LocalChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Delivers a change to every matching channel. Returns how many got it.
    /// Channels whose receiver is gone are pruned whether or not they match.
    pub fn publish(&self, change: RawChange) -> usize {
        let mut delivered = 0;
        self.channels.retain(|id, reg| {
            if !reg.topic.accepts(&change) {
                return keep_open(id, reg);
            }
            match reg.tx.send(FeedMessage::Change(change.clone())) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => keep_open(id, reg),
            }
        });
        tracing::trace!(entity = ?change.entity, kind = ?change.kind, delivered, "change published");
        delivered
    }

    /// Sends a status notice to every open channel, e.g. `ChannelError` when
    /// the backend connection drops. Abandoned channels are pruned.
    pub fn notify_all(&self, status: ChannelStatus) {
        self.channels.retain(|id, reg| match reg.tx.send(FeedMessage::Status(status.clone())) {
            Ok(()) => true,
            Err(_) => keep_open(id, reg),
        });
    }
}

fn keep_open(id: &ChannelId, reg: &Registered) -> bool {
    if reg.tx.is_closed() {
        tracing::debug!(channel = %id, "pruning abandoned channel");
        return false;
    }
    true
}

#[async_trait]
impl ChangeFeed for LocalChangeHub {
    async fn subscribe(&self, topic: &FeedTopic) -> Result<FeedChannel> {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedMessage::Status(ChannelStatus::Subscribed))
            .map_err(|_| AppError::Transport("channel closed during subscribe".into()))?;
        self.channels.insert(
            id,
            Registered {
                topic: topic.clone(),
                tx,
            },
        );
        tracing::debug!(channel = %id, %topic, "channel opened");
        Ok(FeedChannel { id, messages: rx })
    }

    async fn unsubscribe(&self, channel: ChannelId) -> Result<()> {
        match self.channels.remove(&channel) {
            Some((_, reg)) => {
                let _ = reg.tx.send(FeedMessage::Status(ChannelStatus::Closed));
                tracing::debug!(%channel, "channel closed");
                Ok(())
            }
            None => Err(AppError::not_found("channel", channel)),
        }
    }
}
