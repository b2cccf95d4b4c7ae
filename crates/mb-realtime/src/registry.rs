//! Parks caches of inactive query keys for a retention window.
//!
//! When a screen unmounts, its cache is parked under the query key. A
//! remount within the window starts from the parked snapshot (and refetches
//! on top); after the window the snapshot is evicted.

use crate::cache::{ListOrder, LiveCache};
use crate::live_query::LiveQuery;
use mb_core::{ChangeFeed, FeedTopic, LiveEntity};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Parked<T> {
    cache: LiveCache<T>,
    parked_at: Instant,
}

pub struct QueryCacheRegistry<T> {
    retention: Duration,
    parked: HashMap<String, Parked<T>>,
}

impl<T: LiveEntity> QueryCacheRegistry<T> {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            parked: HashMap::new(),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    /// Parks a cache under `key`. Expired snapshots are dropped on the way.
    pub fn park(&mut self, key: String, cache: LiveCache<T>, now: Instant) {
        self.evict_expired(now);
        self.parked.insert(key, Parked { cache, parked_at: now });
    }

    /// Takes the parked cache for `key` if it is still within retention.
    pub fn take(&mut self, key: &str, now: Instant) -> Option<LiveCache<T>> {
        let parked = self.parked.remove(key)?;
        if now.saturating_duration_since(parked.parked_at) > self.retention {
            tracing::debug!(key, "parked cache expired");
            return None;
        }
        Some(parked.cache)
    }

    /// Drops every snapshot older than the retention window.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let retention = self.retention;
        let before = self.parked.len();
        self.parked
            .retain(|_, p| now.saturating_duration_since(p.parked_at) <= retention);
        let evicted = before - self.parked.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted parked query caches");
        }
        evicted
    }

    /// Builds a query for `topic`, seeded from a parked cache when one is fresh.
    pub fn activate(&mut self, topic: FeedTopic, order: ListOrder, now: Instant) -> LiveQuery<T> {
        let restored = self.take(&topic.key(), now);
        self.evict_expired(now);
        match restored {
            Some(cache) => LiveQuery::with_cache(topic, cache),
            None => LiveQuery::new(topic, order),
        }
    }

    /// Unmounts the query and parks its cache.
    pub async fn deactivate(&mut self, mut query: LiveQuery<T>, feed: &dyn ChangeFeed, now: Instant) {
        query.unmount(feed).await;
        let key = query.key();
        self.park(key, query.into_cache(), now);
    }
}
