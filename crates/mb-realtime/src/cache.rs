//! In-memory list cache for one screen.
//!
//! Holds at most one entity per id. Change events go through [`LiveCache::apply`];
//! fetched snapshots and pages bypass the event rules and overwrite whatever
//! they cover.

use crate::guard::ValidatedChange;
use mb_core::LiveEntity;

/// Where newly inserted entities land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Posts: inserts are prepended.
    NewestFirst,
    /// Comments: inserts are appended.
    Chronological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

impl CacheOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct LiveCache<T> {
    order: ListOrder,
    items: Vec<T>,
}

impl<T: LiveEntity> LiveCache<T> {
    pub fn new(order: ListOrder) -> Self {
        Self {
            order,
            items: Vec::new(),
        }
    }

    pub fn order(&self) -> ListOrder {
        self.order
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn apply(&mut self, change: ValidatedChange<T>) -> CacheOutcome {
        match change {
            ValidatedChange::Insert(entity) => self.insert(entity),
            ValidatedChange::Update(entity) => self.update(entity),
            ValidatedChange::Delete(id) => self.remove(id),
        }
    }

    /// No-op when the id is already cached (duplicate delivery, or our own
    /// optimistic insert got there first).
    pub fn insert(&mut self, entity: T) -> CacheOutcome {
        if self.position(entity.id()).is_some() {
            return CacheOutcome::Ignored;
        }
        match self.order {
            ListOrder::NewestFirst => self.items.insert(0, entity),
            ListOrder::Chronological => self.items.push(entity),
        }
        CacheOutcome::Inserted
    }

    /// Replaces in place. Absent ids are not resurrected.
    pub fn update(&mut self, entity: T) -> CacheOutcome {
        match self.position(entity.id()) {
            Some(idx) => {
                self.items[idx] = entity;
                CacheOutcome::Replaced
            }
            None => CacheOutcome::Ignored,
        }
    }

    pub fn remove(&mut self, id: i64) -> CacheOutcome {
        match self.position(id) {
            Some(idx) => {
                self.items.remove(idx);
                CacheOutcome::Removed
            }
            None => CacheOutcome::Ignored,
        }
    }

    /// Replaces the whole list with a fetched snapshot, already in display order.
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        self.merge_page(items);
    }

    /// Appends a fetched page. Entities already cached are overwritten in
    /// place by the fetched version. Returns how many were appended.
    pub fn merge_page(&mut self, items: Vec<T>) -> usize {
        let mut appended = 0;
        for item in items {
            match self.position(item.id()) {
                Some(idx) => self.items[idx] = item,
                None => {
                    self.items.push(item);
                    appended += 1;
                }
            }
        }
        appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mb_core::Post;

    fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            board_id: Some(1),
            group_id: None,
            author_id: None,
            author_name: None,
            is_anonymous: true,
            display_name: "익명".to_string(),
            title: title.to_string(),
            content: String::new(),
            emotions: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    fn posts(ids: &[i64]) -> LiveCache<Post> {
        let mut cache = LiveCache::new(ListOrder::NewestFirst);
        cache.replace_all(ids.iter().map(|&id| post(id, "")).collect());
        cache
    }

    #[test]
    fn duplicate_insert_keeps_single_copy() {
        let mut cache = posts(&[1, 2, 3]);
        assert_eq!(cache.apply(ValidatedChange::Insert(post(4, ""))), CacheOutcome::Inserted);
        assert_eq!(cache.apply(ValidatedChange::Insert(post(4, ""))), CacheOutcome::Ignored);
        assert_eq!(cache.ids(), vec![4, 1, 2, 3]);
    }

    #[test]
    fn insert_of_existing_id_does_not_overwrite() {
        let mut cache = posts(&[5]);
        cache.insert(post(5, "from event"));
        assert_eq!(cache.get(5).unwrap().title, "");
    }

    #[test]
    fn chronological_insert_appends() {
        let mut cache = LiveCache::new(ListOrder::Chronological);
        cache.insert(post(1, ""));
        cache.insert(post(2, ""));
        assert_eq!(cache.ids(), vec![1, 2]);
    }

    #[test]
    fn delete_absent_is_noop() {
        let mut cache = posts(&[1, 2, 3]);
        assert_eq!(cache.apply(ValidatedChange::Delete(42)), CacheOutcome::Ignored);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn delete_present_removes() {
        let mut cache = posts(&[1, 2, 3]);
        assert_eq!(cache.remove(2), CacheOutcome::Removed);
        assert_eq!(cache.ids(), vec![1, 3]);
    }

    #[test]
    fn update_absent_is_noop() {
        let mut cache = posts(&[1]);
        assert_eq!(cache.apply(ValidatedChange::Update(post(9, "x"))), CacheOutcome::Ignored);
        assert_eq!(cache.ids(), vec![1]);
    }

    #[test]
    fn update_keeps_position() {
        let mut cache = posts(&[1, 2, 3]);
        cache.update(post(2, "edited"));
        assert_eq!(cache.ids(), vec![1, 2, 3]);
        assert_eq!(cache.get(2).unwrap().title, "edited");
    }

    #[test]
    fn replace_all_drops_duplicate_ids() {
        let mut cache = LiveCache::new(ListOrder::NewestFirst);
        cache.replace_all(vec![post(1, "a"), post(1, "b"), post(2, "")]);
        assert_eq!(cache.ids(), vec![1, 2]);
        assert_eq!(cache.get(1).unwrap().title, "b");
    }

    #[test]
    fn merge_page_overwrites_and_appends() {
        let mut cache = posts(&[3, 2]);
        let appended = cache.merge_page(vec![post(2, "fresh"), post(1, "")]);
        assert_eq!(appended, 1);
        assert_eq!(cache.ids(), vec![3, 2, 1]);
        assert_eq!(cache.get(2).unwrap().title, "fresh");
    }
}
