//! # mb-realtime
//!
//! Keeps in-memory list caches consistent with a push-based change feed while
//! coexisting with pull-based fetches.
//!
//! ## Module Structure
//!
//! - `guard`: validates raw feed payloads into typed changes
//! - `cache`: insert/update/delete rules over an ordered, id-unique list
//! - `subscription`: Idle -> Subscribing -> Active -> Closed lifecycle
//! - `live_query`: one screen's cache + subscription
//! - `registry`: retention of caches for inactive query keys

pub mod cache;
pub mod error;
pub mod guard;
pub mod live_query;
pub mod registry;
pub mod subscription;

pub use cache::{CacheOutcome, ListOrder, LiveCache};
pub use error::ShapeError;
pub use guard::{validate, ValidatedChange};
pub use live_query::LiveQuery;
pub use registry::QueryCacheRegistry;
pub use subscription::{Subscription, SubscriptionState};
