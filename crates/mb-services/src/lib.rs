//! # mb-services
//!
//! Application services on top of the mb-core ports: composing posts and
//! comments under a board's anonymity policy, reactions, group invites, and
//! emotion tagging.

pub mod community;
pub mod emotion;

pub use community::{Author, CommunityService, ComposeComment, ComposePost, ReactionToggle};
pub use emotion::{clamp_emotions, detect_emotions, RetryPolicy, MAX_EMOTIONS};
