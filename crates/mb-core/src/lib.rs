//! moodboard/crates/mb-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Moodboard.

pub mod alias;
pub mod error;
pub mod feed;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use alias::*;
pub use error::*;
pub use feed::*;
pub use models::*;
pub use traits::*;
