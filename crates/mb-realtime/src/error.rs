//! Error types for mb-realtime

use mb_core::{ChangeKind, EntityKind};
use thiserror::Error;

/// Why a change payload was rejected at the boundary.
///
/// These never reach callers of `LiveQuery::handle_message`; the payload is
/// logged and dropped.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("expected a {expected:?} change, got {actual:?}")]
    WrongEntity {
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("{0:?} change carries no record")]
    MissingRecord(ChangeKind),

    #[error("malformed {entity:?} record: {source}")]
    Malformed {
        entity: EntityKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("delete record has no numeric id")]
    MissingId,
}
