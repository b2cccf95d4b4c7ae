//! Shape guard between the change feed and typed cache logic.
//!
//! Inserts and updates must decode into the full entity. Deletes fall back
//! to the bare `id` because the backend may truncate them to the primary key.

use crate::error::ShapeError;
use mb_core::{ChangeKind, LiveEntity, RawChange};
use serde_json::Value;

/// A change that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedChange<T> {
    Insert(T),
    Update(T),
    Delete(i64),
}

pub fn validate<T: LiveEntity>(change: &RawChange) -> Result<ValidatedChange<T>, ShapeError> {
    if change.entity != T::KIND {
        return Err(ShapeError::WrongEntity {
            expected: T::KIND,
            actual: change.entity,
        });
    }

    match change.kind {
        ChangeKind::Insert => decode::<T>(change.new.as_ref(), change.kind).map(ValidatedChange::Insert),
        ChangeKind::Update => decode::<T>(change.new.as_ref(), change.kind).map(ValidatedChange::Update),
        ChangeKind::Delete => {
            let record = change.old.as_ref().ok_or(ShapeError::MissingRecord(change.kind))?;
            match serde_json::from_value::<T>(record.clone()) {
                Ok(entity) => Ok(ValidatedChange::Delete(entity.id())),
                Err(_) => bare_id(record).map(ValidatedChange::Delete),
            }
        }
    }
}

fn decode<T: LiveEntity>(record: Option<&Value>, kind: ChangeKind) -> Result<T, ShapeError> {
    let record = record.ok_or(ShapeError::MissingRecord(kind))?;
    serde_json::from_value(record.clone()).map_err(|source| ShapeError::Malformed {
        entity: T::KIND,
        source,
    })
}

fn bare_id(record: &Value) -> Result<i64, ShapeError> {
    let id = record.get("id").and_then(Value::as_i64).ok_or(ShapeError::MissingId)?;
    tracing::debug!(id, "accepting truncated delete payload");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_core::{Comment, EntityKind};
    use serde_json::json;

    fn comment_json(id: i64) -> Value {
        json!({
            "id": id,
            "post_id": 7,
            "is_anonymous": true,
            "display_name": "조용한 여우 2",
            "content": "nice",
            "created_at": "2024-05-01T12:00:00Z"
        })
    }

    fn raw(kind: ChangeKind, new: Option<Value>, old: Option<Value>) -> RawChange {
        RawChange {
            kind,
            entity: EntityKind::Comment,
            new,
            old,
        }
    }

    #[test]
    fn valid_insert_decodes() {
        let v = validate::<Comment>(&raw(ChangeKind::Insert, Some(comment_json(5)), None)).unwrap();
        match v {
            ValidatedChange::Insert(c) => assert_eq!(c.id, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn insert_with_wrong_type_is_rejected() {
        let mut bad = comment_json(5);
        bad["id"] = json!("five");
        let err = validate::<Comment>(&raw(ChangeKind::Insert, Some(bad), None)).unwrap_err();
        assert!(matches!(err, ShapeError::Malformed { .. }));
    }

    #[test]
    fn insert_missing_required_field_is_rejected() {
        let mut bad = comment_json(5);
        bad.as_object_mut().unwrap().remove("content");
        assert!(validate::<Comment>(&raw(ChangeKind::Insert, Some(bad), None)).is_err());
    }

    #[test]
    fn update_without_record_is_rejected() {
        let err = validate::<Comment>(&raw(ChangeKind::Update, None, None)).unwrap_err();
        assert!(matches!(err, ShapeError::MissingRecord(ChangeKind::Update)));
    }

    #[test]
    fn truncated_delete_falls_back_to_id() {
        let v = validate::<Comment>(&raw(ChangeKind::Delete, None, Some(json!({"id": 9})))).unwrap();
        assert_eq!(v, ValidatedChange::Delete(9));
    }

    #[test]
    fn delete_without_numeric_id_is_rejected() {
        let err = validate::<Comment>(&raw(ChangeKind::Delete, None, Some(json!({"id": "9"})))).unwrap_err();
        assert!(matches!(err, ShapeError::MissingId));
    }

    #[test]
    fn wrong_entity_kind_is_rejected() {
        let mut change = raw(ChangeKind::Insert, Some(comment_json(1)), None);
        change.entity = EntityKind::Post;
        assert!(matches!(
            validate::<Comment>(&change),
            Err(ShapeError::WrongEntity { .. })
        ));
    }
}
