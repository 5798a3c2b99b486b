use scribe_core::AppError;
use scribe_domain::{EntitySchema, EntityState};
use serde_json::{Map, Value, json};

use super::ChangeTracker;

fn tracker() -> ChangeTracker {
    let customer = EntitySchema::new("customer", "id", ["id", "name", "email"])
        .unwrap_or_else(|_| unreachable!());
    ChangeTracker::new([customer])
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn added_entity_is_snapshotted_without_prior_values() {
    let mut tracker = tracker();
    let handle = tracker
        .add("customer", object(json!({"name": "Ada"})))
        .unwrap_or_else(|_| unreachable!());

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].handle, handle);
    assert_eq!(snapshot[0].state, EntityState::Added);
    assert!(snapshot[0].prior_values.is_none());
    assert_eq!(tracker.identifier_value(handle), Some(Value::Null));
}

#[test]
fn changing_a_field_marks_entity_modified() {
    let mut tracker = tracker();
    let handle = tracker
        .attach("customer", object(json!({"id": 1, "name": "A"})))
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(tracker.state(handle), EntityState::Unchanged);
    assert!(!tracker.has_changes());

    assert!(tracker.set_field(handle, "name", json!("B")).is_ok());

    assert_eq!(tracker.state(handle), EntityState::Modified);
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot[0].modified_field_names(), vec!["name"]);
}

#[test]
fn reverting_a_field_returns_entity_to_unchanged() {
    let mut tracker = tracker();
    let handle = tracker
        .attach("customer", object(json!({"id": 1, "name": "A"})))
        .unwrap_or_else(|_| unreachable!());

    assert!(tracker.set_field(handle, "name", json!("B")).is_ok());
    assert!(tracker.set_field(handle, "name", json!("A")).is_ok());

    assert_eq!(tracker.state(handle), EntityState::Unchanged);
    assert!(tracker.snapshot().is_empty());
}

#[test]
fn removing_added_entity_detaches_it() {
    let mut tracker = tracker();
    let handle = tracker
        .add("customer", object(json!({"name": "Ada"})))
        .unwrap_or_else(|_| unreachable!());

    assert!(tracker.remove(handle).is_ok());

    assert_eq!(tracker.state(handle), EntityState::Detached);
    assert!(!tracker.has_changes());
}

#[test]
fn removing_modified_entity_restores_original_values() {
    let mut tracker = tracker();
    let handle = tracker
        .attach("customer", object(json!({"id": 2, "name": "A"})))
        .unwrap_or_else(|_| unreachable!());
    assert!(tracker.set_field(handle, "name", json!("B")).is_ok());

    assert!(tracker.remove(handle).is_ok());

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot[0].state, EntityState::Deleted);
    assert!(snapshot[0].current_values.is_none());
    assert_eq!(snapshot[0].prior_value("name"), &json!("A"));
}

#[test]
fn identifier_of_stored_entity_cannot_change() {
    let mut tracker = tracker();
    let handle = tracker
        .attach("customer", object(json!({"id": 3})))
        .unwrap_or_else(|_| unreachable!());

    let result = tracker.set_field(handle, "id", json!(4));

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn undeclared_field_is_rejected() {
    let mut tracker = tracker();
    let handle = tracker
        .attach("customer", object(json!({"id": 3})))
        .unwrap_or_else(|_| unreachable!());

    let result = tracker.set_field(handle, "phone", json!("555"));

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn attaching_same_identifier_twice_conflicts() {
    let mut tracker = tracker();
    assert!(tracker.attach("customer", object(json!({"id": 5}))).is_ok());

    let result = tracker.attach("customer", object(json!({"id": 5})));

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[test]
fn attaching_without_integer_identifier_is_rejected() {
    let mut tracker = tracker();

    let result = tracker.attach("customer", object(json!({"id": "abc"})));

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn unknown_entity_type_is_not_found() {
    let mut tracker = tracker();

    let result = tracker.add("invoice", Map::new());

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn accept_changes_promotes_values_and_forgets_deleted_entries() {
    let mut tracker = tracker();
    let added = tracker
        .add("customer", object(json!({"name": "New"})))
        .unwrap_or_else(|_| unreachable!());
    let deleted = tracker
        .attach("customer", object(json!({"id": 9})))
        .unwrap_or_else(|_| unreachable!());
    assert!(tracker.remove(deleted).is_ok());
    assert!(tracker.assign_identifier(added, 10).is_ok());

    tracker.accept_changes();

    assert_eq!(tracker.state(added), EntityState::Unchanged);
    assert_eq!(tracker.state(deleted), EntityState::Detached);
    assert_eq!(tracker.identifier_value(added), Some(json!(10)));
    assert_eq!(tracker.find("customer", 10), Some(added));
    assert!(!tracker.has_changes());
}

#[test]
fn snapshot_preserves_tracking_order() {
    let mut tracker = tracker();
    let first = tracker
        .attach("customer", object(json!({"id": 1, "name": "A"})))
        .unwrap_or_else(|_| unreachable!());
    let second = tracker
        .add("customer", object(json!({"name": "B"})))
        .unwrap_or_else(|_| unreachable!());
    assert!(tracker.set_field(first, "name", json!("C")).is_ok());

    let handles: Vec<_> = tracker
        .snapshot()
        .into_iter()
        .map(|change| change.handle)
        .collect();

    assert_eq!(handles, vec![first, second]);
}
