// crates/acstore-core/tests/memory_store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Tests for the in-memory attribute container store.
// Purpose: Validate identifier assignment, updates, filtering, and lifecycle.
// Dependencies: acstore-core
// ============================================================================
//! ## Overview
//! Ensures the in-memory store assigns dense sequence numbers, returns copies,
//! filters through container expressions, and enforces open/closed state.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::thread;

use acstore_core::AttributeContainer;
use acstore_core::AttributeContainerIdentifier;
use acstore_core::AttributeContainerStore;
use acstore_core::AttributeValue;
use acstore_core::InMemoryAttributeContainerStore;
use acstore_core::StorageProfiler;
use acstore_core::StoreError;
use acstore_core::profiler::PROFILE_GET_CONTAINERS;
use acstore_core::profiler::PROFILE_WRITE_NEW;

/// Returns an opened store.
fn open_store() -> InMemoryAttributeContainerStore {
    let store = InMemoryAttributeContainerStore::new();
    store.open().unwrap();
    store
}

/// Builds an event data container.
fn event_data(parser: &str, pid: i64) -> AttributeContainer {
    let mut container = AttributeContainer::new("event_data");
    container.set_attribute("parser", parser);
    container.set_attribute("pid", pid);
    container
}

#[test]
fn add_assigns_dense_identifiers_per_type() {
    let store = open_store();
    let mut first = event_data("winreg", 1);
    let mut second = event_data("filestat", 2);
    let mut other = AttributeContainer::new("event");
    store.add_attribute_container(&mut first).unwrap();
    store.add_attribute_container(&mut second).unwrap();
    store.add_attribute_container(&mut other).unwrap();

    assert_eq!(first.identifier(), &AttributeContainerIdentifier::new("event_data", 1));
    assert_eq!(second.identifier(), &AttributeContainerIdentifier::new("event_data", 2));
    assert_eq!(other.identifier(), &AttributeContainerIdentifier::new("event", 1));
    assert_eq!(store.get_number_of_attribute_containers("event_data").unwrap(), 2);
    assert!(store.has_attribute_containers("event").unwrap());
    assert!(!store.has_attribute_containers("event_tag").unwrap());
}

#[test]
fn container_types_ignore_case() {
    let store = open_store();
    let mut upper = AttributeContainer::new("Event_Data");
    upper.set_attribute("pid", 1_i64);
    let mut lower = event_data("winreg", 2);
    store.add_attribute_container(&mut upper).unwrap();
    store.add_attribute_container(&mut lower).unwrap();

    assert_eq!(upper.identifier(), &AttributeContainerIdentifier::new("event_data", 1));
    assert_eq!(lower.identifier(), &AttributeContainerIdentifier::new("event_data", 2));
    assert_eq!(store.get_number_of_attribute_containers("EVENT_DATA").unwrap(), 2);
    assert!(store.get_attribute_container_by_index("Event_Data", 1).unwrap().is_some());
    let filtered = store.get_attribute_containers("event_DATA", Some("pid == 1")).unwrap();
    assert_eq!(filtered.len(), 1);
}

#[test]
fn reads_by_index_and_identifier() {
    let store = open_store();
    let mut container = event_data("winreg", 4);
    store.add_attribute_container(&mut container).unwrap();

    let by_index = store.get_attribute_container_by_index("event_data", 0).unwrap().unwrap();
    assert_eq!(by_index, container);
    assert!(store.get_attribute_container_by_index("event_data", 1).unwrap().is_none());

    let by_identifier = store
        .get_attribute_container_by_identifier("event_data", container.identifier())
        .unwrap()
        .unwrap();
    assert_eq!(by_identifier.get_attribute("parser"), Some(&AttributeValue::from("winreg")));

    let unset = AttributeContainerIdentifier::default();
    assert!(matches!(
        store.get_attribute_container_by_identifier("event_data", &unset),
        Err(StoreError::Invalid(_))
    ));
}

#[test]
fn update_overwrites_existing_and_rejects_missing() {
    let store = open_store();
    let mut container = event_data("winreg", 4);
    store.add_attribute_container(&mut container).unwrap();

    container.set_attribute("pid", 8_i64);
    store.update_attribute_container(&container).unwrap();
    let stored = store.get_attribute_container_by_index("event_data", 0).unwrap().unwrap();
    assert_eq!(stored.get_attribute("pid"), Some(&AttributeValue::Int(8)));

    let unstored = event_data("other", 1);
    assert!(matches!(
        store.update_attribute_container(&unstored),
        Err(StoreError::MissingContainer(_))
    ));
    let mut beyond = event_data("other", 1);
    beyond.set_identifier(AttributeContainerIdentifier::new("event_data", 5));
    assert!(matches!(
        store.update_attribute_container(&beyond),
        Err(StoreError::MissingContainer(_))
    ));
}

#[test]
fn reads_return_copies() {
    let store = open_store();
    let mut container = event_data("winreg", 4);
    store.add_attribute_container(&mut container).unwrap();

    let mut copy = store.get_attribute_container_by_index("event_data", 0).unwrap().unwrap();
    copy.set_attribute("pid", 99_i64);
    let stored = store.get_attribute_container_by_index("event_data", 0).unwrap().unwrap();
    assert_eq!(stored.get_attribute("pid"), Some(&AttributeValue::Int(4)));
}

#[test]
fn get_containers_filters_in_sequence_order() {
    let store = open_store();
    for (parser, pid) in [("winreg", 1), ("filestat", 2), ("winreg", 3)] {
        store.add_attribute_container(&mut event_data(parser, pid)).unwrap();
    }
    let all = store.get_attribute_containers("event_data", None).unwrap();
    assert_eq!(all.len(), 3);

    let winreg = store.get_attribute_containers("event_data", Some("parser == 'winreg'")).unwrap();
    let sequence_numbers: Vec<Option<u64>> =
        winreg.iter().map(|c| c.identifier().sequence_number).collect();
    assert_eq!(sequence_numbers, vec![Some(1), Some(3)]);

    let unknown = store.get_attribute_containers("event_data", Some("missing == 1")).unwrap();
    assert!(unknown.is_empty());
    assert!(store.get_attribute_containers("event", None).unwrap().is_empty());

    assert!(matches!(
        store.get_attribute_containers("event_data", Some("parser ==")),
        Err(StoreError::Invalid(_))
    ));
}

#[test]
fn lifecycle_is_enforced() {
    let store = InMemoryAttributeContainerStore::new();
    assert!(!store.is_open());
    assert_eq!(store.get_number_of_attribute_containers("event"), Err(StoreError::Closed));
    assert_eq!(
        store.add_attribute_container(&mut AttributeContainer::new("event")),
        Err(StoreError::Closed)
    );
    assert_eq!(store.close(), Err(StoreError::AlreadyClosed));

    store.open().unwrap();
    assert_eq!(store.open(), Err(StoreError::AlreadyOpen));
    store.close().unwrap();
    assert_eq!(store.get_attribute_containers("event", None), Err(StoreError::Closed));
}

#[test]
fn profiler_records_operations() {
    let store = open_store();
    let profiler = Arc::new(StorageProfiler::new());
    store.set_storage_profiler(Some(Arc::clone(&profiler)));
    store.add_attribute_container(&mut event_data("winreg", 1)).unwrap();
    store.get_attribute_containers("event_data", None).unwrap();

    let snapshot = profiler.snapshot();
    assert_eq!(snapshot.timings[PROFILE_WRITE_NEW].count, 1);
    assert_eq!(snapshot.timings[PROFILE_GET_CONTAINERS].count, 1);

    store.set_storage_profiler(None);
    store.add_attribute_container(&mut event_data("winreg", 2)).unwrap();
    assert_eq!(profiler.snapshot().timings[PROFILE_WRITE_NEW].count, 1);
}

#[test]
fn concurrent_adds_keep_sequence_numbers_dense() {
    let store = open_store();
    let handles: Vec<_> = (0 .. 4)
        .map(|worker| {
            let store = store.clone();
            thread::spawn(move || {
                for pid in 0 .. 25 {
                    let mut container = event_data("worker", worker * 100 + pid);
                    store.add_attribute_container(&mut container).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let containers = store.get_attribute_containers("event_data", None).unwrap();
    let sequence_numbers: Vec<u64> =
        containers.iter().filter_map(|c| c.identifier().sequence_number).collect();
    assert_eq!(sequence_numbers, (1 ..= 100).collect::<Vec<u64>>());
}
