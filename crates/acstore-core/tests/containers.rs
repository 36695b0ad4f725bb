// crates/acstore-core/tests/containers.rs
// ============================================================================
// Module: Attribute Container Tests
// Description: Tests for attribute values and container serialization rules.
// Purpose: Validate protected attribute handling, comparison strings, and
//          JSON helpers.
// Dependencies: acstore-core, serde_json
// ============================================================================
//! ## Overview
//! Covers serializable attribute selection, deterministic value strings,
//! filter matching, and schema-typed JSON decoding.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use acstore_core::AttributeContainer;
use acstore_core::AttributeContainerIdentifier;
use acstore_core::AttributeValue;
use acstore_core::ContainerDefinition;
use acstore_core::DataType;
use acstore_core::FilterExpression;
use acstore_core::SchemaError;
use acstore_core::SchemaHelper;
use serde_json::json;

/// Builds an event container with one protected attribute that is serialized.
fn sample_event() -> AttributeContainer {
    let mut container = AttributeContainer::new("event")
        .with_serializable_protected_attributes(vec!["_event_values_hash".to_string()]);
    container.set_attribute("timestamp", 1_700_000_000_i64);
    container.set_attribute("timestamp_desc", "Creation Time");
    container.set_attribute("_event_values_hash", "abc");
    container.set_attribute("_cache", "transient");
    container
}

#[test]
fn new_container_identifier_names_the_type() {
    let container = AttributeContainer::new("event");
    assert_eq!(container.container_type(), "event");
    assert_eq!(container.identifier().name.as_deref(), Some("event"));
    assert_eq!(container.identifier().sequence_number, None);
}

#[test]
fn protected_attributes_are_not_serialized_unless_listed() {
    let container = sample_event();
    assert!(container.is_serializable("timestamp"));
    assert!(container.is_serializable("_event_values_hash"));
    assert!(!container.is_serializable("_cache"));
    assert_eq!(container.get_attribute("_cache"), Some(&AttributeValue::from("transient")));

    let map = container.copy_to_map();
    assert!(map.contains_key("_event_values_hash"));
    assert!(!map.contains_key("_cache"));
    assert_eq!(map.len(), 3);
}

#[test]
fn attribute_names_list_protected_names_first() {
    let container = sample_event();
    assert_eq!(
        container.attribute_names(),
        vec![
            "_event_values_hash".to_string(),
            "timestamp".to_string(),
            "timestamp_desc".to_string()
        ]
    );
}

#[test]
fn copy_from_map_skips_unlisted_protected_names() {
    let mut values = BTreeMap::new();
    values.insert("parser".to_string(), AttributeValue::from("winreg"));
    values.insert("_internal".to_string(), AttributeValue::Int(1));
    let mut container = AttributeContainer::new("event_data");
    container.copy_from_map(&values);
    assert_eq!(container.get_attribute("parser"), Some(&AttributeValue::from("winreg")));
    assert_eq!(container.get_attribute("_internal"), None);
}

#[test]
fn remove_attribute_returns_previous_value() {
    let mut container = sample_event();
    assert_eq!(container.remove_attribute("timestamp"), Some(AttributeValue::Int(1_700_000_000)));
    assert_eq!(container.remove_attribute("timestamp"), None);
}

#[test]
fn attribute_values_string_is_sorted_and_excludes_hidden_values() {
    let mut container = sample_event();
    let mut map = BTreeMap::new();
    map.insert("b".to_string(), AttributeValue::Int(2));
    map.insert("a".to_string(), AttributeValue::Bool(true));
    container.set_attribute("extra", AttributeValue::Map(map));
    container.set_attribute("raw", AttributeValue::Bytes(vec![0x41, 0x00]));
    assert_eq!(
        container.attribute_values_string(),
        "_event_values_hash: abc, extra: {a: True, b: 2}, raw: b'A\\x00', timestamp: \
         1700000000, timestamp_desc: Creation Time"
    );
}

#[test]
fn attribute_values_hash_tracks_serializable_values() {
    let first = sample_event();
    let mut second = sample_event();
    second.set_attribute("_cache", "different");
    assert_eq!(first.attribute_values_hash(), second.attribute_values_hash());

    second.set_attribute("timestamp_desc", "Modification Time");
    assert_ne!(first.attribute_values_hash(), second.attribute_values_hash());
}

#[test]
fn matches_expression_handles_missing_and_unknown_attributes() {
    let container = sample_event();
    assert!(container.matches_expression(None));

    let matching = FilterExpression::parse("timestamp_desc == 'Creation Time'").unwrap();
    assert!(container.matches_expression(Some(&matching)));

    let unknown = FilterExpression::parse("parser == 'winreg'").unwrap();
    assert!(!container.matches_expression(Some(&unknown)));

    let hidden = FilterExpression::parse("_cache == 'transient'").unwrap();
    assert!(!container.matches_expression(Some(&hidden)));
}

#[test]
fn matches_expression_compares_identifiers_by_string_form() {
    let mut container = AttributeContainer::new("event");
    let identifier = AttributeContainerIdentifier::new("event_data", 4);
    container.set_attribute("event_data_identifier", identifier);
    let expression = FilterExpression::parse("event_data_identifier == 'event_data.4'").unwrap();
    assert!(container.matches_expression(Some(&expression)));
}

#[test]
fn to_json_includes_identifier_and_serializable_attributes() {
    let mut container = sample_event();
    container.set_identifier(AttributeContainerIdentifier::new("event", 2));
    assert_eq!(
        container.to_json(),
        json!({
            "identifier": "event.2",
            "attributes": {
                "_event_values_hash": "abc",
                "timestamp": 1_700_000_000,
                "timestamp_desc": "Creation Time",
            }
        })
    );
}

#[test]
fn from_json_attributes_decodes_typed_values() {
    let definition = ContainerDefinition::new("event_data")
        .with_attribute("pid", DataType::Int)
        .with_attribute("is_system", DataType::Bool)
        .with_attribute("tags", DataType::Custom("List[str]".to_string()))
        .with_attribute("event_identifier", DataType::Identifier);
    let helper = SchemaHelper::new();
    let object = json!({
        "pid": 4,
        "is_system": true,
        "tags": ["a", "b"],
        "event_identifier": "event.9",
        "parser": null,
    });
    let container =
        AttributeContainer::from_json_attributes(&definition, &helper, object.as_object().unwrap())
            .unwrap();
    assert_eq!(container.get_attribute("pid"), Some(&AttributeValue::Int(4)));
    assert_eq!(container.get_attribute("is_system"), Some(&AttributeValue::Bool(true)));
    assert_eq!(
        container.get_attribute("tags"),
        Some(&AttributeValue::List(vec![AttributeValue::from("a"), AttributeValue::from("b")]))
    );
    assert_eq!(
        container.get_attribute("event_identifier"),
        Some(&AttributeValue::Identifier(AttributeContainerIdentifier::new("event", 9)))
    );
    assert_eq!(container.get_attribute("parser"), None);
}

#[test]
fn from_json_attributes_rejects_unknown_and_mistyped_attributes() {
    let definition = ContainerDefinition::new("event_data").with_attribute("pid", DataType::Int);
    let helper = SchemaHelper::new();

    let unknown = json!({"parser": "winreg"});
    let error =
        AttributeContainer::from_json_attributes(&definition, &helper, unknown.as_object().unwrap())
            .unwrap_err();
    assert!(matches!(error, SchemaError::UnknownAttribute { .. }));

    let mistyped = json!({"pid": "four"});
    let error =
        AttributeContainer::from_json_attributes(
            &definition,
            &helper,
            mistyped.as_object().unwrap()
        )
            .unwrap_err();
    assert!(matches!(error, SchemaError::ValueMismatch { .. }));
}

#[test]
fn attribute_value_from_json_rejects_null_and_floats() {
    assert!(AttributeValue::from_json(&json!(null)).is_err());
    assert!(AttributeValue::from_json(&json!(1.5)).is_err());
    assert_eq!(
        AttributeValue::from_json(&json!({"k": [1, "v"]})).unwrap(),
        AttributeValue::Map(BTreeMap::from([(
            "k".to_string(),
            AttributeValue::List(vec![AttributeValue::Int(1), AttributeValue::from("v")])
        )]))
    );
}
