// crates/acstore-core/tests/schema.rs
// ============================================================================
// Module: Schema Tests
// Description: Tests for data types, the schema helper, and JSON serializers.
// Purpose: Validate data type naming and custom type serialization.
// Dependencies: acstore-core
// ============================================================================
//! ## Overview
//! Ensures built-in data types parse from their names, custom types resolve
//! through the registry, and JSON serializers enforce list shapes.

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

use acstore_core::AttributeContainerIdentifier;
use acstore_core::AttributeValue;
use acstore_core::DataType;
use acstore_core::JsonAttributeSerializer;
use acstore_core::SchemaError;
use acstore_core::SchemaHelper;
use acstore_core::schema::AttributeSerializer;
use acstore_core::schema::JsonElementKind;
use serde_json::json;

#[test]
fn data_types_parse_and_display_by_name() {
    for name in ["AttributeContainerIdentifier", "bool", "int", "str", "timestamp", "List[str]"] {
        let data_type: DataType = name.parse().unwrap();
        assert_eq!(data_type.to_string(), name);
    }
    assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
    assert_eq!("List[int]".parse::<DataType>().unwrap(), DataType::Custom("List[int]".to_string()));
    assert!("".parse::<DataType>().is_err());
    assert!(" int".parse::<DataType>().is_err());
}

#[test]
fn data_types_serialize_as_names() {
    let json = serde_json::to_value(DataType::Identifier).unwrap();
    assert_eq!(json, json!("AttributeContainerIdentifier"));
    let decoded: DataType = serde_json::from_value(json!("timestamp")).unwrap();
    assert_eq!(decoded, DataType::Timestamp);
}

#[test]
fn schema_helper_has_builtin_and_default_list_types() {
    let helper = SchemaHelper::new();
    assert!(helper.has_data_type("bool"));
    assert!(helper.has_data_type("AttributeContainerIdentifier"));
    assert!(helper.has_data_type("List[str]"));
    assert!(helper.has_data_type("List[int]"));
    assert!(!helper.has_data_type("List[bool]"));
    assert_eq!(helper.custom_data_types(), vec!["List[int]", "List[str]"]);
}

#[test]
fn schema_helper_registration_rules() {
    let mut helper = SchemaHelper::new();
    assert_eq!(
        helper.register_data_type("List[str]", Arc::new(JsonAttributeSerializer::new())),
        Err(SchemaError::AlreadyRegistered("List[str]".to_string()))
    );
    assert_eq!(
        helper.register_data_type("int", Arc::new(JsonAttributeSerializer::new())),
        Err(SchemaError::AlreadyRegistered("int".to_string()))
    );
    helper.register_data_type("Payload", Arc::new(JsonAttributeSerializer::new())).unwrap();
    assert!(helper.has_data_type("Payload"));
    helper.deregister_data_type("Payload").unwrap();
    assert_eq!(
        helper.deregister_data_type("Payload"),
        Err(SchemaError::NotRegistered("Payload".to_string()))
    );
}

#[test]
fn attribute_serializer_only_supports_json() {
    let helper = SchemaHelper::new();
    assert!(helper.attribute_serializer("List[str]", "json").is_ok());
    assert_eq!(
        helper.attribute_serializer("List[str]", "protobuf").unwrap_err(),
        SchemaError::UnsupportedSerializationFormat("protobuf".to_string())
    );
    assert_eq!(
        helper.attribute_serializer("Missing", "json").unwrap_err(),
        SchemaError::UnknownDataType("Missing".to_string())
    );
}

#[test]
fn list_serializers_enforce_element_kind() {
    let serializer = JsonAttributeSerializer::list_of(JsonElementKind::Int);
    let value = AttributeValue::List(vec![AttributeValue::Int(1), AttributeValue::Int(2)]);
    let text = serializer.serialize_value(&value).unwrap();
    assert_eq!(text, "[1,2]");
    assert_eq!(serializer.deserialize_value(&text).unwrap(), value);

    let mixed = AttributeValue::List(vec![AttributeValue::Int(1), AttributeValue::from("x")]);
    assert!(matches!(serializer.serialize_value(&mixed), Err(SchemaError::ValueMismatch { .. })));
    assert!(matches!(
        serializer.deserialize_value("[\"x\"]"),
        Err(SchemaError::ValueMismatch { .. })
    ));
    assert!(matches!(serializer.deserialize_value("{"), Err(SchemaError::Json(_))));
    assert!(matches!(
        serializer.serialize_value(&AttributeValue::Int(1)),
        Err(SchemaError::ValueMismatch { .. })
    ));
}

#[test]
fn check_value_matches_declared_types() {
    let helper = SchemaHelper::new();
    helper.check_value(&DataType::Bool, &AttributeValue::Bool(false)).unwrap();
    helper.check_value(&DataType::Timestamp, &AttributeValue::Int(10)).unwrap();
    helper
        .check_value(
            &DataType::Identifier,
            &AttributeValue::Identifier(AttributeContainerIdentifier::new("event", 1)),
        )
        .unwrap();
    helper
        .check_value(
            &DataType::Custom("List[str]".to_string()),
            &AttributeValue::List(vec![AttributeValue::from("a")]),
        )
        .unwrap();
    assert!(matches!(
        helper.check_value(&DataType::Str, &AttributeValue::Int(1)),
        Err(SchemaError::ValueMismatch { .. })
    ));
    assert!(matches!(
        helper.check_value(&DataType::Custom("Unknown".to_string()), &AttributeValue::Int(1)),
        Err(SchemaError::UnknownDataType(_))
    ));
}

#[test]
fn value_from_json_follows_data_type() {
    let helper = SchemaHelper::new();
    assert_eq!(helper.value_from_json(&DataType::Int, &json!(5)).unwrap(), AttributeValue::Int(5));
    assert!(helper.value_from_json(&DataType::Bool, &json!(1)).is_err());
    assert!(helper.value_from_json(&DataType::Identifier, &json!("event")).is_err());
    assert_eq!(
        helper.value_from_json(&DataType::Custom("List[int]".to_string()), &json!([3])).unwrap(),
        AttributeValue::List(vec![AttributeValue::Int(3)])
    );
}
