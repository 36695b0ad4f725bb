// crates/acstore-core/tests/definitions.rs
// ============================================================================
// Module: Definitions File Tests
// Description: Tests for the YAML container definitions reader.
// Purpose: Validate the checked-in fixtures and reader error handling.
// Dependencies: acstore-core, tempfile
// ============================================================================
//! ## Overview
//! Reads the `test_data/` fixtures and ensures malformed documents fail with
//! format errors instead of producing partial definitions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::PathBuf;

use acstore_core::AttributeContainersManager;
use acstore_core::DataType;
use acstore_core::DefinitionsError;
use acstore_core::SchemaHelper;
use acstore_core::definitions::MAX_DEFINITIONS_FILE_BYTES;
use acstore_core::read_definitions;
use acstore_core::read_definitions_file;

/// Returns the path of a workspace fixture.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../test_data").join(name)
}

#[test]
fn reads_fixture_definitions() {
    let definitions =
        read_definitions_file(&fixture("definitions.yaml"), &SchemaHelper::new()).unwrap();
    let types: Vec<&str> = definitions.iter().map(|d| d.container_type.as_str()).collect();
    assert_eq!(types, vec!["event", "event_data", "event_tag"]);

    let event = &definitions[0];
    assert_eq!(event.schema.get("timestamp"), Some(&DataType::Timestamp));
    assert_eq!(event.schema.get("event_data_identifier"), Some(&DataType::Identifier));
    assert_eq!(event.serializable_protected_attributes, vec!["_event_values_hash".to_string()]);

    let event_data = &definitions[1];
    assert_eq!(event_data.schema.get("is_system"), Some(&DataType::Bool));
    assert_eq!(event_data.schema.get("tags"), Some(&DataType::Custom("List[str]".to_string())));
}

#[test]
fn fixture_definitions_register_with_manager() {
    let manager = AttributeContainersManager::new();
    let definitions =
        read_definitions_file(&fixture("definitions.yaml"), &manager.schema_helper()).unwrap();
    manager.register_attribute_containers(definitions).unwrap();
    assert_eq!(manager.container_types(), vec!["event", "event_data", "event_tag"]);
}

#[test]
fn unsupported_types_are_format_errors() {
    let error =
        read_definitions_file(&fixture("definitions_unsupported_type.yaml"), &SchemaHelper::new())
            .unwrap_err();
    let DefinitionsError::Format {
        document,
        message,
    } = error
    else {
        panic!("expected format error, got {error:?}");
    };
    assert_eq!(document, 0);
    assert!(message.contains("Map[str, int]"));
}

#[test]
fn missing_attributes_are_format_errors() {
    let error = read_definitions_file(
        &fixture("definitions_missing_attributes.yaml"),
        &SchemaHelper::new(),
    )
    .unwrap_err();
    assert!(matches!(error, DefinitionsError::Format { document: 0, .. }));
}

#[test]
fn attribute_entries_need_name_and_type() {
    let helper = SchemaHelper::new();
    let missing_type = "name: event\nattributes:\n- name: timestamp\n";
    assert!(matches!(
        read_definitions(missing_type, &helper),
        Err(DefinitionsError::Format { .. })
    ));
    let missing_name = "name: event\nattributes:\n- type: int\n";
    assert!(matches!(
        read_definitions(missing_name, &helper),
        Err(DefinitionsError::Format { .. })
    ));
    let missing_type_name = "attributes: []\n";
    assert!(matches!(
        read_definitions(missing_type_name, &helper),
        Err(DefinitionsError::Format { .. })
    ));
}

#[test]
fn empty_documents_are_skipped_and_bad_yaml_fails() {
    let helper = SchemaHelper::new();
    let text = "---\nname: event\nattributes: []\n---\n";
    let definitions = read_definitions(text, &helper).unwrap();
    assert_eq!(definitions.len(), 1);
    assert!(definitions[0].schema.is_empty());

    assert!(matches!(
        read_definitions("name: [unclosed\n", &helper),
        Err(DefinitionsError::Yaml(_))
    ));
}

#[test]
fn missing_and_oversized_files_fail() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.yaml");
    assert!(matches!(
        read_definitions_file(&missing, &SchemaHelper::new()),
        Err(DefinitionsError::Io { .. })
    ));

    let oversized = dir.path().join("big.yaml");
    let size = usize::try_from(MAX_DEFINITIONS_FILE_BYTES).unwrap() + 1;
    fs::write(&oversized, "#".repeat(size)).unwrap();
    assert!(matches!(
        read_definitions_file(&oversized, &SchemaHelper::new()),
        Err(DefinitionsError::TooLarge { .. })
    ));
}
