// crates/acstore-store-sqlite/tests/filter_parity.rs
// ============================================================================
// Module: SQLite Filter Parity Tests
// Description: Property tests comparing SQL filters with in-memory evaluation.
// Purpose: Ensure both stores select the same containers for a filter.
// Dependencies: acstore-core, acstore-store-sqlite, proptest, tempfile
// ============================================================================

//! Property tests comparing `SQLite` filters with in-memory evaluation.

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

use acstore_core::AttributeContainer;
use acstore_core::AttributeContainerStore;
use acstore_core::AttributeContainersManager;
use acstore_core::ContainerDefinition;
use acstore_core::DataType;
use acstore_core::InMemoryAttributeContainerStore;
use acstore_store_sqlite::SqliteAttributeContainerStore;
use acstore_store_sqlite::SqliteStoreConfig;
use proptest::prelude::*;
use tempfile::TempDir;

/// Parsers assigned to generated containers.
const PARSERS: [&str; 4] = ["winreg", "filestat", "pe", ""];

/// Returns a manager with a single integer and string typed container type.
fn parity_manager() -> Arc<AttributeContainersManager> {
    let manager = AttributeContainersManager::new();
    manager
        .register_attribute_container(
            ContainerDefinition::new("event")
                .with_attribute("parser", DataType::Str)
                .with_attribute("pid", DataType::Int),
        )
        .unwrap();
    Arc::new(manager)
}

/// Returns the sequence numbers selected by a filter.
fn selected(store: &dyn AttributeContainerStore, filter: &str) -> Vec<u64> {
    store
        .get_attribute_containers("event", Some(filter))
        .unwrap()
        .iter()
        .filter_map(|container| container.identifier().sequence_number)
        .collect()
}

/// Filters made of bare operands, tested for truthiness alone.
const BARE_FILTERS: [&str; 9] = [
    "parser",
    "not parser",
    "pid",
    "not pid",
    "pid and parser",
    "pid or not parser",
    "'text'",
    "''",
    "not 0",
];

/// Opens both stores and adds the same generated rows to each.
fn populated_stores(
    dir: &TempDir,
    rows: &[(usize, i64)],
) -> (SqliteAttributeContainerStore, InMemoryAttributeContainerStore) {
    let sqlite = SqliteAttributeContainerStore::new(parity_manager());
    sqlite.open(&SqliteStoreConfig::new(dir.path().join("parity.sqlite"))).unwrap();
    let memory = InMemoryAttributeContainerStore::new();
    memory.open().unwrap();

    for (parser_index, pid) in rows {
        let mut container = AttributeContainer::new("event");
        container.set_attribute("parser", PARSERS[*parser_index]);
        container.set_attribute("pid", *pid);
        let mut copy = container.clone();
        sqlite.add_attribute_container(&mut container).unwrap();
        memory.add_attribute_container(&mut copy).unwrap();
    }
    (sqlite, memory)
}

/// Builds a filter from an operator, a threshold, and a parser choice.
fn filter_text(operator: &str, threshold: i64, parser: usize, conjunction: &str) -> String {
    let parser = PARSERS[parser % PARSERS.len()];
    format!("pid {operator} {threshold} {conjunction} not parser == '{parser}'")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sql_filters_select_what_memory_filters_select(
        rows in prop::collection::vec((0usize .. 4, 0i64 .. 10), 0 .. 30),
        operator in prop::sample::select(vec!["==", "!="]),
        threshold in -2i64 .. 12,
        parser in 0usize .. 4,
        conjunction in prop::sample::select(vec!["and", "or"]),
    ) {
        let dir = TempDir::new().unwrap();
        let (sqlite, memory) = populated_stores(&dir, &rows);

        let filter = filter_text(operator, threshold, parser, conjunction);
        prop_assert_eq!(selected(&sqlite, &filter), selected(&memory, &filter));
        sqlite.close().unwrap();
    }

    #[test]
    fn bare_operands_have_the_same_truthiness(
        rows in prop::collection::vec((0usize .. 4, -1i64 .. 3), 1 .. 20),
    ) {
        let dir = TempDir::new().unwrap();
        let (sqlite, memory) = populated_stores(&dir, &rows);

        for filter in BARE_FILTERS {
            prop_assert_eq!(selected(&sqlite, filter), selected(&memory, filter), "{}", filter);
        }
        sqlite.close().unwrap();
    }
}
