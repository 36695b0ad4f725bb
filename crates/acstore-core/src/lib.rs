// crates/acstore-core/src/lib.rs
// ============================================================================
// Module: acstore Core Library
// Description: Public API surface for attribute container storage.
// Purpose: Expose containers, schemas, filters, and the store contract.
// Dependencies: crate::{containers, definitions, filter, interfaces,
//               memory_store, profiler, schema}
// ============================================================================

//! ## Overview
//! acstore persists typed records ("attribute containers") grouped by
//! container type. This crate holds the backend-agnostic pieces: the record
//! types, the container definitions registry, data types and serializers,
//! the filter expression language, the store trait, and an in-memory store.
//! Database backends live in their own crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod containers;
pub mod definitions;
pub mod filter;
pub mod interfaces;
pub mod memory_store;
pub mod profiler;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use containers::AttributeContainer;
pub use containers::AttributeContainerIdentifier;
pub use containers::AttributeContainersManager;
pub use containers::AttributeValue;
pub use containers::ContainerDefinition;
pub use containers::IdentifierError;
pub use containers::ManagerError;
pub use definitions::DefinitionsError;
pub use definitions::read_definitions;
pub use definitions::read_definitions_file;
pub use filter::FilterError;
pub use filter::FilterExpression;
pub use interfaces::AttributeContainerStore;
pub use interfaces::SequenceNumbers;
pub use interfaces::StoreError;
pub use memory_store::InMemoryAttributeContainerStore;
pub use profiler::ProfileSnapshot;
pub use profiler::StorageProfiler;
pub use schema::AttributeSerializer;
pub use schema::DataType;
pub use schema::JsonAttributeSerializer;
pub use schema::SchemaError;
pub use schema::SchemaHelper;
