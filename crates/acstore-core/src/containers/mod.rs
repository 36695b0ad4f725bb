// crates/acstore-core/src/containers/mod.rs
// ============================================================================
// Module: Attribute Containers
// Description: Container records, identifiers, and the definitions registry.
// Purpose: Group the record-level types shared by every store backend.
// Dependencies: crate::containers::{identifier, interface, manager}
// ============================================================================

//! ## Overview
//! Attribute containers are the records persisted by stores. This module
//! exposes the record type, its store-relative identifier, and the manager
//! that maps container types to schemas.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifier;
pub mod interface;
pub mod manager;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifier::AttributeContainerIdentifier;
pub use identifier::IdentifierError;
pub use interface::AttributeContainer;
pub use interface::AttributeValue;
pub use manager::AttributeContainersManager;
pub use manager::ContainerDefinition;
pub use manager::ManagerError;
pub use manager::RESERVED_IDENTIFIER_ATTRIBUTE;
pub use manager::is_sql_identifier;
