// crates/acstore-core/src/interfaces.rs
// ============================================================================
// Module: Store Interfaces
// Description: Backend-agnostic attribute container store contract.
// Purpose: Define the store trait, its error type, and shared sequence number
//          bookkeeping.
// Dependencies: thiserror, crate::{containers, filter, profiler}
// ============================================================================

//! ## Overview
//! [`AttributeContainerStore`] is implemented by every store backend. Methods
//! take `&self`; implementations guard their state internally so a store can
//! be shared across threads. Containers receive identifiers of the form
//! `<type>.<sequence_number>` where sequence numbers start at 1 and increase
//! densely per container type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::containers::AttributeContainer;
use crate::containers::AttributeContainerIdentifier;
use crate::containers::ManagerError;
use crate::filter::FilterError;
use crate::filter::FilterExpression;
use crate::profiler::StorageProfiler;
use crate::schema::SchemaError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Attribute container store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store is not open.
    #[error("unable to access closed storage")]
    Closed,
    /// Store was opened read-only.
    #[error("unable to write to read-only storage")]
    ReadOnly,
    /// Store is already open.
    #[error("storage already opened")]
    AlreadyOpen,
    /// Store is already closed.
    #[error("storage already closed")]
    AlreadyClosed,
    /// Container type is not supported by the store.
    #[error("unsupported container type: {0}")]
    UnsupportedContainerType(String),
    /// Attribute value cannot be stored for its data type.
    #[error("unsupported attribute {container_type}.{attribute} of type {data_type}")]
    UnsupportedAttribute {
        /// Container type name.
        container_type: String,
        /// Attribute name.
        attribute: String,
        /// Declared data type name.
        data_type: String,
    },
    /// Container to update does not exist.
    #[error("missing attribute container: {0}")]
    MissingContainer(String),
    /// Stored data has an unsupported format.
    #[error("unsupported storage format: {0}")]
    Format(String),
    /// Stored format version is incompatible.
    #[error("storage format version mismatch: {0}")]
    VersionMismatch(String),
    /// Request is invalid.
    #[error("invalid request: {0}")]
    Invalid(String),
    /// I/O failure.
    #[error("storage io error: {0}")]
    Io(String),
    /// Backend reported an error.
    #[error("storage error: {0}")]
    Store(String),
}

impl From<FilterError> for StoreError {
    fn from(error: FilterError) -> Self {
        Self::Invalid(format!("invalid filter expression: {error}"))
    }
}

impl From<ManagerError> for StoreError {
    fn from(error: ManagerError) -> Self {
        match error {
            ManagerError::UnsupportedContainerType(container_type) => {
                Self::UnsupportedContainerType(container_type)
            }
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(error: SchemaError) -> Self {
        Self::Invalid(error.to_string())
    }
}

// ============================================================================
// SECTION: Store Trait
// ============================================================================

/// Persistent storage of attribute containers.
pub trait AttributeContainerStore: Send + Sync {
    /// Adds a new container and assigns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] or [`StoreError::ReadOnly`] when the
    /// store cannot be written, or a backend error.
    fn add_attribute_container(&self, container: &mut AttributeContainer) -> Result<(), StoreError>;

    /// Overwrites the stored container that carries the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingContainer`] when no such container exists.
    fn update_attribute_container(&self, container: &AttributeContainer) -> Result<(), StoreError>;

    /// Retrieves a container by its index (sequence number minus one).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] or a backend error.
    fn get_attribute_container_by_index(
        &self,
        container_type: &str,
        index: u64,
    ) -> Result<Option<AttributeContainer>, StoreError>;

    /// Retrieves containers of a type in sequence order, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for malformed filter expressions.
    fn get_attribute_containers(
        &self,
        container_type: &str,
        filter_expression: Option<&str>,
    ) -> Result<Vec<AttributeContainer>, StoreError>;

    /// Returns the number of stored containers of a type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] or a backend error.
    fn get_number_of_attribute_containers(&self, container_type: &str) -> Result<u64, StoreError>;

    /// Closes the store, persisting pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyClosed`] when the store is not open.
    fn close(&self) -> Result<(), StoreError>;

    /// Attaches or detaches a storage profiler.
    fn set_storage_profiler(&self, profiler: Option<Arc<StorageProfiler>>);

    /// Retrieves a container by its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the identifier has no usable
    /// sequence number.
    fn get_attribute_container_by_identifier(
        &self,
        container_type: &str,
        identifier: &AttributeContainerIdentifier,
    ) -> Result<Option<AttributeContainer>, StoreError> {
        let index = identifier_index(identifier)?;
        self.get_attribute_container_by_index(container_type, index)
    }

    /// Returns true when at least one container of the type is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] or a backend error.
    fn has_attribute_containers(&self, container_type: &str) -> Result<bool, StoreError> {
        Ok(self.get_number_of_attribute_containers(container_type)? > 0)
    }
}

/// Returns the index addressed by an identifier.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the sequence number is unset or zero.
pub fn identifier_index(identifier: &AttributeContainerIdentifier) -> Result<u64, StoreError> {
    match identifier.sequence_number {
        Some(sequence_number) if sequence_number > 0 => Ok(sequence_number - 1),
        _ => Err(StoreError::Invalid(format!(
            "identifier {identifier} has no valid sequence number"
        ))),
    }
}

/// Parses an optional filter expression.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the expression is malformed.
pub fn parse_filter_expression(
    filter_expression: Option<&str>,
) -> Result<Option<FilterExpression>, StoreError> {
    filter_expression.map(FilterExpression::parse).transpose().map_err(StoreError::from)
}

// ============================================================================
// SECTION: Sequence Numbers
// ============================================================================

/// Last issued sequence number per container type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceNumbers {
    /// Sequence numbers keyed by container type.
    values: BTreeMap<String, u64>,
}

impl SequenceNumbers {
    /// Creates empty bookkeeping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next sequence number of a container type.
    pub fn advance(&mut self, container_type: &str) -> u64 {
        let value = self.values.entry(container_type.to_string()).or_insert(0);
        *value = value.saturating_add(1);
        *value
    }

    /// Seeds the last issued sequence number of a container type.
    pub fn set(&mut self, container_type: &str, sequence_number: u64) {
        self.values.insert(container_type.to_string(), sequence_number);
    }

    /// Returns the last issued sequence number, or 0 when none.
    #[must_use]
    pub fn current(&self, container_type: &str) -> u64 {
        self.values.get(container_type).copied().unwrap_or(0)
    }

    /// Forgets every issued sequence number.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
