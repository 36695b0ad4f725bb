// crates/acstore-core/src/containers/manager.rs
// ============================================================================
// Module: Attribute Containers Manager
// Description: Registry of attribute container definitions.
// Purpose: Map container type names to schemas and create empty containers.
// Dependencies: thiserror, tracing, crate::schema
// ============================================================================

//! ## Overview
//! The [`AttributeContainersManager`] owns the container definitions known to
//! a process together with the [`SchemaHelper`] that resolves their data
//! types. It is shared explicitly (usually behind an `Arc`) between stores and
//! callers. Container type names are matched case-insensitively: definitions
//! are keyed by the lower-cased type name.
//!
//! Type and attribute names become SQL table and column names, so they are
//! restricted to `[A-Za-z_][A-Za-z0-9_]*` and `_identifier` is reserved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use crate::containers::interface::AttributeContainer;
use crate::schema::AttributeSerializer;
use crate::schema::DataType;
use crate::schema::SchemaError;
use crate::schema::SchemaHelper;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Column name reserved for the store-assigned identifier.
pub const RESERVED_IDENTIFIER_ATTRIBUTE: &str = "_identifier";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Container registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// Container type already registered.
    #[error("attribute container class already set for container type: {0}")]
    AlreadyRegistered(String),
    /// Container type not registered.
    #[error("attribute container class not set for container type: {0}")]
    NotRegistered(String),
    /// Container type unknown to the registry.
    #[error("unsupported container type: {0}")]
    UnsupportedContainerType(String),
    /// Type or attribute name is not a valid identifier.
    #[error("invalid {kind} name: {name:?}")]
    InvalidName {
        /// What was being named.
        kind: &'static str,
        /// Offending name.
        name: String,
    },
    /// Attribute uses a reserved name.
    #[error("attribute name is reserved: {0}")]
    ReservedAttribute(String),
    /// Custom data type registration failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Schema and serialization settings of one container type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    /// Container type name.
    pub container_type: String,
    /// Attribute data types keyed by attribute name.
    pub schema: BTreeMap<String, DataType>,
    /// Protected attribute names that are serialized.
    pub serializable_protected_attributes: Vec<String>,
}

impl ContainerDefinition {
    /// Creates a definition without attributes.
    #[must_use]
    pub fn new(container_type: impl Into<String>) -> Self {
        Self {
            container_type: container_type.into(),
            schema: BTreeMap::new(),
            serializable_protected_attributes: Vec::new(),
        }
    }

    /// Adds an attribute to the schema.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.schema.insert(name.into(), data_type);
        self
    }

    /// Marks a protected attribute as serialized.
    #[must_use]
    pub fn with_serializable_protected_attribute(mut self, name: impl Into<String>) -> Self {
        self.serializable_protected_attributes.push(name.into());
        self
    }

    /// Creates an empty container of this type.
    #[must_use]
    pub fn create_container(&self) -> AttributeContainer {
        AttributeContainer::new(self.container_type.clone())
            .with_serializable_protected_attributes(self.serializable_protected_attributes.clone())
    }

    /// Validates type and attribute names.
    fn validate(&self) -> Result<(), ManagerError> {
        if !is_sql_identifier(&self.container_type) {
            return Err(ManagerError::InvalidName {
                kind: "container type",
                name: self.container_type.clone(),
            });
        }
        for name in self.schema.keys() {
            if name == RESERVED_IDENTIFIER_ATTRIBUTE {
                return Err(ManagerError::ReservedAttribute(name.clone()));
            }
            if !is_sql_identifier(name) {
                return Err(ManagerError::InvalidName {
                    kind: "attribute",
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Returns true for names matching `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_sql_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Registry of attribute container definitions.
#[derive(Debug, Default)]
pub struct AttributeContainersManager {
    /// Definitions keyed by lower-cased container type.
    definitions: RwLock<BTreeMap<String, ContainerDefinition>>,
    /// Data type registry.
    schema_helper: RwLock<SchemaHelper>,
}

impl AttributeContainersManager {
    /// Creates an empty manager with the default data types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty manager with the given data type registry.
    #[must_use]
    pub fn with_schema_helper(schema_helper: SchemaHelper) -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
            schema_helper: RwLock::new(schema_helper),
        }
    }

    /// Registers a container definition.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AlreadyRegistered`] when the type is taken or a
    /// naming error when the definition cannot map onto SQL names.
    pub fn register_attribute_container(
        &self,
        definition: ContainerDefinition,
    ) -> Result<(), ManagerError> {
        definition.validate()?;
        let key = definition.container_type.to_lowercase();
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        if definitions.contains_key(&key) {
            return Err(ManagerError::AlreadyRegistered(key));
        }
        debug!(
            container_type = %key,
            attributes = definition.schema.len(),
            "registered container type"
        );
        definitions.insert(key, definition);
        Ok(())
    }

    /// Registers definitions in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first registration error.
    pub fn register_attribute_containers(
        &self,
        definitions: impl IntoIterator<Item = ContainerDefinition>,
    ) -> Result<(), ManagerError> {
        for definition in definitions {
            self.register_attribute_container(definition)?;
        }
        Ok(())
    }

    /// Deregisters a container type.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotRegistered`] when the type is unknown.
    pub fn deregister_attribute_container(&self, container_type: &str) -> Result<(), ManagerError> {
        let key = container_type.to_lowercase();
        let mut definitions = self.definitions.write().unwrap_or_else(PoisonError::into_inner);
        if definitions.remove(&key).is_none() {
            return Err(ManagerError::NotRegistered(key));
        }
        Ok(())
    }

    /// Creates an empty container of a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnsupportedContainerType`] when unknown.
    pub fn create_attribute_container(
        &self,
        container_type: &str,
    ) -> Result<AttributeContainer, ManagerError> {
        Ok(self.definition(container_type)?.create_container())
    }

    /// Returns the registered container type keys in sorted order.
    #[must_use]
    pub fn container_types(&self) -> Vec<String> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        definitions.keys().cloned().collect()
    }

    /// Returns a copy of a container definition.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnsupportedContainerType`] when unknown.
    pub fn definition(&self, container_type: &str) -> Result<ContainerDefinition, ManagerError> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        definitions
            .get(&container_type.to_lowercase())
            .cloned()
            .ok_or_else(|| ManagerError::UnsupportedContainerType(container_type.to_string()))
    }

    /// Returns the schema of a container type.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnsupportedContainerType`] when unknown.
    pub fn schema(&self, container_type: &str) -> Result<BTreeMap<String, DataType>, ManagerError> {
        Ok(self.definition(container_type)?.schema)
    }

    /// Returns a snapshot of the data type registry.
    #[must_use]
    pub fn schema_helper(&self) -> SchemaHelper {
        self.schema_helper.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Registers a custom data type.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Schema`] when the type is already known.
    pub fn register_data_type(
        &self,
        name: &str,
        serializer: Arc<dyn AttributeSerializer>,
    ) -> Result<(), ManagerError> {
        let mut helper = self.schema_helper.write().unwrap_or_else(PoisonError::into_inner);
        helper.register_data_type(name, serializer)?;
        Ok(())
    }

    /// Deregisters a custom data type.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Schema`] when the type is not registered.
    pub fn deregister_data_type(&self, name: &str) -> Result<(), ManagerError> {
        let mut helper = self.schema_helper.write().unwrap_or_else(PoisonError::into_inner);
        helper.deregister_data_type(name)?;
        Ok(())
    }
}
