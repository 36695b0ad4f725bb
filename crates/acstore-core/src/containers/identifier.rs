// crates/acstore-core/src/containers/identifier.rs
// ============================================================================
// Module: Attribute Container Identifier
// Description: Store-relative identifier for attribute containers.
// Purpose: Provide a typed `<name>.<sequence_number>` identifier with a stable
//          string form.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! An [`AttributeContainerIdentifier`] names a container within a store: the
//! container type (table) name plus the 1-based sequence number assigned by
//! the store. The value is only unique relative to one store and is not part
//! of the container's serialized attributes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The string form has no `.` separator.
    #[error("identifier missing separator: {0}")]
    MissingSeparator(String),
    /// The sequence number is not a base-10 integer.
    #[error("identifier has invalid sequence number: {0}")]
    InvalidSequenceNumber(String),
}

// ============================================================================
// SECTION: Identifier
// ============================================================================

/// Identifier of an attribute container within a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeContainerIdentifier {
    /// Name of the table (attribute container type).
    pub name: Option<String>,
    /// Sequence number of the attribute container.
    pub sequence_number: Option<u64>,
}

impl AttributeContainerIdentifier {
    /// Creates a fully specified identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            name: Some(name.into()),
            sequence_number: Some(sequence_number),
        }
    }

    /// Copies the identifier from its string representation.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the string is not `<name>.<number>`.
    pub fn copy_from_string(&mut self, identifier_string: &str) -> Result<(), IdentifierError> {
        let parsed = identifier_string.parse::<Self>()?;
        *self = parsed;
        Ok(())
    }

    /// Returns the string representation, or `None` when incomplete.
    #[must_use]
    pub fn copy_to_string(&self) -> Option<String> {
        match (&self.name, self.sequence_number) {
            (Some(name), Some(sequence_number)) => Some(format!("{name}.{sequence_number}")),
            _ => None,
        }
    }
}

impl FromStr for AttributeContainerIdentifier {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((name, sequence_number)) = value.rsplit_once('.') else {
            return Err(IdentifierError::MissingSeparator(value.to_string()));
        };
        if sequence_number.is_empty() || !sequence_number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::InvalidSequenceNumber(value.to_string()));
        }
        let sequence_number = sequence_number
            .parse::<u64>()
            .map_err(|_| IdentifierError::InvalidSequenceNumber(value.to_string()))?;
        Ok(Self::new(name, sequence_number))
    }
}

impl fmt::Display for AttributeContainerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.copy_to_string() {
            Some(value) => f.write_str(&value),
            None => f.write_str("<unset>"),
        }
    }
}

impl Serialize for AttributeContainerIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.copy_to_string() {
            Some(value) => serializer.serialize_str(&value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for AttributeContainerIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        match value {
            Some(value) => value.parse().map_err(serde::de::Error::custom),
            None => Ok(Self::default()),
        }
    }
}
