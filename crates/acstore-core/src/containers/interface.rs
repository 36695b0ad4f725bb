// crates/acstore-core/src/containers/interface.rs
// ============================================================================
// Module: Attribute Container Interface
// Description: Attribute values and the attribute container record type.
// Purpose: Provide the typed record stored by attribute container stores.
// Dependencies: serde_json, sha2, crate::filter, crate::schema
// ============================================================================

//! ## Overview
//! An [`AttributeContainer`] is a bag of named [`AttributeValue`]s tagged with
//! a container type. Attribute names starting with `_` are protected: they can
//! be set on a container but only take part in copying, comparison, and
//! storage when listed as serializable protected attributes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::containers::identifier::AttributeContainerIdentifier;
use crate::containers::manager::ContainerDefinition;
use crate::filter::AttributeLookup;
use crate::filter::FilterExpression;
use crate::schema::SchemaError;
use crate::schema::SchemaHelper;

// ============================================================================
// SECTION: Attribute Values
// ============================================================================

/// Runtime value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value (also used for timestamps).
    Int(i64),
    /// String value.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Reference to another attribute container.
    Identifier(AttributeContainerIdentifier),
    /// List of values.
    List(Vec<Self>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Self>),
}

impl AttributeValue {
    /// Returns a short name of the value kind for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Identifier(_) => "identifier",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Converts the value to JSON.
    ///
    /// Bytes become arrays of integers and identifiers their string form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Str(value) => Value::String(value.clone()),
            Self::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Self::Identifier(identifier) => {
                identifier.copy_to_string().map_or(Value::Null, Value::String)
            }
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
            ),
        }
    }

    /// Converts untyped JSON into a value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] for `null`, floats, and integers outside
    /// the `i64` range.
    pub fn from_json(json: &Value) -> Result<Self, SchemaError> {
        match json {
            Value::Null => Err(SchemaError::Json("null is not an attribute value".to_string())),
            Value::Bool(value) => Ok(Self::Bool(*value)),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .ok_or_else(|| SchemaError::Json(format!("unsupported number {number}"))),
            Value::String(value) => Ok(Self::Str(value.clone())),
            Value::Array(items) => {
                Ok(Self::List(items.iter().map(Self::from_json).collect::<Result<_, _>>()?))
            }
            Value::Object(entries) => Ok(Self::Map(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), Self::from_json(value)?)))
                    .collect::<Result<_, SchemaError>>()?,
            )),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Bytes(bytes) => write!(f, "b'{}'", bytes.escape_ascii()),
            Self::Identifier(identifier) => write!(f, "{identifier}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<AttributeContainerIdentifier> for AttributeValue {
    fn from(value: AttributeContainerIdentifier) -> Self {
        Self::Identifier(value)
    }
}

// ============================================================================
// SECTION: Attribute Container
// ============================================================================

/// Typed record persisted by attribute container stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeContainer {
    /// Container type name.
    container_type: String,
    /// Store-relative identifier.
    identifier: AttributeContainerIdentifier,
    /// Attribute values keyed by name.
    attributes: BTreeMap<String, AttributeValue>,
    /// Protected attribute names that are still serialized.
    serializable_protected_attributes: Vec<String>,
}

impl AttributeContainer {
    /// Creates an empty container of the given type.
    #[must_use]
    pub fn new(container_type: impl Into<String>) -> Self {
        let container_type = container_type.into();
        Self {
            identifier: AttributeContainerIdentifier {
                name: Some(container_type.clone()),
                sequence_number: None,
            },
            container_type,
            attributes: BTreeMap::new(),
            serializable_protected_attributes: Vec::new(),
        }
    }

    /// Sets the protected attribute names that are serialized.
    #[must_use]
    pub fn with_serializable_protected_attributes(mut self, names: Vec<String>) -> Self {
        self.serializable_protected_attributes = names;
        self
    }

    /// Returns the container type name.
    #[must_use]
    pub fn container_type(&self) -> &str {
        &self.container_type
    }

    /// Returns the protected attribute names that are serialized.
    #[must_use]
    pub fn serializable_protected_attributes(&self) -> &[String] {
        &self.serializable_protected_attributes
    }

    /// Returns true when the attribute takes part in serialization.
    #[must_use]
    pub fn is_serializable(&self, name: &str) -> bool {
        !name.starts_with('_') || self.serializable_protected_attributes.iter().any(|n| n == name)
    }

    /// Sets an attribute value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Returns an attribute value, including protected attributes.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Copies serializable attributes from a map.
    pub fn copy_from_map(&mut self, values: &BTreeMap<String, AttributeValue>) {
        for (name, value) in values {
            if self.is_serializable(name) {
                self.attributes.insert(name.clone(), value.clone());
            }
        }
    }

    /// Copies serializable attributes to a map.
    #[must_use]
    pub fn copy_to_map(&self) -> BTreeMap<String, AttributeValue> {
        self.attributes().map(|(name, value)| (name.to_string(), value.clone())).collect()
    }

    /// Returns the serializable protected names followed by the public
    /// attribute names that are set.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names = self.serializable_protected_attributes.clone();
        names.extend(self.attributes.keys().filter(|name| !name.starts_with('_')).cloned());
        names
    }

    /// Iterates over serializable `(name, value)` pairs in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes
            .iter()
            .filter(|(name, _)| self.is_serializable(name))
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Returns a comparable string of the serializable attribute values.
    #[must_use]
    pub fn attribute_values_string(&self) -> String {
        self.attributes()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns a hash of the serializable attribute values.
    #[must_use]
    pub fn attribute_values_hash(&self) -> u64 {
        let digest = Sha256::digest(self.attribute_values_string().as_bytes());
        let mut prefix = [0_u8; 8];
        prefix.copy_from_slice(&digest[.. 8]);
        u64::from_be_bytes(prefix)
    }

    /// Returns the container identifier.
    #[must_use]
    pub const fn identifier(&self) -> &AttributeContainerIdentifier {
        &self.identifier
    }

    /// Sets the container identifier.
    pub fn set_identifier(&mut self, identifier: AttributeContainerIdentifier) {
        self.identifier = identifier;
    }

    /// Returns true when the container matches the filter expression.
    ///
    /// A missing expression matches every container. Evaluation errors, such
    /// as a reference to an attribute that is not set, do not match.
    #[must_use]
    pub fn matches_expression(&self, filter_expression: Option<&FilterExpression>) -> bool {
        filter_expression.is_none_or(|expression| expression.evaluate(self).unwrap_or(false))
    }

    /// Returns the JSON form `{ "identifier": ..., "attributes": { ... } }`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let attributes: Map<String, Value> =
            self.attributes().map(|(name, value)| (name.to_string(), value.to_json())).collect();
        let mut object = Map::new();
        object.insert(
            "identifier".to_string(),
            self.identifier.copy_to_string().map_or(Value::Null, Value::String),
        );
        object.insert("attributes".to_string(), Value::Object(attributes));
        Value::Object(object)
    }

    /// Builds a container from a JSON attribute object typed by a definition.
    ///
    /// `null` values are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when an attribute is not in the schema or its
    /// value does not fit the declared data type.
    pub fn from_json_attributes(
        definition: &ContainerDefinition,
        schema_helper: &SchemaHelper,
        object: &Map<String, Value>,
    ) -> Result<Self, SchemaError> {
        let mut container = definition.create_container();
        for (name, json) in object {
            if json.is_null() {
                continue;
            }
            let data_type =
                definition.schema.get(name).ok_or_else(|| SchemaError::UnknownAttribute {
                    container_type: definition.container_type.clone(),
                    attribute: name.clone(),
                })?;
            let value = schema_helper.value_from_json(data_type, json)?;
            container.set_attribute(name.clone(), value);
        }
        Ok(container)
    }
}

impl AttributeLookup for AttributeContainer {
    fn lookup_attribute(&self, name: &str) -> Option<&AttributeValue> {
        if self.is_serializable(name) { self.attributes.get(name) } else { None }
    }
}
