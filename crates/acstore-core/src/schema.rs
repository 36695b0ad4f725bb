// crates/acstore-core/src/schema.rs
// ============================================================================
// Module: Attribute Schema
// Description: Attribute data types and the custom data type registry.
// Purpose: Describe how attribute values are typed and how custom types are
//          serialized for storage.
// Dependencies: serde, serde_json, thiserror, crate::containers
// ============================================================================

//! ## Overview
//! Every attribute in a container definition has a [`DataType`]. Built-in
//! types (`AttributeContainerIdentifier`, `bool`, `int`, `str`, `timestamp`)
//! map onto native storage columns. Any other type name is custom and must be
//! registered with a [`SchemaHelper`] together with an
//! [`AttributeSerializer`] that turns values into text and back.
//!
//! The registry starts with `List[str]` and `List[int]`, both serialized as
//! JSON arrays.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::containers::AttributeContainerIdentifier;
use crate::containers::AttributeValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name of the only supported serialization format.
pub const SERIALIZATION_FORMAT_JSON: &str = "json";

/// Data type name of a list of strings.
pub const LIST_OF_STR: &str = "List[str]";

/// Data type name of a list of integers.
pub const LIST_OF_INT: &str = "List[int]";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema and serialization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Data type name is empty or malformed.
    #[error("invalid data type name: {0:?}")]
    InvalidDataType(String),
    /// Data type is already registered.
    #[error("data type already registered: {0}")]
    AlreadyRegistered(String),
    /// Data type is not registered.
    #[error("data type not registered: {0}")]
    NotRegistered(String),
    /// Data type has no serializer.
    #[error("unsupported data type: {0}")]
    UnknownDataType(String),
    /// Serialization format is not supported.
    #[error("unsupported serialization format: {0}")]
    UnsupportedSerializationFormat(String),
    /// Value does not fit the data type.
    #[error("value does not match data type {data_type}: {detail}")]
    ValueMismatch {
        /// Expected data type name.
        data_type: String,
        /// Mismatch description.
        detail: String,
    },
    /// Attribute is not part of the container schema.
    #[error("attribute {attribute} is not defined for container type {container_type}")]
    UnknownAttribute {
        /// Container type name.
        container_type: String,
        /// Attribute name.
        attribute: String,
    },
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(String),
}

// ============================================================================
// SECTION: Data Types
// ============================================================================

/// Data type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    /// Identifier of another attribute container.
    Identifier,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// UTF-8 string.
    Str,
    /// Timestamp as an integer number of time units.
    Timestamp,
    /// Custom type resolved through the [`SchemaHelper`].
    Custom(String),
}

impl DataType {
    /// Returns the data type name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Identifier => "AttributeContainerIdentifier",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Str => "str",
            Self::Timestamp => "timestamp",
            Self::Custom(name) => name,
        }
    }

    /// Returns true for data types that need no registered serializer.
    #[must_use]
    pub const fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl FromStr for DataType {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed != value {
            return Err(SchemaError::InvalidDataType(value.to_string()));
        }
        Ok(match value {
            "AttributeContainerIdentifier" => Self::Identifier,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "str" => Self::Str,
            "timestamp" => Self::Timestamp,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl TryFrom<String> for DataType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SECTION: Serializers
// ============================================================================

/// Converts values of a custom data type to and from their stored text.
pub trait AttributeSerializer: Send + Sync + fmt::Debug {
    /// Serializes a value to text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the value does not fit the data type.
    fn serialize_value(&self, value: &AttributeValue) -> Result<String, SchemaError>;

    /// Deserializes a value from text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the text is malformed or does not fit.
    fn deserialize_value(&self, text: &str) -> Result<AttributeValue, SchemaError>;
}

/// Element shape enforced by a [`JsonAttributeSerializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonElementKind {
    /// List elements must be strings.
    Str,
    /// List elements must be integers.
    Int,
}

/// JSON serializer for custom attribute values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonAttributeSerializer {
    /// Required list element kind, if any.
    element_kind: Option<JsonElementKind>,
}

impl JsonAttributeSerializer {
    /// Creates a serializer that accepts any JSON-representable value.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            element_kind: None,
        }
    }

    /// Creates a serializer that only accepts lists of the given kind.
    #[must_use]
    pub const fn list_of(kind: JsonElementKind) -> Self {
        Self {
            element_kind: Some(kind),
        }
    }

    /// Checks the value against the enforced shape.
    fn check_shape(&self, value: &AttributeValue) -> Result<(), SchemaError> {
        let Some(kind) = self.element_kind else {
            return Ok(());
        };
        let data_type = list_type_name(kind);
        let AttributeValue::List(items) = value else {
            return Err(SchemaError::ValueMismatch {
                data_type: data_type.to_string(),
                detail: format!("expected list, found {}", value.kind_name()),
            });
        };
        for item in items {
            let fits = matches!(
                (kind, item),
                (JsonElementKind::Str, AttributeValue::Str(_))
                    | (JsonElementKind::Int, AttributeValue::Int(_))
            );
            if !fits {
                return Err(SchemaError::ValueMismatch {
                    data_type: data_type.to_string(),
                    detail: format!("unexpected list element {}", item.kind_name()),
                });
            }
        }
        Ok(())
    }
}

impl AttributeSerializer for JsonAttributeSerializer {
    fn serialize_value(&self, value: &AttributeValue) -> Result<String, SchemaError> {
        self.check_shape(value)?;
        serde_json::to_string(&value.to_json()).map_err(|err| SchemaError::Json(err.to_string()))
    }

    fn deserialize_value(&self, text: &str) -> Result<AttributeValue, SchemaError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|err| SchemaError::Json(err.to_string()))?;
        let value = AttributeValue::from_json(&json)?;
        self.check_shape(&value)?;
        Ok(value)
    }
}

/// Returns the registered type name for a list element kind.
const fn list_type_name(kind: JsonElementKind) -> &'static str {
    match kind {
        JsonElementKind::Str => LIST_OF_STR,
        JsonElementKind::Int => LIST_OF_INT,
    }
}

// ============================================================================
// SECTION: Schema Helper
// ============================================================================

/// Registry of custom data types and their serializers.
#[derive(Debug, Clone)]
pub struct SchemaHelper {
    /// Serializers keyed by custom data type name.
    serializers: BTreeMap<String, Arc<dyn AttributeSerializer>>,
}

impl Default for SchemaHelper {
    fn default() -> Self {
        let mut serializers: BTreeMap<String, Arc<dyn AttributeSerializer>> = BTreeMap::new();
        serializers.insert(
            LIST_OF_STR.to_string(),
            Arc::new(JsonAttributeSerializer::list_of(JsonElementKind::Str)),
        );
        serializers.insert(
            LIST_OF_INT.to_string(),
            Arc::new(JsonAttributeSerializer::list_of(JsonElementKind::Int)),
        );
        Self {
            serializers,
        }
    }
}

impl SchemaHelper {
    /// Creates a registry with the default custom data types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the data type is built in or registered.
    #[must_use]
    pub fn has_data_type(&self, name: &str) -> bool {
        match name.parse::<DataType>() {
            Ok(DataType::Custom(name)) => self.serializers.contains_key(&name),
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Returns the registered custom data type names.
    #[must_use]
    pub fn custom_data_types(&self) -> Vec<&str> {
        self.serializers.keys().map(String::as_str).collect()
    }

    /// Registers a custom data type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::AlreadyRegistered`] when the name is taken, or
    /// [`SchemaError::InvalidDataType`] for built-in or malformed names.
    pub fn register_data_type(
        &mut self,
        name: &str,
        serializer: Arc<dyn AttributeSerializer>,
    ) -> Result<(), SchemaError> {
        match name.parse::<DataType>()? {
            DataType::Custom(name) => {
                if self.serializers.contains_key(&name) {
                    return Err(SchemaError::AlreadyRegistered(name));
                }
                self.serializers.insert(name, serializer);
                Ok(())
            }
            builtin => Err(SchemaError::AlreadyRegistered(builtin.name().to_string())),
        }
    }

    /// Deregisters a custom data type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotRegistered`] when the name is unknown.
    pub fn deregister_data_type(&mut self, name: &str) -> Result<(), SchemaError> {
        if self.serializers.remove(name).is_none() {
            return Err(SchemaError::NotRegistered(name.to_string()));
        }
        Ok(())
    }

    /// Returns the serializer of a custom data type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsupportedSerializationFormat`] for formats
    /// other than `json`, or [`SchemaError::UnknownDataType`] when no
    /// serializer is registered.
    pub fn attribute_serializer(
        &self,
        name: &str,
        serialization_format: &str,
    ) -> Result<Arc<dyn AttributeSerializer>, SchemaError> {
        if serialization_format != SERIALIZATION_FORMAT_JSON {
            return Err(SchemaError::UnsupportedSerializationFormat(
                serialization_format.to_string(),
            ));
        }
        self.serializers
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownDataType(name.to_string()))
    }

    /// Checks that a value fits the data type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on mismatch or when a custom type is unknown.
    pub fn check_value(
        &self,
        data_type: &DataType,
        value: &AttributeValue,
    ) -> Result<(), SchemaError> {
        let fits = match (data_type, value) {
            (DataType::Identifier, AttributeValue::Identifier(_))
            | (DataType::Bool, AttributeValue::Bool(_))
            | (DataType::Int | DataType::Timestamp, AttributeValue::Int(_))
            | (DataType::Str, AttributeValue::Str(_)) => true,
            (DataType::Custom(name), value) => {
                self.attribute_serializer(name, SERIALIZATION_FORMAT_JSON)?
                    .serialize_value(value)?;
                true
            }
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(SchemaError::ValueMismatch {
                data_type: data_type.to_string(),
                detail: format!("found {}", value.kind_name()),
            })
        }
    }

    /// Decodes a JSON value according to a data type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the JSON does not fit the data type.
    pub fn value_from_json(
        &self,
        data_type: &DataType,
        json: &serde_json::Value,
    ) -> Result<AttributeValue, SchemaError> {
        let mismatch = || SchemaError::ValueMismatch {
            data_type: data_type.to_string(),
            detail: format!("unexpected json {json}"),
        };
        match data_type {
            DataType::Bool => json.as_bool().map(AttributeValue::Bool).ok_or_else(mismatch),
            DataType::Int | DataType::Timestamp => {
                json.as_i64().map(AttributeValue::Int).ok_or_else(mismatch)
            }
            DataType::Str => {
                let text = json.as_str().ok_or_else(mismatch)?;
                Ok(AttributeValue::Str(text.to_string()))
            }
            DataType::Identifier => {
                let text = json.as_str().ok_or_else(mismatch)?;
                let identifier = text
                    .parse::<AttributeContainerIdentifier>()
                    .map_err(|err| SchemaError::ValueMismatch {
                        data_type: data_type.to_string(),
                        detail: err.to_string(),
                    })?;
                Ok(AttributeValue::Identifier(identifier))
            }
            DataType::Custom(name) => {
                let serializer = self.attribute_serializer(name, SERIALIZATION_FORMAT_JSON)?;
                serializer.deserialize_value(&json.to_string())
            }
        }
    }
}
