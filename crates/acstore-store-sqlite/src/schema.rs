// crates/acstore-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema Helper
// Description: Mapping between attribute values and SQLite column values.
// Purpose: Choose column storage types and convert values in both directions.
// Dependencies: acstore-core, rusqlite
// ============================================================================

//! ## Overview
//! Built-in data types map onto native `SQLite` storage classes. Booleans are
//! stored as 0/1 integers, identifiers as their `<type>.<n>` string form, and
//! custom types as the text produced by their registered serializer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use acstore_core::AttributeContainerIdentifier;
use acstore_core::AttributeValue;
use acstore_core::DataType;
use acstore_core::SchemaError;
use acstore_core::SchemaHelper;
use rusqlite::types::Value;

// ============================================================================
// SECTION: Schema Helper
// ============================================================================

/// Converts attribute values to and from `SQLite` column values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSchemaHelper;

impl SqliteSchemaHelper {
    /// Returns the column type used to store a data type.
    #[must_use]
    pub const fn storage_data_type(data_type: &DataType) -> &'static str {
        match data_type {
            DataType::Bool | DataType::Int => "INTEGER",
            DataType::Timestamp => "BIGINT",
            DataType::Str | DataType::Identifier | DataType::Custom(_) => "TEXT",
        }
    }

    /// Converts an attribute value into a column value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the value does not fit the data type or
    /// the data type is unknown.
    pub fn serialize_value(
        schema_helper: &SchemaHelper,
        serialization_format: &str,
        data_type: &DataType,
        value: Option<&AttributeValue>,
    ) -> Result<Value, SchemaError> {
        let Some(value) = value else {
            return Ok(Value::Null);
        };
        match (data_type, value) {
            (DataType::Bool, AttributeValue::Bool(flag)) => Ok(Value::Integer(i64::from(*flag))),
            (DataType::Int | DataType::Timestamp, AttributeValue::Int(number)) => {
                Ok(Value::Integer(*number))
            }
            (DataType::Str, AttributeValue::Str(text)) => Ok(Value::Text(text.clone())),
            (DataType::Identifier, AttributeValue::Identifier(identifier)) => {
                Ok(identifier.copy_to_string().map_or(Value::Null, Value::Text))
            }
            (DataType::Custom(name), value) => {
                let serializer = schema_helper.attribute_serializer(name, serialization_format)?;
                Ok(Value::Text(serializer.serialize_value(value)?))
            }
            (data_type, value) => Err(SchemaError::ValueMismatch {
                data_type: data_type.to_string(),
                detail: format!("found {}", value.kind_name()),
            }),
        }
    }

    /// Converts a column value into an attribute value; NULL yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the column value does not fit the data
    /// type or the data type is unknown.
    pub fn deserialize_value(
        schema_helper: &SchemaHelper,
        serialization_format: &str,
        data_type: &DataType,
        value: Value,
    ) -> Result<Option<AttributeValue>, SchemaError> {
        let mismatch = |found: &str| SchemaError::ValueMismatch {
            data_type: data_type.to_string(),
            detail: format!("found sqlite {found}"),
        };
        let attribute = match (data_type, value) {
            (_, Value::Null) => return Ok(None),
            (DataType::Bool, Value::Integer(number)) => AttributeValue::Bool(number != 0),
            (DataType::Int | DataType::Timestamp, Value::Integer(number)) => {
                AttributeValue::Int(number)
            }
            (DataType::Str, Value::Text(text)) => AttributeValue::Str(text),
            (DataType::Identifier, Value::Text(text)) => {
                let identifier = text.parse::<AttributeContainerIdentifier>().map_err(|err| {
                    SchemaError::ValueMismatch {
                        data_type: data_type.to_string(),
                        detail: err.to_string(),
                    }
                })?;
                AttributeValue::Identifier(identifier)
            }
            (DataType::Custom(name), Value::Text(text)) => {
                let serializer = schema_helper.attribute_serializer(name, serialization_format)?;
                serializer.deserialize_value(&text)?
            }
            (_, Value::Integer(_)) => return Err(mismatch("integer")),
            (_, Value::Real(_)) => return Err(mismatch("real")),
            (_, Value::Text(_)) => return Err(mismatch("text")),
            (_, Value::Blob(_)) => return Err(mismatch("blob")),
        };
        Ok(Some(attribute))
    }
}
