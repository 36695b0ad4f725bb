// crates/acstore-core/src/definitions.rs
// ============================================================================
// Module: Container Definitions File
// Description: YAML reader for attribute container definitions.
// Purpose: Load container schemas from multi-document YAML files.
// Dependencies: serde, serde_yaml, thiserror, tracing
// ============================================================================

//! ## Overview
//! A definitions file holds one YAML document per container type:
//!
//! ```yaml
//! name: event
//! attributes:
//! - name: timestamp
//!   type: timestamp
//! - name: tags
//!   type: List[str]
//! serializable_protected_attributes:
//! - _event_values_hash
//! ```
//!
//! Every attribute type must be known to the [`SchemaHelper`] used while
//! reading. Empty documents are skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::containers::ContainerDefinition;
use crate::schema::DataType;
use crate::schema::SchemaHelper;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum definitions file size in bytes.
pub const MAX_DEFINITIONS_FILE_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Definitions file errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionsError {
    /// File could not be read.
    #[error("unable to read definitions file {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Error message.
        message: String,
    },
    /// File exceeds the size limit.
    #[error("definitions file {path} exceeds {max_bytes} bytes")]
    TooLarge {
        /// File path.
        path: String,
        /// Maximum allowed bytes.
        max_bytes: u64,
    },
    /// YAML syntax error.
    #[error("invalid definitions yaml: {0}")]
    Yaml(String),
    /// Document does not describe a valid container definition.
    #[error("invalid definition in document {document}: {message}")]
    Format {
        /// Zero-based document index.
        document: usize,
        /// Error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Raw Documents
// ============================================================================

/// Attribute entry as written in YAML.
#[derive(Debug, Deserialize)]
struct RawAttribute {
    /// Attribute name.
    name: Option<String>,
    /// Attribute data type name.
    #[serde(rename = "type")]
    data_type: Option<String>,
}

/// Container definition document as written in YAML.
#[derive(Debug, Deserialize)]
struct RawDefinition {
    /// Container type name.
    name: Option<String>,
    /// Attribute entries.
    attributes: Option<Vec<RawAttribute>>,
    /// Protected attribute names that are serialized.
    #[serde(default)]
    serializable_protected_attributes: Vec<String>,
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Reads container definitions from a YAML file.
///
/// # Errors
///
/// Returns [`DefinitionsError`] when the file cannot be read or is invalid.
pub fn read_definitions_file(
    path: &Path,
    schema_helper: &SchemaHelper,
) -> Result<Vec<ContainerDefinition>, DefinitionsError> {
    let io_error = |err: std::io::Error| DefinitionsError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    };
    let metadata = fs::metadata(path).map_err(io_error)?;
    if metadata.len() > MAX_DEFINITIONS_FILE_BYTES {
        return Err(DefinitionsError::TooLarge {
            path: path.display().to_string(),
            max_bytes: MAX_DEFINITIONS_FILE_BYTES,
        });
    }
    let text = fs::read_to_string(path).map_err(io_error)?;
    let definitions = read_definitions(&text, schema_helper)?;
    debug!(path = %path.display(), definitions = definitions.len(), "read definitions file");
    Ok(definitions)
}

/// Reads container definitions from YAML text.
///
/// # Errors
///
/// Returns [`DefinitionsError`] for YAML errors or invalid documents.
pub fn read_definitions(
    text: &str,
    schema_helper: &SchemaHelper,
) -> Result<Vec<ContainerDefinition>, DefinitionsError> {
    let mut definitions = Vec::new();
    for (document, deserializer) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let raw = Option::<RawDefinition>::deserialize(deserializer)
            .map_err(|err| DefinitionsError::Yaml(err.to_string()))?;
        if let Some(raw) = raw {
            definitions.push(convert_definition(document, raw, schema_helper)?);
        }
    }
    Ok(definitions)
}

/// Converts a raw document into a definition.
fn convert_definition(
    document: usize,
    raw: RawDefinition,
    schema_helper: &SchemaHelper,
) -> Result<ContainerDefinition, DefinitionsError> {
    let format_error = |message: String| DefinitionsError::Format {
        document,
        message,
    };
    let name = raw.name.filter(|name| !name.is_empty()).ok_or_else(|| {
        format_error("missing container type name".to_string())
    })?;
    let attributes = raw
        .attributes
        .ok_or_else(|| format_error(format!("missing attributes of container type {name}")))?;

    let mut definition = ContainerDefinition::new(name.clone());
    for attribute in attributes {
        let attribute_name = attribute.name.ok_or_else(|| {
            format_error(format!("attribute without name in container type {name}"))
        })?;
        let type_name = attribute.data_type.ok_or_else(|| {
            format_error(format!("attribute {attribute_name} of container type {name} has no type"))
        })?;
        if !schema_helper.has_data_type(&type_name) {
            return Err(format_error(format!(
                "attribute {attribute_name} of container type {name} has unsupported type \
                 {type_name}"
            )));
        }
        let data_type = type_name.parse::<DataType>().map_err(|err| format_error(err.to_string()))?;
        definition = definition.with_attribute(attribute_name, data_type);
    }
    for protected in raw.serializable_protected_attributes {
        definition = definition.with_serializable_protected_attribute(protected);
    }
    Ok(definition)
}
