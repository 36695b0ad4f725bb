// crates/acstore-config/src/config.rs
// ============================================================================
// Module: acstore Configuration
// Description: Configuration loading and validation for acstore.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: acstore-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then the `ACSTORE_CONFIG` environment
//! variable, then `./acstore.toml`. Only the last one may be absent, in which
//! case defaults apply. Relative paths inside the file resolve against the
//! directory holding the file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use acstore_store_sqlite::SqliteJournalMode;
use acstore_store_sqlite::SqliteStoreConfig;
use acstore_store_sqlite::SqliteSyncMode;
use acstore_store_sqlite::store::DEFAULT_MAX_CACHED_CONTAINERS;
use acstore_store_sqlite::store::DEFAULT_MAX_WRITE_CACHE_SIZE;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "acstore.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ACSTORE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of definition files.
pub const MAX_DEFINITION_FILES: usize = 64;
/// Maximum length of a log filter directive.
const MAX_LOG_LEVEL_LENGTH: usize = 256;
/// Default store busy timeout in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default log filter.
const DEFAULT_LOG_LEVEL: &str = "warn";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// acstore configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcstoreConfig {
    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Container definition files.
    #[serde(default)]
    pub definitions: DefinitionsConfig,
}

impl AcstoreConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = resolve_path(path, env::var(CONFIG_ENV_VAR).ok())?;
        let resolved = explicit.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME));
        validate_path(&resolved)?;
        if explicit.is_none() && !resolved.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        if let Some(base) = resolved.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.logging.validate()?;
        self.definitions.validate()
    }

    /// Joins relative store and definition paths onto a base directory.
    fn resolve_relative_paths(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        if let Some(path) = self.store.path.as_mut()
            && path.is_relative()
        {
            *path = base.join(&*path);
        }
        for file in &mut self.definitions.files {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Default store file used when a command names none.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Opens stores without write access.
    #[serde(default)]
    pub read_only: bool,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Capacity of the LRU read cache.
    #[serde(default = "default_max_cached_containers")]
    pub max_cached_containers: usize,
    /// Buffered rows per type before an insert is issued.
    #[serde(default = "default_max_write_cache_size")]
    pub max_write_cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            busy_timeout_ms: default_store_busy_timeout_ms(),
            max_cached_containers: default_max_cached_containers(),
            max_write_cache_size: default_max_write_cache_size(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("store.path", &path.to_string_lossy())?;
        }
        if self.max_cached_containers == 0 {
            return Err(ConfigError::Invalid(
                "store.max_cached_containers must be greater than zero".to_string(),
            ));
        }
        if self.max_write_cache_size == 0 {
            return Err(ConfigError::Invalid(
                "store.max_write_cache_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the `SQLite` store configuration for a store file.
    ///
    /// `path` overrides the configured path. `read_only` is combined with the
    /// configured flag, so a read-only config stays read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no path is available.
    pub fn sqlite_config(
        &self,
        path: Option<&Path>,
        read_only: bool,
    ) -> Result<SqliteStoreConfig, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.path.clone())
            .ok_or_else(|| ConfigError::Invalid("store path must be set".to_string()))?;
        Ok(SqliteStoreConfig {
            path,
            read_only: read_only || self.read_only,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            busy_timeout_ms: self.busy_timeout_ms,
            max_cached_containers: self.max_cached_containers,
            max_write_cache_size: self.max_write_cache_size,
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log filter directive, e.g. `warn` or `acstore_store_sqlite=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emits ANSI colors.
    #[serde(default)]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim();
        if level.is_empty() {
            return Err(ConfigError::Invalid("logging.level must be non-empty".to_string()));
        }
        if level.len() > MAX_LOG_LEVEL_LENGTH {
            return Err(ConfigError::Invalid("logging.level exceeds max length".to_string()));
        }
        if !level.chars().all(|c| c.is_ascii_alphanumeric() || "_-=:,.[]{}\"".contains(c)) {
            return Err(ConfigError::Invalid(
                "logging.level contains unsupported characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Container definition files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionsConfig {
    /// YAML definition files registered in order.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl DefinitionsConfig {
    /// Validates definition file entries.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.files.len() > MAX_DEFINITION_FILES {
            return Err(ConfigError::Invalid(format!(
                "definitions.files exceeds {MAX_DEFINITION_FILES} entries"
            )));
        }
        for file in &self.files {
            validate_path_string("definitions.files", &file.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Returns the default store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Returns the default read cache capacity.
const fn default_max_cached_containers() -> usize {
    DEFAULT_MAX_CACHED_CONTAINERS
}

/// Returns the default write cache size.
const fn default_max_write_cache_size() -> usize {
    DEFAULT_MAX_WRITE_CACHE_SIZE
}

/// Returns the default log filter.
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves an explicit config path from the caller or the environment.
///
/// Returns `None` when the default file name applies.
fn resolve_path(
    path: Option<&Path>,
    env_value: Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = env_value {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    Ok(None)
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
