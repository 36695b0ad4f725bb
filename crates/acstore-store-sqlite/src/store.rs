// crates/acstore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Attribute Container Store
// Description: Attribute container store backed by a single SQLite file.
// Purpose: Persist containers in per-type tables with batched inserts and an
//          LRU read cache.
// Dependencies: acstore-core, lru, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteAttributeContainerStore`] keeps one table per container type. The
//! table has an `_identifier INTEGER PRIMARY KEY AUTOINCREMENT` column followed
//! by the schema attributes in sorted name order, so a container's sequence
//! number equals its row id. A `metadata` table records the format version and
//! the serialization format of custom attribute values.
//!
//! New containers are buffered per type and written as multi-row inserts. The
//! buffer of a type is written before any read or update of that type. Writes
//! run inside a deferred transaction that [`flush`] and [`close`] commit.
//! Security posture: database contents are untrusted; table and column names
//! come from validated definitions and filter literals are bound as parameters.
//!
//! [`flush`]: SqliteAttributeContainerStore::flush
//! [`close`]: AttributeContainerStore::close

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::iter;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use acstore_core::AttributeContainer;
use acstore_core::AttributeContainerIdentifier;
use acstore_core::AttributeContainerStore;
use acstore_core::AttributeContainersManager;
use acstore_core::ContainerDefinition;
use acstore_core::DataType;
use acstore_core::SchemaHelper;
use acstore_core::SequenceNumbers;
use acstore_core::StorageProfiler;
use acstore_core::StoreError;
use acstore_core::containers::RESERVED_IDENTIFIER_ATTRIBUTE;
use acstore_core::filter::SqlParameter;
use acstore_core::interfaces::identifier_index;
use acstore_core::interfaces::parse_filter_expression;
use acstore_core::profiler::PROFILE_GET_CONTAINER_BY_INDEX;
use acstore_core::profiler::PROFILE_GET_CONTAINERS;
use acstore_core::profiler::PROFILE_WRITE_EXISTING;
use acstore_core::profiler::PROFILE_WRITE_NEW;
use acstore_core::schema::SERIALIZATION_FORMAT_JSON;
use lru::LruCache;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::schema::SqliteSchemaHelper;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Format version written to new files.
pub const FORMAT_VERSION: i64 = 20_230_312;
/// Oldest format version that can be appended to.
pub const APPEND_COMPATIBLE_FORMAT_VERSION: i64 = 20_221_023;
/// Oldest format version that is upgraded to [`FORMAT_VERSION`] on open.
pub const UPGRADE_COMPATIBLE_FORMAT_VERSION: i64 = 20_221_023;
/// Oldest format version that can be read.
pub const READ_COMPATIBLE_FORMAT_VERSION: i64 = 20_221_023;
/// Default number of containers held by the read cache.
pub const DEFAULT_MAX_CACHED_CONTAINERS: usize = 32 * 1024;
/// Default number of buffered rows per type before an insert is issued.
pub const DEFAULT_MAX_WRITE_CACHE_SIZE: usize = 50;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum bound parameters per statement in the bundled `SQLite`.
const MAX_SQL_VARIABLES: usize = 32_766;
/// Savepoint wrapping a write cache flush.
const FLUSH_SAVEPOINT: &str = "flush_write_cache";
/// Name of the metadata table.
const METADATA_TABLE: &str = "metadata";
/// Metadata key of the format version.
const METADATA_FORMAT_VERSION: &str = "format_version";
/// Metadata key of the serialization format.
const METADATA_SERIALIZATION_FORMAT: &str = "serialization_format";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// In-memory rollback journal (fastest, not crash safe).
    #[default]
    Memory,
    /// WAL journal mode.
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// No syncing (fastest).
    #[default]
    Off,
    /// Normal synchronous mode (balanced).
    Normal,
    /// Full synchronous mode (safest).
    Full,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }
}

/// Configuration for the `SQLite` attribute container store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `max_cached_containers` and `max_write_cache_size` are greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Opens the file without write access.
    #[serde(default)]
    pub read_only: bool,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Capacity of the LRU read cache.
    #[serde(default = "default_max_cached_containers")]
    pub max_cached_containers: usize,
    /// Buffered rows per type before an insert is issued.
    #[serde(default = "default_max_write_cache_size")]
    pub max_write_cache_size: usize,
}

impl SqliteStoreConfig {
    /// Creates a writable configuration with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_cached_containers: DEFAULT_MAX_CACHED_CONTAINERS,
            max_write_cache_size: DEFAULT_MAX_WRITE_CACHE_SIZE,
        }
    }

    /// Returns the configuration with the read-only flag set.
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Validates the path and cache limits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is out of range or
    /// the path is unusable.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.max_cached_containers == 0 {
            return Err(SqliteStoreError::Invalid(
                "max_cached_containers must be greater than zero".to_string(),
            ));
        }
        if self.max_write_cache_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "max_write_cache_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read cache capacity.
const fn default_max_cached_containers() -> usize {
    DEFAULT_MAX_CACHED_CONTAINERS
}

/// Returns the default write cache size.
const fn default_max_write_cache_size() -> usize {
    DEFAULT_MAX_WRITE_CACHE_SIZE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw attribute values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored metadata is malformed or unsupported.
    #[error("sqlite store format error: {0}")]
    Format(String),
    /// Stored format version is incompatible.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid configuration or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Format(message) => Self::Format(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Wraps a `SQLite` engine error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Buffered rows of one container type.
#[derive(Debug)]
struct WriteCache {
    /// Quoted column list shared by every row.
    column_names: Vec<String>,
    /// Pending rows in sequence order.
    rows: Vec<Vec<Value>>,
}

/// Mutable state of an open or closed store.
#[derive(Debug)]
struct SqliteState {
    /// Open connection, `None` when closed.
    connection: Option<Connection>,
    /// Whether the store was opened read-only.
    read_only: bool,
    /// Format version read from (or written to) the file.
    format_version: Option<i64>,
    /// Serialization format of custom attribute values.
    serialization_format: String,
    /// Buffered rows per type before an insert is issued.
    max_write_cache_size: usize,
    /// Pending rows per container type.
    write_caches: BTreeMap<String, WriteCache>,
    /// Recently used containers keyed by `<type>.<index>`.
    read_cache: Option<LruCache<String, AttributeContainer>>,
    /// Last issued sequence numbers.
    sequence_numbers: SequenceNumbers,
    /// Types whose sequence number was seeded from the file.
    seeded_types: BTreeSet<String>,
    /// Optional storage profiler.
    profiler: Option<Arc<StorageProfiler>>,
}

impl SqliteState {
    /// Creates closed state.
    fn closed(profiler: Option<Arc<StorageProfiler>>) -> Self {
        Self {
            connection: None,
            read_only: false,
            format_version: None,
            serialization_format: SERIALIZATION_FORMAT_JSON.to_string(),
            max_write_cache_size: DEFAULT_MAX_WRITE_CACHE_SIZE,
            write_caches: BTreeMap::new(),
            read_cache: None,
            sequence_numbers: SequenceNumbers::new(),
            seeded_types: BTreeSet::new(),
            profiler,
        }
    }

    /// Returns the open connection.
    fn connection(&self) -> Result<&Connection, StoreError> {
        self.connection.as_ref().ok_or(StoreError::Closed)
    }

    /// Fails unless the store is open for writing.
    fn require_writable(&self) -> Result<(), StoreError> {
        self.connection()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Seeds the sequence number of a type from the file on first use.
    fn seed_sequence_number(&mut self, table: &str) -> Result<(), StoreError> {
        if self.seeded_types.contains(table) {
            return Ok(());
        }
        let count = count_rows(self.connection()?, table)?;
        self.sequence_numbers.set(table, count);
        self.seeded_types.insert(table.to_string());
        Ok(())
    }

    /// Buffers a new row, issuing the insert once the buffer is full.
    fn cache_for_write(
        &mut self,
        table: &str,
        schema: &BTreeMap<String, DataType>,
        row: Vec<Value>,
    ) -> Result<(), StoreError> {
        let cache = self.write_caches.entry(table.to_string()).or_insert_with(|| WriteCache {
            column_names: write_column_names(schema),
            rows: Vec::new(),
        });
        cache.rows.push(row);
        let full = cache.rows.len() >= self.max_write_cache_size;
        if full && let Err(err) = self.flush_write_cache(table) {
            if let Some(cache) = self.write_caches.get_mut(table) {
                cache.rows.pop();
            }
            return Err(err);
        }
        Ok(())
    }

    /// Inserts the buffered rows of a type.
    ///
    /// Rows leave the buffer only after every insert succeeds, so a failed
    /// flush can be retried without losing or duplicating rows.
    fn flush_write_cache(&mut self, table: &str) -> Result<(), StoreError> {
        let Some(cache) = self.write_caches.get(table) else {
            return Ok(());
        };
        if cache.rows.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let connection = self.connection()?;
        begin_transaction(connection)?;
        connection
            .execute_batch(&format!("SAVEPOINT {FLUSH_SAVEPOINT};"))
            .map_err(|err| db_error(&err))?;
        if let Err(err) = insert_rows(connection, table, cache) {
            connection
                .execute_batch(&format!(
                    "ROLLBACK TO {FLUSH_SAVEPOINT}; RELEASE {FLUSH_SAVEPOINT};"
                ))
                .map_err(|rollback| db_error(&rollback))?;
            warn!(container_type = table, rows = cache.rows.len(), "write cache flush failed");
            return Err(err.into());
        }
        connection
            .execute_batch(&format!("RELEASE {FLUSH_SAVEPOINT};"))
            .map_err(|err| db_error(&err))?;
        let rows = cache.rows.len();
        self.write_caches.remove(table);
        trace!(container_type = table, rows, "flushed write cache");
        record_timing(self.profiler.as_ref(), PROFILE_WRITE_NEW, started);
        Ok(())
    }

    /// Inserts every buffered row and commits the open transaction.
    fn flush_all(&mut self) -> Result<(), StoreError> {
        let tables: Vec<String> = self.write_caches.keys().cloned().collect();
        for table in &tables {
            self.flush_write_cache(table)?;
        }
        commit_transaction(self.connection()?)?;
        debug!(container_types = tables.len(), "flushed sqlite store");
        Ok(())
    }

    /// Returns a cached container, refreshing its recency.
    fn cached(&mut self, table: &str, index: u64) -> Option<AttributeContainer> {
        let key = read_cache_key(table, index);
        let container = self.read_cache.as_mut()?.get(&key).cloned();
        if container.is_some() {
            trace!(container_type = table, index, "read cache hit");
        }
        container
    }

    /// Stores a container in the read cache.
    fn cache_for_read(&mut self, table: &str, index: u64, container: AttributeContainer) {
        if let Some(cache) = self.read_cache.as_mut() {
            cache.put(read_cache_key(table, index), container);
        }
    }
}

/// Attribute container store backed by `SQLite`.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Sequence number `n` of a type is stored at row id `n` of its table.
#[derive(Debug)]
pub struct SqliteAttributeContainerStore {
    /// Registry of container definitions.
    manager: Arc<AttributeContainersManager>,
    /// Connection and caches guarded by a mutex.
    state: Mutex<SqliteState>,
}

impl SqliteAttributeContainerStore {
    /// Creates a closed store using the given definitions registry.
    #[must_use]
    pub fn new(manager: Arc<AttributeContainersManager>) -> Self {
        Self {
            manager,
            state: Mutex::new(SqliteState::closed(None)),
        }
    }

    /// Returns the definitions registry.
    #[must_use]
    pub fn manager(&self) -> &Arc<AttributeContainersManager> {
        &self.manager
    }

    /// Opens the store file.
    ///
    /// Writable stores create the file and its metadata when missing and
    /// upgrade older compatible format versions. Sequence numbers of every
    /// registered type are seeded from the stored row counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyOpen`] when open, [`StoreError::Invalid`]
    /// for unusable paths, or [`StoreError::Format`] and
    /// [`StoreError::VersionMismatch`] when the metadata is not supported.
    pub fn open(&self, config: &SqliteStoreConfig) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.connection.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        if config.path.as_os_str().is_empty() {
            return Err(StoreError::Invalid("Missing path.".to_string()));
        }
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_cached_containers).ok_or_else(|| {
            StoreError::Invalid("max_cached_containers must be greater than zero".to_string())
        })?;
        if config.read_only {
            if !config.path.is_file() {
                return Err(StoreError::Io(format!(
                    "store file does not exist: {}",
                    config.path.display()
                )));
            }
        } else {
            ensure_parent_dir(&config.path)?;
        }
        let connection = open_connection(config)?;
        let (format_version, serialization_format) = if config.read_only {
            let metadata = read_metadata(&connection)?;
            check_metadata(&metadata, true)?
        } else {
            initialize_metadata(&connection)?
        };

        let mut sequence_numbers = SequenceNumbers::new();
        let mut seeded_types = BTreeSet::new();
        for container_type in self.manager.container_types() {
            sequence_numbers.set(&container_type, count_rows(&connection, &container_type)?);
            seeded_types.insert(container_type);
        }

        debug!(
            path = %config.path.display(),
            read_only = config.read_only,
            format_version,
            "opened sqlite store"
        );
        let profiler = state.profiler.take();
        *state = SqliteState {
            connection: Some(connection),
            read_only: config.read_only,
            format_version: Some(format_version),
            serialization_format,
            max_write_cache_size: config.max_write_cache_size,
            write_caches: BTreeMap::new(),
            read_cache: Some(LruCache::new(capacity)),
            sequence_numbers,
            seeded_types,
            profiler,
        };
        Ok(())
    }

    /// Writes buffered containers and commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] when the store is not open.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.lock_open()?;
        state.flush_all()
    }

    /// Returns true when the file exists and holds a readable format version.
    ///
    /// The file is opened read-only and is never created.
    #[must_use]
    pub fn check_supported_format(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let Ok(connection) = Connection::open_with_flags(path, flags) else {
            return false;
        };
        read_metadata(&connection).is_ok_and(|metadata| {
            metadata
                .get(METADATA_FORMAT_VERSION)
                .is_some_and(|version| version.parse::<i64>().is_ok())
        })
    }

    /// Returns the format version of the open file.
    #[must_use]
    pub fn format_version(&self) -> Option<i64> {
        self.lock().ok().and_then(|state| state.format_version)
    }

    /// Returns the serialization format of custom attribute values.
    #[must_use]
    pub fn serialization_format(&self) -> String {
        self.lock().map_or_else(
            |_| SERIALIZATION_FORMAT_JSON.to_string(),
            |state| state.serialization_format.clone(),
        )
    }

    /// Returns true when the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().is_ok_and(|state| state.connection.is_some())
    }

    /// Returns true when the store was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.lock().is_ok_and(|state| state.read_only)
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, SqliteState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("sqlite store mutex poisoned".to_string()))
    }

    /// Locks the store state, requiring it to be open.
    fn lock_open(&self) -> Result<MutexGuard<'_, SqliteState>, StoreError> {
        let state = self.lock()?;
        state.connection()?;
        Ok(state)
    }

    /// Returns the definition of a type the store can persist.
    fn supported_definition(
        &self,
        container_type: &str,
    ) -> Result<ContainerDefinition, StoreError> {
        let definition = self.manager.definition(container_type)?;
        if definition.schema.is_empty() {
            return Err(StoreError::UnsupportedContainerType(container_type.to_string()));
        }
        Ok(definition)
    }
}

impl AttributeContainerStore for SqliteAttributeContainerStore {
    fn add_attribute_container(
        &self,
        container: &mut AttributeContainer,
    ) -> Result<(), StoreError> {
        let table = container.container_type().to_lowercase();
        let mut state = self.lock()?;
        state.require_writable()?;
        let definition = self.supported_definition(&table)?;
        let schema_helper = self.manager.schema_helper();
        let row =
            serialize_row(&schema_helper, &state.serialization_format, &definition, container)?;
        state.seed_sequence_number(&table)?;
        let last_sequence_number = state.sequence_numbers.current(&table);
        if last_sequence_number == 0 {
            let connection = state.connection()?;
            if !has_table(connection, &table)? {
                begin_transaction(connection)?;
                create_table(connection, &table, &definition.schema)?;
            }
        }
        let sequence_number = last_sequence_number.saturating_add(1);
        let mut values = Vec::with_capacity(row.len() + 1);
        values.push(Value::Integer(sequence_to_sql(sequence_number)?));
        values.extend(row);
        state.cache_for_write(&table, &definition.schema, values)?;
        state.sequence_numbers.set(&table, sequence_number);
        container.set_identifier(AttributeContainerIdentifier::new(table.clone(), sequence_number));
        state.cache_for_read(&table, last_sequence_number, container.clone());
        Ok(())
    }

    fn update_attribute_container(&self, container: &AttributeContainer) -> Result<(), StoreError> {
        let table = container.container_type().to_lowercase();
        let mut state = self.lock()?;
        state.require_writable()?;
        let definition = self.supported_definition(&table)?;
        let schema_helper = self.manager.schema_helper();
        let identifier = container.identifier();
        let missing = || {
            StoreError::MissingContainer(format!(
                "unable to update non-existing attribute container: {identifier}"
            ))
        };
        let index = identifier_index(identifier).map_err(|_| missing())?;
        let sequence_number = index + 1;
        state.seed_sequence_number(&table)?;
        if sequence_number > state.sequence_numbers.current(&table) {
            return Err(missing());
        }
        state.flush_write_cache(&table)?;
        let row =
            serialize_row(&schema_helper, &state.serialization_format, &definition, container)?;

        let started = Instant::now();
        let assignments = definition
            .schema
            .keys()
            .map(|name| format!("{} = ?", quote_identifier(name)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {RESERVED_IDENTIFIER_ATTRIBUTE} = ?",
            quote_identifier(&table)
        );
        let key = Value::Integer(sequence_to_sql(sequence_number)?);
        let connection = state.connection()?;
        begin_transaction(connection)?;
        let changed = connection
            .execute(&sql, params_from_iter(row.iter().chain(iter::once(&key))))
            .map_err(|err| db_error(&err))?;
        if changed == 0 {
            return Err(missing());
        }
        record_timing(state.profiler.as_ref(), PROFILE_WRITE_EXISTING, started);
        state.cache_for_read(&table, index, container.clone());
        Ok(())
    }

    fn get_attribute_container_by_index(
        &self,
        container_type: &str,
        index: u64,
    ) -> Result<Option<AttributeContainer>, StoreError> {
        let table = container_type.to_lowercase();
        let mut state = self.lock_open()?;
        if let Some(container) = state.cached(&table, index) {
            return Ok(Some(container));
        }
        let definition = self.supported_definition(&table)?;
        state.flush_write_cache(&table)?;
        state.seed_sequence_number(&table)?;
        if index >= state.sequence_numbers.current(&table) {
            return Ok(None);
        }
        let schema_helper = self.manager.schema_helper();

        let started = Instant::now();
        let sequence_number = index + 1;
        let column_count = definition.schema.len();
        let sql = format!(
            "SELECT {} FROM {} WHERE _ROWID_ = ?1",
            read_column_names(&definition.schema),
            quote_identifier(&table)
        );
        let connection = state.connection()?;
        let values = connection
            .query_row(&sql, params![sequence_to_sql(sequence_number)?], |row| {
                row_values(row, column_count)
            })
            .optional()
            .map_err(|err| db_error(&err))?;
        record_timing(state.profiler.as_ref(), PROFILE_GET_CONTAINER_BY_INDEX, started);

        let Some(values) = values else {
            return Ok(None);
        };
        let container = build_container(
            &definition,
            &schema_helper,
            &state.serialization_format,
            values,
            AttributeContainerIdentifier::new(table.clone(), sequence_number),
        )?;
        state.cache_for_read(&table, index, container.clone());
        Ok(Some(container))
    }

    fn get_attribute_containers(
        &self,
        container_type: &str,
        filter_expression: Option<&str>,
    ) -> Result<Vec<AttributeContainer>, StoreError> {
        let table = container_type.to_lowercase();
        let definition = self.supported_definition(&table)?;
        let expression = parse_filter_expression(filter_expression)?;
        let sql_filter = expression
            .map(|expression| expression.to_sql(|name| definition.schema.contains_key(name)))
            .transpose()?;
        let schema_helper = self.manager.schema_helper();
        let mut state = self.lock_open()?;
        state.flush_write_cache(&table)?;
        state.seed_sequence_number(&table)?;
        if state.sequence_numbers.current(&table) == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let (where_clause, parameters) = sql_filter.map_or_else(
            || (String::new(), Vec::new()),
            |sql_filter| {
                let parameters: Vec<Value> =
                    sql_filter.parameters.into_iter().map(sql_parameter_value).collect();
                (format!(" WHERE {}", sql_filter.clause), parameters)
            },
        );
        let sql = format!(
            "SELECT {RESERVED_IDENTIFIER_ATTRIBUTE}, {} FROM {}{where_clause} ORDER BY \
             {RESERVED_IDENTIFIER_ATTRIBUTE}",
            read_column_names(&definition.schema),
            quote_identifier(&table)
        );

        let column_count = definition.schema.len() + 1;
        let connection = state.connection()?;
        let mut statement = connection.prepare(&sql).map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params_from_iter(parameters.iter()), |row| row_values(row, column_count))
            .map_err(|err| db_error(&err))?;
        let mut containers = Vec::new();
        for row in rows {
            let mut values = row.map_err(|err| db_error(&err))?;
            let sequence_number = match values.first() {
                Some(Value::Integer(number)) => u64::try_from(*number).map_err(|_| {
                    StoreError::Format(format!("invalid identifier {number} in table {table}"))
                })?,
                _ => {
                    return Err(StoreError::Format(format!(
                        "missing identifier in table {table}"
                    )));
                }
            };
            let attribute_values = values.split_off(1);
            containers.push(build_container(
                &definition,
                &schema_helper,
                &state.serialization_format,
                attribute_values,
                AttributeContainerIdentifier::new(table.clone(), sequence_number),
            )?);
        }
        record_timing(state.profiler.as_ref(), PROFILE_GET_CONTAINERS, started);
        Ok(containers)
    }

    fn get_number_of_attribute_containers(&self, container_type: &str) -> Result<u64, StoreError> {
        let table = container_type.to_lowercase();
        let mut state = self.lock_open()?;
        state.flush_write_cache(&table)?;
        Ok(count_rows(state.connection()?, &table)?)
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.connection.is_none() {
            return Err(StoreError::AlreadyClosed);
        }
        state.flush_all()?;
        if let Some(connection) = state.connection.take() {
            connection.close().map_err(|(_, err)| StoreError::from(db_error(&err)))?;
        }
        let profiler = state.profiler.take();
        *state = SqliteState::closed(profiler);
        debug!("closed sqlite store");
        Ok(())
    }

    fn set_storage_profiler(&self, profiler: Option<Arc<StorageProfiler>>) {
        if let Ok(mut state) = self.lock() {
            state.profiler = profiler;
        }
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Serializes the schema attributes of a container in column order.
fn serialize_row(
    schema_helper: &SchemaHelper,
    serialization_format: &str,
    definition: &ContainerDefinition,
    container: &AttributeContainer,
) -> Result<Vec<Value>, StoreError> {
    definition
        .schema
        .iter()
        .map(|(name, data_type)| {
            SqliteSchemaHelper::serialize_value(
                schema_helper,
                serialization_format,
                data_type,
                container.get_attribute(name),
            )
            .map_err(|_| unsupported_attribute(&definition.container_type, name, data_type))
        })
        .collect()
}

/// Builds a container from column values in schema order.
fn build_container(
    definition: &ContainerDefinition,
    schema_helper: &SchemaHelper,
    serialization_format: &str,
    values: Vec<Value>,
    identifier: AttributeContainerIdentifier,
) -> Result<AttributeContainer, StoreError> {
    let mut container = definition.create_container();
    for ((name, data_type), value) in definition.schema.iter().zip(values) {
        let attribute = SqliteSchemaHelper::deserialize_value(
            schema_helper,
            serialization_format,
            data_type,
            value,
        )
        .map_err(|_| unsupported_attribute(&definition.container_type, name, data_type))?;
        if let Some(attribute) = attribute {
            container.set_attribute(name.clone(), attribute);
        }
    }
    container.set_identifier(identifier);
    Ok(container)
}

/// Reads the first `column_count` columns of a row.
fn row_values(row: &rusqlite::Row<'_>, column_count: usize) -> rusqlite::Result<Vec<Value>> {
    (0 .. column_count).map(|column| row.get::<_, Value>(column)).collect()
}

/// Builds an unsupported attribute error.
fn unsupported_attribute(container_type: &str, name: &str, data_type: &DataType) -> StoreError {
    StoreError::UnsupportedAttribute {
        container_type: container_type.to_string(),
        attribute: name.to_string(),
        data_type: data_type.to_string(),
    }
}

/// Converts a bound filter literal into a column value.
fn sql_parameter_value(parameter: SqlParameter) -> Value {
    match parameter {
        SqlParameter::Integer(number) => Value::Integer(number),
        SqlParameter::Text(text) => Value::Text(text),
    }
}

/// Converts a sequence number into a row id.
fn sequence_to_sql(sequence_number: u64) -> Result<i64, StoreError> {
    i64::try_from(sequence_number)
        .map_err(|_| {
            StoreError::Invalid(format!("sequence number out of range: {sequence_number}"))
        })
}

/// Returns the read cache key of a container.
fn read_cache_key(table: &str, index: u64) -> String {
    format!("{table}.{index}")
}

/// Quotes a table or column name.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns the quoted schema columns in sorted order.
fn read_column_names(schema: &BTreeMap<String, DataType>) -> String {
    schema.keys().map(|name| quote_identifier(name)).collect::<Vec<_>>().join(", ")
}

/// Returns the quoted insert columns, identifier first.
fn write_column_names(schema: &BTreeMap<String, DataType>) -> Vec<String> {
    iter::once(RESERVED_IDENTIFIER_ATTRIBUTE.to_string())
        .chain(schema.keys().map(|name| quote_identifier(name)))
        .collect()
}

/// Records a timing when a profiler is attached.
fn record_timing(profiler: Option<&Arc<StorageProfiler>>, name: &str, started: Instant) {
    if let Some(profiler) = profiler {
        profiler.record(name, started.elapsed());
    }
}

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Inserts buffered rows in statements bounded by the variable limit.
fn insert_rows(
    connection: &Connection,
    table: &str,
    cache: &WriteCache,
) -> Result<(), SqliteStoreError> {
    let column_count = cache.column_names.len();
    let placeholders = format!("({})", vec!["?"; column_count].join(", "));
    let rows_per_statement = (MAX_SQL_VARIABLES / column_count.max(1)).max(1);
    for chunk in cache.rows.chunks(rows_per_statement) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_identifier(table),
            cache.column_names.join(", "),
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );
        connection
            .execute(&sql, params_from_iter(chunk.iter().flatten()))
            .map_err(|err| db_error(&err))?;
    }
    Ok(())
}

/// Returns true when the table exists.
fn has_table(connection: &Connection, table: &str) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(|err| db_error(&err))
}

/// Creates the table of a container type.
fn create_table(
    connection: &Connection,
    table: &str,
    schema: &BTreeMap<String, DataType>,
) -> Result<(), SqliteStoreError> {
    let identifier_column =
        format!("{RESERVED_IDENTIFIER_ATTRIBUTE} INTEGER PRIMARY KEY AUTOINCREMENT");
    let columns = iter::once(identifier_column)
        .chain(schema.iter().map(|(name, data_type)| {
            let storage_type = SqliteSchemaHelper::storage_data_type(data_type);
            format!("{} {storage_type}", quote_identifier(name))
        }))
        .collect::<Vec<_>>()
        .join(", ");
    connection
        .execute_batch(&format!("CREATE TABLE {} ({columns});", quote_identifier(table)))
        .map_err(|err| db_error(&err))?;
    debug!(container_type = table, columns = schema.len(), "created container table");
    Ok(())
}

/// Returns the number of rows of a table, 0 when it does not exist.
fn count_rows(connection: &Connection, table: &str) -> Result<u64, SqliteStoreError> {
    if !has_table(connection, table)? {
        return Ok(0);
    }
    let max_row_id: Option<i64> = connection
        .query_row(
            &format!("SELECT MAX(_ROWID_) FROM {} LIMIT 1", quote_identifier(table)),
            [],
            |row| row.get(0),
        )
        .map_err(|err| db_error(&err))?;
    u64::try_from(max_row_id.unwrap_or(0))
        .map_err(|_| SqliteStoreError::Format(format!("negative row id in table {table}")))
}

/// Starts an immediate transaction unless one is open.
///
/// The write lock is taken on begin, so a busy database fails here and
/// leaves no transaction holding a stale read snapshot.
fn begin_transaction(connection: &Connection) -> Result<(), SqliteStoreError> {
    if connection.is_autocommit() {
        connection.execute_batch("BEGIN IMMEDIATE;").map_err(|err| db_error(&err))?;
    }
    Ok(())
}

/// Commits the open transaction, if any.
fn commit_transaction(connection: &Connection) -> Result<(), SqliteStoreError> {
    if !connection.is_autocommit() {
        connection.execute_batch("COMMIT;").map_err(|err| db_error(&err))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Reads the metadata key/value pairs.
fn read_metadata(connection: &Connection) -> Result<BTreeMap<String, String>, SqliteStoreError> {
    if !has_table(connection, METADATA_TABLE)? {
        return Err(SqliteStoreError::Format("missing metadata table".to_string()));
    }
    let mut statement = connection
        .prepare("SELECT key, value FROM metadata")
        .map_err(|err| db_error(&err))?;
    let rows = statement
        .query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?)))
        .map_err(|err| db_error(&err))?;
    let mut metadata = BTreeMap::new();
    for row in rows {
        let (key, value) = row.map_err(|err| db_error(&err))?;
        if let (Some(key), Some(value)) = (metadata_text(key), metadata_text(value)) {
            metadata.insert(key, value);
        }
    }
    Ok(metadata)
}

/// Returns the text form of a metadata cell.
fn metadata_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        Value::Integer(number) => Some(number.to_string()),
        Value::Null | Value::Real(_) | Value::Blob(_) => None,
    }
}

/// Checks the metadata and returns the format version and serialization format.
fn check_metadata(
    metadata: &BTreeMap<String, String>,
    read_only: bool,
) -> Result<(i64, String), SqliteStoreError> {
    let reject = |error: SqliteStoreError| {
        warn!(error = %error, "rejected sqlite store metadata");
        error
    };
    let raw_version = metadata
        .get(METADATA_FORMAT_VERSION)
        .ok_or_else(|| reject(SqliteStoreError::Format("format version not set".to_string())))?;
    let format_version = raw_version.parse::<i64>().map_err(|_| {
        reject(SqliteStoreError::Format(format!("invalid format version: {raw_version}")))
    })?;
    if !read_only && format_version < APPEND_COMPATIBLE_FORMAT_VERSION {
        return Err(reject(SqliteStoreError::VersionMismatch(format!(
            "format version {format_version} is too old to append to, minimum supported is \
             {APPEND_COMPATIBLE_FORMAT_VERSION}"
        ))));
    }
    if format_version < READ_COMPATIBLE_FORMAT_VERSION {
        return Err(reject(SqliteStoreError::VersionMismatch(format!(
            "format version {format_version} is too old to read, minimum supported is \
             {READ_COMPATIBLE_FORMAT_VERSION}"
        ))));
    }
    if format_version > FORMAT_VERSION {
        return Err(reject(SqliteStoreError::VersionMismatch(format!(
            "format version {format_version} is too new, maximum supported is {FORMAT_VERSION}"
        ))));
    }
    let serialization_format = metadata.get(METADATA_SERIALIZATION_FORMAT).map(String::as_str);
    if serialization_format != Some(SERIALIZATION_FORMAT_JSON) {
        return Err(reject(SqliteStoreError::Format(format!(
            "unsupported serialization format: {}",
            serialization_format.unwrap_or("<unset>")
        ))));
    }
    Ok((format_version, SERIALIZATION_FORMAT_JSON.to_string()))
}

/// Writes fresh metadata or checks and upgrades existing metadata.
fn initialize_metadata(connection: &Connection) -> Result<(i64, String), SqliteStoreError> {
    if !has_table(connection, METADATA_TABLE)? {
        begin_transaction(connection)?;
        connection
            .execute_batch("CREATE TABLE metadata (key TEXT, value TEXT);")
            .map_err(|err| db_error(&err))?;
        connection
            .execute(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2), (?3, ?4)",
                params![
                    METADATA_FORMAT_VERSION,
                    FORMAT_VERSION.to_string(),
                    METADATA_SERIALIZATION_FORMAT,
                    SERIALIZATION_FORMAT_JSON
                ],
            )
            .map_err(|err| db_error(&err))?;
        commit_transaction(connection)?;
        debug!(format_version = FORMAT_VERSION, "wrote sqlite store metadata");
        return Ok((FORMAT_VERSION, SERIALIZATION_FORMAT_JSON.to_string()));
    }
    let metadata = read_metadata(connection)?;
    let (format_version, serialization_format) = check_metadata(&metadata, false)?;
    if format_version < FORMAT_VERSION && format_version >= UPGRADE_COMPATIBLE_FORMAT_VERSION {
        begin_transaction(connection)?;
        connection
            .execute(
                "UPDATE metadata SET value = ?1 WHERE key = ?2",
                params![FORMAT_VERSION.to_string(), METADATA_FORMAT_VERSION],
            )
            .map_err(|err| db_error(&err))?;
        commit_transaction(connection)?;
        debug!(from = format_version, to = FORMAT_VERSION, "upgraded sqlite store format version");
        return Ok((FORMAT_VERSION, serialization_format));
    }
    Ok((format_version, serialization_format))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection in the configured access mode.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = if config.read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    };
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies the configured journal, sync, and busy timeout settings.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}
