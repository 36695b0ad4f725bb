// crates/acstore-store-sqlite/src/lib.rs
// ============================================================================
// Module: acstore SQLite Store Library
// Description: SQLite backend for the attribute container store.
// Purpose: Expose the SQLite store, its configuration, and value mapping.
// Dependencies: crate::{schema, store}
// ============================================================================

//! ## Overview
//! Persists attribute containers in a single `SQLite` file with one table per
//! container type and a `metadata` table recording the format version and the
//! serialization format of custom attribute values.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod schema;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use schema::SqliteSchemaHelper;
pub use store::APPEND_COMPATIBLE_FORMAT_VERSION;
pub use store::FORMAT_VERSION;
pub use store::READ_COMPATIBLE_FORMAT_VERSION;
pub use store::SqliteAttributeContainerStore;
pub use store::SqliteJournalMode;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
pub use store::UPGRADE_COMPATIBLE_FORMAT_VERSION;
